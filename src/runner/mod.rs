//! Executes an already-written `migrations.json`, one migration at a time,
//! stopping at the first failure and rewriting the file to contain only the
//! migrations that didn't run yet -- a rerun of `--run-migrations` after
//! fixing whatever broke resumes instead of starting over.
//!
//! Dispatches per migration on `cli` (§4.9): absent or `"nx"` runs in
//! process through a [`NativeGeneratorHost`] against `implementation`
//! (falling back to `factory`); anything else shells out through a
//! [`MigrationAdapter`], constructed lazily only if the run actually
//! contains one.

pub mod adapter;
pub mod tree;

use crate::planner::PlannedMigration;
use crate::workspace::Workspace;
use adapter::{MigrationAdapter, NativeGeneratorHost};
use anyhow::Context;
use git2::{Repository, Signature};
use log::info;
use tree::ChangeTracker;

/// A migration with no `cli`, or `cli == "nx"`, runs in process; anything
/// else is handed to the external adapter.
fn is_external(migration: &PlannedMigration) -> bool {
    migration.cli.as_deref().map(|cli| cli != "nx").unwrap_or(false)
}

pub struct Runner<'a> {
    workspace: &'a Workspace,
    native_host: Box<dyn NativeGeneratorHost>,
    external_adapter_factory: Box<dyn Fn() -> Box<dyn MigrationAdapter> + Send + Sync>,
    create_commits: bool,
    commit_prefix: String,
}

pub struct RunOutcome {
    pub completed: Vec<String>,
    /// Present if a migration failed; the remaining (unrun) migrations,
    /// including the one that failed, have already been written back to
    /// `migrations.json` by the time this is returned.
    pub failed_at: Option<String>,
}

impl<'a> Runner<'a> {
    pub fn new(
        workspace: &'a Workspace,
        native_host: Box<dyn NativeGeneratorHost>,
        external_adapter_factory: Box<dyn Fn() -> Box<dyn MigrationAdapter> + Send + Sync>,
        create_commits: bool,
        commit_prefix: impl Into<String>,
    ) -> Self {
        Runner { workspace, native_host, external_adapter_factory, create_commits, commit_prefix: commit_prefix.into() }
    }

    pub async fn run(&self, migrations: &[PlannedMigration]) -> anyhow::Result<RunOutcome> {
        let watched = vec![self.workspace.package_json_path(), self.workspace.config_path()];
        let mut tracker = ChangeTracker::new(&self.workspace.root, watched);

        // Only construct the external adapter if this run actually needs
        // it; a run entirely made of native `nx` migrations never pays for
        // it.
        let external_adapter = if migrations.iter().any(is_external) { Some((self.external_adapter_factory)()) } else { None };

        let mut completed = Vec::new();
        for (idx, migration) in migrations.iter().enumerate() {
            let label = format!("{}:{}", migration.package, migration.name);
            info!("running migration {label}");

            let result = if is_external(migration) {
                let cli = migration.cli.as_deref().expect("is_external implies cli is set");
                external_adapter
                    .as_ref()
                    .expect("external adapter constructed above when any migration needs it")
                    .run(&migration.package, &migration.name, cli, self.workspace)
                    .await
            } else {
                match migration.implementation.as_deref().or(migration.factory.as_deref()) {
                    Some(path) => self.native_host.invoke(path, self.workspace, &mut tracker).await,
                    None => Err(anyhow::anyhow!("migration {label} has no cli, implementation, or factory to run")),
                }
            };

            if let Err(e) = result {
                self.write_remaining(&migrations[idx..])?;
                return Ok(RunOutcome { completed, failed_at: Some(format!("{label}: {e:#}")) });
            }

            if self.create_commits && tracker.has_changes() {
                self.commit_migration(migration)
                    .with_context(|| format!("committing migration {label}"))?;
            }
            tracker.flush_changes();

            completed.push(label);
        }

        self.write_remaining(&[])?;
        Ok(RunOutcome { completed, failed_at: None })
    }

    fn commit_migration(&self, migration: &PlannedMigration) -> anyhow::Result<()> {
        let repo = Repository::open(&self.workspace.root).context("workspace is not a git repository")?;
        let mut index = repo.index()?;
        index.add_all(["."].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = repo.find_tree(tree_oid)?;

        let signature = repo.signature().or_else(|_| Signature::now("workspace-migrate", "migrate@localhost"))?;
        let message = format!("{}{}", self.commit_prefix, migration.name);

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)?;
        Ok(())
    }

    fn write_remaining(&self, remaining: &[PlannedMigration]) -> anyhow::Result<()> {
        let entries: Vec<serde_json::Value> = remaining
            .iter()
            .map(|m| {
                serde_json::json!({
                    "package": m.package,
                    "name": m.name,
                    "version": m.version,
                    "description": m.description,
                    "implementation": m.implementation,
                    "factory": m.factory,
                    "cli": m.cli,
                })
            })
            .collect();
        let doc = serde_json::json!({ "migrations": entries });
        let text = serde_json::to_string_pretty(&doc)? + "\n";
        std::fs::write(self.workspace.migrations_json_path(), text).context("rewriting migrations.json")
    }
}
