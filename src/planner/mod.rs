//! The migration planner: resolves the full set of packages and migration
//! generators a version bump touches, without writing anything to disk.
//! Two phases, both over the same shared state -- see `phase1` and
//! `phase2`.

pub mod filter;
pub mod package_group;
pub mod phase1;
pub mod phase2;

use crate::installed::InstalledResolver;
use crate::registry::client::RegistryClient;
use crate::registry::document::MigrationDocument;
use crate::registry::fetcher::Fetcher;
use crate::workspace::Workspace;
use filter::Confirm;
use std::collections::HashMap;
use std::sync::Arc;

pub use phase2::PlannedMigration;

pub struct Migrator<'a, R: RegistryClient> {
    pub workspace: &'a Workspace,
    pub installed: InstalledResolver<'a>,
    pub fetcher: Arc<Fetcher<R>>,
    pub confirm: Box<dyn Confirm>,

    /// Final target version per package, as phase 1 concludes.
    pub package_updates: HashMap<String, String>,
    /// The version each package is collected at *right now*, mutated as
    /// phase 1 discovers a higher target for it.
    pub collected_versions: HashMap<String, String>,
    /// The version each package was at before phase 1 touched it; the
    /// floor of phase 2's emission window.
    pub starting_versions: HashMap<String, String>,
    /// Packages in the order phase 1 first visited them; phase 2 emits
    /// migrations package-by-package in this order.
    pub visit_order: Vec<String>,
    /// The migration document fetched for each package's final version.
    pub documents: HashMap<String, MigrationDocument>,
    /// `--to=p1@v1,p2@v2` overrides: when phase 1 discovers a bump for one
    /// of these packages (as the root target, a package-group sibling, or a
    /// `packageJsonUpdates` peer), the override wins over whatever version
    /// the discovery site itself proposed.
    pub to_overrides: HashMap<String, String>,
}

impl<'a, R: RegistryClient + 'static> Migrator<'a, R> {
    pub fn new(workspace: &'a Workspace, fetcher: Arc<Fetcher<R>>, confirm: Box<dyn Confirm>) -> Self {
        Migrator {
            workspace,
            installed: InstalledResolver::new(workspace),
            fetcher,
            confirm,
            package_updates: HashMap::new(),
            collected_versions: HashMap::new(),
            starting_versions: HashMap::new(),
            visit_order: Vec::new(),
            documents: HashMap::new(),
            to_overrides: HashMap::new(),
        }
    }

    pub fn with_to_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.to_overrides = overrides;
        self
    }

    /// `--from=` overrides: seed the resolver so `installed(pkg)` reports
    /// the caller-supplied version rather than whatever is actually on
    /// disk.
    pub fn with_installed_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.installed = self.installed.with_overrides(overrides);
        self
    }

    /// Plan a migration from `name`'s currently installed version to
    /// `target_version`, returning the ordered list of migrations to run.
    pub async fn plan(&mut self, name: &str, target_version: &str, exclude_applied: bool) -> anyhow::Result<Vec<PlannedMigration>> {
        self.run_phase1(name, target_version).await?;
        Ok(self.run_phase2(exclude_applied))
    }
}
