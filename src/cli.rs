//! The `migrate` command surface: a single subcommand taking a package and
//! a target version, planning the upgrade, writing it to disk, and
//! optionally running the collected migrations straight away.

use anyhow::Context;
use flexi_logger::Logger;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use structopt::{clap::AppSettings::*, StructOpt};
use workspace_migrate::installed::InstalledResolver;
use workspace_migrate::plan::{self, synthetic, write_plan};
use workspace_migrate::planner::filter::{AlwaysYes, DeclineAll, Confirm};
use workspace_migrate::planner::Migrator;
use workspace_migrate::registry::client::HttpRegistryClient;
use workspace_migrate::registry::fetcher::Fetcher;
use workspace_migrate::runner::adapter::{ExternalCliAdapter, UnimplementedNativeHost};
use workspace_migrate::runner::Runner;
use workspace_migrate::semver_util::{normalize_version_with_tag_check, NormalizedInput, Tag};
use workspace_migrate::workspace::Workspace;

#[derive(StructOpt, Debug)]
#[structopt(name = "migrate", about = "Plan and run migrations across the workspace")]
#[structopt(setting(ColorAuto), setting(ColoredHelp))]
pub struct Opt {
    /// The path to the workspace root.
    ///
    /// Must contain `package.json` and, if present, `workspace.json`.
    #[structopt(short, long, parse(from_os_str), default_value = "./")]
    pub workspace_path: PathBuf,

    /// Specify the log levels.
    #[structopt(short, long, default_value = "warn")]
    pub log: String,

    /// Show verbose planner/runner output.
    #[structopt(short, long)]
    pub verbose: bool,

    #[structopt(flatten)]
    pub migrate: MigrateOpts,
}

#[derive(StructOpt, Debug)]
pub struct MigrateOpts {
    /// The package to migrate, optionally with `@version`/`@tag`
    /// (`nx@14.0.0`, `nx@latest`). Bare package names fall back to `--to`,
    /// or `latest` if that is absent too.
    pub package_and_version: String,

    /// `p1@v1,p2@v2,...` -- override what the planner considers installed
    /// for the named packages, instead of reading `node_modules`.
    #[structopt(long)]
    pub from: Option<String>,

    /// `p1@v1,p2@v2,...` -- override the version the planner targets for
    /// the named packages as they're discovered, taking precedence over
    /// whatever a package group or `packageJsonUpdates` entry proposed.
    #[structopt(long)]
    pub to: Option<String>,

    /// Prompt for confirmation on migrations that declare an `x-prompt`.
    #[structopt(long)]
    pub interactive: bool,

    /// Skip migrations whose `requires` is already satisfied by the
    /// installed state, treating them as already applied.
    #[structopt(long)]
    pub exclude_applied_migrations: bool,

    /// Run the collected migrations immediately after planning.
    #[structopt(long)]
    pub run_migrations: bool,

    /// Overrides where `migrations.json` is read from when combined with
    /// `--run-migrations`; defaults to the workspace root's own file.
    #[structopt(long, parse(from_os_str))]
    pub migrations_file: Option<PathBuf>,

    /// With `--run-migrations`, treat a missing migrations file as a no-op
    /// instead of an error. Has no effect on planning.
    #[structopt(long)]
    pub if_exists: bool,

    /// Create one git commit per migration as it runs.
    #[structopt(long)]
    pub create_commits: bool,

    /// Prefix prepended to each migration's commit message.
    #[structopt(long, default_value = "chore(migrate): ")]
    pub commit_prefix: String,
}

/// A bare `"14.0.0"`, `"v14"`, or similar positional with no package name
/// attached: the version itself (not a package) was given, and the target
/// package is picked by which side of the legacy package-group split it
/// falls on.
fn looks_like_version_literal(raw: &str) -> bool {
    raw.strip_prefix('v').unwrap_or(raw).starts_with(|c: char| c.is_ascii_digit())
}

/// `nx`'s predecessor was `@nrwl/workspace`; a bare version below the
/// release where the two diverged (see
/// [`crate::planner::package_group::LEGACY_PACKAGE_GROUP_THRESHOLD`])
/// targets the legacy name, everything else targets `nx`.
fn default_target_package(version_or_tag: &str) -> &'static str {
    if version_or_tag == "latest" || version_or_tag == "next" {
        return "nx";
    }
    let v = workspace_migrate::semver_util::normalize_version(version_or_tag);
    let threshold =
        workspace_migrate::semver_util::normalize_version(workspace_migrate::planner::package_group::LEGACY_PACKAGE_GROUP_THRESHOLD);
    if v < threshold {
        "@nrwl/workspace"
    } else {
        "nx"
    }
}

fn parse_package_and_version(raw: &str) -> (String, Option<String>) {
    if let Some((name, version)) = raw.rsplit_once('@') {
        if !name.is_empty() {
            return (name.to_owned(), Some(version.to_owned()));
        }
    }
    if raw == "latest" || raw == "next" || looks_like_version_literal(raw) {
        return (default_target_package(raw).to_owned(), Some(raw.to_owned()));
    }
    (raw.to_owned(), None)
}

/// Parses `--from`/`--to`'s `"p1@v1,p2@v2,..."` shape into a per-package
/// override map; empty entries (a trailing comma) are ignored, but an entry
/// missing `@` or with an empty side on either of it is a user error.
fn parse_overrides(raw: &str, flag: &str) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut map = std::collections::HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, version) = entry
            .rsplit_once('@')
            .filter(|(n, v)| !n.is_empty() && !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("invalid --{flag} entry \"{entry}\": expected \"package@version\""))?;
        map.insert(name.to_owned(), version.to_owned());
    }
    Ok(map)
}

pub fn run(args: Opt) -> Result<(), anyhow::Error> {
    let level = if args.verbose { "debug" } else { args.log.as_str() };
    let _ = Logger::try_with_str(level)?.start()?;

    let workspace_root = std::fs::canonicalize(&args.workspace_path).context("resolving workspace path")?;
    let workspace = Workspace::at(workspace_root);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    rt.block_on(run_migrate(&workspace, args.migrate))
}

/// Reads the migrations file for `--run-migrations`. A missing file is a
/// hard error unless `if_exists` is set, in which case it's reported as a
/// clean no-op (`Ok(None)`) -- `--if-exists` only ever applies here, never
/// to whether the target package itself is installed.
fn read_migrations_file(path: &std::path::Path, if_exists: bool) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if if_exists && e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn run_migrate(workspace: &Workspace, opts: MigrateOpts) -> anyhow::Result<()> {
    let from_overrides = opts.from.as_deref().map(|s| parse_overrides(s, "from")).transpose()?.unwrap_or_default();
    let to_overrides = opts.to.as_deref().map(|s| parse_overrides(s, "to")).transpose()?.unwrap_or_default();

    let (name, embedded_version) = parse_package_and_version(&opts.package_and_version);
    let target_raw = embedded_version.or_else(|| to_overrides.get(&name).cloned()).unwrap_or_else(|| "latest".to_owned());

    let installed = InstalledResolver::new(workspace).with_overrides(from_overrides.clone());
    if !installed.is_installed(&name) {
        anyhow::bail!("{name} is not installed in this workspace");
    }

    let client = Arc::new(HttpRegistryClient::new("https://registry.npmjs.org"));
    let fetcher = Fetcher::new(client);

    let confirm: Box<dyn Confirm> = if opts.interactive { Box::new(AlwaysYes) } else { Box::new(DeclineAll) };
    let mut migrator = Migrator::new(workspace, fetcher, confirm)
        .with_to_overrides(to_overrides)
        .with_installed_overrides(from_overrides.clone());

    let target_version = match normalize_version_with_tag_check(&target_raw) {
        NormalizedInput::Version(v) => v.to_string(),
        NormalizedInput::Tag(Tag::Latest) | NormalizedInput::Tag(Tag::Next) => {
            migrator.fetcher.fetch(&name, &target_raw).await?.version
        }
    };

    let migrations = migrator.plan(&name, &target_version, opts.exclude_applied_migrations).await?;
    let migrations =
        synthetic::with_synthetic_format_migration(migrations, &migrator.package_updates, &migrator.starting_versions);

    let written = write_plan(workspace, &migrator.package_updates, &migrations)?;
    info!(
        "planned {} package update(s), {} migration(s); wrote {}",
        written.updated_packages.len(),
        migrations.len(),
        written.migrations_path.display()
    );

    if opts.run_migrations {
        let migrations_path = opts.migrations_file.unwrap_or_else(|| workspace.migrations_json_path());
        let Some(text) = read_migrations_file(&migrations_path, opts.if_exists)? else {
            info!("{} does not exist, skipping (--if-exists)", migrations_path.display());
            return Ok(());
        };
        let doc: serde_json::Value = serde_json::from_str(&text)?;
        let to_run = plan::writer::parse_migrations_json(&doc)?;

        let runner = Runner::new(
            workspace,
            Box::new(UnimplementedNativeHost),
            Box::new(|| Box::new(ExternalCliAdapter)),
            opts.create_commits,
            opts.commit_prefix,
        );
        let outcome = runner.run(&to_run).await?;
        info!("ran {} migration(s)", outcome.completed.len());
        if let Some(failure) = outcome.failed_at {
            anyhow::bail!("migration run stopped early: {failure}");
        }
    }

    Ok(())
}
