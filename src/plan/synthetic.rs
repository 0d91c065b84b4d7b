//! Injects a synthetic migration ahead of the real ones when a workspace is
//! crossing the threshold where the on-disk workspace config format itself
//! changed shape, independent of any package's own `generators` list. No
//! registry document carries this migration; it's generated locally.

use crate::planner::PlannedMigration;
use crate::semver_util::{gt, lte};
use std::collections::HashMap;

/// The release that introduced the newer workspace config layout. Crossing
/// it needs a format migration that no package's own migration document
/// declares, since the format change predates any single package's
/// generator list catching up to it.
pub const WORKSPACE_FORMAT_THRESHOLD: &str = "15.7.0-beta.0";

/// The only package whose upgrade can trigger the format migration -- it's
/// tied to that package's own release history, not to whatever package the
/// caller happened to ask to migrate.
const GATING_PACKAGE: &str = "@nrwl/workspace";

const SYNTHETIC_NAME: &str = "15-7-0-split-configuration-into-project-json-files";
const SYNTHETIC_IMPLEMENTATION: &str = "./src/migrations/update-15-7-0/split-configuration-into-project-json-files";
const SYNTHETIC_CLI: &str = "nx";

/// Prepends the synthetic format-migration step ahead of everything phase 2
/// found, but only when the plan itself updates [`GATING_PACKAGE`] and that
/// update's `starting..=target` straddles [`WORKSPACE_FORMAT_THRESHOLD`].
/// A run that migrates some unrelated package must never trip this, even if
/// that package's own version numbers happen to cross the same threshold.
pub fn with_synthetic_format_migration(
    mut migrations: Vec<PlannedMigration>,
    package_updates: &HashMap<String, String>,
    starting_versions: &HashMap<String, String>,
) -> Vec<PlannedMigration> {
    let Some(target) = package_updates.get(GATING_PACKAGE) else {
        return migrations;
    };
    let starting = starting_versions.get(GATING_PACKAGE).map(String::as_str).unwrap_or("0.0.0");

    let crosses_threshold = gt(WORKSPACE_FORMAT_THRESHOLD, starting) && lte(WORKSPACE_FORMAT_THRESHOLD, target);
    if !crosses_threshold {
        return migrations;
    }

    let synthetic = PlannedMigration {
        package: GATING_PACKAGE.to_owned(),
        name: SYNTHETIC_NAME.to_owned(),
        version: WORKSPACE_FORMAT_THRESHOLD.to_owned(),
        description: None,
        implementation: Some(SYNTHETIC_IMPLEMENTATION.to_owned()),
        factory: None,
        cli: Some(SYNTHETIC_CLI.to_owned()),
    };
    migrations.insert(0, synthetic);
    migrations
}
