//! Applicability filtering for one `packageJsonUpdates` entry: the
//! `requires`/`x-prompt` gates that decide whether the whole entry fires at
//! all, and the per-package version-window check that decides whether an
//! individual bump inside it is still relevant.

use crate::installed::InstalledResolver;
use crate::manifest::Manifest;
use crate::registry::document::{PackageJsonUpdate, PackageJsonUpdatePackage};
use crate::semver_util::{gt, lte, satisfies};
use crate::workspace::Workspace;
use std::collections::HashMap;

/// Confirmation hook for `x-prompt`; in non-interactive runs this always
/// answers yes, matching "assume confirmed" rather than silently skipping
/// prompted updates.
pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

pub struct AlwaysYes;
impl Confirm for AlwaysYes {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// Used when `--interactive` is off and a migration carries an `x-prompt`:
/// conservative default of declining the bump rather than silently applying
/// an interactive-only change.
pub struct DeclineAll;
impl Confirm for DeclineAll {
    fn confirm(&self, _message: &str) -> bool {
        false
    }
}

/// Whether `update` as a whole should be considered: its `requires` map
/// must be satisfied against the installed state *or* a package already
/// bumped earlier in this same planning run (`package_updates`), and if it
/// carries an `x-prompt`, the confirmation hook must agree.
pub fn update_applies(
    update: &PackageJsonUpdate,
    installed: &InstalledResolver,
    package_updates: &HashMap<String, String>,
    confirm: &dyn Confirm,
) -> bool {
    if !satisfies_requires(&update.requires, installed, package_updates) {
        return false;
    }
    if let Some(prompt) = &update.x_prompt {
        if !confirm.confirm(prompt) {
            return false;
        }
    }
    true
}

/// A `requires` map is satisfied peer-by-peer against whichever is known
/// for that peer: a version already planned earlier in this run takes
/// precedence (it reflects where the workspace is headed), falling back to
/// what's actually installed when the peer hasn't been touched by the plan.
pub fn satisfies_requires(requires: &HashMap<String, String>, installed: &InstalledResolver, package_updates: &HashMap<String, String>) -> bool {
    requires.iter().all(|(peer, range)| {
        let version = package_updates.get(peer).cloned().or_else(|| installed.version_of(peer));
        version.map(|v| satisfies(&v, range)).unwrap_or(false)
    })
}

/// Whether a single `(child, cu)` pair inside an admitted update's
/// `packages` map should actually be carried into the plan: its
/// `ifPackageInstalled` guard (if any) must hold, and the child must be
/// either explicitly flagged for package.json insertion or already a
/// direct dependency/devDependency of the root manifest.
pub fn package_update_eligible(cu: &PackageJsonUpdatePackage, child_name: &str, installed: &InstalledResolver, workspace: &Workspace) -> bool {
    if let Some(gate) = &cu.if_package_installed {
        if !installed.is_installed(gate) {
            return false;
        }
    }
    cu.always_add_to_package_json || cu.add_to_package_json.is_some() || is_direct_dependency(workspace, child_name)
}

/// Whether `name` is pinned directly in the root manifest's `dependencies`
/// or `devDependencies` (as opposed to merely present transitively under
/// `node_modules`).
pub fn is_direct_dependency(workspace: &Workspace, name: &str) -> bool {
    Manifest::read(workspace.package_json_path())
        .map(|m| m.has_dependency(name))
        .unwrap_or(false)
}

/// Whether bumping `name` to `candidate_version` is still relevant given
/// the version it's currently collected at (`current`) and the ceiling the
/// overall migration targets (`target`): it must move the package strictly
/// forward, and not overshoot past what was actually requested.
pub fn in_version_window(current: &str, candidate_version: &str, target: &str) -> bool {
    gt(candidate_version, current) && lte(candidate_version, target)
}
