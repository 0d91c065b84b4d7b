//! Resolves "what version of X is actually installed", the predicate the
//! planner's `requires` gates and `ifPackageInstalled` checks both read
//! from. Backed by the workspace's `node_modules`, with two refinements
//! layered on top of a bare lookup: caller-supplied overrides win outright,
//! and failed lookups are never cached (a package legitimately installed
//! mid-run by an earlier migration step must be visible on the next check).

use crate::workspace::Workspace;
use std::cell::RefCell;
use std::collections::HashMap;

/// The legacy package name `nx` migrated from; resolving `nx`'s installed
/// version falls back to this if the former isn't present, mirroring the
/// same rename this codebase honors when expanding package groups.
const LEGACY_NX_ALIAS: &str = "@nrwl/workspace";

pub struct InstalledResolver<'a> {
    workspace: &'a Workspace,
    overrides: HashMap<String, String>,
    positive_cache: RefCell<HashMap<String, String>>,
}

impl<'a> InstalledResolver<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        InstalledResolver {
            workspace,
            overrides: HashMap::new(),
            positive_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Seed explicit overrides (e.g. the version the planner just resolved
    /// for a package that hasn't been written to disk yet this run).
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn set_override(&mut self, name: &str, version: &str) {
        self.overrides.insert(name.to_owned(), version.to_owned());
    }

    pub fn version_of(&self, name: &str) -> Option<String> {
        if let Some(v) = self.overrides.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.positive_cache.borrow().get(name) {
            return Some(v.clone());
        }

        let found = self.workspace.installed_version(name).or_else(|| {
            if name == "nx" {
                self.workspace.installed_version(LEGACY_NX_ALIAS)
            } else {
                None
            }
        });

        if let Some(v) = &found {
            self.positive_cache.borrow_mut().insert(name.to_owned(), v.clone());
        }
        found
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.version_of(name).is_some()
    }

    /// Evaluate a `requires` map (`{"peer-package": ">=3.0.0"}`) against the
    /// installed state: every named peer must be installed and satisfy its
    /// range. An empty map is vacuously satisfied.
    pub fn satisfies_requires(&self, requires: &HashMap<String, String>) -> bool {
        requires.iter().all(|(peer, range)| {
            self.version_of(peer)
                .map(|installed| crate::semver_util::satisfies(&installed, range))
                .unwrap_or(false)
        })
    }
}
