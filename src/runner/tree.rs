//! A minimal changed-files view over the workspace, used to decide what a
//! commit for one migration should contain: snapshot before running it,
//! diff after. Deliberately shallow (manifest and config files only, not a
//! full recursive tree) since those are the only files a migration's
//! generator is expected to touch per migration step.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ChangeTracker {
    root: PathBuf,
    watched: Vec<PathBuf>,
    snapshot: HashMap<PathBuf, Option<String>>,
}

impl ChangeTracker {
    pub fn new(root: &Path, watched: Vec<PathBuf>) -> Self {
        let mut tracker = ChangeTracker { root: root.to_path_buf(), watched, snapshot: HashMap::new() };
        tracker.flush_changes();
        tracker
    }

    fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    /// Files (relative to the workspace root) whose contents differ from
    /// the last [`flush_changes`] call.
    pub fn list_changes(&self) -> Vec<PathBuf> {
        self.watched
            .iter()
            .filter(|p| self.read(p) != *self.snapshot.get(*p).unwrap_or(&None))
            .filter_map(|p| p.strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect()
    }

    /// Re-baseline: the next [`list_changes`] call reports only what
    /// happens after this point.
    pub fn flush_changes(&mut self) {
        self.snapshot = self.watched.iter().map(|p| (p.clone(), self.read(p))).collect();
    }

    pub fn has_changes(&self) -> bool {
        !self.list_changes().is_empty()
    }
}
