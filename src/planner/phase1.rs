//! Phase 1: expand the migration graph from the root package/version out to
//! every transitively-affected package, producing the `package_updates` map
//! (final target version per package) the plan writer and phase 2 both
//! read from.
//!
//! Implemented as a single worklist loop rather than the mutually-recursive
//! pair the distilled description sketched (one function walking package
//! groups, another resolving `packageJsonUpdates` batches and recursing back
//! into the first) -- see DESIGN.md for why the two collapse cleanly into
//! one queue without changing the result: expanding a package group and
//! admitting a `packageJsonUpdates` bump are both "discover a new
//! (package, version) pair to visit", and nothing downstream distinguishes
//! how a pair was discovered.

use super::filter::{in_version_window, package_update_eligible, update_applies, Confirm};
use super::package_group::{expand, resolve_package_group};
use super::Migrator;
use crate::registry::client::RegistryClient;
use crate::semver_util::gt;
use std::collections::VecDeque;

impl<'a, R: RegistryClient + 'static> Migrator<'a, R> {
    pub async fn run_phase1(&mut self, root_name: &str, root_version: &str) -> anyhow::Result<()> {
        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        queue.push_back((root_name.to_owned(), root_version.to_owned()));

        while let Some((name, version)) = queue.pop_front() {
            self.visit(&name, &version, &mut queue).await?;
        }
        Ok(())
    }

    async fn visit(&mut self, name: &str, version: &str, queue: &mut VecDeque<(String, String)>) -> anyhow::Result<()> {
        // A `--to=` override for this package wins over whatever version
        // the discovery site (root target, package-group sibling, or
        // `packageJsonUpdates` peer) proposed.
        let version_owned;
        let version = match self.to_overrides.get(name) {
            Some(forced) => {
                version_owned = forced.clone();
                version_owned.as_str()
            }
            None => version,
        };

        let current = self.collected_versions.get(name).cloned();
        if let Some(current) = &current {
            if !gt(version, current) {
                // Already collected at this version or higher: fixed point
                // reached for this package, nothing new to discover here.
                return Ok(());
            }
        }

        if current.is_none() {
            self.visit_order.push(name.to_owned());
        }

        let Some(installed_version) = self.installed.version_of(name) else {
            // Not installed: record the plan bump and stop. A package
            // that isn't on disk brings no transitive children -- there's
            // no migration document to read a package group or
            // `packageJsonUpdates` out of.
            self.collected_versions.insert(name.to_owned(), version.to_owned());
            self.package_updates.insert(name.to_owned(), version.to_owned());
            return Ok(());
        };

        if current.is_none() {
            self.starting_versions.insert(name.to_owned(), installed_version.clone());
        }

        let doc = self.fetcher.fetch(name, version).await?;

        self.collected_versions.insert(name.to_owned(), doc.version.clone());
        self.package_updates.insert(name.to_owned(), doc.version.clone());
        self.documents.insert(name.to_owned(), doc.clone());

        if let Some(group) = resolve_package_group(name, &doc.version, &doc) {
            for (sibling, sibling_version) in expand(&group, &doc.version) {
                if sibling == name {
                    continue;
                }
                let already_at_or_past = self
                    .collected_versions
                    .get(&sibling)
                    .map(|v| !gt(&sibling_version, v))
                    .unwrap_or(false);
                if !already_at_or_past {
                    queue.push_back((sibling, sibling_version));
                }
            }
        }

        for (_label, update) in &doc.package_json_updates {
            if !in_version_window(&installed_version, &update.version, &doc.version) {
                continue;
            }
            if !update_applies(update, &self.installed, &self.package_updates, self.confirm.as_ref()) {
                continue;
            }
            for (pkg_name, pkg_update) in &update.packages {
                if !package_update_eligible(pkg_update, pkg_name, &self.installed, self.workspace) {
                    continue;
                }

                let pkg_current = self
                    .collected_versions
                    .get(pkg_name)
                    .cloned()
                    .or_else(|| self.installed.version_of(pkg_name))
                    .unwrap_or_else(|| "0.0.0".to_owned());

                if gt(&pkg_update.version, &pkg_current) {
                    queue.push_back((pkg_name.clone(), pkg_update.version.clone()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::filter::DeclineAll;
    use crate::registry::document::RegistryConfigView;
    use crate::registry::fetcher::Fetcher;
    use crate::workspace::Workspace;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;

    /// Hands back pre-baked `view_config`/migrations-file-JSON per
    /// `name@version`, the same shape the live HTTP client would produce
    /// after a successful tarball fetch.
    struct FakeClient {
        resolutions: Mutex<HashMap<(String, String), String>>,
        documents: Mutex<HashMap<(String, String), serde_json::Value>>,
        dir: tempfile::TempDir,
    }

    impl FakeClient {
        fn new() -> Self {
            FakeClient { resolutions: Mutex::new(HashMap::new()), documents: Mutex::new(HashMap::new()), dir: tempfile::tempdir().unwrap() }
        }

        fn with_document(self, name: &str, version: &str, doc: serde_json::Value) -> Self {
            self.resolutions.lock().unwrap().insert((name.to_owned(), version.to_owned()), version.to_owned());
            self.documents.lock().unwrap().insert((name.to_owned(), version.to_owned()), doc);
            self
        }
    }

    #[async_trait]
    impl RegistryClient for FakeClient {
        async fn resolve_version(&self, name: &str, range: &str) -> anyhow::Result<String> {
            self.resolutions
                .lock()
                .unwrap()
                .get(&(name.to_owned(), range.to_owned()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no resolution configured for {name}@{range}"))
        }

        async fn view_config(&self, name: &str, version: &str) -> anyhow::Result<Option<RegistryConfigView>> {
            let has_doc = self.documents.lock().unwrap().contains_key(&(name.to_owned(), version.to_owned()));
            Ok(if has_doc { Some(RegistryConfigView { package_group: Vec::new(), has_migrations: true }) } else { None })
        }

        async fn fetch_migrations_file(&self, name: &str, version: &str) -> anyhow::Result<std::path::PathBuf> {
            let doc = self
                .documents
                .lock()
                .unwrap()
                .get(&(name.to_owned(), version.to_owned()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no document configured for {name}@{version}"))?;
            let path = self.dir.path().join(format!("{}-{}.json", name.replace('/', "_"), version));
            fs::write(&path, serde_json::to_vec(&doc)?)?;
            Ok(path)
        }

        async fn install_to_scratch(&self, _name: &str, _version: &str, _dir: &std::path::Path) -> anyhow::Result<()> {
            anyhow::bail!("not used in this test")
        }
    }

    fn install(dir: &std::path::Path, name: &str, version: &str) {
        let pkg_dir = dir.join("node_modules").join(name);
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("package.json"), format!(r#"{{"name":"{name}","version":"{version}"}}"#)).unwrap();
    }

    #[tokio::test]
    async fn single_package_no_group_emits_windowed_migrations() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "pkg", "1.0.0");
        fs::write(dir.path().join("package.json"), r#"{"name":"root","dependencies":{"pkg":"1.0.0"}}"#).unwrap();

        let client = FakeClient::new().with_document(
            "pkg",
            "2.0.0",
            serde_json::json!({
                "packageJsonUpdates": {
                    "a": {"version": "2.0.0", "packages": {"pkg": {"version": "2.0.0"}}}
                },
                "generators": {
                    "m1": {"version": "1.5.0"},
                    "m2": {"version": "2.0.0"},
                    "m3": {"version": "2.1.0"}
                }
            }),
        );

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll));

        let migrations = migrator.plan("pkg", "2.0.0", false).await.unwrap();

        assert_eq!(migrator.package_updates.get("pkg").map(String::as_str), Some("2.0.0"));
        let names: Vec<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn package_group_with_wildcard_bumps_both_packages() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "root", "1.0.0");
        install(dir.path(), "child", "1.0.0");

        let client = FakeClient::new().with_document(
            "root",
            "2.0.0",
            serde_json::json!({
                "packageGroup": [{"package": "child", "version": "*"}]
            }),
        );

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll));

        migrator.plan("root", "2.0.0", false).await.unwrap();

        assert_eq!(migrator.package_updates.get("root").map(String::as_str), Some("2.0.0"));
        assert_eq!(migrator.package_updates.get("child").map(String::as_str), Some("2.0.0"));
    }

    #[tokio::test]
    async fn requires_gates_out_an_update_and_its_packages() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "pkg", "1.0.0");
        install(dir.path(), "peer", "2.0.0");

        let client = FakeClient::new().with_document(
            "pkg",
            "2.0.0",
            serde_json::json!({
                "packageJsonUpdates": {
                    "a": {
                        "version": "2.0.0",
                        "requires": {"peer": ">=3.0.0"},
                        "packages": {"peer": {"version": "3.0.0", "alwaysAddToPackageJson": true}}
                    }
                }
            }),
        );

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll));

        migrator.plan("pkg", "2.0.0", false).await.unwrap();

        assert!(!migrator.package_updates.contains_key("peer"));
    }

    #[tokio::test]
    async fn an_uninstalled_package_in_a_group_is_planned_but_not_recursed_into() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "root", "1.0.0");
        // "child" is deliberately never installed.

        let client = FakeClient::new().with_document(
            "root",
            "2.0.0",
            serde_json::json!({
                "packageGroup": [{"package": "child", "version": "*"}]
            }),
        );

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll));

        let migrations = migrator.plan("root", "2.0.0", false).await.unwrap();

        assert_eq!(migrator.package_updates.get("child").map(String::as_str), Some("2.0.0"));
        assert!(migrations.iter().all(|m| m.package != "child"));
    }

    #[tokio::test]
    async fn package_json_update_past_its_own_version_window_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "pkg", "2.0.0");
        install(dir.path(), "peer", "1.0.0");

        // `a`'s own version (1.0.0) is already <= installed(pkg) (2.0.0),
        // so it must not fire even though `peer`'s bump looks attractive.
        let client = FakeClient::new().with_document(
            "pkg",
            "3.0.0",
            serde_json::json!({
                "packageJsonUpdates": {
                    "a": {
                        "version": "1.0.0",
                        "packages": {"peer": {"version": "9.0.0", "alwaysAddToPackageJson": true}}
                    }
                }
            }),
        );

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll));

        migrator.plan("pkg", "3.0.0", false).await.unwrap();

        assert!(!migrator.package_updates.contains_key("peer"));
    }

    #[tokio::test]
    async fn to_override_forces_a_discovered_packages_target_version() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path(), "root", "1.0.0");
        install(dir.path(), "child", "1.0.0");

        let client = FakeClient::new()
            .with_document("root", "2.0.0", serde_json::json!({"packageGroup": [{"package": "child", "version": "*"}]}))
            .with_document("child", "2.5.0", serde_json::json!({}));

        let workspace = Workspace::at(dir.path());
        let fetcher = Fetcher::new(std::sync::Arc::new(client));
        let mut to_overrides = HashMap::new();
        to_overrides.insert("child".to_owned(), "2.5.0".to_owned());
        let mut migrator = Migrator::new(&workspace, fetcher, Box::new(DeclineAll)).with_to_overrides(to_overrides);

        migrator.plan("root", "2.0.0", false).await.unwrap();

        assert_eq!(migrator.package_updates.get("child").map(String::as_str), Some("2.5.0"));
    }
}
