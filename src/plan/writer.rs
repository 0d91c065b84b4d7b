//! Materializes a planner result onto disk: bumps each updated package's
//! version in the root manifest (and the workspace's `installation` pin,
//! for the root CLI package), and emits `migrations.json` for the runner to
//! consume.

use crate::manifest::Manifest;
use crate::planner::PlannedMigration;
use crate::registry::document::PackageJsonUpdatePackage;
use crate::workspace::Workspace;
use anyhow::Context;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const ROOT_INSTALLATION_PACKAGE: &str = "nx";

pub struct WrittenPlan {
    pub updated_packages: Vec<String>,
    pub migrations_path: std::path::PathBuf,
}

pub fn write_plan(
    workspace: &Workspace,
    package_updates: &HashMap<String, String>,
    migrations: &[PlannedMigration],
) -> anyhow::Result<WrittenPlan> {
    let mut updated_packages = Vec::new();

    let mut root_manifest = Manifest::read(workspace.package_json_path())
        .context("reading root package.json while writing migration plan")?;

    let mut names: Vec<&String> = package_updates.keys().collect();
    names.sort();
    for name in names {
        let version = &package_updates[name];
        let placeholder = PackageJsonUpdatePackage {
            version: version.clone(),
            always_add_to_package_json: false,
            add_to_package_json: None,
            if_package_installed: None,
        };
        if root_manifest.apply_update(name, &placeholder)? {
            updated_packages.push(name.clone());
        }

        if name == ROOT_INSTALLATION_PACKAGE {
            workspace
                .set_installation_version(name, version, true)
                .with_context(|| format!("pinning installation.version for {name}"))?;
        } else if workspace.read_config()?.get("installation").and_then(|i| i.get("plugins")).and_then(|p| p.get(name)).is_some() {
            workspace
                .set_installation_version(name, version, false)
                .with_context(|| format!("pinning installation.plugins.{name}"))?;
        }
    }

    let migrations_path = workspace.migrations_json_path();
    write_migrations_json(&migrations_path, migrations)?;

    Ok(WrittenPlan { updated_packages, migrations_path })
}

/// Parse a `migrations.json` document (as previously written by
/// [`write_plan`]) back into the runner's migration list.
pub fn parse_migrations_json(doc: &Value) -> anyhow::Result<Vec<PlannedMigration>> {
    let entries = doc
        .get("migrations")
        .and_then(Value::as_array)
        .context("migrations.json has no \"migrations\" array")?;

    entries
        .iter()
        .map(|entry| {
            let package = entry
                .get("package")
                .and_then(Value::as_str)
                .context("migration entry missing \"package\"")?
                .to_owned();
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .context("migration entry missing \"name\"")?
                .to_owned();
            let version = entry
                .get("version")
                .and_then(Value::as_str)
                .context("migration entry missing \"version\"")?
                .to_owned();
            Ok(PlannedMigration {
                package,
                name,
                version,
                description: entry.get("description").and_then(Value::as_str).map(str::to_owned),
                implementation: entry.get("implementation").and_then(Value::as_str).map(str::to_owned),
                factory: entry.get("factory").and_then(Value::as_str).map(str::to_owned),
                cli: entry.get("cli").and_then(Value::as_str).map(str::to_owned),
            })
        })
        .collect()
}

fn write_migrations_json(path: &std::path::Path, migrations: &[PlannedMigration]) -> anyhow::Result<()> {
    let entries: Vec<Value> = migrations
        .iter()
        .map(|m| {
            json!({
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

    let doc = json!({ "migrations": entries });
    let text = serde_json::to_string_pretty(&doc)? + "\n";
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn bumps_present_dependency_and_pins_installation_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name":"root","dependencies":{"nx":"14.0.0"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("workspace.json"), "{}\n").unwrap();

        let workspace = Workspace::at(dir.path());
        let mut package_updates = HashMap::new();
        package_updates.insert("nx".to_owned(), "15.0.0".to_owned());

        let written = write_plan(&workspace, &package_updates, &[]).unwrap();
        assert_eq!(written.updated_packages, vec!["nx".to_owned()]);

        let manifest_text = fs::read_to_string(dir.path().join("package.json")).unwrap();
        assert!(manifest_text.contains("15.0.0"));

        let config_text = fs::read_to_string(dir.path().join("workspace.json")).unwrap();
        let config: Value = serde_json::from_str(&config_text).unwrap();
        assert_eq!(config["installation"]["version"], "15.0.0");
    }

    #[test]
    fn migrations_json_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"root"}"#).unwrap();
        fs::write(dir.path().join("workspace.json"), "{}\n").unwrap();
        let workspace = Workspace::at(dir.path());

        let migrations = vec![
            PlannedMigration { package: "nx".into(), name: "first".into(), version: "14.0.0".into(), description: None, implementation: None, factory: None, cli: None },
            PlannedMigration { package: "nx".into(), name: "second".into(), version: "14.1.0".into(), description: None, implementation: None, factory: None, cli: None },
        ];
        let written = write_plan(&workspace, &HashMap::new(), &migrations).unwrap();

        let text = fs::read_to_string(&written.migrations_path).unwrap();
        let first_idx = text.find("first").unwrap();
        let second_idx = text.find("second").unwrap();
        assert!(first_idx < second_idx);
    }
}
