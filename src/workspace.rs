//! The monorepo root: locating installed package versions under
//! `node_modules`, and reading/writing the workspace-level migration state
//! (`migrations.json`, and the `installation.version`/`installation.plugins`
//! pins inside the workspace config).

use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn package_json_path(&self) -> PathBuf {
        self.root.join("package.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("workspace.json")
    }

    /// The version a dependency is installed at, read from its
    /// `node_modules/<name>/package.json`. `None` if it isn't installed at
    /// all -- distinct from being pinned in the root manifest but not
    /// actually present on disk.
    pub fn installed_version(&self, name: &str) -> Option<String> {
        let pkg_json = self.node_modules_package_json(name);
        let text = fs::read_to_string(pkg_json).ok()?;
        let value: Value = serde_json::from_str(&text).ok()?;
        value.get("version").and_then(Value::as_str).map(str::to_owned)
    }

    pub fn node_modules_package_json(&self, name: &str) -> PathBuf {
        // Scoped packages (`@angular/core`) nest one level deeper; `join`
        // handles that transparently since `name` may itself contain `/`.
        self.root.join("node_modules").join(name).join("package.json")
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.node_modules_package_json(name).exists()
    }

    pub fn read_config(&self) -> anyhow::Result<Value> {
        let path = self.config_path();
        if !path.is_file() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write_config(&self, value: &Value) -> anyhow::Result<()> {
        let path = self.config_path();
        let had_trailing_newline = fs::read_to_string(&path).map(|t| t.ends_with('\n')).unwrap_or(true);
        let mut text = serde_json::to_string_pretty(value)?;
        if had_trailing_newline {
            text.push('\n');
        }
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// Pin `installation.version` (and, if given, `installation.plugins[name]`)
    /// in the workspace config, creating the `installation` object if absent.
    pub fn set_installation_version(&self, plugin: &str, version: &str, is_root: bool) -> anyhow::Result<()> {
        let mut config = self.read_config()?;
        let obj = config
            .as_object_mut()
            .context("workspace config root is not a JSON object")?;
        let installation = obj
            .entry("installation".to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()))
            .as_object_mut()
            .context("installation field is not an object")?;

        if is_root {
            installation.insert("version".to_owned(), Value::String(version.to_owned()));
        } else {
            let plugins = installation
                .entry("plugins".to_owned())
                .or_insert_with(|| Value::Object(serde_json::Map::new()))
                .as_object_mut()
                .context("installation.plugins is not an object")?;
            plugins.insert(plugin.to_owned(), Value::String(version.to_owned()));
        }

        self.write_config(&config)
    }

    pub fn migrations_json_path(&self) -> PathBuf {
        self.root.join("migrations.json")
    }
}

pub fn is_scoped(name: &str) -> bool {
    name.starts_with('@') && name.contains('/')
}
