//! `package.json` handling: read, run an edit closure over the JSON value,
//! write back. Mirrors the source tree's `edit`/`edit_each_dep` shape (read
//! -> mutate in place -> write), generalized from TOML documents to JSON
//! manifests since this domain's manifests are `package.json`, not
//! `Cargo.toml`.

use crate::registry::document::{Section, PackageJsonUpdatePackage};
use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// A `package.json` on disk, tracking whether the source text ended in a
/// trailing newline so a round-trip write doesn't needlessly dirty the file.
pub struct Manifest {
    pub path: PathBuf,
    pub doc: Value,
    had_trailing_newline: bool,
}

impl Manifest {
    pub fn read(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading manifest at {}", path.display()))?;
        let had_trailing_newline = content.ends_with('\n');
        let doc: Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing manifest at {}", path.display()))?;
        Ok(Manifest { path, doc, had_trailing_newline })
    }

    pub fn name(&self) -> Option<&str> {
        self.doc.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.doc.get("version").and_then(Value::as_str)
    }

    /// Run `f` against the manifest's root object, then write the result
    /// back. Fails without touching disk if `f` errors.
    pub fn edit<F, R>(&mut self, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&mut Value) -> anyhow::Result<R>,
    {
        let result = f(&mut self.doc)?;
        self.write()?;
        Ok(result)
    }

    pub fn write(&self) -> anyhow::Result<()> {
        let mut text = serde_json::to_string_pretty(&self.doc)
            .with_context(|| format!("serializing manifest at {}", self.path.display()))?;
        if self.had_trailing_newline {
            text.push('\n');
        }
        fs::write(&self.path, text)
            .with_context(|| format!("writing manifest at {}", self.path.display()))
    }

    /// The version a given dependency is currently pinned to in
    /// `dependencies` or `devDependencies`, whichever has it.
    pub fn dependency_version(&self, name: &str) -> Option<&str> {
        for section in ["dependencies", "devDependencies"] {
            if let Some(v) = self.doc.get(section).and_then(Value::as_object).and_then(|m| m.get(name)) {
                return v.as_str();
            }
        }
        None
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependency_version(name).is_some()
    }

    /// Apply one `packageJsonUpdates[*].packages[name]` entry's tri-state
    /// placement rule: bump if present; add under `add_to_package_json`'s
    /// named section if `always_add_to_package_json` or that section is
    /// named and the package is presently absent; otherwise leave it alone.
    pub fn apply_update(&mut self, name: &str, update: &PackageJsonUpdatePackage) -> anyhow::Result<bool> {
        let already_present = self.has_dependency(name);

        if !already_present {
            if let Some(gate) = &update.if_package_installed {
                if !self.has_dependency(gate) {
                    return Ok(false);
                }
            }
        }

        let target_section: Option<Section> = if already_present {
            None
        } else if update.always_add_to_package_json {
            Some(update.add_to_package_json.unwrap_or(Section::Dependencies))
        } else {
            update.add_to_package_json
        };

        if !already_present && target_section.is_none() {
            return Ok(false);
        }

        self.edit(|doc| {
            let obj = doc.as_object_mut().context("manifest root is not a JSON object")?;
            if already_present {
                for section in ["dependencies", "devDependencies"] {
                    if let Some(entry) = obj.get_mut(section).and_then(Value::as_object_mut) {
                        if entry.contains_key(name) {
                            entry.insert(name.to_owned(), Value::String(update.version.clone()));
                        }
                    }
                }
            } else if let Some(section) = target_section {
                let key = section.as_manifest_key();
                let entry = obj
                    .entry(key.to_owned())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                entry
                    .as_object_mut()
                    .context("dependency section is not an object")?
                    .insert(name.to_owned(), Value::String(update.version.clone()));
            }
            Ok(())
        })?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::document::Section;

    fn write_tmp(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn preserves_trailing_newline() {
        let (_dir, path) = write_tmp("{\n  \"name\": \"pkg\",\n  \"version\": \"1.0.0\"\n}\n");
        let mut m = Manifest::read(&path).unwrap();
        m.edit(|_| Ok(())).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn bumps_existing_dependency_version() {
        let (_dir, path) =
            write_tmp("{\"name\":\"pkg\",\"dependencies\":{\"@angular/core\":\"13.0.0\"}}");
        let mut m = Manifest::read(&path).unwrap();
        let update = PackageJsonUpdatePackage {
            version: "14.0.0".into(),
            always_add_to_package_json: false,
            add_to_package_json: None,
            if_package_installed: None,
        };
        let changed = m.apply_update("@angular/core", &update).unwrap();
        assert!(changed);
        assert_eq!(m.dependency_version("@angular/core"), Some("14.0.0"));
    }

    #[test]
    fn skips_absent_dependency_without_add_flag() {
        let (_dir, path) = write_tmp("{\"name\":\"pkg\"}");
        let mut m = Manifest::read(&path).unwrap();
        let update = PackageJsonUpdatePackage {
            version: "14.0.0".into(),
            always_add_to_package_json: false,
            add_to_package_json: None,
            if_package_installed: None,
        };
        let changed = m.apply_update("@angular/core", &update).unwrap();
        assert!(!changed);
        assert!(!m.has_dependency("@angular/core"));
    }

    #[test]
    fn adds_absent_dependency_when_always_add_is_set() {
        let (_dir, path) = write_tmp("{\"name\":\"pkg\"}");
        let mut m = Manifest::read(&path).unwrap();
        let update = PackageJsonUpdatePackage {
            version: "14.0.0".into(),
            always_add_to_package_json: true,
            add_to_package_json: Some(Section::DevDependencies),
            if_package_installed: None,
        };
        let changed = m.apply_update("@angular/cli", &update).unwrap();
        assert!(changed);
        assert_eq!(m.doc["devDependencies"]["@angular/cli"], "14.0.0");
    }

    #[test]
    fn respects_if_package_installed_gate() {
        let (_dir, path) = write_tmp("{\"name\":\"pkg\"}");
        let mut m = Manifest::read(&path).unwrap();
        let update = PackageJsonUpdatePackage {
            version: "1.0.0".into(),
            always_add_to_package_json: false,
            add_to_package_json: Some(Section::Dependencies),
            if_package_installed: Some("@angular/core".into()),
        };
        let changed = m.apply_update("rxjs", &update).unwrap();
        assert!(!changed);
    }
}
