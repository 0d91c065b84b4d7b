//! Wire shapes for the migration document the registry hands back for
//! `package@version`. Kept close to the JSON the registry actually emits
//! (`packageJsonUpdates`, `x-prompt`, the `schematics`/`generators` alias)
//! rather than flattened into something more "Rust-native", since the
//! planner's filtering rules (dependency/filter.rs) are defined directly in
//! terms of these fields.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Where a dependency should land if it isn't already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dependencies,
    DevDependencies,
}

impl Section {
    pub fn as_manifest_key(self) -> &'static str {
        match self {
            Section::Dependencies => "dependencies",
            Section::DevDependencies => "devDependencies",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AddToPackageJsonRaw {
    Bool(bool),
    Section(String),
}

fn parse_add_to_package_json(raw: Option<&Value>) -> Option<Section> {
    let raw: AddToPackageJsonRaw = raw.and_then(|v| serde_json::from_value(v.clone()).ok())?;
    match raw {
        // `true` alone doesn't name a section; only the string variants do.
        AddToPackageJsonRaw::Bool(_) => None,
        AddToPackageJsonRaw::Section(s) if s == "dependencies" => Some(Section::Dependencies),
        AddToPackageJsonRaw::Section(s) if s == "devDependencies" => Some(Section::DevDependencies),
        AddToPackageJsonRaw::Section(_) => None,
    }
}

/// One entry of a `packageJsonUpdates[*].packages` map, before filtering.
#[derive(Debug, Clone)]
pub struct PackageJsonUpdatePackage {
    pub version: String,
    pub always_add_to_package_json: bool,
    pub add_to_package_json: Option<Section>,
    pub if_package_installed: Option<String>,
}

impl PackageJsonUpdatePackage {
    fn from_value(v: &Value) -> Option<Self> {
        let version = v.get("version")?.as_str()?.to_owned();
        let always_add_to_package_json =
            v.get("alwaysAddToPackageJson").and_then(Value::as_bool).unwrap_or(false);
        let add_to_package_json = parse_add_to_package_json(v.get("addToPackageJson"));
        let if_package_installed =
            v.get("ifPackageInstalled").and_then(Value::as_str).map(str::to_owned);
        Some(PackageJsonUpdatePackage {
            version,
            always_add_to_package_json,
            add_to_package_json,
            if_package_installed,
        })
    }
}

/// A single `packageJsonUpdates` entry: a conditional bump for a set of peer
/// packages.
#[derive(Debug, Clone, Default)]
pub struct PackageJsonUpdate {
    pub version: String,
    pub packages: HashMap<String, PackageJsonUpdatePackage>,
    pub requires: HashMap<String, String>,
    pub x_prompt: Option<String>,
}

impl PackageJsonUpdate {
    fn from_value(v: &Value) -> Option<Self> {
        let version = v.get("version")?.as_str()?.to_owned();
        let packages = v
            .get("packages")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| PackageJsonUpdatePackage::from_value(v).map(|p| (k.clone(), p)))
                    .collect()
            })
            .unwrap_or_default();
        let requires = v
            .get("requires")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let x_prompt = v.get("x-prompt").and_then(Value::as_str).map(str::to_owned);
        Some(PackageJsonUpdate { version, packages, requires, x_prompt })
    }
}

/// One `generators` (`schematics`) entry: a migration script descriptor.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    pub version: Option<String>,
    pub requires: HashMap<String, String>,
    pub description: Option<String>,
    pub implementation: Option<String>,
    pub factory: Option<String>,
    pub cli: Option<String>,
}

impl Generator {
    fn from_value(v: &Value) -> Self {
        let version = v.get("version").and_then(Value::as_str).map(str::to_owned);
        let requires = v
            .get("requires")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                    .collect()
            })
            .unwrap_or_default();
        let description = v.get("description").and_then(Value::as_str).map(str::to_owned);
        let implementation = v.get("implementation").and_then(Value::as_str).map(str::to_owned);
        let factory = v.get("factory").and_then(Value::as_str).map(str::to_owned);
        let cli = v.get("cli").and_then(Value::as_str).map(str::to_owned);
        Generator { version, requires, description, implementation, factory, cli }
    }
}

/// A package-group sibling entry; `version == "*"` means "whatever version
/// this document itself represents".
#[derive(Debug, Clone)]
pub struct PackageGroupEntry {
    pub package: String,
    pub version: String,
}

pub const PACKAGE_GROUP_WILDCARD: &str = "*";

/// The document fetched for `package@version`.
#[derive(Debug, Clone, Default)]
pub struct MigrationDocument {
    /// The canonical version this document represents; may differ from the
    /// version that was requested if a range was resolved.
    pub version: String,
    pub package_group: Vec<PackageGroupEntry>,
    /// Keyed by the arbitrary label the registry assigned the update.
    pub package_json_updates: Vec<(String, PackageJsonUpdate)>,
    /// Keyed by the generator's name, in document order.
    pub generators: Vec<(String, Generator)>,
}

impl MigrationDocument {
    pub fn from_raw(version: String, raw: &Value) -> Self {
        let package_group = raw
            .get("packageGroup")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| {
                        let package = entry.get("package")?.as_str()?.to_owned();
                        let version = entry.get("version")?.as_str()?.to_owned();
                        Some(PackageGroupEntry { package, version })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let package_json_updates = ordered_object(raw.get("packageJsonUpdates"))
            .into_iter()
            .filter_map(|(k, v)| PackageJsonUpdate::from_value(&v).map(|u| (k, u)))
            .collect();

        // `schematics` is the legacy key; treat it exactly as `generators`.
        let generators_raw = raw
            .get("generators")
            .or_else(|| raw.get("schematics"));
        let generators = ordered_object(generators_raw)
            .into_iter()
            .map(|(k, v)| (k, Generator::from_value(&v)))
            .collect();

        MigrationDocument { version, package_group, package_json_updates, generators }
    }
}

fn ordered_object(v: Option<&Value>) -> Vec<(String, Value)> {
    match v.and_then(Value::as_object) {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => Vec::new(),
    }
}

/// The shape the registry's "view" primitive returns for `name@version`
/// before we decide whether a tarball fetch is needed.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigView {
    pub package_group: Vec<PackageGroupEntry>,
    pub has_migrations: bool,
}

/// Re-export for call sites that only need the map type the wire format
/// uses without pulling in `serde_json` directly.
pub type RawObject = Map<String, Value>;
