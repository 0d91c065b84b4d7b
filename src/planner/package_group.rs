//! Package-group expansion: turning one `packageGroup` declaration into the
//! concrete sibling-package/version pairs that belong alongside the package
//! actually being migrated.

use crate::registry::document::{MigrationDocument, PackageGroupEntry, PACKAGE_GROUP_WILDCARD};

/// Before this version, `nx`'s own package group was published without a
/// `packageGroup` field at all; callers on an older collected version need
/// this literal stand-in to get the same sibling-bump behavior later
/// releases get from the registry document itself.
pub const LEGACY_PACKAGE_GROUP_THRESHOLD: &str = "14.0.0-beta.0";

/// The cloud-connect package tracks its own release cadence instead of the
/// rest of the legacy group's, so it's pinned to `latest` rather than `*`.
const LEGACY_CLOUD_PACKAGE: &str = "@nrwl/nx-cloud";

pub fn legacy_nx_package_group() -> Vec<PackageGroupEntry> {
    let mut group: Vec<PackageGroupEntry> = [
        "@nrwl/angular",
        "@nrwl/cypress",
        "@nrwl/eslint-plugin-nx",
        "@nrwl/express",
        "@nrwl/jest",
        "@nrwl/linter",
        "@nrwl/nest",
        "@nrwl/next",
        "@nrwl/node",
        "@nrwl/react",
        "@nrwl/storybook",
        "@nrwl/web",
        "@nrwl/workspace",
    ]
    .iter()
    .map(|name| PackageGroupEntry { package: (*name).to_owned(), version: PACKAGE_GROUP_WILDCARD.to_owned() })
    .collect();
    group.push(PackageGroupEntry { package: LEGACY_CLOUD_PACKAGE.to_owned(), version: "latest".to_owned() });
    group
}

/// Resolve the `packageGroup` a document should expand with: the document's
/// own field, unless `name == "nx"` and `collected_version` predates
/// [`LEGACY_PACKAGE_GROUP_THRESHOLD`], in which case the literal legacy
/// group takes over (see DESIGN.md for why this is hardcoded rather than
/// read from anywhere).
pub fn resolve_package_group(name: &str, collected_version: &str, doc: &MigrationDocument) -> Option<Vec<PackageGroupEntry>> {
    if name == "nx" && crate::semver_util::normalize_version(collected_version) < crate::semver_util::normalize_version(LEGACY_PACKAGE_GROUP_THRESHOLD) {
        return Some(legacy_nx_package_group());
    }
    if doc.package_group.is_empty() {
        None
    } else {
        Some(doc.package_group.clone())
    }
}

/// Concrete `(package, version)` pairs a group resolves to, with `*`
/// substituted for `from_override` (the version the enclosing document
/// itself represents, when no narrower override applies).
pub fn expand(group: &[PackageGroupEntry], from_override: &str) -> Vec<(String, String)> {
    group
        .iter()
        .map(|entry| {
            let version = if entry.version == PACKAGE_GROUP_WILDCARD {
                from_override.to_owned()
            } else {
                entry.version.clone()
            };
            (entry.package.clone(), version)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_group_kicks_in_below_threshold() {
        let doc = MigrationDocument { version: "13.10.0".into(), ..Default::default() };
        let group = resolve_package_group("nx", "13.10.0", &doc).unwrap();
        assert!(group.iter().any(|e| e.package == "@nrwl/workspace"));
    }

    #[test]
    fn legacy_group_pins_the_cloud_package_to_latest_not_wildcard() {
        let group = legacy_nx_package_group();
        let cloud = group.iter().find(|e| e.package == LEGACY_CLOUD_PACKAGE).expect("cloud package present");
        assert_eq!(cloud.version, "latest");
        assert!(group.iter().filter(|e| e.package != LEGACY_CLOUD_PACKAGE).all(|e| e.version == PACKAGE_GROUP_WILDCARD));
    }

    #[test]
    fn modern_document_group_is_used_above_threshold() {
        let doc = MigrationDocument {
            version: "14.0.0".into(),
            package_group: vec![PackageGroupEntry { package: "@nrwl/next".into(), version: "*".into() }],
            ..Default::default()
        };
        let group = resolve_package_group("nx", "14.0.0", &doc).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].package, "@nrwl/next");
    }

    #[test]
    fn wildcard_expands_to_override_version() {
        let group = vec![PackageGroupEntry { package: "@nrwl/next".into(), version: "*".into() }];
        let expanded = expand(&group, "15.0.2");
        assert_eq!(expanded, vec![("@nrwl/next".to_owned(), "15.0.2".to_owned())]);
    }
}
