//! The registry client primitives. These are the one genuinely "external
//! collaborator" surface named as out-of-scope in the original spec (view,
//! pack, tarball extraction) -- we model them as an async trait so the
//! fetcher can be exercised against a fake in tests without a live registry.

use crate::registry::document::RegistryConfigView;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve a range/tag (`^2.0.0`, `latest`, a bare version) against the
    /// registry to a concrete published version.
    async fn resolve_version(&self, name: &str, range: &str) -> Result<String>;

    /// The registry's lightweight "view" shape for `name@version`: whether a
    /// migration config exists at all, and if so, its package group. Returns
    /// `None` if the registry has no config for this exact package/version.
    async fn view_config(&self, name: &str, version: &str) -> Result<Option<RegistryConfigView>>;

    /// Download and extract the package's migrations file, returning a path
    /// to the extracted JSON document. Tarball fetch/extraction itself is
    /// opaque; only the resulting path matters to the fetcher.
    async fn fetch_migrations_file(&self, name: &str, version: &str) -> Result<PathBuf>;

    /// Install `name@version` into `scratch_dir` as a last-resort fallback
    /// when the registry is unreachable.
    async fn install_to_scratch(&self, name: &str, version: &str, scratch_dir: &std::path::Path) -> Result<()>;
}

/// Default implementation, talking to an actual npm-compatible registry over
/// HTTP. The view/resolve endpoints and tarball handling are treated as
/// opaque per the spec -- this type exists to have *something* concrete
/// behind the trait, not to be a complete registry client.
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpRegistryClient { base_url: base_url.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn resolve_version(&self, name: &str, range: &str) -> Result<String> {
        let url = format!("{}/{}/{}", self.base_url, name, range);
        let resp = self.http.get(&url).send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        body.get("version")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("registry response for {name}@{range} had no version field"))
    }

    async fn view_config(&self, name: &str, version: &str) -> Result<Option<RegistryConfigView>> {
        let url = format!("{}/{}/{}/migration-config", self.base_url, name, version);
        let resp = self.http.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let has_migrations = body.get("migrations").is_some() || body.get("generators").is_some();
        let package_group = body
            .get("packageGroup")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|e| {
                        Some(crate::registry::document::PackageGroupEntry {
                            package: e.get("package")?.as_str()?.to_owned(),
                            version: e.get("version")?.as_str()?.to_owned(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(RegistryConfigView { package_group, has_migrations }))
    }

    async fn fetch_migrations_file(&self, name: &str, version: &str) -> Result<PathBuf> {
        let url = format!("{}/{}/{}/-/{}-{}.tgz", self.base_url, name, version, name, version);
        let bytes = self.http.get(&url).send().await?.error_for_status()?.bytes().await?;

        let dir = tempfile::tempdir()?;
        let tar = flate2::read::GzDecoder::new(&bytes[..]);
        let mut archive = tar::Archive::new(tar);
        archive.unpack(dir.path())?;

        let migrations_path = dir.path().join("package").join("migrations.json");
        if !migrations_path.exists() {
            anyhow::bail!("{name}@{version}: migrations file missing from published tarball");
        }
        // Persist the extracted path past the TempDir's drop by leaking the
        // directory handle -- the fetcher reads it once and discards it.
        let kept_root = dir.into_path();
        Ok(kept_root.join("package").join("migrations.json"))
    }

    async fn install_to_scratch(&self, name: &str, version: &str, scratch_dir: &std::path::Path) -> Result<()> {
        let status = tokio::process::Command::new("npm")
            .args(["install", "--no-save", "--prefix"])
            .arg(scratch_dir)
            .arg(format!("{name}@{version}"))
            .status()
            .await?;
        if !status.success() {
            anyhow::bail!("scratch install of {name}@{version} failed with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_version_reads_the_version_field() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/nx/14.0.0")
            .with_status(200)
            .with_body(r#"{"version":"14.0.0"}"#)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(server.url());
        let resolved = client.resolve_version("nx", "14.0.0").await.unwrap();
        assert_eq!(resolved, "14.0.0");
    }

    #[tokio::test]
    async fn view_config_returns_none_on_404() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/nx/14.0.0/migration-config").with_status(404).create_async().await;

        let client = HttpRegistryClient::new(server.url());
        let config = client.view_config("nx", "14.0.0").await.unwrap();
        assert!(config.is_none());
    }

    #[tokio::test]
    async fn view_config_parses_package_group() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/nx/14.0.0/migration-config")
            .with_status(200)
            .with_body(r#"{"generators":{},"packageGroup":[{"package":"@nrwl/next","version":"*"}]}"#)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(server.url());
        let config = client.view_config("nx", "14.0.0").await.unwrap().unwrap();
        assert!(config.has_migrations);
        assert_eq!(config.package_group.len(), 1);
        assert_eq!(config.package_group[0].package, "@nrwl/next");
    }
}
