//! Two-level, promise-valued cache over the registry client: one cache for
//! range -> resolved-version lookups, one for the migration documents
//! themselves. Both caches store the in-flight future, not the eventual
//! value, so concurrent callers for the same key join the same request
//! instead of issuing duplicates (see spec §4.3/§9).

use crate::registry::client::RegistryClient;
use crate::registry::document::MigrationDocument;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// `Shared` futures require a `Clone` output, and `anyhow::Error` isn't
/// `Clone`; wrap it so every concurrent joiner of an in-flight request gets
/// the same (cheaply cloned) failure.
type SharedResult<T> = Result<T, Arc<anyhow::Error>>;
type CacheFuture<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

fn cache_key(name: &str, version: &str) -> String {
    format!("{name}-{version}")
}

pub struct Fetcher<R: RegistryClient> {
    client: Arc<R>,
    resolved_version_cache: AsyncMutex<HashMap<String, CacheFuture<String>>>,
    migrations_cache: AsyncMutex<HashMap<String, CacheFuture<MigrationDocument>>>,
}

impl<R: RegistryClient + 'static> Fetcher<R> {
    pub fn new(client: Arc<R>) -> Arc<Self> {
        Arc::new(Fetcher {
            client,
            resolved_version_cache: AsyncMutex::new(HashMap::new()),
            migrations_cache: AsyncMutex::new(HashMap::new()),
        })
    }

    /// The public entry point: resolve `name@version` to its migration
    /// document, following the fallback and caching rules in spec §4.3.
    pub async fn fetch(self: &Arc<Self>, name: &str, version: &str) -> anyhow::Result<MigrationDocument> {
        let key = cache_key(name, version);

        // Step 1: an identical fetch may already be in flight or resolved.
        let fut = {
            let mut cache = self.migrations_cache.lock().await;
            if let Some(existing) = cache.get(&key) {
                trace!("migrations cache hit for {key}");
                existing.clone()
            } else {
                let this = self.clone();
                let name = name.to_owned();
                let version = version.to_owned();
                let compute: BoxFuture<'static, SharedResult<MigrationDocument>> = async move {
                    this.resolve_and_fetch(&name, &version).await.map_err(Arc::new)
                }
                .boxed();
                let shared = compute.shared();
                cache.insert(key.clone(), shared.clone());
                shared
            }
        };

        fut.await.map_err(|e| anyhow::anyhow!("{e:#}"))
    }

    async fn resolve_and_fetch(self: &Arc<Self>, name: &str, version: &str) -> anyhow::Result<MigrationDocument> {
        match self.try_registry_path(name, version).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!("registry fetch for {name}@{version} failed ({e:#}); falling back to scratch install");
                self.scratch_install_fetch(name, version)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e:#}"))
            }
        }
    }

    async fn resolve_version(self: &Arc<Self>, name: &str, version: &str) -> anyhow::Result<String> {
        let key = cache_key(name, version);
        let fut = {
            let mut cache = self.resolved_version_cache.lock().await;
            if let Some(existing) = cache.get(&key) {
                existing.clone()
            } else {
                let client = self.client.clone();
                let name_o = name.to_owned();
                let version_o = version.to_owned();
                let compute: BoxFuture<'static, SharedResult<String>> = async move {
                    client.resolve_version(&name_o, &version_o).await.map_err(Arc::new)
                }
                .boxed();
                let shared = compute.shared();
                cache.insert(key.clone(), shared.clone());
                shared
            }
        };
        fut.await.map_err(|e| anyhow::anyhow!("{e:#}"))
    }

    async fn try_registry_path(self: &Arc<Self>, name: &str, version: &str) -> anyhow::Result<MigrationDocument> {
        let resolved = self.resolve_version(name, version).await?;

        if resolved != version {
            let resolved_key = cache_key(name, &resolved);
            let cached = {
                let cache = self.migrations_cache.lock().await;
                cache.get(&resolved_key).cloned()
            };
            if let Some(fut) = cached {
                debug!("reusing migrations document cached under resolved version {resolved_key}");
                return fut.await.map_err(|e| anyhow::anyhow!("{e:#}"));
            }
        }

        let config = self.client.view_config(name, &resolved).await?;
        let doc = match config {
            None => MigrationDocument { version: resolved, ..Default::default() },
            Some(cfg) if !cfg.has_migrations => MigrationDocument {
                version: resolved,
                package_group: cfg.package_group,
                ..Default::default()
            },
            Some(_cfg) => {
                let path = self.client.fetch_migrations_file(name, &resolved).await?;
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("reading migrations file for {name}@{resolved}: {e}"))?;
                let raw: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("parsing migrations file for {name}@{resolved}: {e}"))?;
                MigrationDocument::from_raw(resolved, &raw)
            }
        };

        Ok(doc)
    }

    async fn scratch_install_fetch(self: &Arc<Self>, name: &str, version: &str) -> anyhow::Result<MigrationDocument> {
        let scratch = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("creating scratch directory for {name}@{version}: {e}"))?;
        self.client.install_to_scratch(name, version, scratch.path()).await?;

        let pkg_json = scratch.path().join("node_modules").join(name).join("package.json");
        let manifest_text = std::fs::read_to_string(&pkg_json)
            .map_err(|e| anyhow::anyhow!("{name}@{version}: scratch install produced no package.json ({e})"))?;
        let manifest: serde_json::Value = serde_json::from_str(&manifest_text)?;
        let resolved = manifest.get("version").and_then(|v| v.as_str()).unwrap_or(version).to_owned();

        let migrations_path = scratch.path().join("node_modules").join(name).join("migrations.json");
        let doc = if migrations_path.exists() {
            let text = std::fs::read_to_string(&migrations_path)?;
            let raw: serde_json::Value = serde_json::from_str(&text)?;
            MigrationDocument::from_raw(resolved, &raw)
        } else {
            MigrationDocument { version: resolved, ..Default::default() }
        };
        // `scratch` (a TempDir) drops here regardless of outcome above,
        // cleaning up unconditionally.
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::document::RegistryConfigView;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeClient {
        resolve_calls: AtomicUsize,
        resolutions: Mutex<HashMap<(String, String), String>>,
        configs: Mutex<HashMap<(String, String), Option<RegistryConfigView>>>,
    }

    impl FakeClient {
        fn new() -> Self {
            FakeClient {
                resolve_calls: AtomicUsize::new(0),
                resolutions: Mutex::new(HashMap::new()),
                configs: Mutex::new(HashMap::new()),
            }
        }

        fn with_resolution(self, name: &str, range: &str, resolved: &str) -> Self {
            self.resolutions
                .lock()
                .unwrap()
                .insert((name.to_owned(), range.to_owned()), resolved.to_owned());
            self
        }

        fn with_config(self, name: &str, version: &str, cfg: Option<RegistryConfigView>) -> Self {
            self.configs.lock().unwrap().insert((name.to_owned(), version.to_owned()), cfg);
            self
        }
    }

    #[async_trait]
    impl RegistryClient for FakeClient {
        async fn resolve_version(&self, name: &str, range: &str) -> anyhow::Result<String> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            self.resolutions
                .lock()
                .unwrap()
                .get(&(name.to_owned(), range.to_owned()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no resolution configured for {name}@{range}"))
        }

        async fn view_config(&self, name: &str, version: &str) -> anyhow::Result<Option<RegistryConfigView>> {
            Ok(self.configs.lock().unwrap().get(&(name.to_owned(), version.to_owned())).cloned().flatten())
        }

        async fn fetch_migrations_file(&self, _name: &str, _version: &str) -> anyhow::Result<std::path::PathBuf> {
            anyhow::bail!("not used in this test")
        }

        async fn install_to_scratch(&self, _name: &str, _version: &str, _dir: &std::path::Path) -> anyhow::Result<()> {
            anyhow::bail!("not used in this test")
        }
    }

    #[tokio::test]
    async fn fetch_with_no_config_returns_bare_version() {
        let client = Arc::new(
            FakeClient::new().with_resolution("pkg", "2.0.0", "2.0.0").with_config("pkg", "2.0.0", None),
        );
        let fetcher = Fetcher::new(client);
        let doc = fetcher.fetch("pkg", "2.0.0").await.unwrap();
        assert_eq!(doc.version, "2.0.0");
        assert!(doc.generators.is_empty());
    }

    #[tokio::test]
    async fn resolve_version_is_called_at_most_once_per_key_under_concurrency() {
        let client = Arc::new(
            FakeClient::new().with_resolution("pkg", "^2.0.0", "2.3.1").with_config("pkg", "2.3.1", None),
        );
        let fetcher = Fetcher::new(client.clone());

        let (a, b, c) = tokio::join!(
            fetcher.fetch("pkg", "^2.0.0"),
            fetcher.fetch("pkg", "^2.0.0"),
            fetcher.fetch("pkg", "^2.0.0"),
        );
        assert_eq!(a.unwrap().version, "2.3.1");
        assert_eq!(b.unwrap().version, "2.3.1");
        assert_eq!(c.unwrap().version, "2.3.1");
        assert_eq!(client.resolve_calls.load(Ordering::SeqCst), 1);
    }
}
