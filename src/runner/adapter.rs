//! The two genuinely external collaborators of the runner: a
//! [`NativeGeneratorHost`] that runs a migration's own `implementation`/
//! `factory` in-process against the tree, and a [`MigrationAdapter`] that
//! shells out for a migration whose `cli` names something other than
//! `"nx"`. Both are kept behind traits, same as the registry client, so the
//! sequential loop in `runner::mod` can be exercised against fakes without
//! invoking a real generator or spawning a real subprocess.

use crate::runner::tree::ChangeTracker;
use crate::workspace::Workspace;
use anyhow::Context;
use async_trait::async_trait;

/// Runs a migration whose `cli` is absent or `"nx"`: module-resolves
/// `implementation` (falling back to `factory`) relative to the
/// migrations-file directory and invokes it in-process as `fn(tree, {})`.
/// What the resolved function actually does to the tree is opaque from
/// here.
#[async_trait]
pub trait NativeGeneratorHost: Send + Sync {
    async fn invoke(&self, implementation_or_factory: &str, workspace: &Workspace, tree: &mut ChangeTracker) -> anyhow::Result<()>;
}

/// No per-migration transform scripts ship with this crate -- they're the
/// opaque `(tree, options) -> changes` functions the spec treats as an
/// external collaborator. This host fails loudly rather than silently
/// no-opping, so a missing generator can never masquerade as a migration
/// that made no changes.
pub struct UnimplementedNativeHost;

#[async_trait]
impl NativeGeneratorHost for UnimplementedNativeHost {
    async fn invoke(&self, implementation_or_factory: &str, _workspace: &Workspace, _tree: &mut ChangeTracker) -> anyhow::Result<()> {
        anyhow::bail!("no native generator host registered to run {implementation_or_factory}")
    }
}

/// Dispatches a migration whose `cli` names something other than `"nx"` to
/// that CLI directly: `<cli> generate <package>:<name>`. What that
/// subprocess actually does to the workspace is opaque from here.
pub struct ExternalCliAdapter;

#[async_trait]
pub trait MigrationAdapter: Send + Sync {
    async fn run(&self, package: &str, name: &str, cli: &str, workspace: &Workspace) -> anyhow::Result<()>;
}

#[async_trait]
impl MigrationAdapter for ExternalCliAdapter {
    async fn run(&self, package: &str, name: &str, cli: &str, workspace: &Workspace) -> anyhow::Result<()> {
        let generator = format!("{package}:{name}");

        let status = tokio::process::Command::new(cli)
            .arg("generate")
            .arg(&generator)
            .current_dir(&workspace.root)
            .status()
            .await
            .with_context(|| format!("spawning {cli} to run migration {generator}"))?;

        if !status.success() {
            anyhow::bail!("migration {generator} failed with {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
pub struct RecordingAdapter {
    pub ran: std::sync::Mutex<Vec<String>>,
    pub fail_on: Option<String>,
}

#[cfg(test)]
#[async_trait]
impl MigrationAdapter for RecordingAdapter {
    async fn run(&self, package: &str, name: &str, _cli: &str, _workspace: &Workspace) -> anyhow::Result<()> {
        let label = format!("{package}:{name}");
        if self.fail_on.as_deref() == Some(label.as_str()) {
            anyhow::bail!("simulated failure running {label}");
        }
        self.ran.lock().unwrap().push(label);
        Ok(())
    }
}

#[cfg(test)]
pub struct RecordingNativeHost {
    pub ran: std::sync::Mutex<Vec<String>>,
    pub fail_on: Option<String>,
}

#[cfg(test)]
#[async_trait]
impl NativeGeneratorHost for RecordingNativeHost {
    async fn invoke(&self, implementation_or_factory: &str, _workspace: &Workspace, _tree: &mut ChangeTracker) -> anyhow::Result<()> {
        if self.fail_on.as_deref() == Some(implementation_or_factory) {
            anyhow::bail!("simulated failure running {implementation_or_factory}");
        }
        self.ran.lock().unwrap().push(implementation_or_factory.to_owned());
        Ok(())
    }
}
