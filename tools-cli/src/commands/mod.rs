pub mod self_update;
pub mod update;

use anyhow::{Context, Result};

use tools_core::{config, InstallLayout};
use tools_update::{CommandToolchain, DetachedLauncher, GitCli, UpdateOrchestrator};

pub(crate) type Orchestrator = UpdateOrchestrator<GitCli, CommandToolchain, DetachedLauncher>;

/// Orchestrator for the running executable and the `tools.yaml` next to it.
pub(crate) fn orchestrator() -> Result<Orchestrator> {
    let layout = InstallLayout::current().context("could not locate the running executable")?;
    let config = config::load_at(&layout.install_dir).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(&layout.install_dir).display()
        )
    })?;
    tracing::debug!(
        live = %layout.live.display(),
        remote = %config.remote.name,
        branch = %config.remote.branch,
        "resolved install layout"
    );
    Ok(UpdateOrchestrator::from_config(layout, config))
}
