//! Update configuration, read from `<install_dir>/tools.yaml`.
//!
//! Every field has a default, so a missing file (or a file that sets only a
//! few keys) is a valid configuration:
//!
//! ```yaml
//! remote:
//!   name: origin
//!   url: https://github.com/example/tools.git
//!   branch: main
//! version_marker: Cargo.toml
//! build:
//!   fetch: [cargo, fetch]
//!   compile: [cargo, build, --release]
//!   artifact: target/release/tools
//! replacement:
//!   strategy: auto
//!   poll_interval_secs: 1
//!   max_poll_attempts: 600
//! ```
//!
//! A handful of environment variables override the file (see
//! [`UpdateConfig::apply_env_overrides`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{BranchName, RemoteName, ReplacementStrategy};

/// File name of the optional config file inside the install directory.
pub const CONFIG_FILE: &str = "tools.yaml";

pub const ENV_REMOTE_URL: &str = "TOOLS_UPDATE_REMOTE_URL";
pub const ENV_BRANCH: &str = "TOOLS_UPDATE_BRANCH";
pub const ENV_STRATEGY: &str = "TOOLS_UPDATE_STRATEGY";

/// Upstream repository used when `remote.url` is not configured.
pub const DEFAULT_REMOTE_URL: &str = "https://github.com/tools-dev/tools.git";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub remote: RemoteConfig,
    /// Path of the version marker, relative to the install directory.
    pub version_marker: PathBuf,
    pub build: BuildConfig,
    pub replacement: ReplacementConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            version_marker: PathBuf::from("Cargo.toml"),
            build: BuildConfig::default(),
            replacement: ReplacementConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub name: RemoteName,
    pub url: String,
    pub branch: BranchName,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: RemoteName::from("origin"),
            url: DEFAULT_REMOTE_URL.to_owned(),
            branch: BranchName::from("main"),
        }
    }
}

impl RemoteConfig {
    /// `<remote>/<branch>`, e.g. `origin/main`.
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.name, self.branch)
    }
}

/// Toolchain invocations, each an argv vector run in the install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub fetch: Vec<String>,
    pub compile: Vec<String>,
    /// Where the compile step leaves its binary, relative to the install dir.
    pub artifact: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fetch: vec!["cargo".into(), "fetch".into()],
            compile: vec!["cargo".into(), "build".into(), "--release".into()],
            artifact: PathBuf::from("target")
                .join("release")
                .join(format!("tools{}", std::env::consts::EXE_SUFFIX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementConfig {
    pub strategy: ReplacementStrategy,
    pub poll_interval_secs: u64,
    /// Upper bound on helper polls before it gives up and leaves a stalled marker.
    pub max_poll_attempts: u32,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            strategy: ReplacementStrategy::Auto,
            poll_interval_secs: 1,
            max_poll_attempts: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// `<install_dir>/tools.yaml`: pure, no I/O.
pub fn config_path_at(install_dir: &Path) -> PathBuf {
    install_dir.join(CONFIG_FILE)
}

/// Load the config file from `install_dir`, falling back to defaults when the
/// file does not exist. Environment overrides are *not* applied.
pub fn load_file_at(install_dir: &Path) -> Result<UpdateConfig, ConfigError> {
    let path = config_path_at(install_dir);
    if !path.exists() {
        return Ok(UpdateConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(UpdateConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// Load the config file and apply process environment overrides.
pub fn load_at(install_dir: &Path) -> Result<UpdateConfig, ConfigError> {
    let mut config = load_file_at(install_dir)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

impl UpdateConfig {
    /// Override fields from `TOOLS_UPDATE_*` variables resolved by `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_REMOTE_URL) {
            self.remote.url = url;
        }
        if let Some(branch) = get(ENV_BRANCH) {
            self.remote.branch = BranchName::from(branch);
        }
        if let Some(strategy) = get(ENV_STRATEGY) {
            self.replacement.strategy =
                strategy
                    .parse()
                    .map_err(|reason| ConfigError::InvalidEnv {
                        var: ENV_STRATEGY,
                        value: strategy.clone(),
                        reason,
                    })?;
        }
        Ok(())
    }
}
