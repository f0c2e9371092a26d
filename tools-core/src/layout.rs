//! Well-known paths around the live executable.
//!
//! # Layout
//!
//! ```text
//! <install_dir>/
//!   tools                         live executable
//!   tools.new                     candidate produced by the build
//!   tools.backup                  copy of the live executable taken before a swap
//!   tools.old                     displaced backup (deferred helper only)
//!   tools-update-helper.sh|.bat   deferred helper script
//!   .tools-update-pending.json    pending marker for a deferred swap
//!   .tools-update-stalled         left by the helper when it gives up
//! ```
//!
//! # API pattern
//!
//! [`InstallLayout::at`] takes an explicit live path and is what tests use;
//! [`InstallLayout::current`] derives it from `std::env::current_exe()`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const PENDING_MARKER: &str = ".tools-update-pending.json";
pub const STALLED_MARKER: &str = ".tools-update-stalled";

#[cfg(windows)]
pub const HELPER_SCRIPT: &str = "tools-update-helper.bat";
#[cfg(not(windows))]
pub const HELPER_SCRIPT: &str = "tools-update-helper.sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub install_dir: PathBuf,
    pub live: PathBuf,
}

impl InstallLayout {
    /// Layout for an explicit live executable path.
    pub fn at(live: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let live = live.into();
        let install_dir = live
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::NoInstallDir { path: live.clone() })?;
        Ok(Self { install_dir, live })
    }

    /// Layout for the executable of the running process.
    pub fn current() -> Result<Self, ConfigError> {
        let exe = std::env::current_exe().map_err(ConfigError::ExecutableNotFound)?;
        let exe = exe.canonicalize().unwrap_or(exe);
        Self::at(exe)
    }

    /// File name of the live executable, e.g. `tools.exe`.
    pub fn executable_name(&self) -> String {
        self.live
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn candidate(&self) -> PathBuf {
        self.sibling("new")
    }

    pub fn backup(&self) -> PathBuf {
        self.sibling("backup")
    }

    pub fn displaced(&self) -> PathBuf {
        self.sibling("old")
    }

    pub fn helper_script(&self) -> PathBuf {
        self.install_dir.join(HELPER_SCRIPT)
    }

    pub fn pending_marker(&self) -> PathBuf {
        self.install_dir.join(PENDING_MARKER)
    }

    pub fn stalled_marker(&self) -> PathBuf {
        self.install_dir.join(STALLED_MARKER)
    }

    /// `<live>.<suffix>`: appended, so `tools.exe` becomes `tools.exe.new`.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.live.as_os_str());
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }
}
