//! Error types for tools-update.
//!
//! Each variant names the stage that failed so the CLI can tell the user
//! *where* an update stopped. Merge conflicts and stash-restore failures are
//! not errors: the former is resolved by a hard reset, the latter is carried
//! as a warning on the session.

use std::path::PathBuf;

use thiserror::Error;

use tools_core::ConfigError;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Fetching from the remote failed (network down, remote missing, auth).
    #[error("could not fetch from remote '{remote}':\n{output}")]
    RemoteUnavailable { remote: String, output: String },

    /// The install directory is not a git work tree and could not be made one.
    #[error("install directory is not upgradable via git: {reason}")]
    NotUpgradable { reason: String },

    /// A git step other than fetch failed (pull, reset, stash save).
    #[error("`git {command}` failed:\n{output}")]
    SyncFailed { command: String, output: String },

    /// A toolchain step exited non-zero. `output` is the captured diagnostics.
    #[error("build step `{step}` failed:\n{output}")]
    BuildFailed { step: String, output: String },

    /// Copying the live executable to the backup path failed; nothing was replaced.
    #[error("could not back up {live} to {backup}: {source}")]
    BackupFailed {
        live: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renaming the candidate over the live executable failed.
    #[error("could not replace {live}: {source}")]
    SwapFailed {
        live: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The deferred helper could not be written or started.
    #[error("could not launch update helper {script}: {source}")]
    HelperLaunchFailed {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A deferred update staged by an earlier run has not been applied yet.
    #[error("an update staged at {staged_at} is waiting for the tool to exit; restart the tool to apply it")]
    UpdatePending { staged_at: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pending marker JSON error.
    #[error("pending marker JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`UpdateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> UpdateError {
    UpdateError::Io {
        path: path.into(),
        source,
    }
}
