//! Error types for tools-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading configuration or resolving the
/// install layout.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path that was touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override held a value that does not parse.
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// `std::env::current_exe()` failed; the live executable cannot be located.
    #[error("cannot determine the path of the running executable: {0}")]
    ExecutableNotFound(#[source] std::io::Error),

    /// The live executable path has no parent directory.
    #[error("executable path {path} has no parent directory")]
    NoInstallDir { path: PathBuf },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
