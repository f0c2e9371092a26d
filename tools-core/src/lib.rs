//! tools core library: domain types, configuration, install layout, version probe.
//!
//! - [`types`]: newtypes, [`UpdateOptions`], replacement strategy/plan
//! - [`config`]: [`UpdateConfig`] loaded from `tools.yaml` + env overrides
//! - [`layout`]: [`InstallLayout`], every well-known path next to the live executable
//! - [`version`]: [`read_version`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod layout;
pub mod types;
pub mod version;

pub use config::{BuildConfig, RemoteConfig, ReplacementConfig, UpdateConfig};
pub use error::ConfigError;
pub use layout::InstallLayout;
pub use types::{
    BranchName, RemoteName, ReplacementPlan, ReplacementStrategy, UpdateOptions, Version,
};
pub use version::read_version;
