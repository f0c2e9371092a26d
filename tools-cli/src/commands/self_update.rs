//! `tools self-update`: rebuild in place from the current source tree.

use anyhow::Result;
use clap::Args;

use crate::output::{self, ConsoleObserver};

/// Arguments for `tools self-update`.
#[derive(Args, Debug)]
pub struct SelfUpdateArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SelfUpdateArgs {
    pub fn run(self) -> Result<()> {
        let orchestrator = super::orchestrator()?;
        let session = orchestrator.self_update(&ConsoleObserver::new(self.json))?;
        output::finish_session(session, self.json)
    }
}
