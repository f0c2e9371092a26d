//! `tools update`: sync with the remote, rebuild and replace the executable.

use anyhow::Result;
use clap::Args;

use tools_core::UpdateOptions;
use tools_update::Report;

use crate::output::{self, ConsoleObserver};

/// Arguments for `tools update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Rebuild even when the version did not change.
    #[arg(short, long, conflicts_with = "check")]
    pub force: bool,

    /// Only report whether an update is available; change nothing.
    #[arg(short, long)]
    pub check: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl UpdateArgs {
    pub fn options(&self) -> UpdateOptions {
        UpdateOptions {
            force: self.force,
            check_only: self.check,
        }
    }

    pub fn run(self) -> Result<()> {
        let orchestrator = super::orchestrator()?;
        let observer = ConsoleObserver::new(self.json);

        match orchestrator.execute(self.options(), &observer)? {
            Report::Check(report) => output::print_check(&report, self.json),
            Report::Update(session) => output::finish_session(session, self.json),
        }
    }
}
