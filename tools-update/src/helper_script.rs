//! Deferred helper scripts.
//!
//! The helper outlives the tool: it polls the process table until no process
//! with the live executable's name remains, then renames the backup aside,
//! renames the candidate over the live path, and deletes the displaced copy,
//! the pending marker, and itself. Polling is bounded by
//! `max_poll_attempts`; on exhaustion, or when a rename fails, the helper
//! writes the stalled marker and exits non-zero.
//!
//! Failures inside the helper are invisible to the process that launched it;
//! the stalled marker is the only channel back to a later run.

use std::path::Path;

use tools_core::{InstallLayout, ReplacementConfig};

/// Everything a helper script needs to know, with paths already rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperParams {
    pub process_name: String,
    pub live: String,
    pub candidate: String,
    pub backup: String,
    pub displaced: String,
    pub pending_marker: String,
    pub stalled_marker: String,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
}

impl HelperParams {
    pub fn new(layout: &InstallLayout, replacement: &ReplacementConfig) -> Self {
        let show = |p: &Path| p.display().to_string();
        Self {
            process_name: layout.executable_name(),
            live: show(&layout.live),
            candidate: show(&layout.candidate()),
            backup: show(&layout.backup()),
            displaced: show(&layout.displaced()),
            pending_marker: show(&layout.pending_marker()),
            stalled_marker: show(&layout.stalled_marker()),
            poll_interval_secs: replacement.poll_interval_secs.max(1),
            max_poll_attempts: replacement.max_poll_attempts.max(1),
        }
    }
}

/// Script for the platform this binary was compiled for.
pub fn render(params: &HelperParams) -> String {
    if cfg!(windows) {
        render_batch(params)
    } else {
        render_sh(params)
    }
}

/// POSIX `sh` helper using `pgrep -x`.
pub fn render_sh(p: &HelperParams) -> String {
    let q = sh_quote;
    let name = pgrep_name(&p.process_name);
    format!(
        r#"#!/bin/sh
# tools update helper: applies a staged update once {name} has exited.
attempts=0
while pgrep -x {pname} >/dev/null 2>&1; do
    attempts=$((attempts + 1))
    if [ "$attempts" -ge {max} ]; then
        printf '%s still running after %s checks; apply %s manually\n' {qname} {max} {candidate} > {stalled}
        exit 1
    fi
    sleep {interval}
done
if ! mv -f {backup} {displaced}; then
    echo "could not move backup aside" > {stalled}
    exit 1
fi
if ! mv -f {candidate} {live}; then
    mv -f {displaced} {backup}
    echo "could not move candidate into place" > {stalled}
    exit 1
fi
rm -f {displaced} {pending}
rm -f "$0"
"#,
        name = p.process_name,
        pname = q(&name),
        max = p.max_poll_attempts,
        interval = p.poll_interval_secs,
        qname = q(&p.process_name),
        stalled = q(&p.stalled_marker),
        backup = q(&p.backup),
        displaced = q(&p.displaced),
        candidate = q(&p.candidate),
        live = q(&p.live),
        pending = q(&p.pending_marker),
    )
}

/// `cmd.exe` helper using `tasklist`. `ping` stands in for `timeout`, which
/// refuses to run without a console.
pub fn render_batch(p: &HelperParams) -> String {
    let q = batch_quote;
    format!(
        r#"@echo off
rem tools update helper: applies a staged update once {name} has exited.
setlocal
set attempts=0
:WAIT
tasklist /FI "IMAGENAME eq {name}" /NH | find /I "{name}" > nul
if errorlevel 1 goto REPLACE
set /a attempts+=1
if %attempts% GEQ {max} goto STALLED
ping -n {ping} 127.0.0.1 > nul
goto WAIT

:REPLACE
move /Y {backup} {displaced} > nul
if errorlevel 1 goto BACKUP_FAILED
move /Y {candidate} {live} > nul
if errorlevel 1 goto RESTORE
del {displaced}
del {pending}
(goto) 2>nul & del "%~f0"

:RESTORE
move /Y {displaced} {backup} > nul
echo could not move candidate into place> {stalled}
exit /b 1

:BACKUP_FAILED
echo could not move backup aside> {stalled}
exit /b 1

:STALLED
echo {name} still running after {max} checks> {stalled}
exit /b 1
"#,
        name = p.process_name,
        max = p.max_poll_attempts,
        ping = p.poll_interval_secs + 1,
        backup = q(&p.backup),
        displaced = q(&p.displaced),
        candidate = q(&p.candidate),
        live = q(&p.live),
        pending = q(&p.pending_marker),
        stalled = q(&p.stalled_marker),
    )
}

/// Linux truncates process names to 15 bytes, and `pgrep -x` matches that.
fn pgrep_name(name: &str) -> String {
    if cfg!(target_os = "linux") {
        name.chars().take(15).collect()
    } else {
        name.to_owned()
    }
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn batch_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('%', "%%"))
}
