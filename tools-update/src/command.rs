//! Captured execution of external programs (git, toolchain, process table).

use std::fmt;
use std::path::Path;
use std::process::Command;

/// Exit status plus combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub text: String,
}

impl CommandOutput {
    /// Case-insensitive search over the combined output.
    pub fn mentions(&self, needle: &str) -> bool {
        self.text
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text.trim_end())
    }
}

/// Run `program args..` in `dir`, capturing output. Only a failure to start
/// the program is an `Err`; a non-zero exit is reported in the output.
pub fn run_captured<I, S>(program: &str, args: I, dir: &Path) -> std::io::Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new(program).args(args).current_dir(dir).output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = stdout.trim_end().to_string();
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr.trim_end());
    }

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        text,
    })
}
