use super::WindowError;
use std::env;
use std::process::Command;

/// Shell used when `$SHELL` is not set.
const FALLBACK_SHELL: &str = "/bin/sh";

/// Run `command` through the user's shell and return its stdout.
pub fn run_command(command: &str) -> Result<String, WindowError> {
    let shell = env::var("SHELL").unwrap_or_else(|_| FALLBACK_SHELL.to_string());

    let output = Command::new(&shell)
        .arg("-c")
        .arg(command)
        .output()
        .map_err(|e| WindowError::CommandFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(WindowError::CommandFailed {
            command: command.to_string(),
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| WindowError::Parse(e.to_string()))
}
