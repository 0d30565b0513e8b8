use std::process::Command;

use crate::error::SnapError;

/// Run `program args...` and return its stdout.
///
/// A spawn failure or a non-zero exit is an error carrying the exit status and
/// whatever the program wrote to stderr.
pub fn run(program: &str, args: &[&str]) -> Result<String, SnapError> {
    let invocation = || format!("{program} {}", args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| SnapError::Command {
            program: invocation(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = match stderr.trim() {
            "" => output.status.to_string(),
            msg => format!("{}: {msg}", output.status),
        };
        return Err(SnapError::Command {
            program: invocation(),
            detail,
        });
    }

    log::debug!("{} returned {} bytes", invocation(), output.stdout.len());
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
