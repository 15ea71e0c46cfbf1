use anyhow::{anyhow, Context, Result};
use log::debug;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Captured result of an external command invocation
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external command to completion and capture its output.
///
/// A nonzero exit status is an error; stderr is included in the error
/// message so failures of the vendor tools stay diagnosable.
pub fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput> {
    debug!("Running command: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run '{}'", program))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(anyhow!(
            "Command '{} {}' failed with {}: {}",
            program,
            args.join(" "),
            output.status,
            stderr.trim()
        ));
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Run an external command with inherited stdio, killing it when the
/// deadline passes. Used for long-running invocations like builds where
/// streaming output matters more than capturing it.
pub fn run_command_with_timeout(program: &str, args: &[&str], timeout: Duration) -> Result<()> {
    debug!(
        "Running command: {} {} (timeout: {}s)",
        program,
        args.join(" "),
        timeout.as_secs()
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to run '{}'", program))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().context("Failed to poll child process")? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                return Err(anyhow!(
                    "Command '{} {}' failed with {}",
                    program,
                    args.join(" "),
                    status
                ));
            }
            None => {
                if Instant::now() >= deadline {
                    child.kill().context("Failed to kill timed-out process")?;
                    child.wait().context("Failed to reap timed-out process")?;
                    return Err(anyhow!(
                        "Command '{} {}' timed out after {}s",
                        program,
                        args.join(" "),
                        timeout.as_secs()
                    ));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}
