//! Subprocess helpers for the local engines

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{EngineError, Result};

/// Run `command`, feed `input` on stdin, return stdout
///
/// The child is killed if the returned future is dropped, so an attempt
/// timeout in the executor also stops the process.
pub async fn run(mut command: Command, input: Option<&str>) -> Result<Vec<u8>> {
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(text.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(EngineError::Process(if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        }));
    }
    Ok(output.stdout)
}
