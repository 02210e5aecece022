//! Spawning a child process and awaiting its exit with captured output.

use tracing::debug;

use super::io::{drain, feed_input};
use crate::config::{StartInfo, TextEncoding};
use crate::{Error, Result};

/// The completed run of a child process: exit code plus everything it
/// wrote to its standard output and error streams.
///
/// A result only exists once the process has exited *and* both output
/// streams have been drained to EOF, so the captured bytes are never
/// truncated.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// The child's exit code. A child terminated by a signal has no
    /// code and is reported as -1.
    pub exit_code: i32,
    /// Everything the child wrote to standard output.
    pub stdout: Vec<u8>,
    /// Everything the child wrote to standard error.
    pub stderr: Vec<u8>,
    /// The encoding the output should be decoded with.
    pub encoding: TextEncoding,
}

impl ProcessResult {
    /// Check whether the child exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Decode standard output using the configured encoding.
    pub fn stdout_text(&self) -> Result<String> {
        self.encoding.decode(&self.stdout)
    }

    /// Decode standard error using the configured encoding.
    pub fn stderr_text(&self) -> Result<String> {
        self.encoding.decode(&self.stderr)
    }
}

/// Run a child process to completion with no input, capturing its output.
///
/// The child's stdin is closed immediately so it sees EOF.
pub async fn run(info: &StartInfo) -> Result<ProcessResult> {
    run_inner(info, None).await
}

/// Run a child process to completion, writing `input` to its stdin first.
///
/// Stdin is closed after the payload so the child sees EOF. A failure
/// while writing the payload fails the whole run.
pub async fn run_with_input(info: &StartInfo, input: impl Into<Vec<u8>>) -> Result<ProcessResult> {
    run_inner(info, Some(input.into())).await
}

/// Launch the child with all streams piped, mapping launch failures.
pub(crate) fn launch(info: &StartInfo) -> Result<tokio::process::Child> {
    let child = info.command().spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ProgramNotFound {
                program: info.program().to_owned(),
            }
        } else {
            Error::Spawn(e)
        }
    })?;
    debug!(program = info.program(), pid = child.id(), "spawned child process");
    Ok(child)
}

async fn run_inner(info: &StartInfo, input: Option<Vec<u8>>) -> Result<ProcessResult> {
    let mut child = launch(info)?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Spawn(std::io::Error::other("stdin was not captured")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Spawn(std::io::Error::other("stdout was not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Spawn(std::io::Error::other("stderr was not captured")))?;

    // Four concurrent activities: feed and close stdin, drain both output
    // streams, and wait for exit. The runtime observes exit through its
    // async child reaper, so no thread blocks per child. All four must
    // finish before a result is exposed; exit alone is not enough, the
    // drains may still hold undelivered bytes.
    let (feed_result, stdout_result, stderr_result, status) = tokio::join!(
        feed_input(stdin, input),
        drain(stdout),
        drain(stderr),
        child.wait(),
    );

    let status = status.map_err(Error::io)?;
    feed_result?;
    let stdout = stdout_result?;
    let stderr = stderr_result?;

    Ok(ProcessResult {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
        encoding: info.output_encoding(),
    })
}
