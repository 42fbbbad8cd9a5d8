//! Helpers for running child processes with timeouts and bounded output.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output with separate streams.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Child process output with stdout and stderr merged in emission order.
#[derive(Debug)]
pub struct MergedOutput {
    pub status: ExitStatus,
    pub output: Vec<u8>,
    pub truncated: usize,
    pub timed_out: bool,
}

impl MergedOutput {
    /// Output as text followed by a truncation notice when bytes were dropped.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.output).into_owned();
        if self.truncated > 0 {
            text.push_str(&format!("\n[output truncated {} bytes]\n", self.truncated));
        }
        text
    }
}

/// Run a command feeding `stdin` to it, with separate stdout/stderr capture.
///
/// Both pipes are drained by reader threads and stdin is fed by a writer
/// thread, so neither a child that answers before consuming its whole prompt
/// nor one that never reads can hold the caller past `timeout`. At most
/// `output_limit_bytes` per stream are kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = spawn(&mut cmd)?;
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;
    let stdout_reader = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_reader = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // Written from its own thread so a child that never reads its input still
    // falls under the timeout below.
    let stdin_writer = match stdin {
        Some(input) => {
            let pipe = child.stdin.take().context("stdin was not piped")?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(pipe, &input)))
        }
        None => None,
    };

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    if let Some(writer) = stdin_writer {
        writer
            .join()
            .map_err(|_| anyhow!("stdin writer thread panicked"))??;
    }
    let (stdout, stdout_truncated) = join_output(stdout_reader).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_reader).context("join stderr")?;
    if stdout_truncated + stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Spawn `cmd` as the leader of a new process group.
///
/// Everything the child starts inherits the group, so [`kill_group`] reaches
/// grandchildren too.
fn spawn(cmd: &mut Command) -> Result<Child> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    debug!(program = ?cmd.get_program(), "spawning child process");
    cmd.spawn().map_err(|e| {
        error!(err = %e, "failed to spawn command");
        anyhow::Error::new(e).context("spawn command")
    })
}

fn write_stdin(mut pipe: ChildStdin, input: &[u8]) -> Result<()> {
    match pipe.write_all(input) {
        Ok(()) => Ok(()),
        // The child may exit (or be killed) without consuming all of its input.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading all input");
            Ok(())
        }
        Err(e) => Err(e).context("write stdin"),
    }
}

/// Wait up to `timeout`, killing the child's process group once it is exceeded.
///
/// Returns the final status and whether the child was killed.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_ms = timeout.as_millis() as u64, "command timed out, killing");
    kill_group(child)?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

/// SIGKILL every process in the group led by `child`.
///
/// A group with no members left is not an error.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(i32::try_from(child.id()).context("child pid out of range")?);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => {
            // Fall back to the direct child so the timeout still holds.
            warn!(pgid = %pgid, err = %e, "failed to kill process group");
            child.kill().context("kill command")
        }
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

/// Run a command with a timeout, merging stdout and stderr into `capture`.
///
/// Both streams share one file descriptor, so the captured bytes keep the order
/// in which the child emitted them. The file is read back once the child has
/// exited (or been killed), keeping at most `output_limit_bytes`. The child's
/// whole process group is killed before returning, whether or not it timed out.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_captured(
    mut cmd: Command,
    capture: File,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<MergedOutput> {
    let stderr_handle = capture.try_clone().context("clone capture file")?;
    let mut reader = capture.try_clone().context("clone capture file")?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(capture))
        .stderr(Stdio::from(stderr_handle));

    let mut child = spawn(&mut cmd)?;
    // Release our copies of the capture descriptor held by `cmd`.
    drop(cmd);

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    if !timed_out {
        // Background processes started by the child must not outlive the run.
        kill_group(&mut child)?;
    }

    // The shared offset sits at the end of what the child wrote; read from the start.
    rewind(&mut reader)?;
    let (output, truncated) = read_stream_limited(reader, output_limit_bytes)?;
    if truncated > 0 {
        warn!(truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(MergedOutput {
        status,
        output,
        truncated,
        timed_out,
    })
}

fn rewind(file: &mut File) -> Result<()> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(0)).context("rewind capture file")?;
    Ok(())
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Keep the first `limit` bytes of `reader` and drain the rest.
///
/// Returns the kept bytes and how many were discarded.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut kept)
        .context("read output")?;
    let dropped = std::io::copy(&mut reader, &mut std::io::sink()).context("drain output")?;
    Ok((kept, dropped as usize))
}
