//! Child process execution that stays killable: spawn, register, poll, reap.

use anyhow::{Context, Result};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pipeline::cancel::{CancellationFlag, ChildRegistry};
use crate::utils::config::POLL_INTERVAL;

/// Why a child did not run to its own exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Exited,
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.status.success()
    }

    /// Most useful captured text for a failure line: stderr, else stdout.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Kill the child and, on Unix, every process in its group (the child leads its own
/// group, see [`run_tracked`]), so grandchildren holding our pipes die too.
pub fn kill_tree(child: &mut Child) -> io::Result<()> {
    // Reaped children may have had their pid recycled.
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    kill_group(child.id());
    child.kill()
}

/// SIGKILL every process left in the group led by `leader`. No-op off Unix.
fn kill_group(leader: u32) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(leader) {
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = leader;
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf)
        {
            log::debug!("child pipe read failed: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run `cmd` to completion while keeping it killable by the cancellation monitor.
///
/// The child is registered in `registry` right after spawn. The wait loop polls every
/// [`POLL_INTERVAL`] and kills the child when `cancel` is set or `timeout` elapses.
/// Output pipes are drained on separate threads so a chatty child cannot block. Once the
/// child is reaped, whatever is left of its process group is killed so the readers see EOF.
pub fn run_tracked(
    mut cmd: Command,
    registry: &ChildRegistry,
    cancel: &CancellationFlag,
    timeout: Option<Duration>,
) -> Result<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = cmd.spawn().with_context(|| format!("spawn {program}"))?;
    let leader = child.id();
    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    let child = Arc::new(Mutex::new(child));
    let _guard = registry.register(Arc::clone(&child));
    let started = Instant::now();
    let mut termination = Termination::Exited;

    let status = loop {
        {
            let mut c = child.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(status) = c.try_wait().context("wait for child")? {
                break status;
            }
            if termination == Termination::Exited {
                // Covers a cancel that landed between spawn and register.
                if cancel.is_cancelled() {
                    termination = Termination::Cancelled;
                    let _ = kill_tree(&mut c);
                } else if timeout.is_some_and(|t| started.elapsed() >= t) {
                    termination = Termination::TimedOut;
                    let _ = kill_tree(&mut c);
                }
            }
        }
        thread::sleep(POLL_INTERVAL);
    };
    // Background grandchildren still hold the pipes; the readers only finish once they die.
    kill_group(leader);
    // The monitor may have killed the child before this loop saw the flag.
    if termination == Termination::Exited && !status.success() && cancel.is_cancelled() {
        termination = Termination::Cancelled;
    }

    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout reader panicked"))?;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr reader panicked"))?;

    Ok(ProcessOutput {
        status,
        termination,
        stdout,
        stderr,
    })
}
