//! Capture command launcher.
//!
//! The camera encoder and the RTP sender run as a shell pipeline. The
//! shell is started in its own process group so the whole pipeline can be
//! signalled at once.

use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::DEFAULT_KILL_GRACE;
use crate::error::{LinkError, LinkResult};

const EXIT_POLL: Duration = Duration::from_millis(50);

/// A running capture command line.
#[derive(Debug)]
pub struct CaptureProcess {
    child: Child,
    status: Option<ExitStatus>,
}

impl CaptureProcess {
    /// Run `command_line` with `sh -c` in a new process group.
    pub fn spawn(command_line: &str) -> LinkResult<Self> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LinkError::process("spawn", e))?;
        tracing::info!(pid = child.id(), "capture process started");
        Ok(Self {
            child,
            status: None,
        })
    }

    /// Process id of the shell, which is also the process group id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        self.poll().is_none()
    }

    fn poll(&mut self) -> Option<ExitStatus> {
        if self.status.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.status = status,
                Err(e) => tracing::warn!(pid = self.id(), "failed to poll capture process: {e}"),
            }
        }
        self.status
    }

    /// Stop the process group: SIGTERM, then SIGKILL once `grace` has
    /// passed. Returns the exit status; calling it again returns the same.
    pub fn terminate(&mut self, grace: Duration) -> LinkResult<ExitStatus> {
        if let Some(status) = self.poll() {
            return Ok(status);
        }

        let pid = self.id();
        if let Err(e) = self.signal_group("TERM") {
            tracing::warn!(pid, "{e}");
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.poll() {
                tracing::info!(pid, %status, "capture process terminated");
                return Ok(status);
            }
            thread::sleep(EXIT_POLL);
        }

        tracing::warn!(pid, "capture process still running after {grace:?}, killing");
        if let Err(e) = self.signal_group("KILL") {
            tracing::warn!(pid, "{e}");
            self.child
                .kill()
                .map_err(|e| LinkError::process("kill", e))?;
        }
        let status = self
            .child
            .wait()
            .map_err(|e| LinkError::process("wait", e))?;
        self.status = Some(status);
        tracing::info!(pid, %status, "capture process killed");
        Ok(status)
    }

    fn signal_group(&self, signal: &str) -> LinkResult<()> {
        // The shell builtin is always present; a negative pid names the group.
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("kill -{signal} -{}", self.id()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| LinkError::process("signal", e))?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkError::process(
                "signal",
                io::Error::other(format!("kill -{signal} exited with {status}")),
            ))
        }
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.terminate(DEFAULT_KILL_GRACE) {
                tracing::error!("{e}");
            }
        }
    }
}
