//! Bounded subprocess execution for proof backends
//!
//! On unix the prover runs as the leader of its own process group, so the
//! whole group (script plus any prover binaries it started) is killed on
//! timeout or when the calling future is dropped.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::ProofError;

/// How much trailing stderr to keep for the log
const STDERR_TAIL_BYTES: usize = 2048;

/// How long to wait for the stderr reader after the child has exited
const STDERR_DRAIN: Duration = Duration::from_millis(250);

/// Process group of a spawned prover. Dropping it SIGKILLs every member
/// still alive.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pgid, "Prover process group killed"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, error = %e, "Failed to kill prover process group"),
            }
        }

        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run `command` to completion or kill it at `timeout`.
///
/// The child is spawned with `kill_on_drop` in a fresh process group. On
/// timeout the group is sent SIGKILL and the child is reaped before
/// returning; leftover group members are also killed once the child exits.
pub async fn run_bounded(
    mut command: Command,
    program: &Path,
    timeout: Duration,
) -> Result<(), ProofError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => ProofError::BackendMissing(program.to_path_buf()),
        _ => ProofError::Spawn(e),
    })?;
    let mut group = ProcessGroup::of(&child);
    debug!(pid = ?child.id(), program = %program.display(), "Proof backend spawned");

    let stderr = child.stderr.take();
    let reader = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut s) = stderr {
            let _ = s.read_to_end(&mut buf).await;
        }
        buf
    });

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let status = match waited {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            reader.abort();
            return Err(ProofError::Spawn(e));
        }
        Err(_) => {
            group.kill();
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to reap timed-out proof backend");
            }
            reader.abort();
            return Err(ProofError::Timeout(timeout));
        }
    };
    group.kill();

    if status.success() {
        reader.abort();
        return Ok(());
    }

    let stderr = match tokio::time::timeout(STDERR_DRAIN, reader).await {
        Ok(Ok(bytes)) => tail(&bytes),
        _ => String::new(),
    };

    Err(ProofError::NonZeroExit {
        code: status.code(),
        stderr,
    })
}

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
