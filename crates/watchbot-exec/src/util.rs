use std::{io, time::Duration};

use tokio::process::{Child, Command};
use tracing::{debug, trace};

/// Time a worker gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// `<shell> -c <script>`, started in its own process group on unix.
pub(crate) fn shell_command(shell: &str, script: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(script);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Sends SIGTERM to the worker's process group, waits up to `grace`, then SIGKILLs.
///
/// Always reaps the child before returning.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> io::Result<()> {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => {
                trace!(target: "watchbot.exec.proc", pid, "exited after SIGTERM");
                return status.map(|_| ());
            }
            Err(_) => {
                debug!(target: "watchbot.exec.proc", pid, grace_ms = grace.as_millis() as u64, "grace expired; SIGKILL");
                signal_group(pid, libc::SIGKILL);
            }
        }
    }
    child.kill().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> io::Result<()> {
    child.kill().await
}

/// The child leads its own group, so `-pid` addresses it and every descendant.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: libc::c_int) {
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if rc != 0 {
        // Group may already be gone; fall back to the leader alone.
        unsafe { libc::kill(pid as libc::pid_t, signal) };
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn sigterm_is_enough_for_a_plain_sleep() {
        let mut child = shell_command("sh", "sleep 30").spawn().unwrap();
        let start = Instant::now();

        kill_graceful(&mut child, Duration::from_secs(5)).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn ignored_sigterm_escalates_to_sigkill() {
        let mut child = shell_command("sh", "trap '' TERM; sleep 30").spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        kill_graceful(&mut child, Duration::from_millis(300)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_some());
    }
}
