use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};
use watchbot_core::{ExitCode, LaunchError, LaunchSpec, Launcher, WorkerProcess};

use crate::{
    sandbox::{self, IsolationMode, MountPlan},
    util::{DEFAULT_KILL_GRACE, kill_graceful, shell_command},
};

/// How long to keep reading output after the worker exits.
const OUTPUT_TAIL: Duration = Duration::from_secs(1);

/// Runs each worker as `sh -c <command>` on the local host.
#[derive(Clone, Debug)]
pub struct LocalLauncher {
    shell: String,
    isolation: IsolationMode,
    kill_grace: Duration,
}

impl Default for LocalLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLauncher {
    /// Launcher with isolation picked by [`IsolationMode::detect`].
    pub fn new() -> Self {
        Self {
            shell: "sh".into(),
            isolation: IsolationMode::detect(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_isolation(mut self, mode: IsolationMode) -> Self {
        self.isolation = mode;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn isolation(&self) -> IsolationMode {
        self.isolation
    }
}

#[async_trait]
impl Launcher for LocalLauncher {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn WorkerProcess>, LaunchError> {
        Ok(Box::new(self.spawn(spec)?))
    }
}

impl LocalLauncher {
    /// Starts the worker and its output forwarders.
    pub fn spawn(&self, spec: LaunchSpec) -> Result<LocalProcess, LaunchError> {
        if spec.command.trim().is_empty() {
            return Err(LaunchError::Spawn("empty command".into()));
        }
        sandbox::check_volumes(&spec.volumes)?;

        let mut cmd = shell_command(&self.shell, &spec.command);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(plan) = MountPlan::for_spec(&spec)? {
            sandbox::attach(&mut cmd, plan, self.isolation);
        }

        trace!(target: "watchbot.exec.proc", job = %spec.label, command = %spec.command, "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchError::Spawn(format!("{}: {e}", self.shell)))?;
        debug!(target: "watchbot.exec.proc", job = %spec.label, pid = ?child.id(), "spawned");

        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(forward_lines(out, spec.label.clone(), Stream::Stdout));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(forward_lines(err, spec.label.clone(), Stream::Stderr));
        }

        Ok(LocalProcess {
            child,
            label: spec.label,
            kill_grace: self.kill_grace,
            pumps,
        })
    }
}

/// A running local worker.
pub struct LocalProcess {
    child: Child,
    label: String,
    kill_grace: Duration,
    pumps: Vec<JoinHandle<()>>,
}

impl LocalProcess {
    async fn drain_output(&mut self) {
        for mut pump in self.pumps.drain(..) {
            if tokio::time::timeout(OUTPUT_TAIL, &mut pump).await.is_err() {
                // A detached descendant still holds the pipe.
                pump.abort();
                trace!(target: "watchbot.exec.proc", job = %self.label, "output still open after exit; forwarder stopped");
            }
        }
    }
}

#[async_trait]
impl WorkerProcess for LocalProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ExitCode, LaunchError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| LaunchError::Wait(e.to_string()))?;
        self.drain_output().await;

        debug!(target: "watchbot.exec.proc", job = %self.label, ?status, "exited");
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<(), LaunchError> {
        kill_graceful(&mut self.child, self.kill_grace)
            .await
            .map_err(|e| LaunchError::Kill(e.to_string()))?;
        self.drain_output().await;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, label: String, stream: Stream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match stream {
                    Stream::Stdout => info!(target: "watchbot.exec.proc.out", job = %label, "{line}"),
                    Stream::Stderr => warn!(target: "watchbot.exec.proc.err", job = %label, "{line}"),
                },
                Ok(None) => break,
                Err(e) => {
                    trace!(target: "watchbot.exec.proc", job = %label, error = %e, "output read failed");
                    break;
                }
            }
        }
    })
}
