//! Process capability consumed by the job supervisor.

use async_trait::async_trait;

use crate::error::LaunchError;

/// Exit code of a finished process; `None` when it was terminated by a signal.
pub type ExitCode = Option<i32>;

/// Everything a launcher needs to start one worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Label used in logs (the job id).
    pub label: String,
    /// Shell command line.
    pub command: String,
    /// Host paths that must stay writable.
    pub volumes: Vec<String>,
    /// When `false` the worker's root filesystem is read-only.
    pub writable_root: bool,
    /// Extra environment for the worker.
    pub env: Vec<(String, String)>,
}

#[async_trait]
pub trait Launcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts the worker. Errors here mean the process never ran.
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn WorkerProcess>, LaunchError>;
}

/// Handle to a running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if the process is still known.
    fn id(&self) -> Option<u32>;

    /// Waits for the process to exit. Must be cancel safe.
    async fn wait(&mut self) -> Result<ExitCode, LaunchError>;

    /// Forcibly terminates the process and reaps it.
    async fn kill(&mut self) -> Result<(), LaunchError>;
}
