use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, instrument, warn};
use watchbot_model::{WorkerOptions, WorkerOutcome, WorkerResult};

use crate::{
    job::Job,
    launch::{LaunchSpec, Launcher},
};

/// Runs one job's worker under a hard deadline.
///
/// The deadline is not a cooperative cancellation: once it passes the worker
/// is killed through the launcher and the outcome is [`WorkerOutcome::TimedOut`].
pub struct JobSupervisor {
    launcher: Arc<dyn Launcher>,
    options: WorkerOptions,
    writable_root: bool,
}

impl JobSupervisor {
    pub fn new(launcher: Arc<dyn Launcher>, options: WorkerOptions, writable_root: bool) -> Self {
        Self {
            launcher,
            options,
            writable_root,
        }
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Process launch parameters for `job`.
    pub fn launch_spec(&self, job: &Job) -> LaunchSpec {
        LaunchSpec {
            label: job.id().to_string(),
            command: self.options.command().to_string(),
            volumes: self.options.volumes().to_vec(),
            writable_root: self.writable_root,
            env: job.message().worker_env(),
        }
    }

    #[instrument(level = "debug", skip_all, fields(job = %job.id(), message = %job.message().id))]
    pub async fn run(&self, job: &Job) -> WorkerResult {
        let spec = self.launch_spec(job);

        let mut process = match self.launcher.launch(spec).await {
            Ok(p) => p,
            Err(e) => {
                error!(
                    target: "watchbot.core.supervisor",
                    launcher = self.launcher.name(),
                    error = %e,
                    "worker could not be started"
                );
                return WorkerResult::new(
                    WorkerOutcome::SpawnError {
                        reason: e.to_string(),
                    },
                    job.elapsed(),
                );
            }
        };
        debug!(target: "watchbot.core.supervisor", pid = ?process.id(), "worker started");

        let deadline = tokio::time::sleep_until(job.deadline());
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            status = process.wait() => match status {
                Ok(code) => WorkerOutcome::from_exit_code(code),
                Err(e) => {
                    warn!(target: "watchbot.core.supervisor", error = %e, "wait failed");
                    WorkerOutcome::Failed { code: None }
                }
            },
            _ = &mut deadline => {
                info!(
                    target: "watchbot.core.supervisor",
                    limit_secs = self.options.max_job_duration_secs(),
                    "deadline reached; killing worker"
                );
                if let Err(e) = process.kill().await {
                    error!(target: "watchbot.core.supervisor", error = %e, "kill failed");
                }
                WorkerOutcome::TimedOut
            }
        };

        let elapsed = job.elapsed();
        debug!(
            target: "watchbot.core.supervisor",
            outcome = outcome.kind(),
            elapsed_ms = as_ms(elapsed),
            "worker finished"
        );
        WorkerResult::new(outcome, elapsed)
    }
}

#[inline]
fn as_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
