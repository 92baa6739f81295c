use std::time::Duration;

use serde::Serialize;

use crate::{ModelError, Seconds};

/// Job duration applied when none is configured.
pub const DEFAULT_MAX_JOB_DURATION_SECS: Seconds = 900;

/// How each worker process is launched.
///
/// Built through [`WorkerOptions::new`], which rejects an empty command and a zero duration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOptions {
    /// Shell command line run once per message.
    command: String,
    /// Host paths that stay writable for the worker.
    volumes: Vec<String>,
    /// Hard limit for one job, in seconds.
    max_job_duration: Seconds,
}

impl WorkerOptions {
    pub fn new(
        command: impl Into<String>,
        volumes: Vec<String>,
        max_job_duration: Seconds,
    ) -> Result<Self, ModelError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(ModelError::Required { field: "command" });
        }
        if max_job_duration == 0 {
            return Err(ModelError::NotPositive {
                field: "maxJobDuration",
            });
        }
        Ok(Self {
            command,
            volumes,
            max_job_duration,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn max_job_duration_secs(&self) -> Seconds {
        self.max_job_duration
    }

    #[inline]
    pub fn max_job_duration(&self) -> Duration {
        Duration::from_secs(self.max_job_duration)
    }
}
