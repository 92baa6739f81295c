use std::error::Error as StdError;

use thiserror::Error;

/// Failures reported by a queue transport.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("change visibility failed: {0}")]
    Visibility(String),
    #[error("dead-letter failed: {0}")]
    DeadLetter(String),
}

/// Failures reported by a process launcher.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("wait failed: {0}")]
    Wait(String),
    #[error("kill failed: {0}")]
    Kill(String),
}

/// Errors that stop a watcher.
///
/// Per-job failures never surface here; they are resolved against the queue.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("invalid worker spec: {0}")]
    InvalidWorker(String),
    #[error("queue unreachable after {attempts} attempts")]
    QueueUnavailable {
        attempts: u32,
        #[source]
        source: QueueError,
    },
    #[error("job task aborted: {0}")]
    JobAborted(String),
    #[error("watcher already started")]
    AlreadyStarted,
}

/// Renders an error followed by its `source()` chain, separated by `: `.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(src) = cur {
        out.push_str(": ");
        out.push_str(&src.to_string());
        cur = src.source();
    }
    out
}
