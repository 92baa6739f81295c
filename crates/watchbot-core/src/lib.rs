pub mod error;
pub use error::{LaunchError, QueueError, WatcherError};

pub mod queue;
pub use queue::{MemoryQueue, QueueTransport};

pub mod launch;
pub use launch::{ExitCode, LaunchSpec, Launcher, WorkerProcess};

mod map;

pub mod job;
pub use job::{Job, JobId};

pub mod registry;
pub use registry::{Admission, JobEntry, JobRegistry};

pub mod poller;
pub use poller::QueuePoller;

pub mod supervisor;
pub use supervisor::JobSupervisor;

pub mod ack;
pub use ack::{AckAction, AckController};

pub mod watcher;
pub use watcher::{Watcher, WatcherState};

#[cfg(test)]
mod testkit;
