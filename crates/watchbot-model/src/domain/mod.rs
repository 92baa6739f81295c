mod backoff;
pub use backoff::{BackoffStrategy, JitterStrategy};

mod config;
pub use config::{WatcherConfig, WatcherConfigBuilder};

mod worker_options;
pub use worker_options::{DEFAULT_MAX_JOB_DURATION_SECS, WorkerOptions};

mod poll_options;
pub use poll_options::{MAX_WAIT_TIME_SECS, PollOptions};

mod redelivery;
pub use redelivery::{MAX_VISIBILITY_SECS, RedeliveryPolicy};

mod message;
pub use message::{Envelope, Message};

mod outcome;
pub use outcome::{EXIT_NOOP, EXIT_REJECT, WorkerOutcome, WorkerResult};

mod job_status;
pub use job_status::JobStatus;

/// Receipt token handed out by the queue for a single delivery.
///
/// Deleting or changing visibility of a message requires the receipt of the delivery being acted on.
pub type Receipt = String;

/// Duration value in whole seconds.
pub type Seconds = u64;
