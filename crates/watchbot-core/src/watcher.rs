//! Watcher: the poll → dispatch → supervise → acknowledge loop.
//!
//! ## Lifecycle
//!
//! `Created → Listening → Draining → Stopped`
//!
//! - [`Watcher::create`] validates the configuration and wires components; nothing is polled yet.
//! - [`Watcher::listen`] runs the loop until the stop token fires, then waits for every
//!   in-flight job (each bounded by its own deadline) before returning.
//! - A stop request is observed between receives; running jobs are never cut short by it.
//!
//! Per-job failures are resolved against the queue and never leave the loop.
//! Systemic failures are logged once as `[error] ...` and returned from `listen`.

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use watchbot_model::{JobStatus, Message, WatcherConfig, WorkerOutcome};

use crate::{
    ack::{AckAction, AckController},
    error::{WatcherError, error_chain},
    job::{Job, JobId},
    launch::Launcher,
    poller::QueuePoller,
    queue::QueueTransport,
    registry::JobRegistry,
    supervisor::JobSupervisor,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Listening,
    Draining,
    Stopped,
}

/// What a finished job task reports back to the loop.
#[derive(Debug)]
struct JobReport {
    job: JobId,
    outcome: WorkerOutcome,
    action: Option<AckAction>,
}

pub struct Watcher {
    config: Arc<WatcherConfig>,
    poller: QueuePoller,
    supervisor: Arc<JobSupervisor>,
    ack: Arc<AckController>,
    registry: JobRegistry,
    stop: CancellationToken,
    state: Mutex<WatcherState>,
}

impl Watcher {
    /// Builds an idle watcher. Fails if the worker specification is unusable.
    pub fn create(
        config: WatcherConfig,
        queue: Arc<dyn QueueTransport>,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self, WatcherError> {
        validate_worker(&config)?;

        let poller = QueuePoller::new(Arc::clone(&queue), config.poll());
        let supervisor = JobSupervisor::new(
            launcher,
            config.worker_options().clone(),
            config.writable_filesystem(),
        );
        let ack = AckController::new(queue, config.redelivery(), config.max_receive_count());

        debug!(
            target: "watchbot.core.watcher",
            queue = config.queue_url(),
            concurrency = config.concurrency(),
            "watcher created"
        );
        Ok(Self {
            config: Arc::new(config),
            poller,
            supervisor: Arc::new(supervisor),
            ack: Arc::new(ack),
            registry: JobRegistry::new(),
            stop: CancellationToken::new(),
            state: Mutex::new(WatcherState::Created),
        })
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token that moves a listening watcher into draining when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Number of jobs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Runs until stopped and drained, or until a systemic failure.
    pub async fn listen(&self) -> Result<(), WatcherError> {
        let result = self.run().await;
        if let Err(e) = &result {
            error!(target: "watchbot.core.watcher", "[error] {}", error_chain(e));
        }
        self.set_state(WatcherState::Stopped);
        result
    }

    fn set_state(&self, next: WatcherState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(target: "watchbot.core.watcher", from = ?*state, to = ?next, "state");
        *state = next;
    }

    fn begin(&self) -> Result<(), WatcherError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != WatcherState::Created {
            return Err(WatcherError::AlreadyStarted);
        }
        *state = WatcherState::Listening;
        Ok(())
    }

    async fn run(&self) -> Result<(), WatcherError> {
        self.begin()?;
        info!(
            target: "watchbot.core.watcher",
            queue = self.config.queue_url(),
            command = self.config.worker_options().command(),
            "listening"
        );

        let mut jobs: JoinSet<JobReport> = JoinSet::new();
        let failure = self.intake(&mut jobs).await.err();

        self.set_state(WatcherState::Draining);
        info!(target: "watchbot.core.watcher", in_flight = jobs.len(), "draining");
        for entry in self.registry.list() {
            debug!(
                target: "watchbot.core.watcher",
                job = %entry.id,
                message = %entry.message_id,
                status = ?entry.status,
                "waiting for job"
            );
        }
        let mut failure = failure;
        while let Some(joined) = jobs.join_next().await {
            if let Err(e) = self.reap(joined) {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!(target: "watchbot.core.watcher", "stopped");
                Ok(())
            }
        }
    }

    /// The listening phase. Returns when stopped or on the first systemic error.
    async fn intake(&self, jobs: &mut JoinSet<JobReport>) -> Result<(), WatcherError> {
        let limit = self.config.concurrency();
        loop {
            while let Some(joined) = jobs.try_join_next() {
                self.reap(joined)?;
            }
            if self.stop.is_cancelled() {
                return Ok(());
            }

            let capacity = self.registry.available(limit);
            if capacity == 0 {
                tokio::select! {
                    _ = self.stop.cancelled() => return Ok(()),
                    Some(joined) = jobs.join_next() => self.reap(joined)?,
                }
                continue;
            }

            let batch = self.poller.poll(capacity, &self.stop).await?;
            for message in batch {
                self.dispatch(jobs, message);
            }
        }
    }

    fn dispatch(&self, jobs: &mut JoinSet<JobReport>, message: Message) {
        let job = Job::start(message, self.config.worker_options().max_job_duration());
        let Some(admission) = self.registry.admit(&job) else {
            debug!(
                target: "watchbot.core.watcher",
                message = %job.message().id,
                "message already in flight; skipping duplicate delivery"
            );
            return;
        };

        let supervisor = Arc::clone(&self.supervisor);
        let ack = Arc::clone(&self.ack);
        trace!(target: "watchbot.core.watcher", job = %job.id(), message = %job.message().id, "dispatch");

        jobs.spawn(async move {
            admission.set_status(JobStatus::Running);
            let result = supervisor.run(&job).await;
            // The slot must be free before the ack can make the message visible again.
            drop(admission);

            let action = match ack.resolve(job.message(), &result).await {
                Ok(action) => Some(action),
                Err(e) => {
                    error!(
                        target: "watchbot.core.watcher",
                        job = %job.id(),
                        message = %job.message().id,
                        error = %e,
                        "could not resolve message; queue will redeliver it"
                    );
                    None
                }
            };

            JobReport {
                job: job.id().clone(),
                outcome: result.outcome,
                action,
            }
        });
    }

    fn reap(&self, joined: Result<JobReport, JoinError>) -> Result<(), WatcherError> {
        match joined {
            Ok(report) => {
                trace!(
                    target: "watchbot.core.watcher",
                    job = %report.job,
                    outcome = report.outcome.kind(),
                    action = ?report.action,
                    "job reaped"
                );
                Ok(())
            }
            Err(e) => Err(WatcherError::JobAborted(e.to_string())),
        }
    }
}

fn validate_worker(config: &WatcherConfig) -> Result<(), WatcherError> {
    for volume in config.worker_options().volumes() {
        if volume.is_empty() {
            return Err(WatcherError::InvalidWorker("empty volume path".into()));
        }
        if !Path::new(volume).is_absolute() {
            return Err(WatcherError::InvalidWorker(format!(
                "volume {volume:?} must be an absolute path"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use watchbot_model::{BackoffStrategy, PollOptions, RedeliveryPolicy, WorkerOptions};

    use super::*;
    use crate::{
        queue::MemoryQueue,
        testkit::{Script, ScriptedLauncher},
    };

    fn config(concurrency: usize, secs: u64) -> WatcherConfig {
        let opts = WorkerOptions::new(
            "echo hello world",
            vec!["/tmp".into(), "/mnt".into()],
            secs,
        )
        .unwrap();
        WatcherConfig::builder("https://faker", opts)
            .with_concurrency(concurrency)
            .with_poll(PollOptions {
                backoff: BackoffStrategy::constant(10),
                max_retries: 2,
                wait_time_seconds: 1,
            })
            .build()
            .unwrap()
    }

    fn watcher(cfg: WatcherConfig, q: &Arc<MemoryQueue>, l: &ScriptedLauncher) -> Arc<Watcher> {
        Arc::new(Watcher::create(cfg, q.clone(), Arc::new(l.clone())).unwrap())
    }

    /// Stops the watcher once `done` holds, then returns the listen result.
    async fn run_until<F>(w: &Arc<Watcher>, done: F) -> Result<(), WatcherError>
    where
        F: Fn() -> bool,
    {
        let listener = tokio::spawn({
            let w = w.clone();
            async move { w.listen().await }
        });
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        w.stop();
        listener.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn create_does_not_poll() {
        let q = Arc::new(MemoryQueue::new());
        let l = ScriptedLauncher::new(Script::exit(0));
        let w = watcher(config(1, 180), &q, &l);

        assert_eq!(w.state(), WatcherState::Created);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(q.receive_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_message_one_spawn_then_delete() {
        let q = Arc::new(MemoryQueue::new());
        let id = q.push("hello");
        let l = ScriptedLauncher::new(Script::exit(0));
        let w = watcher(config(1, 180), &q, &l);

        let qc = q.clone();
        run_until(&w, move || !qc.deleted().is_empty()).await.unwrap();

        assert!(q.receive_calls() >= 1);
        let launched = l.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].command, "echo hello world");
        assert_eq!(launched[0].volumes, ["/tmp", "/mnt"]);
        assert_eq!(q.deleted(), vec![id]);
        assert_eq!(w.state(), WatcherState::Stopped);
        assert_eq!(w.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_job_is_killed_and_not_deleted() {
        let q = Arc::new(MemoryQueue::new());
        let id = q.push("slow");
        let l = ScriptedLauncher::new(Script::Hang);
        let w = watcher(config(1, 30), &q, &l);

        let lc = l.clone();
        run_until(&w, move || lc.kills() == 1).await.unwrap();

        assert!(q.deleted().is_empty());
        assert_eq!(q.visibility_changes(), vec![(id, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_bound_is_respected() {
        let q = Arc::new(MemoryQueue::new());
        for i in 0..6 {
            q.push(format!("m{i}"));
        }
        let l = ScriptedLauncher::new(Script::exit_after(0, Duration::from_secs(3)));
        let w = watcher(config(2, 60), &q, &l);

        let qc = q.clone();
        run_until(&w, move || qc.deleted().len() == 6).await.unwrap();

        assert_eq!(l.launched().len(), 6);
        assert_eq!(l.peak(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drains_in_flight_jobs() {
        let q = Arc::new(MemoryQueue::new());
        q.push("long");
        let l = ScriptedLauncher::new(Script::exit_after(0, Duration::from_secs(50)));
        let w = watcher(config(1, 120), &q, &l);

        let lc = l.clone();
        run_until(&w, move || lc.launched().len() == 1).await.unwrap();

        // listen returned only after the job finished and was acknowledged.
        assert_eq!(q.deleted().len(), 1);
        assert_eq!(l.kills(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_jobs_never_stop_the_watcher() {
        let q = Arc::new(MemoryQueue::new());
        q.push("a");
        q.push("b");
        let l = ScriptedLauncher::new(Script::exit(0))
            .then(Script::SpawnFail("missing".into()))
            .then(Script::exit(1));
        let w = watcher(config(1, 60), &q, &l);

        let qc = q.clone();
        run_until(&w, move || qc.visibility_changes().len() == 2).await.unwrap();
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_queue_is_fatal() {
        let q = Arc::new(MemoryQueue::new());
        q.fail_next_receives(100);
        let l = ScriptedLauncher::new(Script::exit(0));
        let w = watcher(config(1, 60), &q, &l);

        let err = w.listen().await.unwrap_err();
        assert!(matches!(err, WatcherError::QueueUnavailable { attempts: 3, .. }));
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_twice_is_rejected() {
        let q = Arc::new(MemoryQueue::new());
        let l = ScriptedLauncher::new(Script::exit(0));
        let w = watcher(config(1, 60), &q, &l);
        w.stop();

        w.listen().await.unwrap();
        assert!(matches!(w.listen().await, Err(WatcherError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn released_noop_is_processed_again() {
        let q = Arc::new(MemoryQueue::new());
        let id = q.push("again");
        let l = ScriptedLauncher::new(Script::exit(0)).then(Script::exit(4));
        let cfg = WatcherConfig::builder(
            "https://faker",
            WorkerOptions::new("true", vec![], 60).unwrap(),
        )
        .with_redelivery(RedeliveryPolicy::Release)
        .with_poll(PollOptions {
            wait_time_seconds: 1,
            ..PollOptions::default()
        })
        .build()
        .unwrap();
        let w = watcher(cfg, &q, &l);

        let qc = q.clone();
        run_until(&w, move || !qc.deleted().is_empty()).await.unwrap();

        assert_eq!(l.launched().len(), 2);
        assert_eq!(q.visibility_changes(), vec![(id.clone(), 0)]);
        assert_eq!(q.deleted(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn released_message_is_picked_up_by_a_concurrent_receive() {
        let q = Arc::new(MemoryQueue::new());
        let released = q.push("noop");
        let slow = q.push("slow");
        let l = ScriptedLauncher::new(Script::exit(0))
            .then(Script::exit(4))
            .then(Script::exit_after(0, Duration::from_secs(50)));
        let w = watcher(config(3, 120), &q, &l);

        let qc = q.clone();
        let slow_done = slow.clone();
        run_until(&w, move || qc.deleted().contains(&slow_done)).await.unwrap();

        assert_eq!(q.visibility_changes(), vec![(released.clone(), 0)]);
        assert!(q.deleted().contains(&released));
        assert_eq!(l.launched().len(), 3);
        assert_eq!(q.in_flight_len(), 0);
    }

    #[test]
    fn relative_volume_is_rejected_at_create() {
        let opts = WorkerOptions::new("true", vec!["tmp".into()], 60).unwrap();
        let cfg = WatcherConfig::builder("https://faker", opts).build().unwrap();
        let q: Arc<dyn QueueTransport> = Arc::new(MemoryQueue::new());
        let l: Arc<dyn Launcher> = Arc::new(ScriptedLauncher::new(Script::exit(0)));

        let err = Watcher::create(cfg, q, l).err().expect("rejected");
        assert!(matches!(err, WatcherError::InvalidWorker(_)));
    }
}
