mod config;

use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use watchbot_core::{Launcher, QueueTransport, Watcher};
use watchbot_exec::LocalLauncher;
use watchbot_model::WatcherConfig;
use watchbot_observe::logger_init;
use watchbot_sqs::SqsTransport;

use crate::config::{Command, ConfigResolver, Settings};

#[tokio::main]
async fn main() -> ExitCode {
    let resolver = ConfigResolver::from_env();

    // 1) Logger
    if let Err(e) = resolver.logger().and_then(|cfg| Ok(logger_init(&cfg)?)) {
        eprintln!("[error] {e}");
        return ExitCode::FAILURE;
    }

    // 2) Launcher
    let launcher = LocalLauncher::new();
    info!(target: "watchbot", isolation = ?launcher.isolation(), "launcher ready");

    // 3) Config, queue and watcher; signals request draining once listening
    let args: Vec<String> = std::env::args().skip(1).collect();
    run(&resolver, &args, connect_sqs, Arc::new(launcher), |stop| {
        tokio::spawn(drain_on_signal(stop));
    })
    .await
}

/// Resolves settings, builds the watcher and listens until it stops.
///
/// `on_listen` receives the watcher's stop token right before listening.
async fn run<F, C, Q, S>(
    resolver: &ConfigResolver<F>,
    args: &[String],
    connect: C,
    launcher: Arc<dyn Launcher>,
    on_listen: S,
) -> ExitCode
where
    F: Fn(&str) -> Option<String>,
    C: FnOnce(&WatcherConfig) -> Q,
    Q: Future<Output = Arc<dyn QueueTransport>>,
    S: FnOnce(CancellationToken),
{
    let watcher = match build(resolver, args, connect, launcher).await {
        Ok(w) => w,
        Err(e) => {
            error!(target: "watchbot", "[error] {e:#}");
            return ExitCode::FAILURE;
        }
    };
    on_listen(watcher.stop_handle());

    // A failure here has already been logged by the watcher.
    match watcher.listen().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn build<F, C, Q>(
    resolver: &ConfigResolver<F>,
    args: &[String],
    connect: C,
    launcher: Arc<dyn Launcher>,
) -> anyhow::Result<Watcher>
where
    F: Fn(&str) -> Option<String>,
    C: FnOnce(&WatcherConfig) -> Q,
    Q: Future<Output = Arc<dyn QueueTransport>>,
{
    let Settings { command, watcher } = resolver.resolve(args)?;
    let Command::Listen { command: line } = &command;
    info!(
        target: "watchbot",
        queue = watcher.queue_url(),
        command = %line,
        writable_filesystem = watcher.writable_filesystem(),
        "config resolved"
    );

    let queue = connect(&watcher).await;
    Watcher::create(watcher, queue, launcher).context("cannot create watcher")
}

fn connect_sqs(config: &WatcherConfig) -> impl Future<Output = Arc<dyn QueueTransport>> + use<> {
    let url = config.queue_url().to_owned();
    let dead_letter = config.dead_letter_url().map(str::to_owned);
    async move {
        let mut queue = SqsTransport::from_env(url).await;
        if let Some(dlq) = dead_letter {
            queue = queue.with_dead_letter(dlq);
        }
        Arc::new(queue) as Arc<dyn QueueTransport>
    }
}

/// First SIGINT/SIGTERM drains; a second one exits immediately.
async fn drain_on_signal(stop: CancellationToken) {
    wait_for_signal().await;
    info!(target: "watchbot", "signal received; draining in-flight jobs");
    stop.cancel();

    wait_for_signal().await;
    warn!(target: "watchbot", "second signal; exiting without draining");
    std::process::exit(130);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(target: "watchbot", error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
