//! Scripted launcher for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::LaunchError,
    launch::{ExitCode, LaunchSpec, Launcher, WorkerProcess},
};

/// Behaviour of one scripted worker.
#[derive(Clone, Debug)]
pub enum Script {
    /// Exit with `code` after `after`.
    Exit { code: ExitCode, after: Duration },
    /// Never exit on its own.
    Hang,
    /// Fail to start.
    SpawnFail(String),
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Script::Exit {
            code: Some(code),
            after: Duration::ZERO,
        }
    }

    pub fn exit_after(code: i32, after: Duration) -> Self {
        Script::Exit {
            code: Some(code),
            after,
        }
    }
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Script>,
    launched: Vec<LaunchSpec>,
}

/// Launcher that plays back scripts in order, falling back to a default.
#[derive(Clone)]
pub struct ScriptedLauncher {
    state: Arc<Mutex<State>>,
    fallback: Script,
    kills: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    pub fn new(fallback: Script) -> Self {
        Self {
            state: Arc::default(),
            fallback,
            kills: Arc::default(),
            running: Arc::default(),
            peak: Arc::default(),
        }
    }

    pub fn then(self, script: Script) -> Self {
        self.state.lock().unwrap().scripts.push_back(script);
        self
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.state.lock().unwrap().launched.clone()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Highest number of workers alive at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn WorkerProcess>, LaunchError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.launched.push(spec);
            state.scripts.pop_front().unwrap_or_else(|| self.fallback.clone())
        };
        if let Script::SpawnFail(reason) = script {
            return Err(LaunchError::Spawn(reason));
        }
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(ScriptedProcess {
            script,
            kills: self.kills.clone(),
            running: self.running.clone(),
            alive: true,
        }))
    }
}

struct ScriptedProcess {
    script: Script,
    kills: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    alive: bool,
}

impl ScriptedProcess {
    fn exited(&mut self) {
        if std::mem::replace(&mut self.alive, false) {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl WorkerProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        self.alive.then_some(4242)
    }

    async fn wait(&mut self) -> Result<ExitCode, LaunchError> {
        match self.script.clone() {
            Script::Exit { code, after } => {
                tokio::time::sleep(after).await;
                self.exited();
                Ok(code)
            }
            Script::Hang => std::future::pending().await,
            Script::SpawnFail(_) => unreachable!("never launched"),
        }
    }

    async fn kill(&mut self) -> Result<(), LaunchError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.exited();
        Ok(())
    }
}
