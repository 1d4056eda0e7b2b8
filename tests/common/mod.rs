//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use trader_control::config::loader::ConfigPersistence;
use trader_control::config::schema::StackConfig;
use trader_control::config::settings::{StatusSettings, WorkerSettings};
use trader_control::config::store::{ConfigStore, SnapshotOrigin};
use trader_control::orchestration::OrchestrationController;
use trader_control::workers::status::StatusAggregator;
use trader_control::workers::{Worker, WorkerError, WorkerId, WorkerRegistry, WorkerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Pause,
    Unpause,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Pause(String),
    Unpause(String),
    Signal(String, String),
}

impl Call {
    pub fn op(&self) -> Option<Op> {
        match self {
            Call::List => None,
            Call::Pause(_) => Some(Op::Pause),
            Call::Unpause(_) => Some(Op::Unpause),
            Call::Signal(..) => Some(Op::Signal),
        }
    }
}

/// In-memory worker runtime with failure injection and a call log.
#[derive(Default)]
pub struct FakeRegistry {
    workers: Mutex<Vec<Worker>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<(Op, String)>>,
    delays: Mutex<HashMap<(Op, String), Duration>>,
    unavailable: AtomicBool,
}

impl FakeRegistry {
    pub fn with_workers(workers: &[(&str, WorkerState)]) -> Arc<Self> {
        let registry = Self::default();
        *registry.workers.lock().unwrap() = workers
            .iter()
            .map(|(name, state)| Worker {
                id: WorkerId::from(*name),
                name: name.to_string(),
                state: *state,
                created_at: None,
            })
            .collect();
        Arc::new(registry)
    }

    /// Every call of `op` against `worker` fails.
    pub fn fail(&self, op: Op, worker: &str) {
        self.failing.lock().unwrap().insert((op, worker.to_string()));
    }

    /// Every call of `op` against `worker` takes `delay` before answering.
    pub fn delay(&self, op: Op, worker: &str, delay: Duration) {
        self.delays.lock().unwrap().insert((op, worker.to_string()), delay);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Workers a given operation was attempted on, in call order.
    pub fn targets(&self, op: Op) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Pause(w) if op == Op::Pause => Some(w),
                Call::Unpause(w) if op == Op::Unpause => Some(w),
                Call::Signal(w, _) if op == Op::Signal => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn state_of(&self, worker: &str) -> WorkerState {
        self.workers
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id.as_str() == worker)
            .map(|w| w.state)
            .unwrap_or(WorkerState::Unknown)
    }

    async fn control(&self, op: Op, id: &WorkerId, call: Call) -> Result<(), WorkerError> {
        self.calls.lock().unwrap().push(call);

        let key = (op, id.to_string());
        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WorkerError::Unavailable("daemon down".into()));
        }
        if self.failing.lock().unwrap().contains(&key) {
            return Err(WorkerError::Control {
                id: id.clone(),
                message: format!("injected {op:?} failure"),
            });
        }

        let mut workers = self.workers.lock().unwrap();
        let worker = workers
            .iter_mut()
            .find(|w| &w.id == id)
            .ok_or_else(|| WorkerError::NotFound { id: id.clone() })?;
        match (op, worker.state) {
            (Op::Pause, WorkerState::Running) => worker.state = WorkerState::Paused,
            (Op::Unpause, WorkerState::Paused) => worker.state = WorkerState::Running,
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerRegistry for FakeRegistry {
    async fn list(&self) -> Result<Vec<Worker>, WorkerError> {
        self.calls.lock().unwrap().push(Call::List);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WorkerError::Unavailable("daemon down".into()));
        }
        Ok(self.workers.lock().unwrap().clone())
    }

    async fn pause(&self, id: &WorkerId) -> Result<(), WorkerError> {
        self.control(Op::Pause, id, Call::Pause(id.to_string())).await
    }

    async fn unpause(&self, id: &WorkerId) -> Result<(), WorkerError> {
        self.control(Op::Unpause, id, Call::Unpause(id.to_string())).await
    }

    async fn signal(&self, id: &WorkerId, signal: &str) -> Result<(), WorkerError> {
        self.control(Op::Signal, id, Call::Signal(id.to_string(), signal.to_string()))
            .await
    }
}

/// Short deadlines and near-zero backoff so failure paths stay fast.
pub fn fast_worker_settings() -> WorkerSettings {
    WorkerSettings {
        operation_timeout_ms: 200,
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        ..WorkerSettings::default()
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub registry: Arc<FakeRegistry>,
    pub store: Arc<ConfigStore>,
    pub persistence: Arc<ConfigPersistence>,
    pub controller: Arc<OrchestrationController>,
}

impl Fixture {
    /// Config file on disk holding the default document, loaded into the store.
    pub fn new(workers: &[(&str, WorkerState)]) -> Self {
        Self::with_settings(workers, fast_worker_settings())
    }

    pub fn with_settings(workers: &[(&str, WorkerState)], settings: WorkerSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let persistence = Arc::new(ConfigPersistence::new(
            dir.path().join("config.toml"),
            dir.path().join("backups"),
            5,
        ));
        fs::write(
            persistence.path(),
            toml::to_string_pretty(&StackConfig::default()).unwrap(),
        )
        .unwrap();

        let store = Arc::new(ConfigStore::new());
        let loaded = persistence.load().unwrap();
        store.replace(loaded.config, loaded.digest, SnapshotOrigin::Startup);

        let registry = FakeRegistry::with_workers(workers);
        let controller = Arc::new(OrchestrationController::new(
            store.clone(),
            persistence.clone(),
            registry.clone(),
            &settings,
        ));

        Self {
            dir,
            registry,
            store,
            persistence,
            controller,
        }
    }

    pub fn aggregator(&self) -> Arc<StatusAggregator> {
        Arc::new(StatusAggregator::new(
            self.registry.clone(),
            self.store.clone(),
            StatusSettings {
                poll_interval_secs: 1,
                upstream_timeout_ms: 100,
                list_timeout_ms: 500,
            },
        ))
    }

    /// Make the next canonical write fail by putting a directory in its place.
    pub fn break_canonical_path(&self) {
        fs::remove_file(self.persistence.path()).unwrap();
        fs::create_dir(self.persistence.path()).unwrap();
    }
}

/// Default document with one distinguishable edit.
pub fn edited_config(max_positions: u32) -> StackConfig {
    let mut config = StackConfig::default();
    config.trading.max_positions = max_positions;
    config
}
