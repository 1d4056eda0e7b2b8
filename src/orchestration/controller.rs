//! Save-and-apply state machine.
//!
//! # Responsibilities
//! - Pause running workers, persist, swap the snapshot, unpause, signal
//! - Unpause everything this operation paused when persistence fails
//! - Serialize operations: a second call while one is in flight is `Busy`
//!
//! # Design Decisions
//! - Per-worker calls run concurrently, each under its own deadline and
//!   retry policy; one stuck worker never blocks the others
//! - Worker failures are collected into the report, never thrown
//! - The operation runs on its own task so a dropped caller (client
//!   disconnect, request timeout) cannot strand paused workers

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::loader::{ConfigPersistence, PersistenceError, WriteOutcome};
use crate::config::schema::StackConfig;
use crate::config::settings::WorkerSettings;
use crate::config::store::{ConfigStore, SnapshotOrigin};
use crate::config::validation::{validate_config, ValidationError};
use crate::observability::metrics;
use crate::orchestration::report::{ApplyReport, OrchestrationState, Step, StepError};
use crate::resilience::retries::{retry_with_backoff, RetryPolicy};
use crate::resilience::timeouts::with_deadline;
use crate::workers::{Worker, WorkerError, WorkerId, WorkerRegistry, WorkerState};

/// Error type for a save-and-apply.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("another save-and-apply is already in progress")]
    Busy,

    #[error("configuration rejected with {} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error("worker runtime unavailable: {source}")]
    RuntimeUnavailable {
        #[source]
        source: WorkerError,
        report: Box<ApplyReport>,
    },

    #[error("failed to persist configuration: {source}")]
    Persistence {
        #[source]
        source: PersistenceError,
        report: Box<ApplyReport>,
    },

    #[error("failed to read backup: {0}")]
    Backup(#[source] PersistenceError),

    #[error("save-and-apply task aborted: {0}")]
    Aborted(String),
}

impl OrchestrationError {
    /// Report of an operation that started and then failed.
    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            OrchestrationError::RuntimeUnavailable { report, .. }
            | OrchestrationError::Persistence { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Drives the pause, persist, unpause, signal cycle.
pub struct OrchestrationController {
    store: Arc<ConfigStore>,
    persistence: Arc<ConfigPersistence>,
    registry: Arc<dyn WorkerRegistry>,
    reload_signal: String,
    deadline: Duration,
    retry: RetryPolicy,
    in_flight: Arc<Mutex<()>>,
    state: Arc<AtomicU8>,
    last_report: ArcSwapOption<ApplyReport>,
}

/// Resets the observable state to `Idle` however the operation ends.
struct IdleOnDrop(Arc<AtomicU8>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.store(OrchestrationState::Idle as u8, Ordering::SeqCst);
    }
}

struct FanOut {
    succeeded: Vec<WorkerId>,
    failed: Vec<WorkerError>,
}

impl OrchestrationController {
    pub fn new(
        store: Arc<ConfigStore>,
        persistence: Arc<ConfigPersistence>,
        registry: Arc<dyn WorkerRegistry>,
        settings: &WorkerSettings,
    ) -> Self {
        Self {
            store,
            persistence,
            registry,
            reload_signal: settings.reload_signal.clone(),
            deadline: settings.operation_timeout(),
            retry: RetryPolicy::from(settings),
            in_flight: Arc::new(Mutex::new(())),
            state: Arc::new(AtomicU8::new(OrchestrationState::Idle as u8)),
            last_report: ArcSwapOption::empty(),
        }
    }

    pub fn state(&self) -> OrchestrationState {
        OrchestrationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Report of the most recent operation that got past validation.
    pub fn last_report(&self) -> Option<Arc<ApplyReport>> {
        self.last_report.load_full()
    }

    /// Validate, persist, and roll `config` out to every worker.
    pub async fn save_and_apply(self: &Arc<Self>, config: StackConfig) -> Result<ApplyReport, OrchestrationError> {
        let started = Instant::now();

        if let Err(errors) = validate_config(&config) {
            tracing::warn!(errors = errors.len(), "Rejected invalid configuration before touching workers");
            metrics::record_apply("invalid", started);
            return Err(OrchestrationError::Invalid(errors));
        }

        let guard = match Arc::clone(&self.in_flight).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Save-and-apply rejected, another operation is in flight");
                metrics::record_apply("busy", started);
                return Err(OrchestrationError::Busy);
            }
        };

        let id = Uuid::new_v4();
        let span = tracing::info_span!("save_and_apply", operation_id = %id);
        let this = Arc::clone(self);
        let reset = IdleOnDrop(Arc::clone(&self.state));

        let task = tokio::spawn(
            async move {
                let _guard = guard;
                let _reset = reset;
                this.run(id, config).await
            }
            .instrument(span),
        );

        let result = task
            .await
            .unwrap_or_else(|e| Err(OrchestrationError::Aborted(e.to_string())));

        let outcome = match &result {
            Ok(report) => report.outcome.as_str(),
            Err(OrchestrationError::RuntimeUnavailable { .. }) => "runtime_unavailable",
            Err(OrchestrationError::Persistence { .. }) => "persistence_failed",
            Err(_) => "aborted",
        };
        metrics::record_apply(outcome, started);
        result
    }

    /// Re-apply a backup through the full save-and-apply cycle.
    pub async fn restore_backup(self: &Arc<Self>, name: &str) -> Result<ApplyReport, OrchestrationError> {
        let loaded = self.persistence.read_backup(name).map_err(OrchestrationError::Backup)?;
        tracing::info!(backup = %name, "Restoring configuration backup");
        self.save_and_apply(loaded.config).await
    }

    async fn run(&self, id: Uuid, config: StackConfig) -> Result<ApplyReport, OrchestrationError> {
        let mut report = ApplyReport::begin(id);
        tracing::info!("Save-and-apply starting");

        // Pausing
        self.set_state(OrchestrationState::Pausing);
        let workers = match self.list_workers().await {
            Ok(workers) => workers,
            Err(source) => {
                tracing::error!(error = %source, "Worker runtime unavailable, nothing paused or persisted");
                report.errors.push(StepError::from_worker(Step::Discover, &source));
                report.finish(false);
                self.retain(&report);
                return Err(OrchestrationError::RuntimeUnavailable {
                    source,
                    report: Box::new(report),
                });
            }
        };

        let running: Vec<WorkerId> = ids_where(&workers, |s| s == WorkerState::Running);
        let pause = self.fan_out(Step::Pause, &running).await;
        report.paused = pause.succeeded.clone();
        self.record(&mut report, Step::Pause, &pause.failed);
        self.set_state(OrchestrationState::Paused);
        tracing::info!(
            discovered = workers.len(),
            paused = pause.succeeded.len(),
            failed = pause.failed.len(),
            "Workers paused"
        );

        // Persisting
        self.set_state(OrchestrationState::Persisting);
        let written = match self.persist(&config).await {
            Ok(written) => written,
            Err(source) => {
                tracing::error!(error = %source, "Persistence failed, recovering paused workers");
                report.errors.push(StepError::new(Step::Persist, None, source.to_string()));

                self.set_state(OrchestrationState::Recovering);
                let mut targets = pause.succeeded;
                // A timed-out pause may still have landed.
                targets.extend(
                    pause
                        .failed
                        .iter()
                        .filter(|e| matches!(e, WorkerError::Timeout { .. }))
                        .filter_map(|e| e.worker().cloned()),
                );
                let recover = self.fan_out(Step::Recover, &targets).await;
                report.unpaused = recover.succeeded;
                self.record(&mut report, Step::Recover, &recover.failed);

                report.finish(false);
                self.retain(&report);
                return Err(OrchestrationError::Persistence {
                    source,
                    report: Box::new(report),
                });
            }
        };

        if let Some(warning) = &written.backup_warning {
            tracing::warn!(warning = %warning, "Configuration written without backup");
        }
        report.backup = written.backup;
        report.backup_warning = written.backup_warning;
        let version = self.store.replace(config, written.digest, SnapshotOrigin::Orchestrated);
        report.version = Some(version);
        tracing::info!(version, "Configuration persisted and current");

        // Unpausing
        self.set_state(OrchestrationState::Unpausing);
        let targets = ids_where(&workers, |s| s != WorkerState::Stopped);
        let unpause = self.fan_out(Step::Unpause, &targets).await;
        report.unpaused = unpause.succeeded.clone();
        self.record(&mut report, Step::Unpause, &unpause.failed);

        // Signaling
        self.set_state(OrchestrationState::Signaling);
        let targets = match self.list_workers().await {
            Ok(current) => ids_where(&current, |s| s == WorkerState::Running),
            Err(e) => {
                tracing::warn!(error = %e, "Could not re-list workers, signaling the unpaused set");
                report.errors.push(StepError::from_worker(Step::Signal, &e));
                unpause.succeeded
            }
        };
        let signal = self.fan_out(Step::Signal, &targets).await;
        report.signaled = signal.succeeded;
        self.record(&mut report, Step::Signal, &signal.failed);

        report.finish(true);
        tracing::info!(
            outcome = report.outcome.as_str(),
            errors = report.errors.len(),
            signaled = report.signaled.len(),
            "Save-and-apply finished"
        );
        self.retain(&report);
        Ok(report)
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, WorkerError> {
        let deadline = self.deadline;
        retry_with_backoff(self.retry, move || async move {
            match tokio::time::timeout(deadline, self.registry.list()).await {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Unavailable(format!(
                    "listing workers timed out after {}ms",
                    deadline.as_millis()
                ))),
            }
        })
        .await
    }

    /// Run one step against every target concurrently.
    async fn fan_out(&self, step: Step, targets: &[WorkerId]) -> FanOut {
        let calls = targets.iter().map(move |id| async move { (id, self.call(step, id).await) });

        let mut out = FanOut {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (id, result) in join_all(calls).await {
            match result {
                Ok(()) => out.succeeded.push(id.clone()),
                Err(e) => {
                    tracing::warn!(step = step.as_str(), worker = %id, error = %e, "Worker control call failed");
                    out.failed.push(e);
                }
            }
        }
        out
    }

    async fn call(&self, step: Step, id: &WorkerId) -> Result<(), WorkerError> {
        retry_with_backoff(self.retry, move || async move {
            let call = async {
                match step {
                    Step::Pause => self.registry.pause(id).await,
                    Step::Unpause | Step::Recover => self.registry.unpause(id).await,
                    Step::Signal => self.registry.signal(id, &self.reload_signal).await,
                    Step::Discover | Step::Persist => Ok(()),
                }
            };
            with_deadline(id, self.deadline, call).await
        })
        .await
    }

    async fn persist(&self, config: &StackConfig) -> Result<WriteOutcome, PersistenceError> {
        let persistence = Arc::clone(&self.persistence);
        let config = config.clone();
        let path = persistence.path().to_path_buf();
        tokio::task::spawn_blocking(move || persistence.write_with_backup(&config))
            .await
            .unwrap_or_else(|e| {
                Err(PersistenceError::Io {
                    path,
                    source: std::io::Error::other(e.to_string()),
                })
            })
    }

    fn record(&self, report: &mut ApplyReport, step: Step, failures: &[WorkerError]) {
        for error in failures {
            metrics::record_worker_error(step.as_str());
            report.errors.push(StepError::from_worker(step, error));
        }
    }

    fn retain(&self, report: &ApplyReport) {
        self.last_report.store(Some(Arc::new(report.clone())));
    }

    fn set_state(&self, state: OrchestrationState) {
        self.state.store(state as u8, Ordering::SeqCst);
        tracing::debug!(?state, "Orchestration state");
    }
}

fn ids_where(workers: &[Worker], keep: impl Fn(WorkerState) -> bool) -> Vec<WorkerId> {
    workers
        .iter()
        .filter(|w| keep(w.state))
        .map(|w| w.id.clone())
        .collect()
}
