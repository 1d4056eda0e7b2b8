//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct every component once, in dependency order
//! - Perform the initial configuration load
//! - Start background tasks (watcher, status poller) bound to shutdown
//!
//! # Design Decisions
//! - A missing or invalid document leaves the store NotLoaded; the admin
//!   surface can still write a fresh one
//! - Failing to start the watcher is fatal: hot pickup is a core promise

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::loader::ConfigPersistence;
use crate::config::settings::ControlSettings;
use crate::config::store::{ConfigStore, SnapshotOrigin};
use crate::config::watcher::{ChangeWatcher, WatchError};
use crate::lifecycle::Shutdown;
use crate::orchestration::OrchestrationController;
use crate::workers::docker::DockerRegistry;
use crate::workers::status::StatusAggregator;
use crate::workers::WorkerRegistry;

/// Error type for bringing the control plane up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to start configuration watcher: {0}")]
    Watch(#[from] WatchError),

    #[error("invalid address {address}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Every long-lived component, wired together.
pub struct ControlPlane {
    pub settings: ControlSettings,
    pub store: Arc<ConfigStore>,
    pub persistence: Arc<ConfigPersistence>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub controller: Arc<OrchestrationController>,
    pub status: Arc<StatusAggregator>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl ControlPlane {
    /// Build against the local Docker daemon.
    pub fn build(settings: ControlSettings) -> Self {
        let registry: Arc<dyn WorkerRegistry> = Arc::new(DockerRegistry::connect(&settings.workers));
        Self::with_registry(settings, registry)
    }

    /// Build against any registry implementation.
    pub fn with_registry(settings: ControlSettings, registry: Arc<dyn WorkerRegistry>) -> Self {
        let store = Arc::new(ConfigStore::new());
        let persistence = Arc::new(ConfigPersistence::new(
            &settings.paths.config_path,
            &settings.paths.backup_dir,
            settings.paths.backup_retention,
        ));
        let controller = Arc::new(OrchestrationController::new(
            Arc::clone(&store),
            Arc::clone(&persistence),
            Arc::clone(&registry),
            &settings.workers,
        ));
        let status = Arc::new(StatusAggregator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            settings.status.clone(),
        ));

        let plane = Self {
            settings,
            store,
            persistence,
            registry,
            controller,
            status,
            shutdown: Shutdown::new(),
            tasks: Vec::new(),
        };
        plane.initial_load();
        plane
    }

    fn initial_load(&self) {
        match self.persistence.load() {
            Ok(loaded) => {
                let version = self.store.replace(loaded.config, loaded.digest, SnapshotOrigin::Startup);
                tracing::info!(path = %self.persistence.path().display(), version, "Configuration loaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Starting without a configuration snapshot");
            }
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// State shared with the admin router.
    pub fn admin_state(&self) -> AdminState {
        AdminState {
            store: Arc::clone(&self.store),
            persistence: Arc::clone(&self.persistence),
            controller: Arc::clone(&self.controller),
            status: Arc::clone(&self.status),
            api_key: Arc::from(self.settings.admin.api_key.as_str()),
        }
    }

    /// Spawn the watcher and status poller.
    pub fn start(&mut self) -> Result<(), StartupError> {
        let watcher = ChangeWatcher::new(
            Arc::clone(&self.persistence),
            Arc::clone(&self.store),
            self.settings.watcher.debounce(),
        );
        self.tasks.push(watcher.spawn(self.shutdown.subscribe())?);

        let status = Arc::clone(&self.status);
        self.tasks.push(tokio::spawn(status.run(self.shutdown.subscribe())));

        tracing::info!(tasks = self.tasks.len(), "Control plane started");
        Ok(())
    }

    /// Serve the admin API until shutdown. Returns immediately when disabled.
    pub async fn serve_admin(&self) -> Result<(), StartupError> {
        let admin_settings = &self.settings.admin;
        if !admin_settings.enabled {
            tracing::info!("Admin API disabled");
            return Ok(());
        }

        let address: SocketAddr = admin_settings
            .bind_address
            .parse()
            .map_err(|source| StartupError::Address {
                address: admin_settings.bind_address.clone(),
                source,
            })?;
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        tracing::info!(address = %address, "Admin API listening");

        let app = admin::router(self.admin_state(), admin_settings.request_timeout());
        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|source| StartupError::Bind { address, source })
    }

    /// Trigger shutdown and wait for background tasks to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Control plane stopped");
    }
}
