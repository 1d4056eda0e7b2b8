//! Docker binding for the worker registry.
//!
//! # Responsibilities
//! - Scope containers to the stack by label
//! - Translate container state strings into `WorkerState`
//! - Make pause/unpause idempotent by absorbing Docker's 409 conflicts
//! - Keep a last-observed cache so log lines name containers without re-listing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{KillContainerOptions, ListContainersOptions};
use bollard::errors::Error as DockerError;
use bollard::Docker;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::settings::WorkerSettings;
use crate::workers::{Worker, WorkerError, WorkerId, WorkerRegistry, WorkerState};

/// Worker registry backed by the local Docker daemon.
pub struct DockerRegistry {
    /// `None` when no client could be constructed; every call then
    /// reports the runtime unavailable.
    docker: Option<Docker>,
    label_filter: String,
    last_seen: Arc<DashMap<WorkerId, Worker>>,
}

impl DockerRegistry {
    /// Connect using the local defaults (socket / DOCKER_HOST).
    ///
    /// Construction never fails; an unreachable daemon surfaces on first use.
    pub fn connect(settings: &WorkerSettings) -> Self {
        let docker = match Docker::connect_with_local_defaults() {
            Ok(docker) => Some(docker),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize Docker client, worker control unavailable");
                None
            }
        };
        Self {
            docker,
            label_filter: format!("{}={}", settings.label_key, settings.label_value),
            last_seen: Arc::new(DashMap::new()),
        }
    }

    fn client(&self) -> Result<&Docker, WorkerError> {
        self.docker
            .as_ref()
            .ok_or_else(|| WorkerError::Unavailable("Docker client not initialized".to_string()))
    }

    fn display_name(&self, id: &WorkerId) -> String {
        self.last_seen
            .get(id)
            .map(|w| w.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl WorkerRegistry for DockerRegistry {
    async fn list(&self) -> Result<Vec<Worker>, WorkerError> {
        let docker = self.client()?;
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![self.label_filter.clone()])]),
            ..Default::default()
        };

        let containers = docker
            .list_containers(Some(options))
            .await
            .map_err(|e| WorkerError::Unavailable(e.to_string()))?;

        let workers: Vec<Worker> = containers
            .into_iter()
            .filter_map(|c| {
                let id = WorkerId::new(c.id?);
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.to_string());
                Some(Worker {
                    id,
                    name,
                    state: c.state.as_deref().map_or(WorkerState::Unknown, WorkerState::from_runtime),
                    created_at: c.created.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
                })
            })
            .collect();

        self.last_seen.clear();
        for worker in &workers {
            self.last_seen.insert(worker.id.clone(), worker.clone());
        }
        tracing::debug!(count = workers.len(), label = %self.label_filter, "Listed stack workers");
        Ok(workers)
    }

    async fn pause(&self, id: &WorkerId) -> Result<(), WorkerError> {
        let docker = self.client()?;
        match docker.pause_container(id.as_str()).await {
            Ok(()) => {
                tracing::info!(worker = %self.display_name(id), "Container paused");
                Ok(())
            }
            Err(e) if is_conflict(&e, "already paused") => {
                tracing::debug!(worker = %self.display_name(id), "Container already paused");
                Ok(())
            }
            Err(e) => Err(map_error(id, e)),
        }
    }

    async fn unpause(&self, id: &WorkerId) -> Result<(), WorkerError> {
        let docker = self.client()?;
        match docker.unpause_container(id.as_str()).await {
            Ok(()) => {
                tracing::info!(worker = %self.display_name(id), "Container unpaused");
                Ok(())
            }
            Err(e) if is_conflict(&e, "not paused") => {
                tracing::debug!(worker = %self.display_name(id), "Container was not paused");
                Ok(())
            }
            Err(e) => Err(map_error(id, e)),
        }
    }

    async fn signal(&self, id: &WorkerId, signal: &str) -> Result<(), WorkerError> {
        let docker = self.client()?;
        docker
            .kill_container(id.as_str(), Some(KillContainerOptions { signal }))
            .await
            .map_err(|e| map_error(id, e))?;
        tracing::info!(worker = %self.display_name(id), signal, "Signal delivered");
        Ok(())
    }
}

fn is_conflict(error: &DockerError, needle: &str) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError { status_code: 409, message } if message.contains(needle)
    )
}

fn map_error(id: &WorkerId, error: DockerError) -> WorkerError {
    match error {
        DockerError::DockerResponseServerError { status_code: 404, .. } => {
            WorkerError::NotFound { id: id.clone() }
        }
        DockerError::DockerResponseServerError { message, .. } => WorkerError::Control {
            id: id.clone(),
            message,
        },
        other => WorkerError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status_code: u16, message: &str) -> DockerError {
        DockerError::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_conflicts_are_recognised() {
        assert!(is_conflict(&server_error(409, "Container abc is already paused"), "already paused"));
        assert!(!is_conflict(&server_error(409, "Container abc is not running"), "already paused"));
        assert!(!is_conflict(&server_error(500, "already paused"), "already paused"));
    }

    #[test]
    fn test_error_mapping() {
        let id = WorkerId::from("abc");
        assert_eq!(
            map_error(&id, server_error(404, "No such container")),
            WorkerError::NotFound { id: id.clone() }
        );
        assert!(matches!(
            map_error(&id, server_error(409, "Container abc is not running")),
            WorkerError::Control { .. }
        ));
    }
}
