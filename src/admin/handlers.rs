use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::config::loader::{BackupRecord, PersistenceError};
use crate::config::schema::StackConfig;
use crate::config::store::ConfigSnapshot;
use crate::orchestration::{ApplyReport, OrchestrationError, OrchestrationState};
use crate::workers::status::StatusSnapshot;

/// JSON error body: `{ "error": ..., "details": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        let status = match &e {
            PersistenceError::NotFound { .. } | PersistenceError::BackupNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(e: OrchestrationError) -> Self {
        let message = e.to_string();
        match e {
            OrchestrationError::Busy => ApiError::new(StatusCode::CONFLICT, message),
            OrchestrationError::Invalid(errors) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, message).with_details(errors)
            }
            OrchestrationError::RuntimeUnavailable { report, .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, message).with_details(report)
            }
            OrchestrationError::Persistence { report, .. } => {
                ApiError::new(StatusCode::BAD_GATEWAY, message).with_details(report)
            }
            OrchestrationError::Backup(source) => ApiError::from(source),
            OrchestrationError::Aborted(_) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message),
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub config_version: u64,
    pub orchestration: OrchestrationState,
    pub stack: Arc<StatusSnapshot>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<StatusResponse> {
    let stack = match state.status.latest() {
        Some(snapshot) => snapshot,
        None => state.status.poll().await,
    };
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        config_version: state.store.version(),
        orchestration: state.controller.state(),
        stack,
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Result<Json<Arc<ConfigSnapshot>>, ApiError> {
    state
        .store
        .get()
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

pub async fn put_config(
    State(state): State<AdminState>,
    Json(config): Json<StackConfig>,
) -> Result<Json<ApplyReport>, ApiError> {
    let report = state.controller.save_and_apply(config).await?;
    Ok(Json(report))
}

pub async fn get_last_apply(State(state): State<AdminState>) -> Result<Json<Arc<ApplyReport>>, ApiError> {
    state
        .controller
        .last_report()
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "no save-and-apply has run yet"))
}

pub async fn list_backups(State(state): State<AdminState>) -> Result<Json<Vec<BackupRecord>>, ApiError> {
    Ok(Json(state.persistence.list_backups()?))
}

pub async fn create_backup(State(state): State<AdminState>) -> Result<(StatusCode, Json<BackupRecord>), ApiError> {
    let record = state.persistence.create_backup()?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn restore_backup(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ApplyReport>, ApiError> {
    let report = state.controller.restore_backup(&name).await?;
    Ok(Json(report))
}
