//! Admin HTTP surface: configuration, status, and last apply result.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::loader::ConfigPersistence;
use crate::config::store::ConfigStore;
use crate::orchestration::OrchestrationController;
use crate::workers::status::StatusAggregator;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Handles shared by every admin route.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<ConfigStore>,
    pub persistence: Arc<ConfigPersistence>,
    pub controller: Arc<OrchestrationController>,
    pub status: Arc<StatusAggregator>,
    pub api_key: Arc<str>,
}

pub fn router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config).put(put_config))
        .route("/admin/apply/last", get(get_last_apply))
        .route("/admin/backups", get(list_backups).post(create_backup))
        .route("/admin/backups/{name}/restore", post(restore_backup))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
