//! HTTP API Server
//!
//! REST surface for operator tooling: status snapshot, health probe,
//! forced role override, and the automatic-recovery toggle.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cluster::{ClusterStatus, Role, StateStore};
use crate::config::ApiConfig;
use crate::datapath::UptimeProbe;
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Cluster state store
    pub store: Arc<StateStore>,
    /// Local uptime source, reported for the peer's uptime poller
    pub uptime: Arc<dyn UptimeProbe>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, store: Arc<StateStore>, uptime: Arc<dyn UptimeProbe>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { store, uptime }),
        }
    }

    /// Create the router
    fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/v1/status", get(handle_status))
            .route("/v1/health", get(handle_health))
            .route("/v1/role", post(handle_force_role))
            .route("/v1/recovery", post(handle_recovery))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Status response: the cluster snapshot plus local uptime
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: ClusterStatus,
    pub uptime_secs: u64,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub role: String,
}

/// Forced role override request
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// Automatic-recovery toggle request
#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub enabled: bool,
}

/// Command response
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.get_status() {
        Ok(status) => Json(StatusResponse {
            status,
            uptime_secs: state.uptime.local_uptime_secs(),
        })
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.get_status() {
        Ok(status) => Json(HealthResponse {
            healthy: true,
            role: status.local_role.to_string(),
        })
        .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                healthy: false,
                role: Role::Init.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn handle_force_role(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleRequest>,
) -> impl IntoResponse {
    match state.store.force_role(req.role) {
        Ok(()) => Json(CommandResponse {
            success: true,
            message: Some(format!("role forced to {}", req.role)),
        })
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn handle_recovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecoveryRequest>,
) -> impl IntoResponse {
    match state.store.set_auto_recovery(req.enabled) {
        Ok(()) => Json(CommandResponse {
            success: true,
            message: Some(format!(
                "automatic recovery {}",
                if req.enabled { "enabled" } else { "disabled" }
            )),
        })
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

fn error_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &e {
        Error::InvalidRole(_) => (StatusCode::BAD_REQUEST, "INVALID_ROLE"),
        Error::NotInitialized => (StatusCode::SERVICE_UNAVAILABLE, "NOT_INITIALIZED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_request_parses_lowercase() {
        let req: RoleRequest = serde_json::from_str(r#"{"role":"active"}"#).unwrap();
        assert_eq!(req.role, Role::Active);

        let req: RoleRequest = serde_json::from_str(r#"{"role":"standby"}"#).unwrap();
        assert_eq!(req.role, Role::Standby);

        assert!(serde_json::from_str::<RoleRequest>(r#"{"role":"split"}"#).is_err());
    }

    #[test]
    fn test_error_response_mapping() {
        let (status, _) = error_response(Error::InvalidRole("INIT".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(Error::NotInitialized);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(Error::Network("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
