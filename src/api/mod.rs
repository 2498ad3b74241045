//! HTTP API for health checks and relay status

use crate::checkpoint::CheckpointName;
use crate::config::ApiConfig;
use crate::error::{FederatorError, FederatorResult};
use crate::relay::{CycleReport, CycleState, Federator};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub federator: Arc<Federator>,
    pub agent: Address,
    pub started: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(
    config: ApiConfig,
    federator: Arc<Federator>,
    agent: Address,
) -> FederatorResult<()> {
    let app = router(AppState {
        federator,
        agent,
        started: Instant::now(),
    });

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| FederatorError::Internal(format!("api server: {}", e)))
}

/// Liveness: unhealthy once a cycle has failed
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cycle_state = state.federator.state().await;
    let code = if cycle_state == CycleState::Failed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status: if code == StatusCode::OK { "ok" } else { "failed" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let internal = |e: FederatorError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        agent: format!("{:?}", state.agent),
        state: state.federator.state().await,
        last_block: state
            .federator
            .checkpoint(CheckpointName::LastBlock)
            .await
            .map_err(internal)?,
        last_tx_count: state
            .federator
            .checkpoint(CheckpointName::LastTxCount)
            .await
            .map_err(internal)?,
        last_cycle: state.federator.last_report().await,
    }))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    agent: String,
    state: CycleState,
    last_block: Option<u64>,
    last_tx_count: Option<u64>,
    last_cycle: Option<CycleReport>,
}
