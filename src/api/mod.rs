//! HTTP API for catalog lookups, quotes and lifecycle control

use crate::allowance::AllowanceOracle;
use crate::backend::Envelope;
use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::{
    BridgeOrchestrator, BridgeRequest, Lifecycle, LifecycleSnapshot, LifecycleState, StateKind,
};
use crate::quote::QuoteRouter;
use crate::registry::ChainAssetRegistry;
use crate::state::{LifecycleStats, StateManager};
use crate::types::{AllowanceQuery, Chain, QuoteRequest, Route, Token};
use crate::units::format_units;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BridgeOrchestrator>,
    pub registry: Arc<ChainAssetRegistry>,
    pub oracle: Arc<AllowanceOracle>,
    pub router: Arc<QuoteRouter>,
    pub state_manager: Arc<StateManager>,
    /// RPC connections of the wallet signer, when one is configured
    pub chain_manager: Option<Arc<ChainManager>>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/chains", get(get_chains))
        .route("/chains/:id/tokens", get(get_tokens))
        .route("/allowance", get(get_allowance))
        .route("/quote", post(post_quote))
        .route("/lifecycles", get(list_lifecycles).post(create_lifecycle))
        .route("/lifecycles/:id", get(get_lifecycle))
        .route("/lifecycles/:id/approve", post(approve_lifecycle))
        .route("/lifecycles/:id/quote", post(quote_lifecycle))
        .route("/lifecycles/:id/bridge", post(bridge_lifecycle))
        .route("/lifecycles/:id/confirm", post(confirm_lifecycle))
        .route("/lifecycles/:id/cancel", post(cancel_lifecycle))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> BridgeResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

/// Error response, rendered as a rejected envelope
#[derive(Debug)]
pub enum ApiError {
    Bridge(BridgeError),
    NotFound(String),
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Bridge(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Bridge(err) => (status_for(&err), err.to_string()),
        };
        (status, Json(Envelope::<()>::rejected(message))).into_response()
    }
}

fn status_for(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::InvalidStateTransition { .. } | BridgeError::CancellationRejected { .. } => {
            StatusCode::CONFLICT
        }
        BridgeError::ChainNotFound { .. } | BridgeError::TokenNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        BridgeError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,
        BridgeError::ConfirmationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::CatalogUnavailable(_)
        | BridgeError::AllowanceQueryFailed(_)
        | BridgeError::QuoteServiceError(_)
        | BridgeError::BuildFailed(_)
        | BridgeError::BackendRejected(_)
        | BridgeError::Transport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(result: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(result)))
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - catalog loaded and signer RPCs reachable
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.registry.snapshot().await;

    let chain_health = match &state.chain_manager {
        Some(manager) => manager.health_check().await,
        None => Vec::new(),
    };
    let chains_ok = chain_health.iter().all(|(_, healthy)| *healthy);
    let ready = catalog.is_loaded() && chains_ok;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            catalog_loaded: catalog.is_loaded(),
            catalog_fetched_at: catalog.fetched_at().map(|t| t.to_rfc3339()),
            chains: chain_health
                .into_iter()
                .map(|(chain_id, healthy)| ChainHealth { chain_id, healthy })
                .collect(),
        }),
    )
}

async fn get_chains(State(state): State<AppState>) -> ApiResult<Vec<Chain>> {
    ok(state.registry.list_chains().await?)
}

async fn get_tokens(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> ApiResult<Vec<Token>> {
    ok(state.registry.list_tokens(chain_id).await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowanceParams {
    chain_id: u64,
    token: String,
    amount: String,
}

/// Allowance of the signer wallet towards the bridge contract
async fn get_allowance(
    State(state): State<AppState>,
    Query(params): Query<AllowanceParams>,
) -> ApiResult<AllowanceResponse> {
    let token = state.registry.token(params.chain_id, &params.token).await?;
    let required = AllowanceOracle::requirement(&token, &params.amount)?;

    let query = AllowanceQuery {
        chain_id: params.chain_id,
        owner_address: state.orchestrator.signer_address(),
        spender_address: state.orchestrator.spender().to_string(),
        token_address: token.address.clone(),
    };
    let result = state.oracle.check_allowance(&query).await?;

    ok(AllowanceResponse {
        owner: query.owner_address,
        spender: query.spender_address,
        allowed: result.allowed_amount.to_string(),
        allowed_formatted: format_units(result.allowed_amount, token.decimals),
        required: required.to_string(),
        approved: AllowanceOracle::covers(&result, required),
    })
}

async fn post_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<QuoteResponse> {
    let routes = state.router.get_routes(&request).await?;
    ok(QuoteResponse { routes })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLifecycle {
    #[serde(flatten)]
    request: BridgeRequest,
    /// Drive the whole lifecycle in the background
    #[serde(default)]
    auto: bool,
}

/// Start a lifecycle and run its allowance check
async fn create_lifecycle(
    State(state): State<AppState>,
    Json(body): Json<CreateLifecycle>,
) -> Result<(StatusCode, Json<Envelope<LifecycleSnapshot>>), ApiError> {
    let lifecycle = state.orchestrator.start(body.request);
    state.state_manager.track(lifecycle.clone());

    lifecycle.check_allowance().await?;

    if body.auto {
        let background = lifecycle.clone();
        tokio::spawn(async move {
            let state = background.run().await;
            info!(lifecycle = %background.id(), state = %state.kind(), "Lifecycle run finished");
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(lifecycle.snapshot().await)),
    ))
}

async fn list_lifecycles(
    State(state): State<AppState>,
) -> ApiResult<Vec<LifecycleSnapshot>> {
    let lifecycles = state.state_manager.list();
    let snapshots = futures::future::join_all(lifecycles.iter().map(|l| l.snapshot())).await;
    ok(snapshots)
}

async fn get_lifecycle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    ok(find(&state, id)?.snapshot().await)
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Approve,
    Quote,
    Bridge,
    Confirm,
    Cancel,
}

async fn approve_lifecycle(
    state: State<AppState>,
    id: Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    drive(state, id, Step::Approve).await
}

async fn quote_lifecycle(
    state: State<AppState>,
    id: Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    drive(state, id, Step::Quote).await
}

async fn bridge_lifecycle(
    state: State<AppState>,
    id: Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    drive(state, id, Step::Bridge).await
}

async fn confirm_lifecycle(
    state: State<AppState>,
    id: Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    drive(state, id, Step::Confirm).await
}

async fn cancel_lifecycle(
    state: State<AppState>,
    id: Path<Uuid>,
) -> ApiResult<LifecycleSnapshot> {
    drive(state, id, Step::Cancel).await
}

/// Run one explicit step; state-machine misuse surfaces as 409
async fn drive(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    step: Step,
) -> ApiResult<LifecycleSnapshot> {
    let lifecycle = find(&state, id)?;

    let result = match step {
        Step::Approve => lifecycle.approve().await,
        Step::Quote => lifecycle.quote().await,
        Step::Bridge => lifecycle.bridge().await,
        Step::Cancel => lifecycle.cancel().await,
        Step::Confirm => confirm(&lifecycle).await,
    };

    if let Err(e) = &result {
        warn!(lifecycle = %id, step = ?step, "Step rejected: {}", e);
    }
    result?;

    ok(lifecycle.snapshot().await)
}

/// Re-poll whichever confirmation the lifecycle is waiting on
async fn confirm(lifecycle: &Arc<Lifecycle>) -> BridgeResult<LifecycleState> {
    match lifecycle.state().await.kind() {
        StateKind::ConfirmingBridge => lifecycle.confirm_bridge().await,
        _ => lifecycle.confirm_approval().await,
    }
}

fn find(state: &AppState, id: Uuid) -> Result<Arc<Lifecycle>, ApiError> {
    state
        .state_manager
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("lifecycle {} not found", id)))
}

async fn get_stats(State(state): State<AppState>) -> ApiResult<LifecycleStats> {
    ok(state.state_manager.get_stats())
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    catalog_loaded: bool,
    catalog_fetched_at: Option<String>,
    chains: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain_id: u64,
    healthy: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AllowanceResponse {
    owner: String,
    spender: String,
    allowed: String,
    allowed_formatted: String,
    required: String,
    approved: bool,
}

#[derive(Serialize)]
struct QuoteResponse {
    routes: Vec<Route>,
}
