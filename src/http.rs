//! Thin HTTP surface over the ledger facade. Spec section 6 (external
//! interfaces) treats HTTP as one possible embedding, not the contract
//! itself; this module exists only so the crate is runnable end to end.
//! Grounded on the teacher's `routes/balances.rs` + `routes/internal.rs`
//! handler shape (`State` extractor, `Json` in/out, `(StatusCode, Json<Error>)`
//! error arm) with the JWT auth middleware dropped — player identity comes
//! from the host game platform, an external collaborator out of scope here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "unhandled ledger error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
}

fn not_found(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: e.to_string() }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/currencies", currency_routes())
        .nest("/api/players/:player_name", player_routes())
        .nest("/api/snapshots", snapshot_routes())
        .with_state(state)
}

fn currency_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_currencies).post(create_currency))
        .route("/:identifier", delete(delete_currency))
        .route("/:identifier/enabled", post(set_currency_enabled))
        .route("/:identifier/primary", post(set_primary_currency))
}

fn player_routes() -> Router<AppState> {
    Router::new()
        .route("/balances/:currency", get(get_balance))
        .route("/deposit", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/set", post(set_balance))
        .route("/max-balance", post(set_max_balance))
        .route("/audit", get(audit_log))
        .route("/load", post(load_player))
}

fn snapshot_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_snapshots).post(create_snapshot))
        .route("/:id/rollback", post(rollback_snapshot))
        .route("/:id/rollback/:player_name", post(rollback_snapshot_for_player))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.ledger.is_ready() { "ready" } else { "starting" },
    })
}

// ---- currencies ----

#[derive(Deserialize)]
struct CreateCurrencyRequest {
    identifier: String,
    name: String,
    symbol: String,
    precision: i16,
    default_max_balance: i64,
    #[serde(default)]
    console_log: bool,
}

async fn list_currencies(State(state): State<AppState>) -> Json<Vec<crate::models::Currency>> {
    Json(state.ledger.list_currencies())
}

async fn create_currency(
    State(state): State<AppState>,
    Json(req): Json<CreateCurrencyRequest>,
) -> Result<Json<crate::models::Currency>, ApiError> {
    state
        .ledger
        .create_currency(
            &req.identifier, &req.name, &req.symbol, req.precision, req.default_max_balance,
            req.console_log,
        )
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn delete_currency(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.ledger.delete_currency(&identifier).await.map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SetEnabledRequest {
    enabled: bool,
}

async fn set_currency_enabled(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<Json<crate::models::Currency>, ApiError> {
    state
        .ledger
        .set_currency_enabled(&identifier, req.enabled)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn set_primary_currency(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<crate::models::Currency>, ApiError> {
    state.ledger.set_primary_currency(&identifier).await.map(Json).map_err(internal_error)
}

// ---- player balances / mutations ----

#[derive(Deserialize)]
struct DirectQuery {
    #[serde(default)]
    direct: bool,
}

#[derive(Serialize)]
struct BalanceResponse {
    balance: Decimal,
}

async fn get_balance(
    State(state): State<AppState>,
    Path((player_name, currency)): Path<(String, String)>,
    Query(q): Query<DirectQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = if q.direct {
        state.ledger.balance_direct(&player_name, &currency).await.map_err(not_found)?
    } else {
        state.ledger.balance_cached(&player_name, &currency)
    };
    Ok(Json(BalanceResponse { balance }))
}

#[derive(Deserialize)]
struct LoadPlayerRequest {
    #[serde(default)]
    player_uuid: String,
}

async fn load_player(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Json(req): Json<LoadPlayerRequest>,
) -> Result<StatusCode, ApiError> {
    state.ledger.load_player(&player_name, &req.player_uuid).await.map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct MutationRequest {
    #[serde(default)]
    player_uuid: String,
    currency: String,
    amount: Decimal,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    operator: String,
    #[serde(default)]
    direct: bool,
}

fn default_reason(reason: &str, fallback: &str) -> String {
    if reason.is_empty() { fallback.to_string() } else { reason.to_string() }
}

fn default_operator(operator: &str) -> String {
    if operator.is_empty() { "API".to_string() } else { operator.to_string() }
}

async fn deposit(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Json(req): Json<MutationRequest>,
) -> Json<crate::error::OperationResult> {
    let reason = default_reason(&req.reason, "api deposit");
    let operator = default_operator(&req.operator);
    let result = if req.direct {
        state
            .ledger
            .deposit_direct(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    } else {
        state
            .ledger
            .deposit(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    };
    Json(result)
}

async fn withdraw(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Json(req): Json<MutationRequest>,
) -> Json<crate::error::OperationResult> {
    let reason = default_reason(&req.reason, "api withdraw");
    let operator = default_operator(&req.operator);
    let result = if req.direct {
        state
            .ledger
            .withdraw_direct(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    } else {
        state
            .ledger
            .withdraw(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    };
    Json(result)
}

async fn set_balance(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Json(req): Json<MutationRequest>,
) -> Json<crate::error::OperationResult> {
    let reason = default_reason(&req.reason, "api set");
    let operator = default_operator(&req.operator);
    let result = if req.direct {
        state
            .ledger
            .set_balance_direct(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    } else {
        state
            .ledger
            .set_balance(&player_name, &req.player_uuid, &req.currency, req.amount, &reason, &operator)
            .await
    };
    Json(result)
}

#[derive(Deserialize)]
struct SetMaxBalanceRequest {
    currency: String,
    max_balance: i64,
}

async fn set_max_balance(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Json(req): Json<SetMaxBalanceRequest>,
) -> Result<Json<crate::models::Account>, ApiError> {
    state
        .ledger
        .set_max_balance(&player_name, &req.currency, req.max_balance)
        .await
        .map(Json)
        .map_err(internal_error)
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page_size() -> i64 {
    50
}

async fn audit_log(
    State(state): State<AppState>,
    Path(player_name): Path<String>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<crate::models::TransactionRecord>>, ApiError> {
    state
        .ledger
        .audit_for_player(&player_name, q.page, q.page_size)
        .await
        .map(Json)
        .map_err(internal_error)
}

// ---- snapshots ----

#[derive(Deserialize)]
struct CreateSnapshotRequest {
    #[serde(default)]
    memo: String,
}

#[derive(Serialize)]
struct SnapshotCreatedResponse {
    snapshot_id: String,
}

async fn create_snapshot(
    State(state): State<AppState>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Json<SnapshotCreatedResponse>, ApiError> {
    let snapshot_id = state.ledger.create_snapshot(&req.memo).await.map_err(internal_error)?;
    Ok(Json(SnapshotCreatedResponse { snapshot_id }))
}

async fn list_snapshots(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::SnapshotSummary>>, ApiError> {
    state.ledger.list_snapshots().await.map(Json).map_err(internal_error)
}

#[derive(Serialize)]
struct RollbackResponse {
    restored: usize,
}

async fn rollback_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RollbackResponse>, ApiError> {
    let restored = state.ledger.rollback_snapshot(&id).await.map_err(not_found)?;
    Ok(Json(RollbackResponse { restored }))
}

async fn rollback_snapshot_for_player(
    State(state): State<AppState>,
    Path((id, player_name)): Path<(String, String)>,
) -> Result<Json<RollbackResponse>, ApiError> {
    let restored = state
        .ledger
        .rollback_snapshot_for_player(&id, &player_name)
        .await
        .map_err(not_found)?;
    Ok(Json(RollbackResponse { restored }))
}
