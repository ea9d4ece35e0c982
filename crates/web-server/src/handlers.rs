use crate::{error::AppError, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use core_types::{ConnectionMonitorState, SlotId, TradingOutcome};
use orchestrator::InstanceStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct PairRequest {
    pub pair: String,
}

#[derive(Debug, Serialize)]
pub struct SlotResponse {
    pub slot: SlotId,
}

/// # POST /api/trading/:user_id/start
///
/// Always answers with the outcome body; `success` tells the caller what happened.
pub async fn start_trading(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<TradingOutcome>) {
    let outcome = state.service.start_trading(&user_id).await;
    let status = if outcome.success { StatusCode::OK } else { StatusCode::UNPROCESSABLE_ENTITY };
    (status, Json(outcome))
}

/// # GET /api/slots/available
pub async fn available_slot(State(state): State<Arc<AppState>>) -> Result<Json<SlotResponse>, AppError> {
    let slot = state.service.available_slot().await?;
    Ok(Json(SlotResponse { slot }))
}

/// # GET /api/instances/:slot/status
pub async fn instance_status(
    Path(slot): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<InstanceStatus>, AppError> {
    let status = state.service.instance_status(SlotId::new(slot)?).await?;
    Ok(Json(status))
}

/// # POST /api/instances/:slot/stop
/// Stops the terminal and its container and stops monitoring the slot.
pub async fn stop_instance(
    Path(slot): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let slot = SlotId::new(slot)?;
    state.service.stop_trading(slot).await?;
    Ok(Json(json!({ "slot": slot, "stopped": true })))
}

/// # POST /api/instances/:slot/terminal/stop
pub async fn stop_terminal(
    Path(slot): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let slot = SlotId::new(slot)?;
    state.service.stop_terminal(slot).await?;
    Ok(Json(json!({ "slot": slot, "stopped": true })))
}

/// # POST /api/instances/:slot/pair
pub async fn set_pair(
    Path(slot): Path<u32>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PairRequest>,
) -> Result<Json<Value>, AppError> {
    let slot = SlotId::new(slot)?;
    state.service.set_pair(slot, &request.pair).await?;
    Ok(Json(json!({ "slot": slot, "pair": request.pair })))
}

/// # GET /api/instances/:slot/connection
/// Runs one connection probe right now.
pub async fn check_connection(
    Path(slot): Path<u32>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let slot = SlotId::new(slot)?;
    let connected = state.service.check_connection(slot).await?;
    Ok(Json(json!({ "slot": slot, "connected": connected })))
}

/// # GET /api/connections
pub async fn connections(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionMonitorState>> {
    Json(state.service.connections().await)
}
