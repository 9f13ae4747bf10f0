use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::blockchain::Network;
use crate::config::SettingsError;
use crate::engine::EngineError;
use crate::payments::ledger::EntityTotals;
use crate::payments::types::{
    EntityId, MonitorError, StartOutcome, StopStatus, SubscriptionHandle, VerificationResult,
};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub network: Network,
    pub listeners: usize,
    pub donations: usize,
}

#[derive(Deserialize)]
pub struct StartListenerRequest {
    pub campaign_id: String,
    pub wallet: String,
}

#[derive(Serialize)]
pub struct StopListenerResponse {
    pub status: StopStatus,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub network: Network,
    pub tx_hash: String,
    pub expected_amount: Decimal,
    /// Empty or `native` for the chain's native asset.
    #[serde(default)]
    pub token_address: String,
    pub decimals: u8,
    pub recipient: String,
}

#[derive(Deserialize)]
pub struct ActivationRequest {
    pub network: Network,
    pub tx_hash: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    #[serde(flatten)]
    pub result: VerificationResult,
    pub message: &'static str,
}

impl From<VerificationResult> for VerifyResponse {
    fn from(result: VerificationResult) -> Self {
        Self {
            message: result.user_message(),
            result,
        }
    }
}

/// Engine errors as HTTP responses.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_) | EngineError::Monitor(MonitorError::InvalidWallet(_)) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::Monitor(MonitorError::MonitoringDisabled(_)) => StatusCode::CONFLICT,
            EngineError::Settings(SettingsError::NotFound(_)) => StatusCode::NOT_FOUND,
            EngineError::Settings(SettingsError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Chain(e) | EngineError::Monitor(MonitorError::Chain(e)) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::Chain(_) | EngineError::Monitor(MonitorError::Chain(_)) => StatusCode::BAD_GATEWAY,
            EngineError::Settings(SettingsError::Invalid(_)) | EngineError::Recorder(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Admin request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        network: state.engine.monitor_network(),
        listeners: state.engine.listeners_status().len(),
        donations: state.ledger.count(),
    })
}

pub async fn get_listeners(State(state): State<AdminState>) -> Json<Vec<SubscriptionHandle>> {
    Json(state.engine.listeners_status())
}

pub async fn start_listener(
    State(state): State<AdminState>,
    Json(request): Json<StartListenerRequest>,
) -> Result<Json<StartOutcome>, ApiError> {
    let outcome = state
        .engine
        .start_campaign_listener(&request.campaign_id, &request.wallet)
        .await?;
    Ok(Json(outcome))
}

pub async fn stop_listener(
    State(state): State<AdminState>,
    Path(campaign_id): Path<String>,
) -> Json<StopListenerResponse> {
    Json(StopListenerResponse {
        status: state.engine.stop_campaign_listener(&campaign_id),
    })
}

pub async fn verify_payment(
    State(state): State<AdminState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let result = state
        .engine
        .verify_payment(
            request.network,
            &request.tx_hash,
            request.expected_amount,
            &request.token_address,
            request.decimals,
            &request.recipient,
        )
        .await?;
    Ok(Json(result.into()))
}

pub async fn verify_activation(
    State(state): State<AdminState>,
    Json(request): Json<ActivationRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let result = state
        .engine
        .verify_activation_fee(request.network, &request.tx_hash)
        .await?;
    Ok(Json(result.into()))
}

pub async fn get_donations(State(state): State<AdminState>) -> Json<HashMap<EntityId, EntityTotals>> {
    Json(state.ledger.totals())
}
