//! Risk-state route

use crate::defcon::RiskStatus;
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResponse {
    #[serde(flatten)]
    pub status: RiskStatus,
}

/// Current DEFCON level. This handler is deliberately infallible: breakers
/// poll it, and a transport-level 500 here must never masquerade as an
/// escalation.
pub async fn current_risk(State(state): State<SharedState>) -> Json<SuccessResponse<RiskResponse>> {
    let status = state.risk.current().await;

    Json(SuccessResponse::with_data(
        format!("Risk level {:?}", status.level),
        RiskResponse { status },
    ))
}
