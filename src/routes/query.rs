//! Gatekeeper route: ad-hoc read-only SQL

use crate::error::AppError;
use crate::gatekeeper::QueryExecution;
use crate::models::SuccessResponse;
use crate::routes::actor_from_headers;
use crate::state::SharedState;
use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryRequest {
    #[validate(length(min = 1, message = "query text is required"))]
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryResponse {
    #[serde(flatten)]
    pub execution: QueryExecution,
}

/// Validate and execute a free-form read query. Mutation-class keywords are
/// rejected with a policy error before anything touches the store.
pub async fn execute_query(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ExecuteQueryRequest>,
) -> Result<Json<SuccessResponse<ExecuteQueryResponse>>, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let actor = actor_from_headers(&headers);
    let execution = state.gatekeeper.execute(&req.query, &actor).await?;

    Ok(Json(SuccessResponse::with_data(
        format!(
            "Query executed: {} rows in {}ms",
            execution.row_count, execution.duration_ms
        ),
        ExecuteQueryResponse { execution },
    )))
}
