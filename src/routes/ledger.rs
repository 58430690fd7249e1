//! Audit ledger routes

use crate::error::AppError;
use crate::ledger::{compute_rollup, AgentTaskEvent, AuditEntry, LedgerRollup};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventQuery {
    pub agent_id: Option<String>,
    pub limit: Option<i64>,
    /// Timestamp cursor: return entries strictly older than this
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventListResponse {
    pub entries: Vec<AgentTaskEvent>,
    pub summary: LedgerRollup,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListResponse {
    pub entries: Vec<AuditEntry>,
}

/// Agent task-event feed with derived governance flags and rollup counts
pub async fn list_task_events(
    State(state): State<SharedState>,
    Query(query): Query<TaskEventQuery>,
) -> Result<Json<SuccessResponse<TaskEventListResponse>>, AppError> {
    let entries = state
        .ledger
        .query_task_events(query.agent_id.as_deref(), query.limit, query.before)
        .await?;
    let summary = compute_rollup(&entries);

    Ok(Json(SuccessResponse::with_data(
        format!("Retrieved {} task events", entries.len()),
        TaskEventListResponse { entries, summary },
    )))
}

/// Raw audit entries, newest first
pub async fn list_audit_entries(
    State(state): State<SharedState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<SuccessResponse<AuditListResponse>>, AppError> {
    let entries = state.ledger.query_audit(query.limit, query.before).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Retrieved {} audit entries", entries.len()),
        AuditListResponse { entries },
    )))
}
