//! Staging workflow routes

use crate::error::AppError;
use crate::models::SuccessResponse;
use crate::routes::actor_from_headers;
use crate::staging::{NewSubmission, ReviewStatus, ReviewVerdict, StagingSubmission};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_half_life() -> i32 {
    24
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[validate(length(min = 1, message = "domain is required"))]
    pub domain: String,
    #[validate(length(min = 1, message = "narrative is required"))]
    pub narrative: String,
    #[validate(range(min = 0.0, max = 1.0, message = "probability must lie in [0, 1]"))]
    pub probability: f64,
    #[validate(range(min = 0.0, max = 1.0, message = "confidence must lie in [0, 1]"))]
    pub confidence: f64,
    #[serde(default = "default_half_life")]
    #[validate(range(min = 1, message = "halfLifeHours must be positive"))]
    pub half_life_hours: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub verdict: ReviewVerdict,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub submission: StagingSubmission,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionListResponse {
    pub submissions: Vec<StagingSubmission>,
}

/// Submit a narrative into G0 staging (lands as PENDING)
pub async fn submit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<SubmissionResponse>>), AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let actor = actor_from_headers(&headers);
    let submission = state
        .staging
        .submit(
            NewSubmission {
                domain: req.domain,
                narrative: req.narrative,
                probability: req.probability,
                confidence: req.confidence,
                half_life_hours: req.half_life_hours,
            },
            &actor,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            "Submission staged for review",
            SubmissionResponse { submission },
        )),
    ))
}

/// List submissions, most recent first, optionally filtered by status
pub async fn list_submissions(
    State(state): State<SharedState>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<SuccessResponse<SubmissionListResponse>>, AppError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(ReviewStatus::parse(&raw.to_uppercase()).ok_or_else(|| {
            AppError::Validation(format!("unknown review status '{}'", raw))
        })?),
    };

    let submissions = state.staging.list(status, query.limit).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Found {} submissions", submissions.len()),
        SubmissionListResponse { submissions },
    )))
}

/// Apply a reviewer verdict to a pending submission
pub async fn review(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<SuccessResponse<SubmissionResponse>>, AppError> {
    let reviewer = actor_from_headers(&headers);
    let submission = state
        .staging
        .review(id, req.verdict, &reviewer, req.rejection_reason)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Submission {:?}", req.verdict),
        SubmissionResponse { submission },
    )))
}

/// Promote an approved submission into canonical storage
pub async fn promote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<SubmissionResponse>>, AppError> {
    let actor = actor_from_headers(&headers);
    let submission = state.staging.promote(id, &actor).await?;

    Ok(Json(SuccessResponse::with_data(
        "Submission promoted",
        SubmissionResponse { submission },
    )))
}
