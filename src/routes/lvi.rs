//! LVI metric routes

use crate::error::AppError;
use crate::lvi::{grade, round1, trend, LviReading, Trend, TrendDirection};
use crate::models::SuccessResponse;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub window_days: Option<i64>,
    pub limit: Option<i64>,
}

/// Trend as presented: percentage rounded to one decimal place
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendView {
    pub direction: TrendDirection,
    pub pct: f64,
}

impl From<Trend> for TrendView {
    fn from(t: Trend) -> Self {
        Self {
            direction: t.direction,
            pct: round1(t.pct),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLviResponse {
    pub current: Option<LviReading>,
    pub grade: Option<char>,
    pub trend: TrendView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LviHistoryResponse {
    pub readings: Vec<LviReading>,
}

/// Current reading with grade and trend attached. Grade and trend stay off
/// the history endpoint; they belong to "current" only.
pub async fn current_lvi(
    State(state): State<SharedState>,
) -> Result<Json<SuccessResponse<CurrentLviResponse>>, AppError> {
    // Two most recent readings are enough for the trend comparison
    let recent = state.lvi.history(None, Some(2)).await?;
    let trend_view = TrendView::from(trend(&recent));

    let current = recent.into_iter().next();
    let letter = current.as_ref().map(|r| grade(r.lvi_score));

    Ok(Json(SuccessResponse::with_data(
        match &current {
            Some(r) => format!("LVI {:.3}", r.lvi_score),
            None => "No LVI readings yet".to_string(),
        },
        CurrentLviResponse {
            current,
            grade: letter,
            trend: trend_view,
        },
    )))
}

/// Reading history inside a day window, most recent first
pub async fn lvi_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SuccessResponse<LviHistoryResponse>>, AppError> {
    let readings = state.lvi.history(query.window_days, query.limit).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Retrieved {} readings", readings.len()),
        LviHistoryResponse { readings },
    )))
}
