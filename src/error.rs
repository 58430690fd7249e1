//! Error handling module
//!
//! Provides unified error types and handling for the entire application.
//! The taxonomy distinguishes caller mistakes (validation, policy, bad
//! transitions) from store trouble (transient vs. not-provisioned) so the
//! dashboard can render a precise message instead of a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Gatekeeper rejection: the request asked for something the read-only
    /// policy forbids. Never a system fault.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Workflow transition attempted from a state the transition table does
    /// not permit.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing table for a feature has not been provisioned yet.
    #[error("Feature not enabled: {0}")]
    NotActivated(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Convert a store error, mapping "relation does not exist" to the
    /// distinct not-provisioned signal so operators can tell "broken" from
    /// "not yet activated".
    pub fn from_db(e: tokio_postgres::Error) -> Self {
        if e.code() == Some(&SqlState::UNDEFINED_TABLE) {
            AppError::NotActivated(
                "required table is not provisioned in this environment".to_string(),
            )
        } else {
            AppError::Database(e)
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::PolicyViolation(msg) => (
                StatusCode::FORBIDDEN,
                "POLICY_VIOLATION",
                msg.clone(),
                None,
            ),
            AppError::InvalidTransition(msg) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::NotActivated(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "FEATURE_NOT_ENABLED",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_violation_is_distinct_from_internal() {
        let policy = AppError::PolicyViolation("no DML".to_string());
        let internal = AppError::Internal("boom".to_string());
        assert!(policy.to_string().contains("Policy violation"));
        assert!(internal.to_string().contains("Internal error"));
    }

    #[test]
    fn test_not_activated_message() {
        let err = AppError::NotActivated("lvi_readings missing".to_string());
        assert_eq!(err.to_string(), "Feature not enabled: lvi_readings missing");
    }
}
