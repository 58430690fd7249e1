//! Staged Approval Workflow (Oracle Staging)
//!
//! G0 -> G1 gate: machine-generated narrative submissions land in staging,
//! a human reviewer approves or rejects them, and only an explicit promote
//! step materializes approved content into canonical storage. Submissions are
//! never deleted; rejected and pending attempts stay behind for audit.
//!
//! Transitions are applied as a single conditional UPDATE against the store
//! so two concurrent reviewers cannot double-transition the same submission;
//! a transition attempted from an unexpected state is rejected, not ignored.

use crate::error::AppError;
use crate::ledger::{clamp_limit, ActionType, AuditLedger, AuditRecord};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// =============================================================================
// STATE MACHINE
// =============================================================================

/// Review state of a staging submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Promoted,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::Promoted => "PROMOTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(ReviewStatus::Pending),
            "APPROVED" => Some(ReviewStatus::Approved),
            "REJECTED" => Some(ReviewStatus::Rejected),
            "PROMOTED" => Some(ReviewStatus::Promoted),
            _ => None,
        }
    }

    /// The complete transition table. APPROVED is a resting state distinct
    /// from PROMOTED; REJECTED and PROMOTED are terminal.
    pub fn can_transition(self, to: ReviewStatus) -> bool {
        matches!(
            (self, to),
            (ReviewStatus::Pending, ReviewStatus::Approved)
                | (ReviewStatus::Pending, ReviewStatus::Rejected)
                | (ReviewStatus::Approved, ReviewStatus::Promoted)
        )
    }
}

/// Reviewer verdict on a pending submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

impl ReviewVerdict {
    fn target_status(self) -> ReviewStatus {
        match self {
            ReviewVerdict::Approved => ReviewStatus::Approved,
            ReviewVerdict::Rejected => ReviewStatus::Rejected,
        }
    }
}

// =============================================================================
// DATA TYPES
// =============================================================================

/// A narrative submission in the staging area
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingSubmission {
    pub submission_id: Uuid,
    pub domain: String,
    pub narrative: String,
    pub probability: f64,
    pub confidence: f64,
    pub half_life_hours: i32,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub review_status: ReviewStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub promoted_to_vector_id: Option<Uuid>,
}

/// Input for a new submission
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub domain: String,
    pub narrative: String,
    pub probability: f64,
    pub confidence: f64,
    pub half_life_hours: i32,
}

/// Field-level validation for a new submission. Single source of truth; the
/// HTTP layer's derive checks are a convenience, this is the contract.
pub fn validate_submission(sub: &NewSubmission) -> Result<(), AppError> {
    if sub.domain.trim().is_empty() {
        return Err(AppError::Validation("domain must not be empty".to_string()));
    }
    if sub.narrative.trim().is_empty() {
        return Err(AppError::Validation(
            "narrative must not be empty".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&sub.probability) {
        return Err(AppError::Validation(format!(
            "probability must lie in [0, 1], got {}",
            sub.probability
        )));
    }
    if !(0.0..=1.0).contains(&sub.confidence) {
        return Err(AppError::Validation(format!(
            "confidence must lie in [0, 1], got {}",
            sub.confidence
        )));
    }
    if sub.half_life_hours <= 0 {
        return Err(AppError::Validation(format!(
            "halfLifeHours must be positive, got {}",
            sub.half_life_hours
        )));
    }
    Ok(())
}

const SUBMISSION_COLUMNS: &str = "submission_id, domain, narrative, probability, confidence, \
                                  half_life_hours, submitted_by, submitted_at, review_status, \
                                  reviewed_by, reviewed_at, rejection_reason, promoted_to_vector_id";

// =============================================================================
// STAGING SERVICE
// =============================================================================

/// Workflow service over the shared pool; every successful transition also
/// appends a ledger entry (best-effort).
#[derive(Clone)]
pub struct StagingService {
    pool: Pool,
    ledger: AuditLedger,
}

impl StagingService {
    pub fn new(pool: Pool, ledger: AuditLedger) -> Self {
        Self { pool, ledger }
    }

    /// Create a PENDING submission on behalf of the calling principal.
    pub async fn submit(
        &self,
        sub: NewSubmission,
        actor: &str,
    ) -> Result<StagingSubmission, AppError> {
        validate_submission(&sub)?;

        let client = self.pool.get().await?;

        let submission_id = Uuid::new_v4();
        let now = Utc::now();

        client
            .execute(
                "INSERT INTO oracle_staging \
                 (submission_id, domain, narrative, probability, confidence, \
                  half_life_hours, submitted_by, submitted_at, review_status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING')",
                &[
                    &submission_id,
                    &sub.domain,
                    &sub.narrative,
                    &sub.probability,
                    &sub.confidence,
                    &sub.half_life_hours,
                    &actor,
                    &now,
                ],
            )
            .await
            .map_err(AppError::from_db)?;

        info!(
            "Staging submission {} created in domain '{}' by {}",
            submission_id, sub.domain, actor
        );

        self.ledger
            .append_best_effort(AuditRecord {
                action_type: ActionType::G0NarrativeSubmission,
                action_target: submission_id.to_string(),
                target_kind: "staging_submission".to_string(),
                initiated_by: actor.to_string(),
                decision: "PENDING_REVIEW".to_string(),
                decision_rationale: format!(
                    "domain={} probability={} confidence={} narrative=\"{}\"",
                    sub.domain,
                    sub.probability,
                    sub.confidence,
                    preview(&sub.narrative)
                ),
            })
            .await;

        Ok(StagingSubmission {
            submission_id,
            domain: sub.domain,
            narrative: sub.narrative,
            probability: sub.probability,
            confidence: sub.confidence,
            half_life_hours: sub.half_life_hours,
            submitted_by: actor.to_string(),
            submitted_at: now,
            review_status: ReviewStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            promoted_to_vector_id: None,
        })
    }

    /// Apply a reviewer verdict. Legal only from PENDING; applied as one
    /// conditional UPDATE so concurrent reviewers cannot both win.
    pub async fn review(
        &self,
        submission_id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        rejection_reason: Option<String>,
    ) -> Result<StagingSubmission, AppError> {
        if verdict == ReviewVerdict::Rejected
            && rejection_reason.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(AppError::Validation(
                "a rejection requires a rejectionReason".to_string(),
            ));
        }

        let target = verdict.target_status();
        // A reason only accompanies a rejection
        let rejection_reason = match verdict {
            ReviewVerdict::Rejected => rejection_reason,
            ReviewVerdict::Approved => None,
        };
        let client = self.pool.get().await?;
        let now = Utc::now();

        let sql = format!(
            "UPDATE oracle_staging \
             SET review_status = $1, reviewed_by = $2, reviewed_at = $3, rejection_reason = $4 \
             WHERE submission_id = $5 AND review_status = 'PENDING' \
             RETURNING {}",
            SUBMISSION_COLUMNS
        );
        let row = client
            .query_opt(
                sql.as_str(),
                &[
                    &target.as_str(),
                    &reviewer,
                    &now,
                    &rejection_reason,
                    &submission_id,
                ],
            )
            .await
            .map_err(AppError::from_db)?;

        let Some(row) = row else {
            return Err(self
                .transition_failure(&client, submission_id, target)
                .await);
        };
        let submission = row_to_submission(&row)?;

        info!(
            "Staging submission {} reviewed as {:?} by {}",
            submission_id, verdict, reviewer
        );

        self.ledger
            .append_best_effort(AuditRecord {
                action_type: ActionType::G0Review,
                action_target: submission_id.to_string(),
                target_kind: "staging_submission".to_string(),
                initiated_by: reviewer.to_string(),
                decision: target.as_str().to_string(),
                decision_rationale: submission
                    .rejection_reason
                    .clone()
                    .unwrap_or_else(|| format!("reviewed as {}", target.as_str())),
            })
            .await;

        Ok(submission)
    }

    /// Materialize an APPROVED submission into canonical storage. The gate
    /// update and the canonical insert run as one data-modifying statement,
    /// so a concurrent retry observes PROMOTED and fails cleanly.
    pub async fn promote(
        &self,
        submission_id: Uuid,
        actor: &str,
    ) -> Result<StagingSubmission, AppError> {
        let client = self.pool.get().await?;

        let vector_id = Uuid::new_v4();
        let now = Utc::now();

        let promoted = client
            .query_opt(
                "WITH gate AS ( \
                     UPDATE oracle_staging \
                     SET review_status = 'PROMOTED', promoted_to_vector_id = $2 \
                     WHERE submission_id = $1 AND review_status = 'APPROVED' \
                     RETURNING domain, narrative, probability, confidence, half_life_hours \
                 ) \
                 INSERT INTO oracle_vectors \
                 (vector_id, domain, narrative, probability, confidence, half_life_hours, \
                  promoted_from, created_at) \
                 SELECT $2, domain, narrative, probability, confidence, half_life_hours, $1, $3 \
                 FROM gate \
                 RETURNING vector_id",
                &[&submission_id, &vector_id, &now],
            )
            .await
            .map_err(AppError::from_db)?;

        if promoted.is_none() {
            return Err(self
                .transition_failure(&client, submission_id, ReviewStatus::Promoted)
                .await);
        }

        info!(
            "Staging submission {} promoted to vector {} by {}",
            submission_id, vector_id, actor
        );

        self.ledger
            .append_best_effort(AuditRecord {
                action_type: ActionType::G0Promotion,
                action_target: submission_id.to_string(),
                target_kind: "staging_submission".to_string(),
                initiated_by: actor.to_string(),
                decision: "PROMOTED".to_string(),
                decision_rationale: format!("materialized as vector {}", vector_id),
            })
            .await;

        self.get(submission_id).await
    }

    /// Fetch one submission.
    pub async fn get(&self, submission_id: Uuid) -> Result<StagingSubmission, AppError> {
        let client = self.pool.get().await?;

        let sql = format!(
            "SELECT {} FROM oracle_staging WHERE submission_id = $1",
            SUBMISSION_COLUMNS
        );
        let row = client
            .query_opt(sql.as_str(), &[&submission_id])
            .await
            .map_err(AppError::from_db)?
            .ok_or_else(|| {
                AppError::NotFound(format!("Submission {} not found", submission_id))
            })?;

        row_to_submission(&row)
    }

    /// List submissions, most recent first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<ReviewStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<StagingSubmission>, AppError> {
        let client = self.pool.get().await?;
        let limit = clamp_limit(limit);

        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM oracle_staging WHERE review_status = $1 \
                     ORDER BY submitted_at DESC LIMIT $2",
                    SUBMISSION_COLUMNS
                );
                client.query(sql.as_str(), &[&status.as_str(), &limit]).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM oracle_staging ORDER BY submitted_at DESC LIMIT $1",
                    SUBMISSION_COLUMNS
                );
                client.query(sql.as_str(), &[&limit]).await
            }
        }
        .map_err(AppError::from_db)?;

        rows.iter().map(row_to_submission).collect()
    }

    /// A conditional transition matched zero rows: either the submission does
    /// not exist, or it sits in a state the transition table does not admit.
    async fn transition_failure(
        &self,
        client: &deadpool_postgres::Client,
        submission_id: Uuid,
        target: ReviewStatus,
    ) -> AppError {
        let current = client
            .query_opt(
                "SELECT review_status FROM oracle_staging WHERE submission_id = $1",
                &[&submission_id],
            )
            .await;

        match current {
            Ok(Some(row)) => {
                let raw: String = row.get(0);
                let admissible = ReviewStatus::parse(&raw)
                    .map_or(false, |current| current.can_transition(target));
                if admissible {
                    // The state changed again between our conditional update
                    // and this read; the caller lost a race and may retry.
                    AppError::InvalidTransition(format!(
                        "submission {} was transitioned concurrently; re-read and retry",
                        submission_id
                    ))
                } else {
                    AppError::InvalidTransition(format!(
                        "cannot move submission {} from {} to {}",
                        submission_id,
                        raw,
                        target.as_str()
                    ))
                }
            }
            Ok(None) => AppError::NotFound(format!("Submission {} not found", submission_id)),
            Err(e) => AppError::from_db(e),
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= 160 {
        flat
    } else {
        let head: String = flat.chars().take(160).collect();
        format!("{}...", head)
    }
}

fn row_to_submission(row: &tokio_postgres::Row) -> Result<StagingSubmission, AppError> {
    let raw_status: String = row.get(8);
    let review_status = ReviewStatus::parse(&raw_status).ok_or_else(|| {
        AppError::Internal(format!("unrecognized review status '{}'", raw_status))
    })?;

    Ok(StagingSubmission {
        submission_id: row.get(0),
        domain: row.get(1),
        narrative: row.get(2),
        probability: row.get(3),
        confidence: row.get(4),
        half_life_hours: row.get(5),
        submitted_by: row.get(6),
        submitted_at: row.get(7),
        review_status,
        reviewed_by: row.get(9),
        reviewed_at: row.get(10),
        rejection_reason: row.get(11),
        promoted_to_vector_id: row.get(12),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> NewSubmission {
        NewSubmission {
            domain: "macro".to_string(),
            narrative: "rate regime likely to shift within the half-life window".to_string(),
            probability: 0.4,
            confidence: 0.6,
            half_life_hours: 24,
        }
    }

    #[test]
    fn test_transition_table_pending_paths() {
        assert!(ReviewStatus::Pending.can_transition(ReviewStatus::Approved));
        assert!(ReviewStatus::Pending.can_transition(ReviewStatus::Rejected));
        assert!(!ReviewStatus::Pending.can_transition(ReviewStatus::Promoted));
        assert!(!ReviewStatus::Pending.can_transition(ReviewStatus::Pending));
    }

    #[test]
    fn test_transition_table_approved_is_a_resting_state() {
        assert!(ReviewStatus::Approved.can_transition(ReviewStatus::Promoted));
        assert!(!ReviewStatus::Approved.can_transition(ReviewStatus::Approved));
        assert!(!ReviewStatus::Approved.can_transition(ReviewStatus::Rejected));
        assert!(!ReviewStatus::Approved.can_transition(ReviewStatus::Pending));
    }

    #[test]
    fn test_transition_table_terminal_states_admit_nothing() {
        for terminal in [ReviewStatus::Rejected, ReviewStatus::Promoted] {
            for target in [
                ReviewStatus::Pending,
                ReviewStatus::Approved,
                ReviewStatus::Rejected,
                ReviewStatus::Promoted,
            ] {
                assert!(
                    !terminal.can_transition(target),
                    "{:?} -> {:?} must be rejected",
                    terminal,
                    target
                );
            }
        }
    }

    #[test]
    fn test_validate_accepts_in_range_submission() {
        assert!(validate_submission(&submission()).is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_probability() {
        let mut sub = submission();
        sub.probability = 1.5;
        assert!(validate_submission(&sub).is_err());

        sub.probability = -0.1;
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let mut sub = submission();
        sub.confidence = 2.0;
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_validate_accepts_boundary_values() {
        let mut sub = submission();
        sub.probability = 0.0;
        sub.confidence = 1.0;
        assert!(validate_submission(&sub).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut sub = submission();
        sub.domain = "   ".to_string();
        assert!(validate_submission(&sub).is_err());

        let mut sub = submission();
        sub.narrative = String::new();
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_half_life() {
        let mut sub = submission();
        sub.half_life_hours = 0;
        assert!(validate_submission(&sub).is_err());
        sub.half_life_hours = -4;
        assert!(validate_submission(&sub).is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ReviewStatus::Pending,
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
            ReviewStatus::Promoted,
        ] {
            assert_eq!(ReviewStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReviewStatus::parse("MERGED"), None);
    }
}
