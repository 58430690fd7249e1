//! Audit Ledger
//!
//! Append-only record of governance-relevant actions, linked by a hash-chain
//! id, plus the read side of the agent task-event feed. Entries are never
//! updated or deleted; corrections are new entries referencing the original.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

/// Rationale text is bounded so oversized payloads cannot bloat the ledger
pub const MAX_RATIONALE_LEN: usize = 1000;

/// Listing limits: default page size and hard ceiling
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

// =============================================================================
// DATA TYPES
// =============================================================================

/// Governance-relevant action classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    DirectSqlQuery,
    G0NarrativeSubmission,
    G0Review,
    G0Promotion,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::DirectSqlQuery => "DIRECT_SQL_QUERY",
            ActionType::G0NarrativeSubmission => "G0_NARRATIVE_SUBMISSION",
            ActionType::G0Review => "G0_REVIEW",
            ActionType::G0Promotion => "G0_PROMOTION",
        }
    }
}

/// An immutable ledger entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub action_type: String,
    pub action_target: String,
    pub target_kind: String,
    pub initiated_by: String,
    pub decision: String,
    pub decision_rationale: String,
    pub hash_chain_id: String,
    pub created_at: DateTime<Utc>,
}

/// Input for a new ledger entry; id, chain id, and timestamp are assigned on
/// append.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub action_type: ActionType,
    pub action_target: String,
    pub target_kind: String,
    pub initiated_by: String,
    pub decision: String,
    pub decision_rationale: String,
}

/// Task lifecycle status reported by agent processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Error,
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => TaskStatus::Pending,
            "RUNNING" => TaskStatus::Running,
            "SUCCESS" => TaskStatus::Success,
            "FAILED" => TaskStatus::Failed,
            // Unknown statuses are treated as errored rather than healthy
            _ => TaskStatus::Error,
        }
    }
}

/// Derived classification of a task event; computed, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GovernanceFlag {
    Ok,
    Alert,
    Info,
}

/// One unit of agent work, as read back from the feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskEvent {
    pub task_id: String,
    pub agent_id: String,
    pub task_name: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub cost_usd: Option<f64>,
    pub provider: String,
    pub signature_hash: String,
    pub quad_hash: String,
    pub fallback_used: bool,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub governance_flag: GovernanceFlag,
}

/// Summary counts over a ledger listing; derived, never stored
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRollup {
    pub total: usize,
    pub ok_count: usize,
    pub alert_count: usize,
    pub info_count: usize,
    pub distinct_agents: usize,
}

// =============================================================================
// PURE DERIVATIONS
// =============================================================================

/// Classify a task event. Single source of truth for the OK/ALERT/INFO flag.
pub fn governance_flag(status: TaskStatus, retry_count: i32, fallback_used: bool) -> GovernanceFlag {
    if matches!(status, TaskStatus::Failed | TaskStatus::Error) || retry_count > 0 || fallback_used
    {
        GovernanceFlag::Alert
    } else if status == TaskStatus::Success {
        GovernanceFlag::Ok
    } else {
        GovernanceFlag::Info
    }
}

/// Derive the hash-chain grouping key for an entry: SHA-256 over the UTC day
/// and action type, truncated to 16 hex chars. Entries of the same class on
/// the same day share a chain, which is what forensic reconstruction keys on.
pub fn hash_chain_id(action_type: ActionType, at: DateTime<Utc>) -> String {
    let material = format!("{}:{}", at.format("%Y-%m-%d"), action_type.as_str());
    let digest = Sha256::digest(material.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Bound rationale text, marking the cut so readers know it was elided.
pub fn truncate_rationale(text: &str) -> String {
    if text.chars().count() <= MAX_RATIONALE_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_RATIONALE_LEN - 3).collect();
        format!("{}...", head)
    }
}

/// Clamp a requested page size to the allowed window.
pub fn clamp_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Roll up a page of task events into summary counts.
pub fn compute_rollup(events: &[AgentTaskEvent]) -> LedgerRollup {
    let mut ok = 0;
    let mut alert = 0;
    let mut info = 0;
    let mut agents: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for event in events {
        match event.governance_flag {
            GovernanceFlag::Ok => ok += 1,
            GovernanceFlag::Alert => alert += 1,
            GovernanceFlag::Info => info += 1,
        }
        agents.insert(event.agent_id.as_str());
    }

    LedgerRollup {
        total: events.len(),
        ok_count: ok,
        alert_count: alert,
        info_count: info,
        distinct_agents: agents.len(),
    }
}

// =============================================================================
// LEDGER SERVICE
// =============================================================================

/// Ledger service over the shared pool. Cheap to clone; every component that
/// must record its effects holds one.
#[derive(Clone)]
pub struct AuditLedger {
    pool: Pool,
}

impl AuditLedger {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Append an entry and return its id.
    pub async fn append(&self, record: AuditRecord) -> Result<Uuid, AppError> {
        let client = self.pool.get().await?;

        let entry_id = Uuid::new_v4();
        let now = Utc::now();
        let chain = hash_chain_id(record.action_type, now);
        let rationale = truncate_rationale(&record.decision_rationale);

        client
            .execute(
                "INSERT INTO governance_audit_log \
                 (entry_id, action_type, action_target, target_kind, initiated_by, \
                  decision, decision_rationale, hash_chain_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                &[
                    &entry_id,
                    &record.action_type.as_str(),
                    &record.action_target,
                    &record.target_kind,
                    &record.initiated_by,
                    &record.decision,
                    &rationale,
                    &chain,
                    &now,
                ],
            )
            .await
            .map_err(AppError::from_db)?;

        Ok(entry_id)
    }

    /// Append after a primary action already succeeded. The primary result is
    /// authoritative: a ledger failure here is logged and swallowed, never
    /// surfaced to the caller.
    pub async fn append_best_effort(&self, record: AuditRecord) {
        let action = record.action_type.as_str();
        let target = record.action_target.clone();
        if let Err(e) = self.append(record).await {
            warn!(
                "Audit append failed for {} on {} (primary action already committed): {}",
                action, target, e
            );
        }
    }

    /// Most recent audit entries, newest first. `before` is a timestamp
    /// cursor: pass the last seen `created_at` to continue a listing.
    pub async fn query_audit(
        &self,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let client = self.pool.get().await?;
        let limit = clamp_limit(limit);

        let rows = client
            .query(
                "SELECT entry_id, action_type, action_target, target_kind, initiated_by, \
                        decision, decision_rationale, hash_chain_id, created_at \
                 FROM governance_audit_log \
                 WHERE ($2::TIMESTAMPTZ IS NULL OR created_at < $2) \
                 ORDER BY created_at DESC \
                 LIMIT $1",
                &[&limit, &before],
            )
            .await
            .map_err(AppError::from_db)?;

        Ok(rows
            .iter()
            .map(|row| AuditEntry {
                entry_id: row.get(0),
                action_type: row.get(1),
                action_target: row.get(2),
                target_kind: row.get(3),
                initiated_by: row.get(4),
                decision: row.get(5),
                decision_rationale: row.get(6),
                hash_chain_id: row.get(7),
                created_at: row.get(8),
            })
            .collect())
    }

    /// Task events, newest first, optionally filtered to one agent. `before`
    /// is a timestamp cursor over `started_at`.
    pub async fn query_task_events(
        &self,
        agent_id: Option<&str>,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<AgentTaskEvent>, AppError> {
        let client = self.pool.get().await?;
        let limit = clamp_limit(limit);

        const COLUMNS: &str = "task_id, agent_id, task_name, task_type, status, started_at, \
                               completed_at, latency_ms, cost_usd, provider, signature_hash, \
                               quad_hash, fallback_used, retry_count, error_message";

        let rows = match agent_id {
            Some(agent) => {
                let sql = format!(
                    "SELECT {} FROM agent_task_events \
                     WHERE agent_id = $1 AND ($3::TIMESTAMPTZ IS NULL OR started_at < $3) \
                     ORDER BY started_at DESC LIMIT $2",
                    COLUMNS
                );
                client.query(sql.as_str(), &[&agent, &limit, &before]).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM agent_task_events \
                     WHERE ($2::TIMESTAMPTZ IS NULL OR started_at < $2) \
                     ORDER BY started_at DESC LIMIT $1",
                    COLUMNS
                );
                client.query(sql.as_str(), &[&limit, &before]).await
            }
        }
        .map_err(AppError::from_db)?;

        Ok(rows
            .iter()
            .map(|row| {
                let status = TaskStatus::parse(row.get::<_, &str>(4));
                let fallback_used: bool = row.get(12);
                let retry_count: i32 = row.get(13);
                AgentTaskEvent {
                    task_id: row.get(0),
                    agent_id: row.get(1),
                    task_name: row.get(2),
                    task_type: row.get(3),
                    status,
                    started_at: row.get(5),
                    completed_at: row.get(6),
                    latency_ms: row.get(7),
                    cost_usd: row.get(8),
                    provider: row.get(9),
                    signature_hash: row.get(10),
                    quad_hash: row.get(11),
                    fallback_used,
                    retry_count,
                    error_message: row.get(14),
                    governance_flag: governance_flag(status, retry_count, fallback_used),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn event(status: TaskStatus, retry_count: i32, fallback_used: bool) -> AgentTaskEvent {
        AgentTaskEvent {
            task_id: "t-1".to_string(),
            agent_id: "atlas".to_string(),
            task_name: "scan".to_string(),
            task_type: "analysis".to_string(),
            status,
            started_at: Utc::now(),
            completed_at: None,
            latency_ms: None,
            cost_usd: None,
            provider: "anthropic".to_string(),
            signature_hash: "sig".to_string(),
            quad_hash: "quad".to_string(),
            fallback_used,
            retry_count,
            error_message: None,
            governance_flag: governance_flag(status, retry_count, fallback_used),
        }
    }

    #[test]
    fn test_governance_flag_clean_success_is_ok() {
        assert_eq!(
            governance_flag(TaskStatus::Success, 0, false),
            GovernanceFlag::Ok
        );
    }

    #[test]
    fn test_governance_flag_failure_is_alert_regardless_of_retries() {
        assert_eq!(
            governance_flag(TaskStatus::Failed, 0, false),
            GovernanceFlag::Alert
        );
        assert_eq!(
            governance_flag(TaskStatus::Error, 0, false),
            GovernanceFlag::Alert
        );
    }

    #[test]
    fn test_governance_flag_retry_or_fallback_taints_success() {
        assert_eq!(
            governance_flag(TaskStatus::Success, 2, false),
            GovernanceFlag::Alert
        );
        assert_eq!(
            governance_flag(TaskStatus::Success, 0, true),
            GovernanceFlag::Alert
        );
    }

    #[test]
    fn test_governance_flag_in_flight_is_info() {
        assert_eq!(
            governance_flag(TaskStatus::Running, 0, false),
            GovernanceFlag::Info
        );
        assert_eq!(
            governance_flag(TaskStatus::Pending, 0, false),
            GovernanceFlag::Info
        );
    }

    #[test]
    fn test_hash_chain_id_stable_within_day_and_action() {
        let morning = Utc.with_ymd_and_hms(2026, 8, 27, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 8, 27, 22, 30, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2026, 8, 28, 8, 0, 0).unwrap();

        let a = hash_chain_id(ActionType::DirectSqlQuery, morning);
        let b = hash_chain_id(ActionType::DirectSqlQuery, evening);
        let c = hash_chain_id(ActionType::DirectSqlQuery, next_day);
        let d = hash_chain_id(ActionType::G0Promotion, morning);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_truncate_rationale_bounds_large_payloads() {
        let big = "x".repeat(5000);
        let out = truncate_rationale(&big);
        assert_eq!(out.chars().count(), MAX_RATIONALE_LEN);
        assert!(out.ends_with("..."));

        let small = "executed in 12ms";
        assert_eq!(truncate_rationale(small), small);
    }

    #[test]
    fn test_clamp_limit_default_and_ceiling() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(500)), 100);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
    }

    #[test]
    fn test_rollup_counts_flags_and_distinct_agents() {
        let mut events = vec![
            event(TaskStatus::Success, 0, false),
            event(TaskStatus::Failed, 0, false),
            event(TaskStatus::Running, 0, false),
            event(TaskStatus::Success, 1, false),
        ];
        events[1].agent_id = "hermes".to_string();

        let rollup = compute_rollup(&events);
        assert_eq!(rollup.total, 4);
        assert_eq!(rollup.ok_count, 1);
        assert_eq!(rollup.alert_count, 2);
        assert_eq!(rollup.info_count, 1);
        assert_eq!(rollup.distinct_agents, 2);
    }

    #[test]
    fn test_unknown_status_parses_to_error() {
        assert_eq!(TaskStatus::parse("SOMETHING_NEW"), TaskStatus::Error);
        assert_eq!(TaskStatus::parse("ERROR"), TaskStatus::Error);
        assert_eq!(TaskStatus::parse("SUCCESS"), TaskStatus::Success);
    }
}
