//! Schema bootstrap
//!
//! DDL for the control-plane tables, applied idempotently at startup.
//! The audit log, task events, snapshots, and LVI readings are append-mostly;
//! staging rows mutate only through the review state machine.

use deadpool_postgres::Pool;
use tracing::info;

/// Append-only ledger of governance-relevant actions
const CREATE_AUDIT_LOG: &str = r#"
    CREATE TABLE IF NOT EXISTS governance_audit_log (
        entry_id UUID PRIMARY KEY,
        action_type VARCHAR(64) NOT NULL,
        action_target VARCHAR(255) NOT NULL,
        target_kind VARCHAR(64) NOT NULL,
        initiated_by VARCHAR(128) NOT NULL,
        decision VARCHAR(64) NOT NULL,
        decision_rationale TEXT NOT NULL,
        hash_chain_id VARCHAR(64) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
"#;

/// One row per unit of agent work, written by the agent processes themselves
const CREATE_TASK_EVENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS agent_task_events (
        task_id VARCHAR(128) PRIMARY KEY,
        agent_id VARCHAR(128) NOT NULL,
        task_name VARCHAR(255) NOT NULL,
        task_type VARCHAR(64) NOT NULL,
        status VARCHAR(16) NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ,
        latency_ms BIGINT,
        cost_usd DOUBLE PRECISION,
        provider VARCHAR(64) NOT NULL,
        signature_hash VARCHAR(128) NOT NULL,
        quad_hash VARCHAR(128) NOT NULL,
        fallback_used BOOLEAN NOT NULL DEFAULT FALSE,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT
    )
"#;

/// Periodic system-state snapshots; only the latest valid row is read
const CREATE_STATE_SNAPSHOTS: &str = r#"
    CREATE TABLE IF NOT EXISTS state_snapshots (
        snapshot_id UUID PRIMARY KEY,
        defcon_level VARCHAR(16) NOT NULL,
        regime_label VARCHAR(64) NOT NULL,
        state_vector_hash VARCHAR(128) NOT NULL,
        is_valid BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL
    )
"#;

/// G0 staging: narrative submissions awaiting human review
const CREATE_ORACLE_STAGING: &str = r#"
    CREATE TABLE IF NOT EXISTS oracle_staging (
        submission_id UUID PRIMARY KEY,
        domain VARCHAR(128) NOT NULL,
        narrative TEXT NOT NULL,
        probability DOUBLE PRECISION NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        half_life_hours INTEGER NOT NULL DEFAULT 24,
        submitted_by VARCHAR(128) NOT NULL,
        submitted_at TIMESTAMPTZ NOT NULL,
        review_status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
        reviewed_by VARCHAR(128),
        reviewed_at TIMESTAMPTZ,
        rejection_reason TEXT,
        promoted_to_vector_id UUID
    )
"#;

/// G1 canonical store; rows arrive only through staging promotion
const CREATE_ORACLE_VECTORS: &str = r#"
    CREATE TABLE IF NOT EXISTS oracle_vectors (
        vector_id UUID PRIMARY KEY,
        domain VARCHAR(128) NOT NULL,
        narrative TEXT NOT NULL,
        probability DOUBLE PRECISION NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        half_life_hours INTEGER NOT NULL,
        promoted_from UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
"#;

/// Learning Velocity Index time series
const CREATE_LVI_READINGS: &str = r#"
    CREATE TABLE IF NOT EXISTS lvi_readings (
        lvi_id UUID PRIMARY KEY,
        computed_at TIMESTAMPTZ NOT NULL,
        lvi_score DOUBLE PRECISION NOT NULL,
        completed_experiments INTEGER NOT NULL,
        median_evaluation_time_hours DOUBLE PRECISION NOT NULL,
        coverage_rate DOUBLE PRECISION NOT NULL,
        integrity_rate DOUBLE PRECISION NOT NULL,
        time_factor DOUBLE PRECISION NOT NULL,
        brier_component DOUBLE PRECISION NOT NULL,
        computation_method VARCHAR(64) NOT NULL,
        drivers JSONB NOT NULL
    )
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON governance_audit_log(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_task_events_started_at ON agent_task_events(started_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_task_events_agent_id ON agent_task_events(agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_state_snapshots_created_at ON state_snapshots(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_oracle_staging_submitted_at ON oracle_staging(submitted_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_oracle_staging_status ON oracle_staging(review_status)",
    "CREATE INDEX IF NOT EXISTS idx_lvi_readings_computed_at ON lvi_readings(computed_at DESC)",
];

/// Create control-plane tables if they don't exist
pub async fn create_tables(pool: &Pool) -> anyhow::Result<()> {
    let client = pool.get().await?;

    for ddl in [
        CREATE_AUDIT_LOG,
        CREATE_TASK_EVENTS,
        CREATE_STATE_SNAPSHOTS,
        CREATE_ORACLE_STAGING,
        CREATE_ORACLE_VECTORS,
        CREATE_LVI_READINGS,
    ] {
        client.execute(ddl, &[]).await?;
    }

    for idx in INDEXES {
        let _ = client.execute(*idx, &[]).await;
    }

    info!("✅ Control-plane tables initialized");
    Ok(())
}
