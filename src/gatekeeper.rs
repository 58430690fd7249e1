//! Query Gatekeeper
//!
//! Validates free-form read requests against a mutation blacklist before
//! execution. The blacklist is a blanket whole-word match anywhere in the
//! text, comments and string literals included. A column literally named
//! `update_time` is rejected; that false positive is the accepted cost of
//! never parsing SQL here.

use crate::error::AppError;
use crate::ledger::{ActionType, AuditLedger, AuditRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::Pool;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::time::Instant;
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

/// Mutation-class keywords; any whole-word occurrence rejects the statement.
/// Underscore counts as a word separator here, so `update_time` is caught
/// while `updated` is not.
static MUTATION_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^a-z0-9])(insert|update|delete|drop|create|alter|truncate|grant|revoke|execute|call)(?:$|[^a-z0-9])",
    )
    .expect("mutation keyword pattern is valid")
});

const PREVIEW_LEN: usize = 120;

/// Reject any statement containing a mutation-class keyword, case-insensitive,
/// whole-word, anywhere in the text.
pub fn validate_query(sql: &str) -> Result<(), AppError> {
    if let Some(captures) = MUTATION_KEYWORDS.captures(sql) {
        let keyword = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        return Err(AppError::PolicyViolation(format!(
            "query contains disallowed keyword '{}'; only read-only statements are permitted",
            keyword.to_lowercase()
        )));
    }
    Ok(())
}

/// Bounded preview of the query text for audit rationale.
pub fn query_preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_LEN {
        flat
    } else {
        let head: String = flat.chars().take(PREVIEW_LEN).collect();
        format!("{}...", head)
    }
}

/// Result of an executed ad-hoc query
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecution {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub duration_ms: u64,
}

/// Gatekeeper service: validates, executes against the read-only principal,
/// and ledgers every execution.
#[derive(Clone)]
pub struct QueryGatekeeper {
    pool: Pool,
    ledger: AuditLedger,
}

impl QueryGatekeeper {
    pub fn new(pool: Pool, ledger: AuditLedger) -> Self {
        Self { pool, ledger }
    }

    /// Validate and execute a free-form read query. On success exactly one
    /// audit entry is appended (best-effort); rejections are not ledgered.
    pub async fn execute(&self, sql: &str, actor: &str) -> Result<QueryExecution, AppError> {
        validate_query(sql)?;

        let client = self.pool.get().await?;

        let started = Instant::now();
        let rows = client.query(sql, &[]).await.map_err(AppError::from_db)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let json_rows: Vec<Value> = rows.iter().map(row_to_json).collect();
        let row_count = json_rows.len();

        info!(
            "Gatekeeper executed query for {}: {} rows in {}ms",
            actor, row_count, duration_ms
        );

        self.ledger
            .append_best_effort(AuditRecord {
                action_type: ActionType::DirectSqlQuery,
                action_target: "ad_hoc_query".to_string(),
                target_kind: "sql".to_string(),
                initiated_by: actor.to_string(),
                decision: "EXECUTED".to_string(),
                decision_rationale: format!(
                    "query=\"{}\" rows={} elapsed_ms={}",
                    query_preview(sql),
                    row_count,
                    duration_ms
                ),
            })
            .await;

        Ok(QueryExecution {
            rows: json_rows,
            row_count,
            duration_ms,
        })
    }
}

/// Convert a dynamically-typed row into a column-name-keyed JSON object.
/// Types outside the mapped set serialize as null rather than failing the
/// whole result.
fn row_to_json(row: &Row) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), cell_to_json(row, idx));
    }
    Value::Object(object)
}

fn cell_to_json(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();
    if *ty == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(idx), Value::Bool)
    } else if *ty == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(idx), |v| Value::Number(v.into()))
    } else if *ty == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(idx), |v| Value::Number(v.into()))
    } else if *ty == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(idx), |v| Value::Number(v.into()))
    } else if *ty == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(idx), |v| float(v as f64))
    } else if *ty == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(idx), float)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        opt(row.try_get::<_, Option<String>>(idx), Value::String)
    } else if *ty == Type::UUID {
        opt(row.try_get::<_, Option<Uuid>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if *ty == Type::TIMESTAMPTZ {
        opt(row.try_get::<_, Option<DateTime<Utc>>>(idx), |v| {
            Value::String(v.to_rfc3339())
        })
    } else if *ty == Type::TIMESTAMP {
        opt(row.try_get::<_, Option<NaiveDateTime>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if *ty == Type::DATE {
        opt(row.try_get::<_, Option<NaiveDate>>(idx), |v| {
            Value::String(v.to_string())
        })
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        opt(row.try_get::<_, Option<Value>>(idx), |v| v)
    } else {
        row.try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null)
    }
}

fn opt<T>(cell: Result<Option<T>, tokio_postgres::Error>, to_value: impl Fn(T) -> Value) -> Value {
    match cell {
        Ok(Some(v)) => to_value(v),
        _ => Value::Null,
    }
}

fn float(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_is_allowed() {
        assert!(validate_query("SELECT 1").is_ok());
        assert!(validate_query("select agent_id, status from agent_task_events").is_ok());
    }

    #[test]
    fn test_mutation_keyword_rejects_any_casing_and_position() {
        assert!(validate_query("DROP TABLE agents").is_err());
        assert!(validate_query("select * from t; DROP TABLE t").is_err());
        assert!(validate_query("select * from t where note = 'please Delete me'").is_err());
        assert!(validate_query("select 1 -- update later").is_err());
        assert!(validate_query("TrUnCaTe agent_task_events").is_err());
    }

    #[test]
    fn test_whole_word_only() {
        // Substrings of identifiers are not matches
        assert!(validate_query("select created_at from state_snapshots").is_ok());
        assert!(validate_query("select updated from t").is_ok());
        // But the bare word inside an identifier phrase is
        assert!(validate_query("select update_time from t").is_err());
    }

    #[test]
    fn test_all_blacklisted_keywords_reject() {
        for kw in [
            "insert", "update", "delete", "drop", "create", "alter", "truncate", "grant",
            "revoke", "execute", "call",
        ] {
            let sql = format!("select 1 where x = {}", kw);
            assert!(validate_query(&sql).is_err(), "keyword {} must reject", kw);
        }
    }

    #[test]
    fn test_rejection_is_policy_violation() {
        match validate_query("delete from t") {
            Err(AppError::PolicyViolation(msg)) => {
                assert!(msg.contains("delete"));
            }
            other => panic!("expected PolicyViolation, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_query_preview_flattens_and_truncates() {
        let sql = "select *\n  from   agent_task_events\n  where status = 'SUCCESS'";
        assert_eq!(
            query_preview(sql),
            "select * from agent_task_events where status = 'SUCCESS'"
        );

        let long = format!("select {}", "column_name, ".repeat(40));
        let preview = query_preview(&long);
        assert!(preview.chars().count() <= PREVIEW_LEN + 3);
        assert!(preview.ends_with("..."));
    }
}
