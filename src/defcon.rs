//! Snapshot-Derived Risk State
//!
//! Maps the most recent valid system-state snapshot to a discrete DEFCON
//! level. Reads here must never fail: dashboards and automated breakers poll
//! this continuously, and a hard error must not look like an escalation.
//! Absence of data is never elevated risk.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Discrete alert tier, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefconLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl DefconLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "GREEN" => Some(DefconLevel::Green),
            "YELLOW" => Some(DefconLevel::Yellow),
            "ORANGE" => Some(DefconLevel::Orange),
            "RED" => Some(DefconLevel::Red),
            _ => None,
        }
    }
}

/// Where the reported level came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSource {
    /// Read from the latest valid snapshot
    Snapshot,
    /// No valid snapshot exists; safe default
    Default,
    /// The read itself failed; safe default, failure logged
    Fallback,
}

/// Current risk payload, always constructible
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskStatus {
    pub level: DefconLevel,
    pub regime: String,
    pub source: RiskSource,
    pub state_vector_hash: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RiskStatus {
    /// GREEN/UNKNOWN payload used whenever no authoritative snapshot is
    /// readable.
    pub fn safe_default(source: RiskSource) -> Self {
        Self {
            level: DefconLevel::Green,
            regime: "UNKNOWN".to_string(),
            source,
            state_vector_hash: None,
            timestamp: None,
        }
    }
}

/// Risk-state reader over the shared pool
#[derive(Clone)]
pub struct RiskState {
    pool: Pool,
}

impl RiskState {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Current risk level. Infallible by contract: every failure path
    /// degrades to the GREEN/UNKNOWN payload with the failure logged.
    pub async fn current(&self) -> RiskStatus {
        match self.read_latest_valid().await {
            Ok(Some(status)) => status,
            Ok(None) => RiskStatus::safe_default(RiskSource::Default),
            Err(e) => {
                warn!("Risk-state read failed, serving safe default: {}", e);
                RiskStatus::safe_default(RiskSource::Fallback)
            }
        }
    }

    async fn read_latest_valid(&self) -> anyhow::Result<Option<RiskStatus>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                "SELECT defcon_level, regime_label, state_vector_hash, created_at \
                 FROM state_snapshots \
                 WHERE is_valid = TRUE \
                 ORDER BY created_at DESC \
                 LIMIT 1",
                &[],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_level: String = row.get(0);
        let Some(level) = DefconLevel::parse(&raw_level) else {
            // A snapshot with a level we cannot interpret is treated like a
            // failed read, not like elevated risk.
            warn!("Snapshot carries unrecognized defcon level '{}'", raw_level);
            return Ok(Some(RiskStatus::safe_default(RiskSource::Fallback)));
        };

        Ok(Some(RiskStatus {
            level,
            regime: row.get(1),
            source: RiskSource::Snapshot,
            state_vector_hash: Some(row.get(2)),
            timestamp: Some(row.get(3)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_by_severity() {
        assert!(DefconLevel::Green < DefconLevel::Yellow);
        assert!(DefconLevel::Yellow < DefconLevel::Orange);
        assert!(DefconLevel::Orange < DefconLevel::Red);
    }

    #[test]
    fn test_parse_known_levels() {
        assert_eq!(DefconLevel::parse("GREEN"), Some(DefconLevel::Green));
        assert_eq!(DefconLevel::parse("RED"), Some(DefconLevel::Red));
        assert_eq!(DefconLevel::parse("purple"), None);
        assert_eq!(DefconLevel::parse(""), None);
    }

    #[test]
    fn test_safe_default_is_green_unknown() {
        let status = RiskStatus::safe_default(RiskSource::Default);
        assert_eq!(status.level, DefconLevel::Green);
        assert_eq!(status.regime, "UNKNOWN");
        assert_eq!(status.source, RiskSource::Default);
        assert!(status.state_vector_hash.is_none());
        assert!(status.timestamp.is_none());

        let fallback = RiskStatus::safe_default(RiskSource::Fallback);
        assert_eq!(fallback.source, RiskSource::Fallback);
        assert_eq!(fallback.level, DefconLevel::Green);
    }
}
