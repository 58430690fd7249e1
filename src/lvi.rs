//! Derived Metric Engine (Learning Velocity Index)
//!
//! Reads the append-only LVI time series and derives a letter grade plus a
//! trend from consecutive readings. Scores and percentages stay at full
//! precision here; rounding happens only at the response boundary.

use crate::error::AppError;
use crate::ledger::clamp_limit;
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One LVI computation cycle, as persisted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LviReading {
    pub lvi_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub lvi_score: f64,
    pub completed_experiments: i32,
    pub median_evaluation_time_hours: f64,
    pub coverage_rate: f64,
    pub integrity_rate: f64,
    pub time_factor: f64,
    pub brier_component: f64,
    pub computation_method: String,
    pub drivers: serde_json::Value,
}

/// Trend direction between the two most recent readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

/// Trend over the two most recent readings; pct is full-precision
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub direction: TrendDirection,
    pub pct: f64,
}

impl Trend {
    pub fn stable() -> Self {
        Self {
            direction: TrendDirection::Stable,
            pct: 0.0,
        }
    }
}

// =============================================================================
// PURE DERIVATIONS
// =============================================================================

/// Letter grade over closed, ordered thresholds.
pub fn grade(score: f64) -> char {
    if score >= 0.8 {
        'A'
    } else if score >= 0.6 {
        'B'
    } else if score >= 0.4 {
        'C'
    } else if score >= 0.2 {
        'D'
    } else {
        'F'
    }
}

/// Compare the two most recent readings (index 0 = latest). Fewer than two
/// readings, or a non-positive previous score, is STABLE at 0% by definition,
/// never an error.
pub fn trend(history: &[LviReading]) -> Trend {
    if history.len() < 2 {
        return Trend::stable();
    }

    let latest = history[0].lvi_score;
    let previous = history[1].lvi_score;
    if previous <= 0.0 {
        return Trend::stable();
    }

    let pct = (latest - previous) / previous * 100.0;
    let direction = if pct > 5.0 {
        TrendDirection::Improving
    } else if pct < -5.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    Trend { direction, pct }
}

/// Round to one decimal place. Presentation boundary only.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// =============================================================================
// METRIC ENGINE
// =============================================================================

const READING_COLUMNS: &str = "lvi_id, computed_at, lvi_score, completed_experiments, \
                               median_evaluation_time_hours, coverage_rate, integrity_rate, \
                               time_factor, brier_component, computation_method, drivers";

/// Read side of the LVI time series
#[derive(Clone)]
pub struct LviEngine {
    pool: Pool,
}

impl LviEngine {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Readings inside the window, most recent first. The two most recent
    /// entries are the trend inputs; a larger window serves the history view.
    pub async fn history(
        &self,
        window_days: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<LviReading>, AppError> {
        let client = self.pool.get().await?;
        let limit = clamp_limit(limit);

        let rows = match window_days {
            Some(days) if days > 0 => {
                let since = Utc::now() - Duration::days(days);
                let sql = format!(
                    "SELECT {} FROM lvi_readings WHERE computed_at >= $1 \
                     ORDER BY computed_at DESC LIMIT $2",
                    READING_COLUMNS
                );
                client.query(sql.as_str(), &[&since, &limit]).await
            }
            _ => {
                let sql = format!(
                    "SELECT {} FROM lvi_readings ORDER BY computed_at DESC LIMIT $1",
                    READING_COLUMNS
                );
                client.query(sql.as_str(), &[&limit]).await
            }
        }
        .map_err(AppError::from_db)?;

        Ok(rows.iter().map(row_to_reading).collect())
    }
}

fn row_to_reading(row: &tokio_postgres::Row) -> LviReading {
    LviReading {
        lvi_id: row.get(0),
        computed_at: row.get(1),
        lvi_score: row.get(2),
        completed_experiments: row.get(3),
        median_evaluation_time_hours: row.get(4),
        coverage_rate: row.get(5),
        integrity_rate: row.get(6),
        time_factor: row.get(7),
        brier_component: row.get(8),
        computation_method: row.get(9),
        drivers: row.get(10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reading(score: f64) -> LviReading {
        LviReading {
            lvi_id: Uuid::new_v4(),
            computed_at: Utc::now(),
            lvi_score: score,
            completed_experiments: 12,
            median_evaluation_time_hours: 6.5,
            coverage_rate: 0.7,
            integrity_rate: 0.9,
            time_factor: 0.8,
            brier_component: 0.3,
            computation_method: "composite_v2".to_string(),
            drivers: serde_json::json!({"coverage": "stable"}),
        }
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(grade(0.8), 'A');
        assert_eq!(grade(0.79999), 'B');
        assert_eq!(grade(0.6), 'B');
        assert_eq!(grade(0.59999), 'C');
        assert_eq!(grade(0.4), 'C');
        assert_eq!(grade(0.2), 'D');
        assert_eq!(grade(0.19999), 'F');
        assert_eq!(grade(0.0), 'F');
        assert_eq!(grade(1.0), 'A');
    }

    #[test]
    fn test_trend_improving() {
        let history = vec![reading(0.50), reading(0.40)];
        let t = trend(&history);
        assert_eq!(t.direction, TrendDirection::Improving);
        assert!((t.pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_declining() {
        let history = vec![reading(0.40), reading(0.50)];
        let t = trend(&history);
        assert_eq!(t.direction, TrendDirection::Declining);
        assert!((t.pct - (-20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_trend_small_move_is_stable() {
        let history = vec![reading(0.51), reading(0.50)];
        let t = trend(&history);
        assert_eq!(t.direction, TrendDirection::Stable);
        assert!(t.pct > 0.0 && t.pct <= 5.0);
    }

    #[test]
    fn test_trend_single_reading_is_stable_zero() {
        let t = trend(&[reading(0.5)]);
        assert_eq!(t.direction, TrendDirection::Stable);
        assert_eq!(t.pct, 0.0);

        let t = trend(&[]);
        assert_eq!(t.direction, TrendDirection::Stable);
        assert_eq!(t.pct, 0.0);
    }

    #[test]
    fn test_trend_zero_previous_is_stable() {
        let history = vec![reading(0.5), reading(0.0)];
        let t = trend(&history);
        assert_eq!(t.direction, TrendDirection::Stable);
        assert_eq!(t.pct, 0.0);
    }

    #[test]
    fn test_round1_presentation_only() {
        assert_eq!(round1(24.96), 25.0);
        assert_eq!(round1(-19.999), -20.0);
        assert_eq!(round1(3.14), 3.1);
    }
}
