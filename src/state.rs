//! Application state management
//!
//! Shared state accessible across all handlers. Every service receives its
//! store handle explicitly from here; nothing reaches for a process-wide
//! singleton, which keeps the services testable against any pool.

use crate::defcon::RiskState;
use crate::gatekeeper::QueryGatekeeper;
use crate::ledger::AuditLedger;
use crate::lvi::LviEngine;
use crate::staging::StagingService;
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Append-only ledger; every mutating component records through it
    pub ledger: AuditLedger,

    /// Read-only query gate for ad-hoc SQL
    pub gatekeeper: QueryGatekeeper,

    /// Snapshot-derived risk state (DEFCON)
    pub risk: RiskState,

    /// G0 staging workflow
    pub staging: StagingService,

    /// Learning Velocity Index reader
    pub lvi: LviEngine,
}

impl AppState {
    pub fn new(pool: Pool) -> Self {
        let ledger = AuditLedger::new(pool.clone());

        Self {
            gatekeeper: QueryGatekeeper::new(pool.clone(), ledger.clone()),
            risk: RiskState::new(pool.clone()),
            staging: StagingService::new(pool.clone(), ledger.clone()),
            lvi: LviEngine::new(pool),
            ledger,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
