//! Sentinel API - Governance Integrity Control Plane
//!
//! The control plane that sits between an autonomous agent fleet and its
//! durable store:
//! - Gatekeeper: ad-hoc data access is strictly read-only
//! - Ledger: every governance-relevant action lands in an append-only,
//!   hash-chain-linked audit trail
//! - DEFCON: a discrete risk level derived from the latest valid snapshot
//! - Oracle Staging: a human-gated submit -> review -> promote workflow
//!   before machine narratives become canonical data
//! - LVI: a bounded composite learning metric with grade and trend

mod config;
mod db;
mod defcon;
mod error;
mod gatekeeper;
mod ledger;
mod lvi;
mod models;
mod routes;
mod staging;
mod state;

use crate::config::{DatabaseConfig, Settings};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Sentinel - Governance Integrity Control Plane...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Initialize database pool - REQUIRED (the store is the source of truth)
    let state = match init_database_pool(&settings.database).await {
        Ok(pool) => {
            info!("✅ Database pool created successfully");

            if let Err(e) = db::create_tables(&pool).await {
                error!("❌ FATAL: Failed to initialize control-plane tables: {}", e);
                return Err(e);
            }

            Arc::new(AppState::new(pool))
        }
        Err(e) => {
            error!("❌ FATAL: Failed to initialize database pool: {}", e);
            error!("DATABASE_URL must be set in .env and database must be accessible");
            return Err(e);
        }
    };

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Gatekeeper ───");
    info!("   POST /api/query                  - Execute ad-hoc read-only query");
    info!("");
    info!("   ─── Audit Ledger ───");
    info!("   GET  /api/ledger                 - Agent task events + rollup");
    info!("   GET  /api/ledger/audit           - Raw audit entries");
    info!("");
    info!("   ─── Risk State ───");
    info!("   GET  /api/defcon                 - Current DEFCON level");
    info!("");
    info!("   ─── Oracle Staging ───");
    info!("   POST /api/staging                - Submit narrative (G0)");
    info!("   GET  /api/staging                - List submissions");
    info!("   POST /api/staging/:id/review     - Approve or reject");
    info!("   POST /api/staging/:id/promote    - Promote to canonical (G1)");
    info!("");
    info!("   ─── Learning Velocity Index ───");
    info!("   GET  /api/lvi                    - Current reading + grade + trend");
    info!("   GET  /api/lvi/history            - Reading history");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sentinel_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Initialize database pool from settings
async fn init_database_pool(db: &DatabaseConfig) -> anyhow::Result<deadpool_postgres::Pool> {
    use deadpool_postgres::{Config, ManagerConfig, RecyclingMethod};

    let mut cfg = Config::new();
    cfg.host = Some(db.host.clone());
    cfg.port = Some(db.port);
    cfg.user = Some(db.user.clone());
    cfg.password = Some(db.password.clone());
    cfg.dbname = Some(db.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    // Managed Postgres (Neon and friends) requires TLS
    let pool = if db.use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tls)
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;

    client
        .query_one("SELECT 1 as ok", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!("✅ Database connection successful (TLS: {})", db.use_tls);
    Ok(pool)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
