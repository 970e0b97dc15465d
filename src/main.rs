use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use learnhub_trust::{
    DatabasePool, MemoryStore, PgTrustStore, TrustConfig, TrustScoreEngine, TrustStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = TrustConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the LEARNHUB_TRUST_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting LearnHub trust ledger reconciliation");

    let level_policy = config.policy.to_level_policy()?;
    info!(
        thresholds = ?level_policy.thresholds(),
        "Trust level policy loaded"
    );

    let summary = if config.database.postgres_enabled {
        let db = DatabasePool::new(
            &config.database.postgres_url,
            config.database.max_connections,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("Database connection failed")?;
        db.init_schema()
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Schema initialization failed")?;

        let store = Arc::new(PgTrustStore::new(Arc::new(db)));
        reconcile(store, level_policy, "postgres").await?
    } else {
        warn!("PostgreSQL disabled, reconciling an empty in-memory store");
        let store = Arc::new(MemoryStore::new());
        reconcile(store, level_policy, "memory").await?
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn reconcile<S: TrustStore>(
    store: Arc<S>,
    policy: learnhub_trust::TrustLevelPolicy,
    backend: &str,
) -> Result<serde_json::Value> {
    let engine = TrustScoreEngine::new(store, policy);
    let report = engine
        .reconcile()
        .await
        .context("Score reconciliation failed")?;

    if report.is_clean() {
        info!(backend = backend, "Score cache matches the ledger");
    } else {
        warn!(
            backend = backend,
            repaired = report.repaired.len(),
            "Score cache repaired from the ledger"
        );
    }

    Ok(serde_json::json!({
        "backend": backend,
        "repaired": report.repaired,
    }))
}

fn init_logging(config: &TrustConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let span_events = if config.logging.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // RUST_LOG takes precedence over the configured level when present
    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_span_events(span_events)
                .finish(),
        ),
        Err(_) => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_max_level(log_level)
                .with_span_events(span_events)
                .finish(),
        ),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))
}
