use std::sync::Arc;

use anyhow::Context;

use stockledger_infra::{AdjustmentEngine, LedgerConfig, PostgresStockStore, StockService, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env().context("failed to load configuration")?;
    stockledger_observability::init(&config.log_level);

    let pool = db::connect(&config.database)
        .await
        .context("failed to connect to postgres")?;
    db::apply_schema(&pool)
        .await
        .context("failed to apply stock_levels schema")?;

    let engine = AdjustmentEngine::new(PostgresStockStore::new(pool))
        .with_db_timeout(config.database.timeout);
    let services = Arc::new(StockService::new(Arc::new(engine)));

    let app = stockledger_api::app::build_app(services);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        environment = %config.environment,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
