use std::path::Path;
use std::sync::Arc;

use syncd_orchestrator::Orchestrator;
use syncd_store::{SqliteStore, TrackingStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts the daemon and blocks until SIGINT/SIGTERM (or Ctrl-C on other
/// platforms). Exit code mapping is the caller's job (§6): 0 on a clean
/// shutdown, 1 on anything that prevented the orchestrator from running at
/// all.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let cfg = syncd_config::load(config_path)?;
    let ops_http_bind = cfg.ops_http_bind.clone();

    let orchestrator = Arc::new(Orchestrator::bootstrap(cfg).await?);

    let api_state = Arc::new(syncd_api::AppState { orchestrator: orchestrator.clone() });
    let app = syncd_api::build_app(api_state);
    let listener = tokio::net::TcpListener::bind(&ops_http_bind).await?;
    info!(bind = %ops_http_bind, "ops http surface listening");
    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    orchestrator.run(cancel).await?;
    let _ = server.await?;
    Ok(())
}

/// Prints the tracking store's current contents without going through the
/// full startup sequence — no instance lock, no cloud connection, no
/// connector. Read-only from the CLI's point of view; SQLite's own file
/// locking arbitrates with a concurrently running daemon.
pub async fn status(config_path: &Path) -> anyhow::Result<()> {
    let cfg = syncd_config::load(config_path)?;
    let store = open_store(&cfg).await?;

    let counts = syncd_orchestrator::status_counts(&store).await?;
    let mut rows: Vec<(String, u64)> = counts.into_iter().map(|(s, n)| (s.to_string(), n)).collect();
    rows.sort();

    println!("tracked records by status:");
    if rows.is_empty() {
        println!("  (none)");
    }
    for (status, count) in rows {
        println!("  {status:<12} {count}");
    }
    Ok(())
}

/// Forces an immediate retention sweep, bypassing the daemon's daily
/// schedule.
pub async fn prune(config_path: &Path) -> anyhow::Result<()> {
    let cfg = syncd_config::load(config_path)?;
    let retention = cfg.retention;
    let store = open_store(&cfg).await?;
    let removed = store.prune(retention).await?;
    println!("removed {removed} terminal record(s) older than {retention:?}");
    Ok(())
}

async fn open_store(cfg: &syncd_config::Config) -> anyhow::Result<SqliteStore> {
    let path = cfg
        .store
        .sqlite_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("sqlite_path is not valid UTF-8"))?;
    let store = SqliteStore::connect(path).await?;
    store.hydrate().await?;
    Ok(store)
}
