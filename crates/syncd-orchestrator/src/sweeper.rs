use std::sync::Arc;
use std::time::Duration;

use syncd_store::TrackingStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Owns the daily pass that drops terminal records older than `retention`
/// (§4.1, supplemented — the store only exposes the mechanism, something has
/// to call it on a schedule). Runs once immediately on startup so a freshly
/// restarted daemon doesn't wait a full day before its first sweep.
pub async fn run(store: Arc<dyn TrackingStore>, retention: Duration, cancel: CancellationToken) {
    loop {
        match store.prune(retention).await {
            Ok(removed) => info!(removed, "retention sweep complete"),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
        }
    }
}
