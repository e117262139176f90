use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use syncd_config::ErpConfig;
use syncd_domain::{DeliveryStatus, InternalId};
use syncd_store::TrackingStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::ConnectorEvent;
use crate::firebird::erp;

const CANCELLATION_CODES: &[&str] = &["C", "D"];
const FINALIZATION_CODES: &[&str] = &["F", "E"];

#[derive(Debug, Clone)]
pub struct StatusTrackerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for StatusTrackerConfig {
    fn default() -> Self {
        StatusTrackerConfig { poll_interval: Duration::from_secs(30), batch_size: 50 }
    }
}

/// Detects cancellation/finalization in the ERP for orders already under
/// management (§4.2.1). Polls on a slower interval than the ingestor, with
/// the same in-flight semaphore discipline.
pub struct StatusTracker {
    erp: ErpConfig,
    store: Arc<dyn TrackingStore>,
    cfg: StatusTrackerConfig,
    in_flight: Arc<AtomicBool>,
}

impl StatusTracker {
    pub fn new(erp: ErpConfig, store: Arc<dyn TrackingStore>, cfg: StatusTrackerConfig) -> Self {
        StatusTracker { erp, store, cfg, in_flight: Arc::new(AtomicBool::new(false)) }
    }

    pub async fn run(self: Arc<Self>, events: mpsc::Sender<ConnectorEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("status tracker stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if self.in_flight.swap(true, Ordering::SeqCst) {
                        debug!("status tracker tick dropped: previous cycle still in flight");
                        continue;
                    }
                    let this = self.clone();
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.poll_once(&events).await {
                            error!(error = %e, "status tracker poll failed");
                        }
                        this.in_flight.store(false, Ordering::SeqCst);
                    });
                }
            }
        }
    }

    async fn poll_once(
        &self,
        events: &mpsc::Sender<ConnectorEvent>,
    ) -> Result<(), crate::error::ConnectorError> {
        let active = self.store.active_ids().await?;
        for chunk in active.chunks(self.cfg.batch_size) {
            let ids: Vec<String> = chunk.iter().map(|id| id.as_str().to_string()).collect();
            let erp = self.erp.clone();
            let codes = tokio::task::spawn_blocking(move || {
                let mut conn = erp::connect(&erp)?;
                erp::fetch_status_codes(&mut conn, &ids)
            })
            .await
            .map_err(|e| crate::error::ConnectorError::ErpIo(e.to_string()))??;

            for (sale_id, code) in codes {
                let internal_id = InternalId::canonicalize(&sale_id);
                if CANCELLATION_CODES.contains(&code.as_str()) {
                    let external_id = self.store.get_external_id(&internal_id).await?;
                    self.store.update_status(&internal_id, DeliveryStatus::Cancelled, None).await?;
                    let _ = events
                        .send(ConnectorEvent::OrderCancelled(internal_id, external_id))
                        .await;
                } else if FINALIZATION_CODES.contains(&code.as_str()) {
                    // Log only — wait for the cloud to confirm DELIVERED, never
                    // set it locally from an ERP-side finalization code.
                    debug!(sale_id, code, "ERP reports finalized; awaiting cloud confirmation");
                }
            }
        }
        Ok(())
    }
}
