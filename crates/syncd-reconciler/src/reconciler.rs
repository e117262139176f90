use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use syncd_cloud::{CloudClient, CooldownMap};
use syncd_config::ReconciliationConfig;
use syncd_domain::{Clock, DeliveryStatus, ExternalId, SystemClock};
use syncd_store::TrackingStore;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ReconcilerError;
use crate::events::ReconcilerEvent;

/// Periodic, pull-based diff against the cloud's view of the world (§4.5).
/// Never mutates the cloud and never enqueues dispatcher tasks — it only
/// corrects local state and emits events for the orchestrator to relay.
pub struct Reconciler {
    cloud: Arc<CloudClient>,
    store: Arc<dyn TrackingStore>,
    cooldown: CooldownMap,
    cfg: ReconciliationConfig,
    clock: Arc<dyn Clock>,
    last_tick: RwLock<Option<DateTime<Utc>>>,
}

impl Reconciler {
    pub fn new(
        cloud: Arc<CloudClient>,
        store: Arc<dyn TrackingStore>,
        cooldown: CooldownMap,
        cfg: ReconciliationConfig,
    ) -> Self {
        Reconciler::with_clock(cloud, store, cooldown, cfg, Arc::new(SystemClock))
    }

    /// Test seam (§9): a `FakeClock` lets `last_tick()` assertions run without
    /// sleeping for real time.
    pub fn with_clock(
        cloud: Arc<CloudClient>,
        store: Arc<dyn TrackingStore>,
        cooldown: CooldownMap,
        cfg: ReconciliationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Reconciler { cloud, store, cooldown, cfg, clock, last_tick: RwLock::new(None) }
    }

    /// When the last completed reconciliation cycle finished, for the ops
    /// status surface. `None` before the first cycle runs.
    pub async fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.read().await
    }

    pub async fn run(self: Arc<Self>, events: mpsc::Sender<ReconcilerEvent>, cancel: CancellationToken) {
        if !self.cfg.enabled {
            info!("reconciler disabled by configuration");
            return;
        }
        let mut ticker = tokio::time::interval(self.cfg.sync_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reconciler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(&events).await {
                        warn!(error = %e, "reconciliation cycle failed");
                    }
                }
            }
        }
    }

    async fn run_once(&self, events: &mpsc::Sender<ReconcilerEvent>) -> Result<(), ReconcilerError> {
        let snapshot = self.cloud.get_full_global_snapshot().await?;
        let remote: HashMap<ExternalId, (String, Option<String>)> = snapshot
            .deliveries
            .into_iter()
            .map(|d| (ExternalId::new(d.id), (d.status, d.deliveryman_id)))
            .collect();

        let local = self.store.snapshot_for_reconciler().await?;
        let cooldown_window = self.cfg.cooldown;

        for (internal_id, external_id, local_status) in local {
            if self.cooldown.is_hot(&external_id, cooldown_window) {
                debug!(%internal_id, %external_id, "skipping id touched recently by push channel");
                continue;
            }

            match remote.get(&external_id) {
                None => {
                    self.store.update_status(&internal_id, DeliveryStatus::Missing, None).await?;
                    let _ = events.send(ReconcilerEvent::DeliveryMissing(internal_id)).await;
                }
                Some((code, deliveryman_id)) => {
                    let mapped = DeliveryStatus::from_cloud_code(code);
                    if mapped != local_status {
                        self.store
                            .update_status(&internal_id, mapped, deliveryman_id.clone())
                            .await?;
                        if mapped == DeliveryStatus::InProgress {
                            if let Some(driver) = deliveryman_id {
                                let _ = events
                                    .send(ReconcilerEvent::DeliveryInRoute(internal_id, driver.clone()))
                                    .await;
                            }
                        }
                    }
                }
            }
        }

        self.cooldown.prune(cooldown_window);
        *self.last_tick.write().await = Some(self.clock.now());
        Ok(())
    }
}
