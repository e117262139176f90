use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use syncd_config::ErpConfig;
use syncd_domain::Order;
use syncd_store::TrackingStore;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor::Cursor;
use crate::events::ConnectorEvent;
use crate::firebird::erp;

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub poll_interval: Duration,
    pub detail_retry_base: Duration,
    pub detail_retry_factor: u32,
    pub detail_retry_max_attempts: u32,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        IngestorConfig {
            poll_interval: Duration::from_secs(10),
            detail_retry_base: Duration::from_secs(2),
            detail_retry_factor: 2,
            detail_retry_max_attempts: 3,
        }
    }
}

/// Detects new deliveries via the `DELIVERYLOG` table (§4.2.1). Owns its own
/// timer and in-flight boolean; timer ticks that arrive while a cycle is
/// already running are dropped.
pub struct Ingestor {
    erp: ErpConfig,
    store: Arc<dyn TrackingStore>,
    cfg: IngestorConfig,
    cursor: Mutex<Cursor>,
    in_flight: Arc<AtomicBool>,
}

impl Ingestor {
    pub fn new(erp: ErpConfig, store: Arc<dyn TrackingStore>, cfg: IngestorConfig) -> Self {
        Ingestor {
            erp,
            store,
            cfg,
            cursor: Mutex::new(Cursor::starting_at(Utc::now())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(
        self: Arc<Self>,
        events: mpsc::Sender<ConnectorEvent>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("ingestor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if self.in_flight.swap(true, Ordering::SeqCst) {
                        debug!("ingestor tick dropped: previous cycle still in flight");
                        continue;
                    }
                    let this = self.clone();
                    let events = events.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.poll_once(&events, &cancel).await {
                            error!(error = %e, "ingestor poll failed");
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
        cancel: &CancellationToken,
    ) -> Result<(), crate::error::ConnectorError> {
        let mut cursor = self.cursor.lock().await;

        let erp = self.erp.clone();
        let rows = if let Some(last_id) = cursor.committed_id() {
            let conn_erp = erp.clone();
            tokio::task::spawn_blocking(move || {
                let mut conn = erp::connect(&conn_erp)?;
                erp::fetch_logs_since_id(&mut conn, last_id)
            })
            .await
            .map_err(|e| crate::error::ConnectorError::ErpIo(e.to_string()))??
        } else {
            let since = cursor.committed_time().expect("time mode has a committed_time");
            tokio::task::spawn_blocking(move || {
                let mut conn = erp::connect(&erp)?;
                erp::fetch_logs_since_time(&mut conn, since)
            })
            .await
            .map_err(|e| crate::error::ConnectorError::ErpIo(e.to_string()))??
        };

        cursor.prepare(&rows.iter().map(|r| (r.id, r.log_date)).collect::<Vec<_>>());

        let mut new_ids = Vec::new();
        for row in &rows {
            if row.action != "INSERT" {
                continue;
            }
            if self.store.is_tracked(&syncd_domain::InternalId::canonicalize(&row.sale_id)).await? {
                continue;
            }
            new_ids.push(row.sale_id.clone());
        }

        if new_ids.is_empty() {
            cursor.commit();
            return Ok(());
        }

        match self.fetch_details_with_retry(&new_ids, cancel).await {
            Ok(details) => {
                let mut emitted = 0;
                for d in details {
                    let order = match Order::new(&d.sale_id, d.customer_name, d.address, d.created_at) {
                        Ok(mut o) => {
                            o.customer_contact = d.customer_contact;
                            o.address2 = d.address2;
                            o.neighbourhood = d.neighbourhood;
                            o.reference = d.reference;
                            o
                        }
                        Err(e) => {
                            warn!(error = %e, sale_id = %d.sale_id, "skipping invalid order from ERP");
                            continue;
                        }
                    };
                    if self.store.reserve(&order.internal_id).await? {
                        emitted += 1;
                        let _ = events.send(ConnectorEvent::OrderNormalized(order)).await;
                    }
                }
                debug!(emitted, total_candidates = new_ids.len(), "ingestor cycle complete");
                cursor.commit();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "ingestor detail fetch exhausted retries, rolling back cursor");
                cursor.rollback();
                Ok(())
            }
        }
    }

    async fn fetch_details_with_retry(
        &self,
        sale_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<erp::SaleDetail>, crate::error::ConnectorError> {
        let mut attempt = 0;
        let mut delay = self.cfg.detail_retry_base;
        loop {
            attempt += 1;
            let erp = self.erp.clone();
            let ids = sale_ids.to_vec();
            let result = tokio::task::spawn_blocking(move || {
                let mut conn = erp::connect(&erp)?;
                erp::fetch_sale_details(&mut conn, &ids)
            })
            .await
            .map_err(|e| crate::error::ConnectorError::ErpIo(e.to_string()))?;

            match result {
                Ok(details) => return Ok(details),
                Err(e) if attempt >= self.cfg.detail_retry_max_attempts => return Err(e),
                Err(e) => {
                    warn!(error = %e, attempt, "detail fetch failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            return Err(crate::error::ConnectorError::ErpIo("cancelled during retry".into()));
                        }
                    }
                    delay *= self.cfg.detail_retry_factor;
                }
            }
        }
    }
}
