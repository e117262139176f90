mod erp;
pub mod ingestor;
pub mod status;
pub mod updater;

use std::sync::Arc;

use async_trait::async_trait;
use syncd_config::ErpConfig;
use syncd_domain::{ExternalId, InternalId, Order};
use syncd_store::TrackingStore;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::events::ConnectorEvent;
use ingestor::{Ingestor, IngestorConfig};
use status::{StatusTracker, StatusTrackerConfig};
use updater::Updater;

/// The reference ERP connector (§4.2.1): three cooperating loops — an
/// ingestor, a status tracker, and an updater invoked on demand — sharing one
/// Firebird database.
pub struct FirebirdConnector {
    erp: ErpConfig,
    ingestor: Arc<Ingestor>,
    status_tracker: Arc<StatusTracker>,
    updater: Updater,
    cancel: Mutex<Option<CancellationToken>>,
}

impl FirebirdConnector {
    pub fn new(erp: ErpConfig, store: Arc<dyn TrackingStore>) -> Self {
        FirebirdConnector {
            erp: erp.clone(),
            ingestor: Arc::new(Ingestor::new(erp.clone(), store.clone(), IngestorConfig::default())),
            status_tracker: Arc::new(StatusTracker::new(
                erp.clone(),
                store,
                StatusTrackerConfig::default(),
            )),
            updater: Updater::new(erp),
            cancel: Mutex::new(None),
        }
    }

    /// Installs the ERP schema triplet if absent. Called once at startup,
    /// before `start()`.
    pub async fn install_schema(&self) -> Result<(), ConnectorError> {
        let erp = self.erp.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = erp::connect(&erp)?;
            erp::install_schema(&mut conn)
        })
        .await
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?
    }
}

#[async_trait]
impl Connector for FirebirdConnector {
    async fn start(&self, events: mpsc::Sender<ConnectorEvent>) -> Result<(), ConnectorError> {
        self.install_schema().await?;

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        tokio::spawn(self.ingestor.clone().run(events.clone(), token.clone()));
        tokio::spawn(self.status_tracker.clone().run(events, token));
        info!("firebird connector started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        Ok(())
    }

    fn needs_driver_mapping(&self) -> bool {
        true
    }

    async fn list_local_drivers(&self) -> Result<Vec<(String, String)>, ConnectorError> {
        let erp = self.erp.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = erp::connect(&erp)?;
            let rows: Vec<(String, String)> = conn
                .query("SELECT CD_MOTORISTA, NOME FROM DRIVERS", ())
                .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
            Ok(rows)
        })
        .await
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?
    }

    async fn fetch_order_details(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<Order>, ConnectorError> {
        let erp = self.erp.clone();
        let sale_id = internal_id.as_str().to_string();
        let details = tokio::task::spawn_blocking(move || {
            let mut conn = erp::connect(&erp)?;
            erp::fetch_sale_details(&mut conn, &[sale_id])
        })
        .await
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))??;

        Ok(details.into_iter().next().and_then(|d| {
            Order::new(&d.sale_id, d.customer_name, d.address, d.created_at)
                .ok()
                .map(|mut o| {
                    o.customer_contact = d.customer_contact;
                    o.address2 = d.address2;
                    o.neighbourhood = d.neighbourhood;
                    o.reference = d.reference;
                    o
                })
        }))
    }

    async fn mark_delivery_in_route(
        &self,
        order: &Order,
        remote_driver_id: &str,
    ) -> Result<(), ConnectorError> {
        self.updater.set_in_route(order, remote_driver_id).await
    }

    async fn mark_delivery_done(&self, order: &Order) -> Result<(), ConnectorError> {
        self.updater.set_done(order).await
    }

    async fn on_added(
        &self,
        internal_id: &InternalId,
        external_id: &ExternalId,
    ) -> Result<(), ConnectorError> {
        info!(%internal_id, %external_id, "order added in cloud");
        Ok(())
    }

    async fn on_rejected(&self, internal_id: &InternalId) -> Result<(), ConnectorError> {
        info!(%internal_id, "order rejected by cloud");
        Ok(())
    }

    async fn on_deleted_in_cloud(&self, order: &Order) -> Result<(), ConnectorError> {
        info!(internal_id = %order.internal_id, "order deleted in cloud; no ERP write-back required");
        Ok(())
    }

    async fn on_route_started_in_cloud(
        &self,
        order: &Order,
        remote_driver_id: &str,
    ) -> Result<(), ConnectorError> {
        self.updater.set_in_route(order, remote_driver_id).await
    }

    async fn on_route_ended_in_cloud(&self, order: &Order) -> Result<(), ConnectorError> {
        self.updater.set_done(order).await
    }
}
