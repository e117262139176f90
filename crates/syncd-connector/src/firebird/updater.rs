use syncd_config::ErpConfig;
use syncd_domain::Order;
use tracing::{info, warn};

use crate::error::ConnectorError;
use crate::firebird::erp;

/// Writes state back to the ERP on behalf of the connector's `on_*` and
/// `mark_delivery_*` callbacks. Success/failure is only used for logging —
/// the cloud side has already committed by the time these run.
pub struct Updater {
    erp: ErpConfig,
}

impl Updater {
    pub fn new(erp: ErpConfig) -> Self {
        Updater { erp }
    }

    pub async fn set_in_route(&self, order: &Order, driver_name: &str) -> Result<(), ConnectorError> {
        let erp = self.erp.clone();
        let sale_id = order.internal_id.as_str().to_string();
        let driver_name = driver_name.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = erp::connect(&erp)?;
            erp::set_in_route(&mut conn, &sale_id, &driver_name)
        })
        .await
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;

        match &result {
            Ok(()) => info!(internal_id = %order.internal_id, "wrote route-start back to ERP"),
            Err(e) => warn!(internal_id = %order.internal_id, error = %e, "failed to write route-start to ERP"),
        }
        result
    }

    pub async fn set_done(&self, order: &Order) -> Result<(), ConnectorError> {
        let erp = self.erp.clone();
        let sale_id = order.internal_id.as_str().to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = erp::connect(&erp)?;
            erp::set_done(&mut conn, &sale_id)
        })
        .await
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;

        match &result {
            Ok(()) => info!(internal_id = %order.internal_id, "wrote completion back to ERP"),
            Err(e) => warn!(internal_id = %order.internal_id, error = %e, "failed to write completion to ERP"),
        }
        result
    }
}
