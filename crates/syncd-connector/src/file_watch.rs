use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use syncd_domain::{ExternalId, InternalId, Order};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::events::ConnectorEvent;

/// Shape a dropped-in JSON file must match. Field names mirror [`Order`]
/// directly; anything else is a malformed file.
#[derive(Debug, Deserialize)]
struct RawFileOrder {
    internal_id: String,
    customer_name: String,
    address: String,
    customer_contact: Option<String>,
    address2: Option<String>,
    neighbourhood: Option<String>,
    reference: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

/// Degenerate connector that watches a directory for new JSON records
/// (§4.2.2). Has no status tracking and does not require driver mapping;
/// exists to exercise the [`Connector`] contract with a second, much simpler
/// implementation.
pub struct FileWatchConnector {
    dir: PathBuf,
    debounce: Duration,
    cancel: Mutex<Option<CancellationToken>>,
}

impl FileWatchConnector {
    pub fn new(dir: PathBuf) -> Self {
        FileWatchConnector { dir, debounce: Duration::from_millis(300), cancel: Mutex::new(None) }
    }

    fn parse_file(path: &Path) -> Result<Order, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let raw: RawFileOrder = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        let created_at = raw.created_at.unwrap_or_else(Utc::now);
        let mut order = Order::new(&raw.internal_id, raw.customer_name, raw.address, created_at)
            .map_err(|e| e.to_string())?;
        order.customer_contact = raw.customer_contact;
        order.address2 = raw.address2;
        order.neighbourhood = raw.neighbourhood;
        order.reference = raw.reference;
        Ok(order)
    }
}

#[async_trait]
impl Connector for FileWatchConnector {
    async fn start(&self, events: mpsc::Sender<ConnectorEvent>) -> Result<(), ConnectorError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ConnectorError::Watch(format!("create watch dir: {e}")))?;

        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());

        let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<Event>>(64);
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res| {
                let _ = raw_tx.blocking_send(res);
            })
            .map_err(|e| ConnectorError::Watch(e.to_string()))?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConnectorError::Watch(e.to_string()))?;

        let debounce = self.debounce;
        tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the task.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("file watch connector stopping");
                        return;
                    }
                    maybe = raw_rx.recv() => {
                        let Some(res) = maybe else { return };
                        let Ok(event) = res else { continue };
                        if !matches!(event.kind, EventKind::Create(_)) {
                            continue;
                        }
                        // Debounce: give the writer time to finish flushing
                        // before we try to parse a possibly-partial file.
                        tokio::time::sleep(debounce).await;
                        for path in event.paths {
                            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                                continue;
                            }
                            match FileWatchConnector::parse_file(&path) {
                                Ok(order) => {
                                    let _ = events.send(ConnectorEvent::OrderNormalized(order)).await;
                                }
                                Err(e) => {
                                    warn!(path = %path.display(), error = %e, "skipping malformed order file");
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), ConnectorError> {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        Ok(())
    }

    fn needs_driver_mapping(&self) -> bool {
        false
    }

    async fn list_local_drivers(&self) -> Result<Vec<(String, String)>, ConnectorError> {
        Ok(Vec::new())
    }

    async fn fetch_order_details(
        &self,
        _internal_id: &InternalId,
    ) -> Result<Option<Order>, ConnectorError> {
        // The file-watch connector has no durable source of truth beyond the
        // tracking store itself; restore replay degrades to whatever the
        // store already has.
        Ok(None)
    }

    async fn mark_delivery_in_route(
        &self,
        _order: &Order,
        _remote_driver_id: &str,
    ) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn mark_delivery_done(&self, _order: &Order) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn on_added(
        &self,
        _internal_id: &InternalId,
        _external_id: &ExternalId,
    ) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn on_rejected(&self, _internal_id: &InternalId) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn on_deleted_in_cloud(&self, _order: &Order) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn on_route_started_in_cloud(
        &self,
        _order: &Order,
        _remote_driver_id: &str,
    ) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn on_route_ended_in_cloud(&self, _order: &Order) -> Result<(), ConnectorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.json");
        std::fs::write(
            &path,
            r#"{"internal_id":"10.0","customer_name":"A","address":"123 Main"}"#,
        )
        .unwrap();
        let order = FileWatchConnector::parse_file(&path).unwrap();
        assert_eq!(order.internal_id.as_str(), "10");
        assert_eq!(order.customer_name, "A");
    }

    #[test]
    fn rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileWatchConnector::parse_file(&path).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.json");
        std::fs::write(&path, r#"{"internal_id":"1","customer_name":"","address":"x"}"#).unwrap();
        assert!(FileWatchConnector::parse_file(&path).is_err());
    }
}
