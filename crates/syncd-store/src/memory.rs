use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use syncd_domain::{Clock, DeliveryStatus, DriverMapping, ExternalId, InternalId, SystemClock, TrackingRecord};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{DriverMappingStore, TrackingStore};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<InternalId, TrackingRecord>,
    external_index: HashMap<ExternalId, InternalId>,
    drivers: HashMap<String, String>, // remote_id -> local_id
}

/// In-memory implementation of [`TrackingStore`] and [`DriverMappingStore`].
///
/// All data is lost on process exit. Used by the file-watching connector's
/// tests and by the orchestrator's own test suite in place of a SQLite file.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::with_clock(Arc::new(SystemClock))
    }

    /// Test seam (§9): a `FakeClock` makes `prune()`'s retention cutoff
    /// deterministic instead of depending on real elapsed time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryStore { inner: Arc::new(RwLock::new(Inner::default())), clock }
    }
}

#[async_trait]
impl TrackingStore for InMemoryStore {
    async fn hydrate(&self) -> Result<(), StoreError> {
        // Nothing to load from: the cache already is the store.
        Ok(())
    }

    async fn reserve(&self, internal_id: &InternalId) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.records.contains_key(internal_id) {
            return Ok(false);
        }
        let now = Utc::now();
        guard
            .records
            .insert(internal_id.clone(), TrackingRecord::reserved(internal_id.clone(), now));
        Ok(true)
    }

    async fn register(
        &self,
        internal_id: &InternalId,
        external_id: ExternalId,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let cached_status = guard.records.get(internal_id).map(|r| r.status);
        let final_status = match cached_status {
            Some(s) if s != DeliveryStatus::Pending => s,
            _ => status,
        };
        let record = TrackingRecord {
            internal_id: internal_id.clone(),
            external_id: Some(external_id.clone()),
            status: final_status,
            deliveryman_id: guard.records.get(internal_id).and_then(|r| r.deliveryman_id.clone()),
            created_at: guard
                .records
                .get(internal_id)
                .map(|r| r.created_at)
                .unwrap_or(now),
            updated_at: now,
        };
        guard.external_index.insert(external_id, internal_id.clone());
        guard.records.insert(internal_id.clone(), record);
        Ok(())
    }

    async fn release(&self, internal_id: &InternalId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let should_remove = matches!(guard.records.get(internal_id), Some(r) if !r.is_bound());
        if should_remove {
            guard.records.remove(internal_id);
        }
        Ok(())
    }

    async fn update_status(
        &self,
        internal_id: &InternalId,
        status: DeliveryStatus,
        deliveryman_id: Option<String>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(record) = guard.records.get_mut(internal_id) {
            record.status = status;
            if deliveryman_id.is_some() {
                record.deliveryman_id = deliveryman_id;
            }
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn is_tracked(&self, internal_id: &InternalId) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.records.contains_key(internal_id))
    }

    async fn get_status(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<DeliveryStatus>, StoreError> {
        Ok(self.inner.read().await.records.get(internal_id).map(|r| r.status))
    }

    async fn get_external_id(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<ExternalId>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .get(internal_id)
            .and_then(|r| r.external_id.clone()))
    }

    async fn get_internal_id_by_external(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<InternalId>, StoreError> {
        Ok(self.inner.read().await.external_index.get(external_id).cloned())
    }

    async fn active_ids(&self) -> Result<Vec<InternalId>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .records
            .values()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.internal_id.clone())
            .collect())
    }

    async fn snapshot_for_reconciler(
        &self,
    ) -> Result<Vec<(InternalId, ExternalId, DeliveryStatus)>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .records
            .values()
            .filter(|r| !r.status.is_terminal())
            .filter_map(|r| {
                r.external_id
                    .clone()
                    .map(|ext| (r.internal_id.clone(), ext, r.status))
            })
            .collect())
    }

    async fn prune(&self, older_than: Duration) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        let cutoff = self.clock.now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let stale: Vec<InternalId> = guard
            .records
            .values()
            .filter(|r| r.status.is_terminal() && r.updated_at < cutoff)
            .map(|r| r.internal_id.clone())
            .collect();
        for id in &stale {
            if let Some(r) = guard.records.remove(id) {
                if let Some(ext) = r.external_id {
                    guard.external_index.remove(&ext);
                }
            }
        }
        Ok(stale.len() as u64)
    }

    async fn get_tracked_ids(&self) -> Result<Vec<InternalId>, StoreError> {
        Ok(self.inner.read().await.records.keys().cloned().collect())
    }

    async fn stop_tracking(&self, internal_id: &InternalId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(r) = guard.records.remove(internal_id) {
            if let Some(ext) = r.external_id {
                guard.external_index.remove(&ext);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DriverMappingStore for InMemoryStore {
    async fn add(&self, remote_id: &str, local_id: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.drivers.contains_key(remote_id) {
            return Ok(false);
        }
        guard.drivers.insert(remote_id.to_string(), local_id.to_string());
        Ok(true)
    }

    async fn add_many(&self, pairs: &[(String, String)]) -> Result<u64, StoreError> {
        let mut guard = self.inner.write().await;
        let mut inserted = 0u64;
        for (remote, local) in pairs {
            if !guard.drivers.contains_key(remote) {
                guard.drivers.insert(remote.clone(), local.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn lookup_local(&self, remote_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().await.drivers.get(remote_id).cloned())
    }

    async fn lookup_remote(&self, local_id: &str) -> Result<Option<String>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .drivers
            .iter()
            .find(|(_, local)| local.as_str() == local_id)
            .map(|(remote, _)| remote.clone()))
    }

    async fn delete(&self, remote_id: &str) -> Result<(), StoreError> {
        self.inner.write().await.drivers.remove(remote_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DriverMapping>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .drivers
            .iter()
            .map(|(remote_id, local_id)| DriverMapping {
                remote_id: remote_id.clone(),
                local_id: local_id.clone(),
            })
            .collect())
    }
}
