use std::time::Duration;

use async_trait::async_trait;
use syncd_domain::{DeliveryStatus, ExternalId, InternalId};

use crate::error::StoreError;

/// Durable key/value over [`syncd_domain::TrackingRecord`], keyed by canonical
/// `internal_id`. Single logical owner; concurrent readers allowed, writers
/// serialized per key. All methods take raw ids and canonicalize internally
/// so callers never have to remember to.
#[async_trait]
pub trait TrackingStore: Send + Sync + 'static {
    /// Load all persisted records into the hot cache. Idempotent — safe to
    /// call more than once, later calls are a no-op refresh.
    async fn hydrate(&self) -> Result<(), StoreError>;

    /// Succeeds iff no record exists for this id; inserts (PENDING, unbound).
    /// Returning `false` is an expected outcome, not an error.
    async fn reserve(&self, internal_id: &InternalId) -> Result<bool, StoreError>;

    /// Promotes a reserved record to bound. If the cached status has already
    /// advanced past PENDING, the advanced status is persisted instead of
    /// `status` — see the advancement rule in the component design.
    async fn register(
        &self,
        internal_id: &InternalId,
        external_id: ExternalId,
        status: DeliveryStatus,
    ) -> Result<(), StoreError>;

    /// Removes the record iff it is still reserved (unbound). No-op
    /// otherwise — used to roll back a failed ADD.
    async fn release(&self, internal_id: &InternalId) -> Result<(), StoreError>;

    /// Transitions a bound record; writes through to disk.
    async fn update_status(
        &self,
        internal_id: &InternalId,
        status: DeliveryStatus,
        deliveryman_id: Option<String>,
    ) -> Result<(), StoreError>;

    async fn is_tracked(&self, internal_id: &InternalId) -> Result<bool, StoreError>;
    async fn get_status(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<DeliveryStatus>, StoreError>;
    async fn get_external_id(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<ExternalId>, StoreError>;
    async fn get_internal_id_by_external(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<InternalId>, StoreError>;

    /// Non-terminal internal ids; basis for periodic polling/reconciliation.
    async fn active_ids(&self) -> Result<Vec<InternalId>, StoreError>;

    /// (internal_id, external_id, status) for every bound, non-terminal
    /// record; the reconciler's diff input.
    async fn snapshot_for_reconciler(
        &self,
    ) -> Result<Vec<(InternalId, ExternalId, DeliveryStatus)>, StoreError>;

    /// Deletes terminal records older than `older_than`. Returns the count
    /// removed.
    async fn prune(&self, older_than: Duration) -> Result<u64, StoreError>;

    /// All canonical ids currently cached, regardless of status.
    async fn get_tracked_ids(&self) -> Result<Vec<InternalId>, StoreError>;

    /// Unconditional removal, bypassing the reserved-only check `release`
    /// applies. Used by the retention sweeper and explicit operator
    /// intervention.
    async fn stop_tracking(&self, internal_id: &InternalId) -> Result<(), StoreError>;
}

/// Persistent bidirectional map between remote driver ids and local driver
/// ids (component C9).
#[async_trait]
pub trait DriverMappingStore: Send + Sync + 'static {
    /// Inserts a new pairing. Returns `false` if `remote_id` is already
    /// mapped (duplicate), `true` on a fresh insert.
    async fn add(&self, remote_id: &str, local_id: &str) -> Result<bool, StoreError>;

    /// Insert-or-ignore for a batch of pairs, atomically. Returns the number
    /// of rows actually inserted.
    async fn add_many(&self, pairs: &[(String, String)]) -> Result<u64, StoreError>;

    async fn lookup_local(&self, remote_id: &str) -> Result<Option<String>, StoreError>;
    async fn lookup_remote(&self, local_id: &str) -> Result<Option<String>, StoreError>;
    async fn delete(&self, remote_id: &str) -> Result<(), StoreError>;
    async fn list_all(&self) -> Result<Vec<syncd_domain::DriverMapping>, StoreError>;
}
