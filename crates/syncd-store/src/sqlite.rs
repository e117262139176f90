use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use syncd_domain::{Clock, DeliveryStatus, DriverMapping, ExternalId, InternalId, SystemClock, TrackingRecord};
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::error::StoreError;
use crate::store::{DriverMappingStore, TrackingStore};

// DDL — idempotent; run at every startup via migrate(). Mirrors the schema in
// the external-interfaces section: DeliveryMapping / DeliverymenMapping, plus
// an AFTER-UPDATE trigger that refreshes updated_at.
const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS DeliveryMapping (
    external_delivery_id TEXT PRIMARY KEY,
    internal_delivery_id TEXT NOT NULL UNIQUE,
    status                TEXT NOT NULL CHECK (status IN
        ('PENDING','SENDING','ADDED','IN_PROGRESS','MISSING','DELIVERED','FAILED','CANCELLED')),
    deliveryman_id        TEXT,
    create_at             TIMESTAMP NOT NULL,
    updated_at            TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS PendingReservation (
    internal_delivery_id TEXT PRIMARY KEY,
    create_at            TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS DeliverymenMapping (
    velide_id TEXT PRIMARY KEY,
    local_id  TEXT NOT NULL UNIQUE
);

CREATE TRIGGER IF NOT EXISTS trg_delivery_mapping_touch
AFTER UPDATE ON DeliveryMapping
FOR EACH ROW
BEGIN
    UPDATE DeliveryMapping SET updated_at = CURRENT_TIMESTAMP
        WHERE external_delivery_id = NEW.external_delivery_id;
END;
"#;

/// A single mutation destined for the writer task. The cache is the source
/// of truth for reads; every variant here is the disk-side echo of a cache
/// mutation already applied (or about to be applied) in [`SqliteStore`].
enum WriteOp {
    InsertReservation {
        internal_id: InternalId,
        created_at: DateTime<Utc>,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    DeleteReservation {
        internal_id: InternalId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    UpsertRecord {
        record: TrackingRecord,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    DeleteRecord {
        internal_id: InternalId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    PruneTerminal {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<Result<u64, StoreError>>,
    },
    AddDriverMapping {
        remote_id: String,
        local_id: String,
        reply: oneshot::Sender<Result<bool, StoreError>>,
    },
    AddDriverMappings {
        pairs: Vec<(String, String)>,
        reply: oneshot::Sender<Result<u64, StoreError>>,
    },
    DeleteDriverMapping {
        remote_id: String,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

#[derive(Debug, Default)]
struct Cache {
    records: HashMap<InternalId, TrackingRecord>,
    external_index: HashMap<ExternalId, InternalId>,
    reservations: std::collections::HashSet<InternalId>,
    /// Status advancement observed for a reserved-only id, before `register`
    /// promotes it into `records` (§4.1: a concurrent status update can
    /// arrive while the ADD that will bind the external_id is still in
    /// flight). Cache-only — `PendingReservation` has no status column, so
    /// this is lost on restart, which just reopens the same narrow race
    /// window rather than regressing anything already bound.
    reserved_status: HashMap<InternalId, DeliveryStatus>,
    drivers: HashMap<String, String>,
}

/// SQLite-backed [`TrackingStore`] / [`DriverMappingStore`].
///
/// Reads are served entirely from an in-memory cache guarded by a single
/// `RwLock`; writes are handed to a dedicated background task over an
/// unbounded channel so the pool is only ever touched from one place. Callers
/// await a oneshot reply, so `register`/`update_status`/etc. only return once
/// the write actually committed — the serialization is invisible to them.
#[derive(Clone)]
pub struct SqliteStore {
    cache: Arc<RwLock<Cache>>,
    writer: mpsc::UnboundedSender<WriteOp>,
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Opens (creating if absent) the SQLite file at `path`, applies pragmas
    /// and migrations, and spawns the writer task. Does not hydrate — call
    /// [`TrackingStore::hydrate`] once construction completes.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        Self::connect_with_clock(path, Arc::new(SystemClock)).await
    }

    /// Test seam (§9): a `FakeClock` lets `prune()`'s retention cutoff be
    /// asserted deterministically instead of depending on real elapsed time.
    pub async fn connect_with_clock(path: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| StoreError::Persistence(format!("sqlite connect: {e}")))?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("pragma journal_mode: {e}")))?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("pragma synchronous: {e}")))?;
        sqlx::query("PRAGMA foreign_keys=ON")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("pragma foreign_keys: {e}")))?;

        sqlx::query(MIGRATIONS)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("migration: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Arc::new(RwLock::new(Cache::default()));
        tokio::spawn(run_writer(pool.clone(), rx));

        Ok(Self { cache, writer: tx, pool, clock })
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, StoreError>>) -> WriteOp,
    ) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.writer
            .send(make(reply_tx))
            .map_err(|_| StoreError::Internal("store writer task has stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| StoreError::Internal("store writer task dropped reply".into()))?
    }
}

async fn run_writer(pool: SqlitePool, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::InsertReservation { internal_id, created_at, reply } => {
                let result = sqlx::query(
                    "INSERT INTO PendingReservation (internal_delivery_id, create_at) VALUES (?, ?)",
                )
                .bind(internal_id.as_str())
                .bind(created_at)
                .execute(&pool)
                .await
                .map(|_| ())
                .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            WriteOp::DeleteReservation { internal_id, reply } => {
                let result = sqlx::query("DELETE FROM PendingReservation WHERE internal_delivery_id = ?")
                    .bind(internal_id.as_str())
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            WriteOp::UpsertRecord { record, reply } => {
                let result = upsert_record(&pool, &record).await;
                let _ = reply.send(result);
            }
            WriteOp::DeleteRecord { internal_id, reply } => {
                let result = sqlx::query("DELETE FROM DeliveryMapping WHERE internal_delivery_id = ?")
                    .bind(internal_id.as_str())
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            WriteOp::PruneTerminal { cutoff, reply } => {
                let result = sqlx::query(
                    "DELETE FROM DeliveryMapping
                     WHERE status IN ('DELIVERED','FAILED','CANCELLED','MISSING')
                       AND updated_at < ?",
                )
                .bind(cutoff)
                .execute(&pool)
                .await
                .map(|r| r.rows_affected())
                .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            WriteOp::AddDriverMapping { remote_id, local_id, reply } => {
                let result = sqlx::query(
                    "INSERT INTO DeliverymenMapping (velide_id, local_id) VALUES (?, ?)
                     ON CONFLICT (velide_id) DO NOTHING",
                )
                .bind(&remote_id)
                .bind(&local_id)
                .execute(&pool)
                .await
                .map(|r| r.rows_affected() > 0)
                .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
            WriteOp::AddDriverMappings { pairs, reply } => {
                let result = insert_driver_mappings(&pool, &pairs).await;
                let _ = reply.send(result);
            }
            WriteOp::DeleteDriverMapping { remote_id, reply } => {
                let result = sqlx::query("DELETE FROM DeliverymenMapping WHERE velide_id = ?")
                    .bind(&remote_id)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(|e| StoreError::Persistence(e.to_string()));
                let _ = reply.send(result);
            }
        }
    }
}

async fn upsert_record(pool: &SqlitePool, record: &TrackingRecord) -> Result<(), StoreError> {
    let external_id = record
        .external_id
        .as_ref()
        .ok_or_else(|| StoreError::Internal("upsert_record requires a bound external_id".into()))?;
    sqlx::query(
        "INSERT INTO DeliveryMapping
            (external_delivery_id, internal_delivery_id, status, deliveryman_id, create_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (external_delivery_id) DO UPDATE SET
            status = excluded.status,
            deliveryman_id = excluded.deliveryman_id,
            updated_at = excluded.updated_at",
    )
    .bind(external_id.as_str())
    .bind(record.internal_id.as_str())
    .bind(record.status.to_string())
    .bind(&record.deliveryman_id)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await
    .map_err(|e| StoreError::Persistence(e.to_string()))?;
    Ok(())
}

async fn insert_driver_mappings(
    pool: &SqlitePool,
    pairs: &[(String, String)],
) -> Result<u64, StoreError> {
    let mut inserted = 0u64;
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StoreError::Persistence(e.to_string()))?;
    for (remote, local) in pairs {
        let result = sqlx::query(
            "INSERT INTO DeliverymenMapping (velide_id, local_id) VALUES (?, ?)
             ON CONFLICT (velide_id) DO NOTHING",
        )
        .bind(remote)
        .bind(local)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Persistence(e.to_string()))?;
        inserted += result.rows_affected();
    }
    tx.commit().await.map_err(|e| StoreError::Persistence(e.to_string()))?;
    Ok(inserted)
}

fn status_from_str(s: &str) -> DeliveryStatus {
    match s {
        "PENDING" => DeliveryStatus::Pending,
        "SENDING" => DeliveryStatus::Sending,
        "ADDED" => DeliveryStatus::Added,
        "IN_PROGRESS" => DeliveryStatus::InProgress,
        "MISSING" => DeliveryStatus::Missing,
        "DELIVERED" => DeliveryStatus::Delivered,
        "FAILED" => DeliveryStatus::Failed,
        "CANCELLED" => DeliveryStatus::Cancelled,
        // Unknown statuses loaded from disk are a data invariant violation;
        // the caller is responsible for skipping the record and logging it.
        other => {
            tracing::error!(status = other, "unknown delivery status in DeliveryMapping row");
            DeliveryStatus::Added
        }
    }
}

#[async_trait]
impl TrackingStore for SqliteStore {
    async fn hydrate(&self) -> Result<(), StoreError> {
        // hydrate() reads directly through the pool rather than the writer
        // task, since it runs once before any writer traffic and wants the
        // whole table in one shot. Idempotent: re-running it simply replaces
        // the cache contents with whatever is currently on disk.
        let rows: Vec<(String, String, String, Option<String>, DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT external_delivery_id, internal_delivery_id, status, deliveryman_id, create_at, updated_at
                 FROM DeliveryMapping",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let reservation_rows: Vec<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT internal_delivery_id, create_at FROM PendingReservation")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let driver_rows: Vec<(String, String)> =
            sqlx::query_as("SELECT velide_id, local_id FROM DeliverymenMapping")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let mut guard = self.cache.write().await;
        guard.records.clear();
        guard.external_index.clear();
        guard.reservations.clear();
        guard.reserved_status.clear();
        guard.drivers.clear();

        for (external_id, internal_id, status, deliveryman_id, created_at, updated_at) in rows {
            let internal_id = InternalId::canonicalize(&internal_id);
            let external_id = ExternalId::new(external_id);
            let record = TrackingRecord {
                internal_id: internal_id.clone(),
                external_id: Some(external_id.clone()),
                status: status_from_str(&status),
                deliveryman_id,
                created_at,
                updated_at,
            };
            guard.external_index.insert(external_id, internal_id.clone());
            guard.records.insert(internal_id, record);
        }
        for (internal_id, _created_at) in reservation_rows {
            guard.reservations.insert(InternalId::canonicalize(&internal_id));
        }
        for (remote_id, local_id) in driver_rows {
            guard.drivers.insert(remote_id, local_id);
        }
        Ok(())
    }

    async fn reserve(&self, internal_id: &InternalId) -> Result<bool, StoreError> {
        {
            let guard = self.cache.read().await;
            if guard.records.contains_key(internal_id) || guard.reservations.contains(internal_id) {
                return Ok(false);
            }
        }
        {
            let mut guard = self.cache.write().await;
            if guard.records.contains_key(internal_id) || guard.reservations.contains(internal_id) {
                return Ok(false);
            }
            guard.reservations.insert(internal_id.clone());
        }
        let now = Utc::now();
        let result = self
            .send(|reply| WriteOp::InsertReservation {
                internal_id: internal_id.clone(),
                created_at: now,
                reply,
            })
            .await;
        if result.is_err() {
            self.cache.write().await.reservations.remove(internal_id);
        }
        result.map(|_| true)
    }

    async fn register(
        &self,
        internal_id: &InternalId,
        external_id: ExternalId,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = {
            let guard = self.cache.read().await;
            let cached_status = guard
                .records
                .get(internal_id)
                .map(|r| r.status)
                .or_else(|| guard.reserved_status.get(internal_id).copied());
            let final_status = match cached_status {
                Some(s) if s != DeliveryStatus::Pending => s,
                _ => status,
            };
            TrackingRecord {
                internal_id: internal_id.clone(),
                external_id: Some(external_id.clone()),
                status: final_status,
                deliveryman_id: guard.records.get(internal_id).and_then(|r| r.deliveryman_id.clone()),
                created_at: guard.records.get(internal_id).map(|r| r.created_at).unwrap_or(now),
                updated_at: now,
            }
        };

        self.send(|reply| WriteOp::UpsertRecord { record: record.clone(), reply }).await?;
        let _ = self
            .send(|reply| WriteOp::DeleteReservation { internal_id: internal_id.clone(), reply })
            .await;

        let mut guard = self.cache.write().await;
        guard.reservations.remove(internal_id);
        guard.reserved_status.remove(internal_id);
        guard.external_index.insert(external_id, internal_id.clone());
        guard.records.insert(internal_id.clone(), record);
        Ok(())
    }

    async fn release(&self, internal_id: &InternalId) -> Result<(), StoreError> {
        let is_reserved_only = {
            let guard = self.cache.read().await;
            !guard.records.contains_key(internal_id) && guard.reservations.contains(internal_id)
        };
        if !is_reserved_only {
            return Ok(());
        }
        self.send(|reply| WriteOp::DeleteReservation { internal_id: internal_id.clone(), reply })
            .await?;
        let mut guard = self.cache.write().await;
        guard.reservations.remove(internal_id);
        guard.reserved_status.remove(internal_id);
        Ok(())
    }

    async fn update_status(
        &self,
        internal_id: &InternalId,
        status: DeliveryStatus,
        deliveryman_id: Option<String>,
    ) -> Result<(), StoreError> {
        enum Target {
            Bound(TrackingRecord),
            ReservedOnly,
            Untracked,
        }

        let target = {
            let guard = self.cache.read().await;
            if let Some(existing) = guard.records.get(internal_id) {
                let mut record = existing.clone();
                record.status = status;
                if deliveryman_id.is_some() {
                    record.deliveryman_id = deliveryman_id;
                }
                record.updated_at = Utc::now();
                Target::Bound(record)
            } else if guard.reservations.contains(internal_id) {
                Target::ReservedOnly
            } else {
                Target::Untracked
            }
        };

        match target {
            Target::Bound(record) => {
                self.send(|reply| WriteOp::UpsertRecord { record: record.clone(), reply }).await?;
                self.cache.write().await.records.insert(internal_id.clone(), record);
            }
            Target::ReservedOnly => {
                // Not bound yet, so there's no external_id to upsert
                // `DeliveryMapping` against — the advanced status lives in
                // the cache only, for `register` to pick up (§4.1).
                self.cache.write().await.reserved_status.insert(internal_id.clone(), status);
            }
            Target::Untracked => {}
        }
        Ok(())
    }

    async fn is_tracked(&self, internal_id: &InternalId) -> Result<bool, StoreError> {
        let guard = self.cache.read().await;
        Ok(guard.records.contains_key(internal_id) || guard.reservations.contains(internal_id))
    }

    async fn get_status(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<DeliveryStatus>, StoreError> {
        let guard = self.cache.read().await;
        if let Some(r) = guard.records.get(internal_id) {
            return Ok(Some(r.status));
        }
        if let Some(status) = guard.reserved_status.get(internal_id) {
            return Ok(Some(*status));
        }
        if guard.reservations.contains(internal_id) {
            return Ok(Some(DeliveryStatus::Pending));
        }
        Ok(None)
    }

    async fn get_external_id(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<ExternalId>, StoreError> {
        Ok(self
            .cache
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
        Ok(self.cache.read().await.external_index.get(external_id).cloned())
    }

    async fn active_ids(&self) -> Result<Vec<InternalId>, StoreError> {
        let guard = self.cache.read().await;
        Ok(guard
            .records
            .values()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.internal_id.clone())
            .chain(guard.reservations.iter().cloned())
            .collect())
    }

    async fn snapshot_for_reconciler(
        &self,
    ) -> Result<Vec<(InternalId, ExternalId, DeliveryStatus)>, StoreError> {
        let guard = self.cache.read().await;
        Ok(guard
            .records
            .values()
            .filter(|r| !r.status.is_terminal())
            .filter_map(|r| r.external_id.clone().map(|ext| (r.internal_id.clone(), ext, r.status)))
            .collect())
    }

    async fn prune(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let removed = self.send(|reply| WriteOp::PruneTerminal { cutoff, reply }).await?;
        let mut guard = self.cache.write().await;
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
        Ok(removed)
    }

    async fn get_tracked_ids(&self) -> Result<Vec<InternalId>, StoreError> {
        let guard = self.cache.read().await;
        Ok(guard
            .records
            .keys()
            .cloned()
            .chain(guard.reservations.iter().cloned())
            .collect())
    }

    async fn stop_tracking(&self, internal_id: &InternalId) -> Result<(), StoreError> {
        self.send(|reply| WriteOp::DeleteRecord { internal_id: internal_id.clone(), reply })
            .await?;
        let _ = self
            .send(|reply| WriteOp::DeleteReservation { internal_id: internal_id.clone(), reply })
            .await;
        let mut guard = self.cache.write().await;
        guard.reservations.remove(internal_id);
        if let Some(r) = guard.records.remove(internal_id) {
            if let Some(ext) = r.external_id {
                guard.external_index.remove(&ext);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DriverMappingStore for SqliteStore {
    async fn add(&self, remote_id: &str, local_id: &str) -> Result<bool, StoreError> {
        let inserted = self
            .send(|reply| WriteOp::AddDriverMapping {
                remote_id: remote_id.to_string(),
                local_id: local_id.to_string(),
                reply,
            })
            .await?;
        if inserted {
            self.cache
                .write()
                .await
                .drivers
                .insert(remote_id.to_string(), local_id.to_string());
        }
        Ok(inserted)
    }

    async fn add_many(&self, pairs: &[(String, String)]) -> Result<u64, StoreError> {
        let inserted = self
            .send(|reply| WriteOp::AddDriverMappings { pairs: pairs.to_vec(), reply })
            .await?;
        let mut guard = self.cache.write().await;
        for (remote, local) in pairs {
            guard.drivers.entry(remote.clone()).or_insert_with(|| local.clone());
        }
        Ok(inserted)
    }

    async fn lookup_local(&self, remote_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.read().await.drivers.get(remote_id).cloned())
    }

    async fn lookup_remote(&self, local_id: &str) -> Result<Option<String>, StoreError> {
        let guard = self.cache.read().await;
        Ok(guard
            .drivers
            .iter()
            .find(|(_, local)| local.as_str() == local_id)
            .map(|(remote, _)| remote.clone()))
    }

    async fn delete(&self, remote_id: &str) -> Result<(), StoreError> {
        self.send(|reply| WriteOp::DeleteDriverMapping { remote_id: remote_id.to_string(), reply })
            .await?;
        self.cache.write().await.drivers.remove(remote_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<DriverMapping>, StoreError> {
        let guard = self.cache.read().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.sqlite3");
        let store = SqliteStore::connect(path.to_str().unwrap()).await.unwrap();
        store.hydrate().await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn reserve_register_round_trip_persists() {
        let (store, _dir) = open_store().await;
        let id = InternalId::canonicalize("42");
        assert!(store.reserve(&id).await.unwrap());
        store
            .register(&id, ExternalId::new("ext-1"), DeliveryStatus::Added)
            .await
            .unwrap();
        assert_eq!(store.get_status(&id).await.unwrap(), Some(DeliveryStatus::Added));
        assert_eq!(
            store.get_internal_id_by_external(&ExternalId::new("ext-1")).await.unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn register_does_not_regress_an_advanced_status() {
        // Simulates the poller observing a status change before the ADD returns.
        let (store, _dir) = open_store().await;
        let id = InternalId::canonicalize("1");
        store.reserve(&id).await.unwrap();
        store.update_status(&id, DeliveryStatus::Cancelled, None).await.unwrap();
        assert_eq!(store.get_status(&id).await.unwrap(), Some(DeliveryStatus::Cancelled));
        store
            .register(&id, ExternalId::new("ext-cancelled"), DeliveryStatus::Added)
            .await
            .unwrap();
        assert_eq!(store.get_status(&id).await.unwrap(), Some(DeliveryStatus::Cancelled));
    }

    #[tokio::test]
    async fn release_rolls_back_an_unbound_reservation() {
        let (store, _dir) = open_store().await;
        let id = InternalId::canonicalize("7");
        store.reserve(&id).await.unwrap();
        store.release(&id).await.unwrap();
        assert!(!store.is_tracked(&id).await.unwrap());
    }

    #[tokio::test]
    async fn driver_mapping_persists_across_lookups() {
        let (store, _dir) = open_store().await;
        assert!(store.add("r1", "l1").await.unwrap());
        assert!(!store.add("r1", "l2").await.unwrap());
        assert_eq!(store.lookup_local("r1").await.unwrap(), Some("l1".to_string()));
    }

    #[tokio::test]
    async fn prune_cutoff_uses_the_injected_clock() {
        use syncd_domain::FakeClock;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.sqlite3");
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let store = SqliteStore::connect_with_clock(path.to_str().unwrap(), clock.clone())
            .await
            .unwrap();
        store.hydrate().await.unwrap();

        let id = InternalId::canonicalize("99");
        store.reserve(&id).await.unwrap();
        store.register(&id, ExternalId::new("ext-99"), DeliveryStatus::Delivered).await.unwrap();

        // Clock hasn't moved since the record was created, so a day-long
        // retention window keeps it.
        assert_eq!(store.prune(Duration::from_secs(86_400)).await.unwrap(), 0);
        assert!(store.is_tracked(&id).await.unwrap());

        // Advancing the fake clock (no real sleep) pushes the cutoff past it.
        clock.advance(Duration::from_secs(86_401));
        assert_eq!(store.prune(Duration::from_secs(86_400)).await.unwrap(), 1);
        assert!(!store.is_tracked(&id).await.unwrap());
    }
}
