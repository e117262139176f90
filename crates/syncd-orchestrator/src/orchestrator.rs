use std::sync::Arc;

use syncd_cloud::{CloudClient, CloudEvent, CooldownMap, PushChannel};
use syncd_config::{Config, TargetSystem};
use syncd_connector::{Connector, ConnectorEvent, FileWatchConnector, FirebirdConnector};
use syncd_dispatcher::{Dispatcher, DispatcherEvent};
use syncd_domain::{DeliveryStatus, InternalId, Order};
use syncd_reconciler::{Reconciler, ReconcilerEvent};
use syncd_store::{DriverMappingStore, SqliteStore, TrackingStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver_mapping::{self, DEFAULT_MIN_SCORE};
use crate::error::OrchestratorError;
use crate::lock::InstanceLock;
use crate::status::OpsStatus;
use crate::sweeper;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Wires up C1–C9 and drives the daemon's whole lifetime: the startup
/// sequence (§4.7), the steady-state event-routing table, and the
/// background maintenance tasks (retention sweep, token refresh). One
/// instance per process, guarded by [`InstanceLock`].
pub struct Orchestrator {
    cfg: Config,
    store: Arc<dyn TrackingStore>,
    driver_store: Arc<dyn DriverMappingStore>,
    connector: Arc<dyn Connector>,
    cloud: Arc<CloudClient>,
    dispatcher: Arc<Dispatcher>,
    reconciler: Arc<Reconciler>,
    push: Arc<PushChannel>,
    token_provider: Arc<syncd_auth::TokenProvider>,
    ops: Arc<OpsStatus>,
    _lock: InstanceLock,
}

impl Orchestrator {
    /// Runs startup steps 1–4 of the component design: acquire the
    /// single-instance lock, open the store, obtain a first valid bearer
    /// from C8, and instantiate the configured connector (running the
    /// driver-mapping workflow if it requires one). Does not yet hydrate or
    /// start any background loop — that's [`Orchestrator::run`].
    pub async fn bootstrap(cfg: Config) -> Result<Self, OrchestratorError> {
        let lock = InstanceLock::acquire(&cfg.store.lock_path)?;

        let sqlite = SqliteStore::connect(
            cfg.store
                .sqlite_path
                .to_str()
                .ok_or_else(|| OrchestratorError::Startup("sqlite_path is not valid UTF-8".into()))?,
        )
        .await?;
        let concrete = Arc::new(sqlite);
        let store: Arc<dyn TrackingStore> = concrete.clone();
        let driver_store: Arc<dyn DriverMappingStore> = concrete;

        let token_provider = Arc::new(syncd_auth::TokenProvider::load(
            cfg.auth.clone(),
            cfg.store.token_store_path.clone(),
        )?);
        let initial_token = token_provider.get_valid_token().await?;

        let cloud = Arc::new(CloudClient::new(&cfg.cloud));
        cloud.set_bearer(initial_token).await;
        {
            let token_provider = token_provider.clone();
            let cloud = cloud.clone();
            cloud
                .set_unauthorized_hook(Arc::new(move || {
                    let token_provider = token_provider.clone();
                    let cloud = cloud.clone();
                    Box::pin(async move {
                        match token_provider.force_refresh().await {
                            Ok(token) => cloud.set_bearer(token).await,
                            Err(e) => warn!(error = %e, "forced refresh after 401 failed"),
                        }
                    })
                }))
                .await;
        }

        let connector: Arc<dyn Connector> = match cfg.target_system {
            TargetSystem::Farmax => {
                let erp = cfg
                    .erp
                    .clone()
                    .ok_or_else(|| OrchestratorError::Startup("farmax target requires an erp section".into()))?;
                Arc::new(FirebirdConnector::new(erp, store.clone()))
            }
            TargetSystem::FileWatch => {
                let dir = cfg
                    .watch_dir
                    .clone()
                    .ok_or_else(|| OrchestratorError::Startup("file_watch target requires watch_dir".into()))?;
                Arc::new(FileWatchConnector::new(dir))
            }
        };

        if connector.needs_driver_mapping() {
            ensure_driver_mapping(connector.as_ref(), &cloud, driver_store.as_ref()).await?;
        }

        let cooldown = CooldownMap::new();
        let dispatcher = Arc::new(Dispatcher::new(cloud.clone(), cfg.reconciliation.clone()));
        let reconciler = Arc::new(Reconciler::new(
            cloud.clone(),
            store.clone(),
            cooldown.clone(),
            cfg.reconciliation.clone(),
        ));
        let push = Arc::new(PushChannel::new(&cfg.cloud, cloud.bearer_handle(), cooldown));

        Ok(Orchestrator {
            cfg,
            store,
            driver_store,
            connector,
            cloud,
            dispatcher,
            reconciler,
            push,
            token_provider,
            ops: Arc::new(OpsStatus::new()),
            _lock: lock,
        })
    }

    pub fn store(&self) -> Arc<dyn TrackingStore> {
        self.store.clone()
    }

    pub fn driver_store(&self) -> Arc<dyn DriverMappingStore> {
        self.driver_store.clone()
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    pub fn push_channel(&self) -> Arc<PushChannel> {
        self.push.clone()
    }

    pub fn ops_status(&self) -> Arc<OpsStatus> {
        self.ops.clone()
    }

    async fn order_for(&self, internal_id: &InternalId) -> Option<Order> {
        self.connector.fetch_order_details(internal_id).await.ok().flatten()
    }

    /// Runs steps 5–7: hydrate the tracking store, replay restored orders
    /// through the same routing path live events take, start every
    /// background loop, flip readiness, and then drive the steady-state
    /// event loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), OrchestratorError> {
        self.store.hydrate().await?;
        info!("tracking store hydrated");

        let tracked = self.store.get_tracked_ids().await?;
        for internal_id in tracked {
            if let Some(order) = self.order_for(&internal_id).await {
                let external_id = self.store.get_external_id(&internal_id).await?;
                self.handle_order_restored(order, external_id).await?;
            }
        }

        let (connector_tx, mut connector_rx) = mpsc::channel::<ConnectorEvent>(EVENT_CHANNEL_CAPACITY);
        let (dispatcher_tx, mut dispatcher_rx) = mpsc::channel::<DispatcherEvent>(EVENT_CHANNEL_CAPACITY);
        let (push_tx, mut push_rx) = mpsc::channel::<CloudEvent>(EVENT_CHANNEL_CAPACITY);
        let (reconciler_tx, mut reconciler_rx) = mpsc::channel::<ReconcilerEvent>(EVENT_CHANNEL_CAPACITY);
        let (auth_tx, mut auth_rx) = mpsc::channel::<String>(8);

        self.connector.start(connector_tx).await?;
        self.push.clone().start(push_tx).await;
        tokio::spawn(self.reconciler.clone().run(reconciler_tx, cancel.clone()));
        tokio::spawn(self.dispatcher.clone().run(dispatcher_tx, cancel.clone()));
        tokio::spawn(sweeper::run(self.store.clone(), self.cfg.retention, cancel.clone()));
        tokio::spawn(self.token_provider.clone().run(auth_tx, cancel.clone()));

        self.ops.set_ready();
        info!(bind = %self.cfg.ops_http_bind, "orchestrator ready");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("orchestrator shutting down");
                    let _ = self.connector.stop().await;
                    self.push.stop().await;
                    return Ok(());
                }
                Some(event) = connector_rx.recv() => {
                    if let Err(e) = self.handle_connector_event(event).await {
                        warn!(error = %e, "failed handling connector event");
                    }
                }
                Some(event) = dispatcher_rx.recv() => {
                    if let Err(e) = self.handle_dispatcher_event(event).await {
                        warn!(error = %e, "failed handling dispatcher event");
                    }
                }
                Some(event) = push_rx.recv() => {
                    if let Err(e) = self.handle_push_event(event).await {
                        warn!(error = %e, "failed handling push event");
                    }
                }
                Some(event) = reconciler_rx.recv() => {
                    if let Err(e) = self.handle_reconciler_event(event).await {
                        warn!(error = %e, "failed handling reconciler event");
                    }
                }
                Some(token) = auth_rx.recv() => {
                    self.cloud.set_bearer(token).await;
                    debug!("cloud bearer refreshed");
                }
            }
        }
    }

    async fn handle_order_restored(
        &self,
        order: Order,
        external_id: Option<syncd_domain::ExternalId>,
    ) -> Result<(), OrchestratorError> {
        if !self.store.is_tracked(&order.internal_id).await? {
            self.store.reserve(&order.internal_id).await?;
            if let Some(external_id) = external_id {
                self.store.register(&order.internal_id, external_id, order.status).await?;
            }
        }
        Ok(())
    }

    async fn handle_connector_event(&self, event: ConnectorEvent) -> Result<(), OrchestratorError> {
        match event {
            ConnectorEvent::OrderNormalized(order) => {
                self.dispatcher.enqueue_add(order.internal_id.clone(), order).await;
            }
            ConnectorEvent::OrderRestored(order, external_id) => {
                self.handle_order_restored(order, external_id).await?;
            }
            ConnectorEvent::OrderCancelled(internal_id, external_id) => {
                if self.dispatcher.cancel_pending_add(&internal_id).await {
                    self.store.update_status(&internal_id, DeliveryStatus::Cancelled, None).await?;
                } else if let Some(external_id) = external_id {
                    self.dispatcher.enqueue_delete(internal_id, external_id).await;
                } else {
                    self.store.update_status(&internal_id, DeliveryStatus::Cancelled, None).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_dispatcher_event(&self, event: DispatcherEvent) -> Result<(), OrchestratorError> {
        match event {
            DispatcherEvent::DeliverySuccess { internal_id, external_id } => {
                self.store.register(&internal_id, external_id.clone(), DeliveryStatus::Added).await?;
                self.connector.on_added(&internal_id, &external_id).await?;
            }
            DispatcherEvent::DeletionSuccess { .. } => {
                // Status was already set to CANCELLED when the DELETE was enqueued.
            }
            DispatcherEvent::TaskFailed { internal_id, message } => {
                self.store.update_status(&internal_id, DeliveryStatus::Failed, None).await?;
                self.connector.on_rejected(&internal_id).await?;
                self.ops.record_failure(format!("dispatch failed for {internal_id}"), message).await;
            }
        }
        Ok(())
    }

    async fn handle_push_event(&self, event: CloudEvent) -> Result<(), OrchestratorError> {
        let external_id = syncd_domain::ExternalId::new(event.external_id().to_string());
        let Some(internal_id) = self.store.get_internal_id_by_external(&external_id).await? else {
            debug!(%external_id, "push event for an id this instance is not tracking, ignoring");
            return Ok(());
        };

        match event {
            CloudEvent::Delete { .. } => {
                self.store.update_status(&internal_id, DeliveryStatus::Cancelled, None).await?;
                if let Some(order) = self.order_for(&internal_id).await {
                    self.connector.on_deleted_in_cloud(&order).await?;
                }
            }
            CloudEvent::StartRoute { deliveryman_id, .. } => {
                self.store
                    .update_status(&internal_id, DeliveryStatus::InProgress, Some(deliveryman_id.clone()))
                    .await?;
                if let Some(order) = self.order_for(&internal_id).await {
                    self.connector.on_route_started_in_cloud(&order, &deliveryman_id).await?;
                }
            }
            CloudEvent::EndRoute { .. } => {
                self.store.update_status(&internal_id, DeliveryStatus::Delivered, None).await?;
                if let Some(order) = self.order_for(&internal_id).await {
                    self.connector.on_route_ended_in_cloud(&order).await?;
                }
            }
            CloudEvent::Add { .. } | CloudEvent::EditLocation { .. } => {
                // Cooldown was already touched by the push channel; no write-back needed.
            }
        }
        Ok(())
    }

    async fn handle_reconciler_event(&self, event: ReconcilerEvent) -> Result<(), OrchestratorError> {
        match event {
            ReconcilerEvent::DeliveryMissing(internal_id) => {
                debug!(%internal_id, "reconciler marked delivery missing");
            }
            ReconcilerEvent::DeliveryInRoute(internal_id, deliveryman_id) => {
                if let Some(order) = self.order_for(&internal_id).await {
                    self.connector.mark_delivery_in_route(&order, &deliveryman_id).await?;
                }
            }
        }
        Ok(())
    }
}

/// Compares the account's current remote drivers against the persisted
/// mapping, auto-accepts high-confidence [`driver_mapping::propose`] pairings
/// for anything new, and logs the rest for manual resolution. There is no
/// interactive mapping UI in this core (non-goal) so startup never blocks
/// waiting on one.
async fn ensure_driver_mapping(
    connector: &dyn Connector,
    cloud: &CloudClient,
    driver_store: &dyn DriverMappingStore,
) -> Result<(), OrchestratorError> {
    let remote = cloud.list_remote_drivers().await?;
    let existing = driver_store.list_all().await?;
    let mapped_remote: std::collections::HashSet<&str> =
        existing.iter().map(|m| m.remote_id.as_str()).collect();
    let unmapped_remote: Vec<(String, String)> =
        remote.into_iter().filter(|(id, _)| !mapped_remote.contains(id.as_str())).collect();

    if unmapped_remote.is_empty() {
        debug!("driver mapping already complete");
        return Ok(());
    }

    let local = connector.list_local_drivers().await?;
    let mapped_local: std::collections::HashSet<&str> =
        existing.iter().map(|m| m.local_id.as_str()).collect();
    let unclaimed_local: Vec<(String, String)> =
        local.into_iter().filter(|(id, _)| !mapped_local.contains(id.as_str())).collect();

    let proposed = driver_mapping::propose(&unmapped_remote, &unclaimed_local, DEFAULT_MIN_SCORE);
    for pairing in &proposed {
        info!(
            remote_id = %pairing.remote_id,
            remote_name = %pairing.remote_name,
            local_id = %pairing.local_id,
            local_name = %pairing.local_name,
            score = pairing.score,
            "auto-accepted driver mapping proposal"
        );
    }

    let pairs: Vec<(String, String)> =
        proposed.iter().map(|p| (p.remote_id.clone(), p.local_id.clone())).collect();
    driver_store.add_many(&pairs).await?;

    let unresolved = unmapped_remote.len() - proposed.len();
    if unresolved > 0 {
        warn!(unresolved, "driver ids could not be auto-mapped; resolve manually and restart");
    }
    Ok(())
}

/// Counts of tracked records by status, for the ops status endpoint.
pub async fn status_counts(
    store: &dyn TrackingStore,
) -> Result<std::collections::HashMap<DeliveryStatus, u64>, OrchestratorError> {
    let mut counts = std::collections::HashMap::new();
    for internal_id in store.get_tracked_ids().await? {
        if let Some(status) = store.get_status(&internal_id).await? {
            *counts.entry(status).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

