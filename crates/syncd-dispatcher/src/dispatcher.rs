use std::collections::VecDeque;
use std::sync::Arc;

use syncd_cloud::CloudClient;
use syncd_config::ReconciliationConfig;
use syncd_domain::{ExternalId, InternalId, Order};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::task::{DispatchTask, DispatcherEvent};

/// Single-writer FIFO queue for mutating cloud operations (§4.4). Exactly
/// one task is in flight at a time; `enqueue_*` only ever append, and
/// [`Dispatcher::cancel_pending_add`] is the one operation allowed to pull
/// an entry back out before it's sent.
pub struct Dispatcher {
    cloud: Arc<CloudClient>,
    queue: Mutex<VecDeque<DispatchTask>>,
    notify: Notify,
    cfg: DispatcherConfig,
    reconciliation: ReconciliationConfig,
}

impl Dispatcher {
    pub fn new(cloud: Arc<CloudClient>, reconciliation: ReconciliationConfig) -> Self {
        Dispatcher {
            cloud,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            cfg: DispatcherConfig::default(),
            reconciliation,
        }
    }

    pub async fn enqueue_add(&self, internal_id: InternalId, order: Order) {
        self.queue.lock().await.push_back(DispatchTask::Add { internal_id, order });
        self.notify.notify_one();
    }

    pub async fn enqueue_delete(&self, internal_id: InternalId, external_id: ExternalId) {
        self.queue.lock().await.push_back(DispatchTask::Delete { internal_id, external_id });
        self.notify.notify_one();
    }

    /// Cancel-before-send optimization (§4.4): removes a not-yet-sent ADD
    /// for `internal_id`. Returns `false` if no such entry is still queued
    /// (already in flight or already completed).
    pub async fn cancel_pending_add(&self, internal_id: &InternalId) -> bool {
        let mut queue = self.queue.lock().await;
        if let Some(pos) = queue.iter().position(|t| t.is_add() && t.internal_id() == internal_id) {
            queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Runs until `cancel` fires, processing one task at a time in FIFO
    /// order.
    pub async fn run(self: Arc<Self>, events: mpsc::Sender<DispatcherEvent>, cancel: CancellationToken) {
        loop {
            loop {
                let next = self.queue.lock().await.pop_front();
                let Some(task) = next else { break };
                self.process(task, &events, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn process(&self, task: DispatchTask, events: &mpsc::Sender<DispatcherEvent>, cancel: &CancellationToken) {
        match task {
            DispatchTask::Add { internal_id, order } => self.process_add(internal_id, order, events, cancel).await,
            DispatchTask::Delete { internal_id, external_id } => {
                self.process_delete(internal_id, external_id, events, cancel).await
            }
        }
    }

    async fn process_add(
        &self,
        internal_id: InternalId,
        order: Order,
        events: &mpsc::Sender<DispatcherEvent>,
        cancel: &CancellationToken,
    ) {
        let mut attempt = 0u32;
        let mut delay = self.cfg.retry_base;
        let mut reconciliation_invocations = 0u32;
        let mut last_was_timeout = false;

        loop {
            attempt += 1;

            if attempt > 1
                && last_was_timeout
                && self.reconciliation.retry_reconciliation_enabled
                && reconciliation_invocations < self.reconciliation.retry_reconciliation_max_attempts
            {
                reconciliation_invocations += 1;
                tokio::select! {
                    _ = tokio::time::sleep(self.reconciliation.retry_reconciliation_delay) => {}
                    _ = cancel.cancelled() => return,
                }
                match self
                    .cloud
                    .find_delivery_by_metadata(
                        &order.customer_name,
                        &order.address,
                        self.reconciliation.retry_reconciliation_time_window,
                    )
                    .await
                {
                    Ok(Some(found)) => {
                        info!(%internal_id, external_id = %found.external_id, "reconciled ADD after timeout");
                        let _ = events
                            .send(DispatcherEvent::DeliverySuccess { internal_id, external_id: found.external_id })
                            .await;
                        return;
                    }
                    Ok(None) => debug!(%internal_id, "retry-time reconciliation found no match"),
                    Err(e) => debug!(%internal_id, error = %e, "retry-time reconciliation failed, continuing retry path"),
                }
            }

            match self.cloud.add_delivery(&order).await {
                Ok(resp) => {
                    let _ = events
                        .send(DispatcherEvent::DeliverySuccess { internal_id, external_id: resp.external_id })
                        .await;
                    return;
                }
                Err(e) => {
                    last_was_timeout = matches!(e, syncd_cloud::CloudError::Timeout);
                    if !e.is_retryable() || attempt >= self.cfg.retry_max_attempts {
                        warn!(%internal_id, error = %e, attempt, "ADD failed terminally");
                        let _ = events
                            .send(DispatcherEvent::TaskFailed { internal_id, message: e.to_string() })
                            .await;
                        return;
                    }
                    warn!(%internal_id, error = %e, attempt, "ADD failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                    delay *= self.cfg.retry_factor;
                }
            }
        }
    }

    async fn process_delete(
        &self,
        internal_id: InternalId,
        external_id: ExternalId,
        events: &mpsc::Sender<DispatcherEvent>,
        cancel: &CancellationToken,
    ) {
        let mut attempt = 0u32;
        let mut delay = self.cfg.retry_base;
        loop {
            attempt += 1;
            match self.cloud.delete_delivery(&external_id).await {
                Ok(()) => {
                    let _ = events
                        .send(DispatcherEvent::DeletionSuccess { internal_id, external_id })
                        .await;
                    return;
                }
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.cfg.retry_max_attempts {
                        warn!(%internal_id, error = %e, attempt, "DELETE failed terminally");
                        let _ = events
                            .send(DispatcherEvent::TaskFailed { internal_id, message: e.to_string() })
                            .await;
                        return;
                    }
                    warn!(%internal_id, error = %e, attempt, "DELETE failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return,
                    }
                    delay *= self.cfg.retry_factor;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_order() -> Order {
        Order::new("1", "Alice", "123 Main St", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn cancel_pending_add_removes_unsent_entry() {
        let cloud = Arc::new(CloudClient::new(&syncd_config::CloudConfig {
            api_url: "http://localhost".into(),
            websocket_url: "ws://localhost".into(),
            timeout: std::time::Duration::from_secs(1),
            use_ssl: true,
            use_neighbourhood: false,
            integration_name: "test".into(),
        }));
        let dispatcher = Dispatcher::new(cloud, ReconciliationConfig::default());
        let id = InternalId::canonicalize("1");
        dispatcher.enqueue_add(id.clone(), sample_order()).await;
        assert!(dispatcher.cancel_pending_add(&id).await);
        assert!(!dispatcher.cancel_pending_add(&id).await);
    }
}
