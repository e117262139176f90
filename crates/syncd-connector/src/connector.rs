use async_trait::async_trait;
use syncd_domain::{ExternalId, InternalId, Order};
use tokio::sync::mpsc;

use crate::error::ConnectorError;
use crate::events::ConnectorEvent;

/// ERP-specific adapter implementing the contract every source plugs in
/// behind. Object-safe so the orchestrator holds one as `Arc<dyn Connector>`
/// regardless of which implementation was selected by configuration
/// (design notes, §9: "variant dispatch or interface-style polymorphism
/// suffices").
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Starts the connector's background loops. `events` is where
    /// [`ConnectorEvent`]s are published; the orchestrator owns the
    /// receiving end.
    async fn start(&self, events: mpsc::Sender<ConnectorEvent>) -> Result<(), ConnectorError>;

    /// Signals all background loops to stop and waits for them to drain,
    /// within the orchestrator's shutdown grace period.
    async fn stop(&self) -> Result<(), ConnectorError>;

    /// True when remote drivers must be mapped to local drivers at startup
    /// before the connector can be trusted to run (component C9).
    fn needs_driver_mapping(&self) -> bool;

    /// The local drivers known to this ERP, for the mapping workflow.
    async fn list_local_drivers(&self) -> Result<Vec<(String, String)>, ConnectorError>;

    /// Best-effort detail lookup for a hydrated record at startup, used to
    /// emit `order_restored` with up-to-date customer/address fields. Should
    /// not fail the whole startup sequence if one record can't be found —
    /// the orchestrator degrades to whatever fields the tracking store has.
    async fn fetch_order_details(
        &self,
        internal_id: &InternalId,
    ) -> Result<Option<Order>, ConnectorError>;

    /// Writes the route-start back to the ERP.
    async fn mark_delivery_in_route(
        &self,
        order: &Order,
        remote_driver_id: &str,
    ) -> Result<(), ConnectorError>;

    /// Writes the completion back to the ERP.
    async fn mark_delivery_done(&self, order: &Order) -> Result<(), ConnectorError>;

    /// Called after the dispatcher resolves an ADD successfully.
    async fn on_added(
        &self,
        internal_id: &InternalId,
        external_id: &ExternalId,
    ) -> Result<(), ConnectorError>;

    /// Called after the dispatcher resolves an ADD as a terminal failure.
    async fn on_rejected(&self, internal_id: &InternalId) -> Result<(), ConnectorError>;

    /// Called when the push channel or reconciler observes a cloud-side
    /// delete for an order this connector produced.
    async fn on_deleted_in_cloud(&self, order: &Order) -> Result<(), ConnectorError>;

    /// Called when the push channel or reconciler observes a route start.
    async fn on_route_started_in_cloud(
        &self,
        order: &Order,
        remote_driver_id: &str,
    ) -> Result<(), ConnectorError>;

    /// Called when the push channel or reconciler observes a route end.
    async fn on_route_ended_in_cloud(&self, order: &Order) -> Result<(), ConnectorError>;
}
