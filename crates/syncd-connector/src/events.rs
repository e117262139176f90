use syncd_domain::{ExternalId, InternalId, Order};

/// Everything a connector emits on its outbound channel. The orchestrator is
/// the only consumer; components never call each other's methods directly
/// (design notes, §9).
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    /// A brand-new order, detected by the connector's ingest path.
    OrderNormalized(Order),
    /// A record found during hydration/restore replay. `external_id` is
    /// `Some` when the order was already bound before the previous shutdown.
    OrderRestored(Order, Option<ExternalId>),
    /// The order was cancelled on the ERP side. `external_id` is `None` when
    /// the cancellation raced ahead of the ADD ever binding one.
    OrderCancelled(InternalId, Option<ExternalId>),
}
