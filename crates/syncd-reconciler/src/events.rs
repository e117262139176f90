use syncd_domain::InternalId;

/// What the reconciler reports back to the orchestrator (§4.5). The
/// reconciler corrects local state on its own; these events exist only for
/// the cases where a connector write-back is needed too.
#[derive(Debug, Clone)]
pub enum ReconcilerEvent {
    /// The cloud no longer lists this delivery; the local store has been
    /// marked `MISSING` already. No ERP write-back.
    DeliveryMissing(InternalId),
    /// The cloud reports the delivery as routed; the local store has been
    /// updated to `IN_PROGRESS` already. The orchestrator still needs to
    /// push the route-start to the ERP via the connector.
    DeliveryInRoute(InternalId, String),
}
