use syncd_domain::{ExternalId, InternalId, Order};

/// One mutating cloud operation the dispatcher owns end to end.
#[derive(Debug, Clone)]
pub enum DispatchTask {
    Add { internal_id: InternalId, order: Order },
    Delete { internal_id: InternalId, external_id: ExternalId },
}

impl DispatchTask {
    pub fn internal_id(&self) -> &InternalId {
        match self {
            DispatchTask::Add { internal_id, .. } => internal_id,
            DispatchTask::Delete { internal_id, .. } => internal_id,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, DispatchTask::Add { .. })
    }
}

/// What the dispatcher reports back to the orchestrator on completion
/// (§4.4.3).
#[derive(Debug, Clone)]
pub enum DispatcherEvent {
    DeliverySuccess { internal_id: InternalId, external_id: ExternalId },
    DeletionSuccess { internal_id: InternalId, external_id: ExternalId },
    TaskFailed { internal_id: InternalId, message: String },
}
