use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A terminal failure worth surfacing on the ops status endpoint. Not an
/// error type — this is a snapshot for human consumption, not something
/// propagated with `?`.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub at: DateTime<Utc>,
    pub title: String,
    pub detail: String,
}

/// Shared readiness/failure state, written by the orchestrator and read by
/// the ops HTTP surface (§6). `ready` flips once after the startup sequence
/// completes and never flips back — a post-startup failure is reported via
/// `last_failure`, not by un-readying the process.
#[derive(Default)]
pub struct OpsStatus {
    ready: AtomicBool,
    last_failure: RwLock<Option<FailureReport>>,
}

impl OpsStatus {
    pub fn new() -> Self {
        OpsStatus::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub async fn record_failure(&self, title: impl Into<String>, detail: impl Into<String>) {
        *self.last_failure.write().await =
            Some(FailureReport { at: Utc::now(), title: title.into(), detail: detail.into() });
    }

    pub async fn last_failure(&self) -> Option<FailureReport> {
        self.last_failure.read().await.clone()
    }
}
