pub mod driver_mapping;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod status;
pub mod sweeper;

pub use error::OrchestratorError;
pub use lock::InstanceLock;
pub use orchestrator::{status_counts, Orchestrator};
pub use status::{FailureReport, OpsStatus};
