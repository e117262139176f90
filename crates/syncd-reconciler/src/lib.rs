pub mod error;
pub mod events;
pub mod reconciler;

pub use error::ReconcilerError;
pub use events::ReconcilerEvent;
pub use reconciler::Reconciler;
