pub mod config;
pub mod dispatcher;
pub mod task;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use task::{DispatchTask, DispatcherEvent};
