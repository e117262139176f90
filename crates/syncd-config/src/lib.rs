mod config;
pub mod error;
mod loader;
mod raw;

pub use config::{
    AuthConfig, CloudConfig, Config, ErpConfig, ReconciliationConfig, StoreConfig, TargetSystem,
};
pub use error::ConfigError;
pub use loader::load;
