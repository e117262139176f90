use std::path::PathBuf;
use std::time::Duration;

/// Fully validated, defaulted configuration for the daemon. Constructed only
/// by [`crate::load`], never directly from YAML.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_system: TargetSystem,
    pub cloud: CloudConfig,
    pub reconciliation: ReconciliationConfig,
    pub erp: Option<ErpConfig>,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub watch_dir: Option<PathBuf>,
    pub retention: Duration,
    pub ops_http_bind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSystem {
    Farmax,
    FileWatch,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub api_url: String,
    pub websocket_url: String,
    pub timeout: Duration,
    pub use_ssl: bool,
    pub use_neighbourhood: bool,
    pub integration_name: String,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub sync_interval: Duration,
    pub cooldown: Duration,
    pub retry_reconciliation_enabled: bool,
    pub retry_reconciliation_delay: Duration,
    pub retry_reconciliation_max_attempts: u32,
    pub retry_reconciliation_time_window: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig {
            enabled: true,
            sync_interval: Duration::from_millis(60_000),
            cooldown: Duration::from_secs_f64(45.0),
            retry_reconciliation_enabled: true,
            retry_reconciliation_delay: Duration::from_secs_f64(3.0),
            retry_reconciliation_max_attempts: 2,
            retry_reconciliation_time_window: Duration::from_secs_f64(300.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub host: String,
    pub file: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub domain: String,
    pub client_id: String,
    pub scope: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub sqlite_path: PathBuf,
    pub lock_path: PathBuf,
    pub token_store_path: PathBuf,
}
