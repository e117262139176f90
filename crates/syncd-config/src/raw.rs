use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw YAML representation of the daemon's config file. Field names mirror
/// what an operator would actually write; conversion into [`crate::Config`]
/// applies defaults and validation.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Which connector to run: "farmax" (Firebird polling) or "file_watch".
    pub target_system: String,

    pub cloud: RawCloudConfig,

    #[serde(default)]
    pub reconciliation: RawReconciliationConfig,

    pub erp: Option<RawErpConfig>,

    pub auth: RawAuthConfig,

    pub store: RawStoreConfig,

    /// Present only when target_system is "file_watch".
    pub watch_dir: Option<PathBuf>,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub ops_http: RawOpsHttpConfig,
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawCloudConfig {
    pub api_url: String,
    pub websocket_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    #[serde(default)]
    pub use_neighbourhood: bool,
    pub integration_name: String,
}

fn default_timeout_seconds() -> f64 {
    15.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawReconciliationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub sync_interval_ms: Option<u64>,
    pub cooldown_seconds: Option<f64>,
    pub retry_reconciliation_enabled: Option<bool>,
    pub retry_reconciliation_delay_seconds: Option<f64>,
    pub retry_reconciliation_max_attempts: Option<u32>,
    pub retry_reconciliation_time_window_seconds: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawErpConfig {
    pub host: String,
    pub file: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawAuthConfig {
    pub domain: String,
    pub client_id: String,
    pub scope: String,
    pub audience: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawStoreConfig {
    pub sqlite_path: PathBuf,
    pub lock_path: PathBuf,
    pub token_store_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawOpsHttpConfig {
    #[serde(default = "default_ops_bind")]
    pub bind: String,
}

impl Default for RawOpsHttpConfig {
    fn default() -> Self {
        RawOpsHttpConfig {
            bind: default_ops_bind(),
        }
    }
}

fn default_ops_bind() -> String {
    "127.0.0.1:8090".to_string()
}
