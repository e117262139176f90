use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::{
    AuthConfig, CloudConfig, Config, ErpConfig, ReconciliationConfig, StoreConfig, TargetSystem,
};
use crate::error::ConfigError;
use crate::raw::RawConfig;

/// Load and validate the daemon's YAML config file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "loaded config");
    convert(raw, path)
}

fn convert(raw: RawConfig, path: &Path) -> Result<Config, ConfigError> {
    let target_system = parse_target_system(&raw.target_system, path)?;

    let erp = match (&target_system, raw.erp) {
        (TargetSystem::Farmax, Some(e)) => Some(ErpConfig {
            host: e.host,
            file: e.file,
            user: e.user,
            password: e.password,
        }),
        (TargetSystem::Farmax, None) => {
            return Err(ConfigError::Conversion {
                path: path.display().to_string(),
                message: "target_system 'farmax' requires an 'erp' section".into(),
            })
        }
        (TargetSystem::FileWatch, _) => None,
    };

    if target_system == TargetSystem::FileWatch && raw.watch_dir.is_none() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "target_system 'file_watch' requires 'watch_dir'".into(),
        });
    }

    let cloud = CloudConfig {
        api_url: raw.cloud.api_url,
        websocket_url: raw.cloud.websocket_url,
        timeout: Duration::from_secs_f64(raw.cloud.timeout_seconds),
        use_ssl: raw.cloud.use_ssl,
        use_neighbourhood: raw.cloud.use_neighbourhood,
        integration_name: raw.cloud.integration_name,
    };

    let defaults = ReconciliationConfig::default();
    let r = raw.reconciliation;
    let reconciliation = ReconciliationConfig {
        enabled: r.enabled,
        sync_interval: r
            .sync_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.sync_interval),
        cooldown: r
            .cooldown_seconds
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.cooldown),
        retry_reconciliation_enabled: r
            .retry_reconciliation_enabled
            .unwrap_or(defaults.retry_reconciliation_enabled),
        retry_reconciliation_delay: r
            .retry_reconciliation_delay_seconds
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.retry_reconciliation_delay),
        retry_reconciliation_max_attempts: r
            .retry_reconciliation_max_attempts
            .unwrap_or(defaults.retry_reconciliation_max_attempts),
        retry_reconciliation_time_window: r
            .retry_reconciliation_time_window_seconds
            .map(Duration::from_secs_f64)
            .unwrap_or(defaults.retry_reconciliation_time_window),
    };

    if reconciliation.sync_interval < Duration::from_millis(1_000) {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "reconciliation.sync_interval_ms must be at least 1000".into(),
        });
    }
    if !(1..=5).contains(&reconciliation.retry_reconciliation_max_attempts) {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "reconciliation.retry_reconciliation_max_attempts must be 1..=5".into(),
        });
    }
    if reconciliation.retry_reconciliation_time_window < Duration::from_secs(60) {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "reconciliation.retry_reconciliation_time_window_seconds must be >= 60"
                .into(),
        });
    }

    let auth = AuthConfig {
        domain: raw.auth.domain,
        client_id: raw.auth.client_id,
        scope: raw.auth.scope,
        audience: raw.auth.audience,
    };

    let store = StoreConfig {
        sqlite_path: raw.store.sqlite_path,
        lock_path: raw.store.lock_path,
        token_store_path: raw.store.token_store_path,
    };

    Ok(Config {
        target_system,
        cloud,
        reconciliation,
        erp,
        auth,
        store,
        watch_dir: raw.watch_dir,
        retention: Duration::from_secs(u64::from(raw.retention_days) * 24 * 3600),
        ops_http_bind: raw.ops_http.bind,
    })
}

fn parse_target_system(s: &str, path: &Path) -> Result<TargetSystem, ConfigError> {
    match s {
        "farmax" => Ok(TargetSystem::Farmax),
        "file_watch" => Ok(TargetSystem::FileWatch),
        other => Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!("unknown target_system '{other}'"),
        }),
    }
}
