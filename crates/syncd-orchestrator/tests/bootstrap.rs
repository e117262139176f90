use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use syncd_config::{AuthConfig, CloudConfig, Config, ReconciliationConfig, StoreConfig, TargetSystem};
use syncd_orchestrator::Orchestrator;
use tokio_util::sync::CancellationToken;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        target_system: TargetSystem::FileWatch,
        cloud: CloudConfig {
            api_url: "http://127.0.0.1:1/graphql".into(),
            websocket_url: "ws://127.0.0.1:1/ws".into(),
            timeout: Duration::from_millis(200),
            use_ssl: false,
            use_neighbourhood: false,
            integration_name: "test".into(),
        },
        reconciliation: ReconciliationConfig { enabled: false, ..ReconciliationConfig::default() },
        erp: None,
        auth: AuthConfig {
            domain: "auth.example.test".into(),
            client_id: "client".into(),
            scope: "offline_access".into(),
            audience: "https://api.example.test".into(),
        },
        store: StoreConfig {
            sqlite_path: dir.join("tracking.sqlite3"),
            lock_path: dir.join("syncd.lock"),
            token_store_path: dir.join("token.json"),
        },
        watch_dir: Some(dir.join("watch")),
        retention: Duration::from_secs(30 * 24 * 3600),
        ops_http_bind: "127.0.0.1:0".into(),
    }
}

#[tokio::test]
async fn bootstrap_and_run_reaches_ready_then_shuts_down_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());

    syncd_auth::store::write(
        &cfg.store.token_store_path,
        &syncd_auth::StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    )
    .unwrap();

    let orchestrator = Arc::new(Orchestrator::bootstrap(cfg).await.unwrap());
    let ops = orchestrator.ops_status();
    assert!(!ops.is_ready());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(orchestrator.clone().run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ops.is_ready());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "orchestrator did not shut down within the timeout");
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn bootstrap_fails_fast_when_another_instance_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    syncd_auth::store::write(
        &cfg.store.token_store_path,
        &syncd_auth::StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        },
    )
    .unwrap();

    let _lock = syncd_orchestrator::InstanceLock::acquire(&cfg.store.lock_path).unwrap();
    let err = Orchestrator::bootstrap(cfg).await.unwrap_err();
    assert!(matches!(err, syncd_orchestrator::OrchestratorError::AlreadyRunning(_)));
}
