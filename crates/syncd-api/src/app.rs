use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// The ops HTTP surface (§6): `/healthz`, `/readyz`, `/status`. No mutation
/// endpoints — everything here is a read of state the orchestrator already
/// owns.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/status", get(handlers::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_always_ok() {
        let dir = tempfile_dir();
        let orchestrator = build_test_orchestrator(&dir).await;
        let app = build_app(Arc::new(AppState { orchestrator }));

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_is_503_before_startup_completes() {
        let dir = tempfile_dir();
        let orchestrator = build_test_orchestrator(&dir).await;
        let app = build_app(Arc::new(AppState { orchestrator }));

        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    fn tempfile_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    async fn build_test_orchestrator(dir: &tempfile::TempDir) -> Arc<syncd_orchestrator::Orchestrator> {
        use std::time::Duration;
        use syncd_config::{AuthConfig, CloudConfig, Config, ReconciliationConfig, StoreConfig, TargetSystem};

        let cfg = Config {
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
                sqlite_path: dir.path().join("tracking.sqlite3"),
                lock_path: dir.path().join("syncd.lock"),
                token_store_path: dir.path().join("token.json"),
            },
            watch_dir: Some(dir.path().join("watch")),
            retention: Duration::from_secs(30 * 24 * 3600),
            ops_http_bind: "127.0.0.1:0".into(),
        };

        syncd_auth::store::write(
            &cfg.store.token_store_path,
            &syncd_auth::StoredToken {
                access_token: "access".into(),
                refresh_token: "refresh".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            },
        )
        .unwrap();

        Arc::new(syncd_orchestrator::Orchestrator::bootstrap(cfg).await.unwrap())
    }
}
