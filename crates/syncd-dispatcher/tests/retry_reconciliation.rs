use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use syncd_cloud::CloudClient;
use syncd_config::{CloudConfig, ReconciliationConfig};
use syncd_dispatcher::{Dispatcher, DispatcherEvent};
use syncd_domain::{InternalId, Order};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// §4.4.2 / S3: a timed-out ADD is reconciled against the cloud's own
/// record of what happened, rather than retried as a fresh RPC.
#[tokio::test]
async fn timed_out_add_is_reconciled_instead_of_resent() {
    let server = MockServer::start().await;

    // The ADD mutation never answers inside the client's timeout window.
    // `.expect(1)` asserts it is called exactly once — the retry after the
    // timeout must be satisfied by reconciliation, not a second mutation.
    Mock::given(method("POST"))
        .and(body_string_contains("AddDelivery"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    // But the snapshot the retry-time reconciliation pass queries shows the
    // delivery was in fact created server-side.
    Mock::given(method("POST"))
        .and(body_string_contains("GlobalSnapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "deliveries": [{
                    "id": "E9",
                    "route_id": null,
                    "created_at": Utc::now().to_rfc3339(),
                    "metadata": { "customer_name": "Alice", "address": "123 Main Street" },
                    "status": "PENDING",
                    "deliveryman_id": null,
                }]
            }
        })))
        .mount(&server)
        .await;

    let cloud = Arc::new(CloudClient::new(&CloudConfig {
        api_url: server.uri(),
        websocket_url: "ws://127.0.0.1:1/ws".into(),
        timeout: Duration::from_millis(200),
        use_ssl: false,
        use_neighbourhood: false,
        integration_name: "test".into(),
    }));

    let reconciliation = ReconciliationConfig {
        retry_reconciliation_enabled: true,
        retry_reconciliation_delay: Duration::from_millis(10),
        retry_reconciliation_max_attempts: 3,
        retry_reconciliation_time_window: Duration::from_secs(300),
        ..ReconciliationConfig::default()
    };

    let dispatcher = Arc::new(Dispatcher::new(cloud, reconciliation));
    let internal_id = InternalId::canonicalize("502");
    let order = Order::new("502", "Alice", "123 Main Street", Utc::now()).unwrap();
    dispatcher.enqueue_add(internal_id.clone(), order).await;

    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(dispatcher.clone().run(tx, cancel.clone()));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("dispatcher should complete the task")
        .expect("channel should stay open");

    match event {
        DispatcherEvent::DeliverySuccess { internal_id: id, external_id } => {
            assert_eq!(id, internal_id);
            assert_eq!(external_id.as_str(), "E9");
        }
        other => panic!("expected reconciled success, got {other:?}"),
    }

    cancel.cancel();
    let _ = handle.await;

    // Drops here, running wiremock's expectation check: the `.expect(1)`
    // above fails the test if the ADD mutation was sent more than once.
    drop(server);
}
