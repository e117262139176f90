use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use syncd_config::CloudConfig;
use syncd_domain::{ExternalId, Order};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CloudError;
use crate::snapshot::{find_best_match, DeliveryResponse, GeoLocation, Snapshot};

/// Invoked when a request comes back `401`; expected to obtain a fresh
/// bearer and call [`CloudClient::set_bearer`] before returning.
pub type UnauthorizedHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

/// Thin typed RPC wrapper over the remote GraphQL endpoint (§4.3). Stateless
/// beyond the current bearer token, which the auth provider updates through
/// [`CloudClient::set_bearer`] rather than the client pulling it itself —
/// this breaks the construction cycle between C3 and C8 (design notes, §9).
pub struct CloudClient {
    http: reqwest::Client,
    api_url: String,
    integration_name: String,
    use_neighbourhood: bool,
    bearer: Arc<RwLock<String>>,
    unauthorized_hook: RwLock<Option<UnauthorizedHook>>,
}

impl CloudClient {
    pub fn new(cfg: &CloudConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .danger_accept_invalid_certs(!cfg.use_ssl)
            .build()
            .expect("reqwest client builds with static config");
        CloudClient {
            http,
            api_url: cfg.api_url.clone(),
            integration_name: cfg.integration_name.clone(),
            use_neighbourhood: cfg.use_neighbourhood,
            bearer: Arc::new(RwLock::new(String::new())),
            unauthorized_hook: RwLock::new(None),
        }
    }

    pub async fn set_bearer(&self, token: String) {
        *self.bearer.write().await = token;
    }

    /// Registers the callback run once on an HTTP 401 before the request is
    /// retried a single time (§4.8: "treats 401 as a signal to request a
    /// fresh token"). Set by the orchestrator once both C3 and C8 exist.
    pub async fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        *self.unauthorized_hook.write().await = Some(hook);
    }

    /// Exposes the underlying bearer cell so other components (the push
    /// channel) observe the same refreshes without a second update path.
    pub fn bearer_handle(&self) -> Arc<RwLock<String>> {
        self.bearer.clone()
    }

    async fn bearer(&self) -> String {
        self.bearer.read().await.clone()
    }

    async fn graphql<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, CloudError> {
        match self.graphql_once(query, &variables).await {
            Err(CloudError::Http(401)) => {
                let hook = self.unauthorized_hook.read().await.clone();
                match hook {
                    Some(hook) => {
                        hook().await;
                        self.graphql_once(query, &variables).await
                    }
                    None => Err(CloudError::Http(401)),
                }
            }
            other => other,
        }
    }

    async fn graphql_once<T: serde::de::DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<T, CloudError> {
        let token = self.bearer().await;
        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(token)
            .header("X-Integration-Name", &self.integration_name)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CloudError::Timeout
                } else {
                    CloudError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CloudError::Http(status.as_u16()));
        }

        let envelope: GraphQlEnvelope<T> =
            resp.json().await.map_err(|e| CloudError::Parse(e.to_string()))?;

        if let Some(errors) = envelope.errors {
            if !errors.is_empty() {
                let message = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
                return Err(CloudError::Server(message));
            }
        }

        envelope.data.ok_or_else(|| CloudError::Parse("response had no data field".into()))
    }

    /// Constructs the metadata object for an ADD mutation. Omits
    /// `reference`/`address2`/`neighbourhood` entirely when absent, rather
    /// than sending null, and sends `neighbourhood` only when the client is
    /// configured with `use_neighbourhood` (ground truth: `api/velide.py`).
    fn metadata_object(&self, order: &Order) -> Value {
        let mut metadata = Map::new();
        metadata.insert("customer_name".into(), json!(order.customer_name));
        metadata.insert("address".into(), json!(order.address));
        if let Some(contact) = &order.customer_contact {
            metadata.insert("customer_contact".into(), json!(contact));
        }
        if let Some(address2) = &order.address2 {
            metadata.insert("address2".into(), json!(address2));
        }
        if self.use_neighbourhood {
            if let Some(neighbourhood) = &order.neighbourhood {
                metadata.insert("neighbourhood".into(), json!(neighbourhood));
            }
        }
        if let Some(reference) = &order.reference {
            metadata.insert("reference".into(), json!(reference));
        }
        Value::Object(metadata)
    }

    /// Milliseconds between `created_at` and now, zeroed when the magnitude
    /// is at or under 60 s to avoid spurious offsets on fresh orders.
    fn created_offset_ms(created_at: chrono::DateTime<Utc>) -> i64 {
        let diff_ms = (Utc::now() - created_at).num_milliseconds();
        if diff_ms.abs() <= 60_000 {
            0
        } else {
            diff_ms
        }
    }

    pub async fn add_delivery(&self, order: &Order) -> Result<DeliveryResponse, CloudError> {
        #[derive(Deserialize)]
        struct AddDeliveryData {
            #[serde(rename = "addDelivery")]
            add_delivery: AddDeliveryPayload,
        }
        #[derive(Deserialize)]
        struct AddDeliveryPayload {
            id: String,
            location: Option<GeoLocation>,
        }

        let variables = json!({
            "input": {
                "externalReference": order.internal_id.as_str(),
                "metadata": self.metadata_object(order),
                "offset": Self::created_offset_ms(order.created_at),
            }
        });

        const QUERY: &str = r#"
            mutation AddDelivery($input: AddDeliveryInput!) {
                addDelivery(input: $input) { id location { lat lng } }
            }
        "#;

        let data: AddDeliveryData = self.graphql(QUERY, variables).await?;
        debug!(internal_id = %order.internal_id, external_id = data.add_delivery.id, "delivery added");
        Ok(DeliveryResponse {
            external_id: ExternalId::new(data.add_delivery.id),
            location: data.add_delivery.location,
        })
    }

    pub async fn delete_delivery(&self, external_id: &ExternalId) -> Result<(), CloudError> {
        #[derive(Deserialize)]
        struct DeleteDeliveryData {
            #[serde(rename = "deleteDelivery")]
            #[allow(dead_code)]
            delete_delivery: bool,
        }

        const QUERY: &str = r#"
            mutation DeleteDelivery($id: ID!) {
                deleteDelivery(id: $id)
            }
        "#;

        let _: DeleteDeliveryData =
            self.graphql(QUERY, json!({ "id": external_id.as_str() })).await?;
        Ok(())
    }

    pub async fn get_full_global_snapshot(&self) -> Result<Snapshot, CloudError> {
        #[derive(Deserialize)]
        struct SnapshotData {
            deliveries: Vec<crate::snapshot::SnapshotDelivery>,
        }

        const QUERY: &str = r#"
            query GlobalSnapshot {
                deliveries {
                    id route_id created_at status deliveryman_id
                    metadata { customer_name address integration_name }
                }
            }
        "#;

        let data: SnapshotData = self.graphql(QUERY, json!({})).await?;
        Ok(Snapshot { deliveries: data.deliveries })
    }

    /// Server-side-flavored lookup (§4.4.2), implemented by fetching the
    /// global snapshot and applying the matching rules locally — see
    /// [`find_best_match`]. `window_seconds` is the acceptance window around
    /// now for `created_at`.
    pub async fn find_delivery_by_metadata(
        &self,
        customer_name: &str,
        address: &str,
        window: StdDuration,
    ) -> Result<Option<DeliveryResponse>, CloudError> {
        let snapshot = self.get_full_global_snapshot().await?;
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::seconds(300));
        let found = find_best_match(&snapshot.deliveries, customer_name, address, window, Utc::now());
        Ok(found.map(|c| DeliveryResponse { external_id: ExternalId::new(c.id.clone()), location: None }))
    }

    /// The account's current deliverymen, for the driver-mapping workflow
    /// (§4.9). Returns `(remote_id, name)` pairs.
    pub async fn list_remote_drivers(&self) -> Result<Vec<(String, String)>, CloudError> {
        #[derive(Deserialize)]
        struct DeliverymenData {
            deliverymen: Vec<Deliveryman>,
        }
        #[derive(Deserialize)]
        struct Deliveryman {
            id: String,
            name: String,
        }

        const QUERY: &str = r#"
            query Deliverymen {
                deliverymen { id name }
            }
        "#;

        let data: DeliverymenData = self.graphql(QUERY, json!({})).await?;
        Ok(data.deliverymen.into_iter().map(|d| (d.id, d.name)).collect())
    }
}
