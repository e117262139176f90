use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use syncd_config::CloudConfig;
use syncd_domain::ExternalId;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cooldown::CooldownMap;

/// Cloud-side event kinds the push channel forwards (§4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudEvent {
    Add { external_id: String },
    Delete { external_id: String },
    StartRoute { external_id: String, deliveryman_id: String },
    EndRoute { external_id: String },
    EditLocation { external_id: String },
}

impl CloudEvent {
    pub fn external_id(&self) -> &str {
        match self {
            CloudEvent::Add { external_id }
            | CloudEvent::Delete { external_id }
            | CloudEvent::StartRoute { external_id, .. }
            | CloudEvent::EndRoute { external_id }
            | CloudEvent::EditLocation { external_id } => external_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Offline,
    Connecting,
    Online,
}

impl From<u8> for ChannelState {
    fn from(v: u8) -> Self {
        match v {
            1 => ChannelState::Connecting,
            2 => ChannelState::Online,
            _ => ChannelState::Offline,
        }
    }
}

impl From<ChannelState> for u8 {
    fn from(s: ChannelState) -> Self {
        match s {
            ChannelState::Offline => 0,
            ChannelState::Connecting => 1,
            ChannelState::Online => 2,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Offline => "offline",
            ChannelState::Connecting => "connecting",
            ChannelState::Online => "online",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct PushChannelConfig {
    pub handshake_timeout: Duration,
    pub keepalive_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        PushChannelConfig {
            handshake_timeout: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(30),
            reconnect_base: Duration::from_secs(2),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

/// Long-lived subscription to the cloud event stream (§4.6). `offline →
/// connecting → online → offline`, with automatic reconnection. Events
/// received while not `online` are dropped — the next reconciler cycle
/// repairs whatever divergence results.
pub struct PushChannel {
    websocket_url: String,
    integration_name: String,
    bearer: Arc<RwLock<String>>,
    cooldown: CooldownMap,
    cfg: PushChannelConfig,
    state: AtomicU8,
    cancel: Arc<tokio::sync::Mutex<Option<CancellationToken>>>,
}

impl PushChannel {
    pub fn new(cloud_cfg: &CloudConfig, bearer: Arc<RwLock<String>>, cooldown: CooldownMap) -> Self {
        PushChannel {
            websocket_url: cloud_cfg.websocket_url.clone(),
            integration_name: cloud_cfg.integration_name.clone(),
            bearer,
            cooldown,
            cfg: PushChannelConfig::default(),
            state: AtomicU8::new(ChannelState::Offline.into()),
            cancel: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, s: ChannelState) {
        self.state.store(s.into(), Ordering::SeqCst);
    }

    pub async fn start(self: Arc<Self>, events: mpsc::Sender<CloudEvent>) {
        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());
        tokio::spawn(self.run(events, token));
    }

    pub async fn stop(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
    }

    async fn run(self: Arc<Self>, events: mpsc::Sender<CloudEvent>, cancel: CancellationToken) {
        let mut backoff = self.cfg.reconnect_base;
        loop {
            if cancel.is_cancelled() {
                self.set_state(ChannelState::Offline);
                return;
            }

            self.set_state(ChannelState::Connecting);
            match self.connect_and_serve(&events, &cancel).await {
                Ok(()) => {
                    // Serve loop returned cleanly only on cancellation.
                    self.set_state(ChannelState::Offline);
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "push channel disconnected, reconnecting");
                    self.set_state(ChannelState::Offline);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(self.cfg.reconnect_max);
                }
            }
        }
    }

    async fn connect_and_serve(
        &self,
        events: &mpsc::Sender<CloudEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let token = self.bearer.read().await.clone();
        let (ws, _resp) = tokio::time::timeout(
            self.cfg.handshake_timeout,
            tokio_tungstenite::connect_async(&self.websocket_url),
        )
        .await
        .map_err(|_| "handshake timed out".to_string())?
        .map_err(|e| e.to_string())?;

        let (mut write, mut read) = ws.split();

        let init = serde_json::json!({
            "type": "connection_init",
            "payload": {
                "Authorization": format!("Bearer {token}"),
                "X-Integration-Name": self.integration_name,
            }
        });
        write
            .send(Message::Text(init.to_string()))
            .await
            .map_err(|e| e.to_string())?;

        self.set_state(ChannelState::Online);
        info!("push channel online");
        // Reset backoff is handled by the caller on the next disconnect.

        loop {
            let next = tokio::time::timeout(self.cfg.keepalive_timeout, read.next());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = next => {
                    let msg = result.map_err(|_| "keepalive timeout".to_string())?;
                    let Some(msg) = msg else { return Err("stream closed".into()) };
                    let msg = msg.map_err(|e| e.to_string())?;
                    match msg {
                        Message::Text(text) => self.handle_text(&text, events).await,
                        Message::Close(_) => return Err("server closed connection".into()),
                        Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, events: &mpsc::Sender<CloudEvent>) {
        if self.state() != ChannelState::Online {
            debug!("dropping event received while not online");
            return;
        }
        match serde_json::from_str::<CloudEvent>(text) {
            Ok(event) => {
                self.cooldown.touch(&ExternalId::new(event.external_id()));
                let _ = events.send(event).await;
            }
            Err(e) => {
                debug!(error = %e, payload = text, "ignoring unrecognized push channel message");
            }
        }
    }
}
