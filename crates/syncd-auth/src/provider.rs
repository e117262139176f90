use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use syncd_config::AuthConfig;
use syncd_domain::{Clock, SystemClock};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AuthError;
use crate::jwt;
use crate::store::{self, StoredToken};

const REFRESH_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Supplies a bearer that is never expired, refreshing proactively on a
/// timer derived from the token's own `exp` claim (§4.8). External to the
/// core: the orchestrator only calls [`TokenProvider::get_valid_token`] at
/// startup and wires [`TokenProvider::run`] into its background set.
pub struct TokenProvider {
    cfg: AuthConfig,
    store_path: PathBuf,
    http: reqwest::Client,
    current: RwLock<StoredToken>,
    clock: Arc<dyn Clock>,
}

impl TokenProvider {
    /// Loads the bootstrapped token store from disk. Returns
    /// [`AuthError::NotBootstrapped`] if no store exists yet — the daemon
    /// does not perform the initial interactive login itself.
    pub fn load(cfg: AuthConfig, store_path: PathBuf) -> Result<Self, AuthError> {
        Self::load_with_clock(cfg, store_path, Arc::new(SystemClock))
    }

    /// Test seam (§9): a `FakeClock` lets expiry-driven refresh timing be
    /// asserted deterministically instead of depending on real elapsed time.
    pub fn load_with_clock(
        cfg: AuthConfig,
        store_path: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let current = store::read(&store_path)?;
        Ok(TokenProvider {
            cfg,
            store_path,
            http: reqwest::Client::new(),
            current: RwLock::new(current),
            clock,
        })
    }

    /// Never returns an expired bearer: refreshes first if within the skew
    /// window of expiry.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        {
            let current = self.current.read().await;
            if current.expires_at - self.clock.now() > chrono::Duration::from_std(REFRESH_SKEW).unwrap() {
                return Ok(current.access_token.clone());
            }
        }
        self.refresh().await
    }

    /// Forces a refresh regardless of the current token's remaining
    /// lifetime. Used by the orchestrator when the cloud client reports a
    /// 401 — the skew window says the token should still be good, but the
    /// server disagrees.
    pub async fn force_refresh(&self) -> Result<String, AuthError> {
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        let refresh_token = self.current.read().await.refresh_token.clone();
        let url = format!("https://{}/oauth/token", self.cfg.domain);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.cfg.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("audience", self.cfg.audience.as_str()),
                ("scope", self.cfg.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AuthError::RefreshFailed(format!("HTTP {}", resp.status())));
        }

        let body: RefreshResponse =
            resp.json().await.map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let expires_at = jwt::expiry(&body.access_token).unwrap_or_else(|| {
            self.clock.now() + chrono::Duration::seconds(body.expires_in.unwrap_or(3600))
        });

        let updated = StoredToken {
            access_token: body.access_token,
            refresh_token: body.refresh_token.unwrap_or(refresh_token),
            expires_at,
        };

        store::write(&self.store_path, &updated)?;
        *self.current.write().await = updated.clone();
        info!(expires_at = %updated.expires_at, "refreshed cloud bearer token");
        Ok(updated.access_token)
    }

    /// Background loop: sleeps until `REFRESH_SKEW` before the current
    /// token's expiry, refreshes, and publishes the new bearer on
    /// `on_refresh` so the cloud client and push channel stay current.
    pub async fn run(self: Arc<Self>, on_refresh: mpsc::Sender<String>, cancel: CancellationToken) {
        loop {
            let sleep_for = {
                let current = self.current.read().await;
                let until_refresh =
                    current.expires_at - self.clock.now() - chrono::Duration::from_std(REFRESH_SKEW).unwrap();
                until_refresh.to_std().unwrap_or(Duration::from_secs(1))
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(sleep_for) => {}
            }
            if cancel.is_cancelled() {
                return;
            }

            match self.refresh().await {
                Ok(token) => {
                    let _ = on_refresh.send(token).await;
                }
                Err(e) => {
                    error!(error = %e, "proactive token refresh failed, core will transition to logged-out");
                    warn!("retrying token refresh in 30s");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                    }
                }
            }
        }
    }
}
