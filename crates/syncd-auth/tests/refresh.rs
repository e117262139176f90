use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use syncd_auth::{StoredToken, TokenProvider};
use syncd_config::AuthConfig;
use syncd_domain::FakeClock;

fn test_cfg(domain: &str) -> AuthConfig {
    AuthConfig {
        domain: domain.into(),
        client_id: "client-1".into(),
        scope: "openid profile".into(),
        audience: "https://cloud.example.test/api".into(),
    }
}

fn write_token(dir: &tempfile::TempDir, expires_at: chrono::DateTime<Utc>) -> std::path::PathBuf {
    let path = dir.path().join("token.json");
    let token = StoredToken {
        access_token: "cached-access".into(),
        refresh_token: "cached-refresh".into(),
        expires_at,
    };
    syncd_auth::store::write(&path, &token).unwrap();
    path
}

/// §9: the skew decision is driven by the injected clock, not the wall
/// clock — advancing the fake clock is what moves a token in or out of the
/// refresh window, not a real sleep.
#[tokio::test]
async fn cached_token_is_returned_without_refresh_when_outside_skew_window() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let path = write_token(&dir, now + ChronoDuration::hours(1));
    let clock = Arc::new(FakeClock::new(now));

    let provider = TokenProvider::load_with_clock(test_cfg("auth.invalid"), path, clock).unwrap();
    let token = provider.get_valid_token().await.unwrap();
    assert_eq!(token, "cached-access");
}

#[tokio::test]
async fn entering_the_skew_window_forces_a_refresh_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    // Expires in 30s; REFRESH_SKEW is 60s, so this is already inside the
    // window at `now` — no need to advance the clock to prove it moves.
    let path = write_token(&dir, now + ChronoDuration::seconds(30));
    let clock = Arc::new(FakeClock::new(now));

    // A closed local port: the refresh POST fails fast (connection refused)
    // rather than depending on network access or a DNS timeout.
    let provider = TokenProvider::load_with_clock(test_cfg("127.0.0.1:9"), path, clock).unwrap();
    assert!(provider.get_valid_token().await.is_err());
}

#[tokio::test]
async fn advancing_the_clock_moves_a_token_into_the_skew_window() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let path = write_token(&dir, now + ChronoDuration::seconds(90));
    let clock = Arc::new(FakeClock::new(now));

    let provider =
        TokenProvider::load_with_clock(test_cfg("127.0.0.1:9"), path, clock.clone()).unwrap();
    // Still outside the 60s skew window.
    assert_eq!(provider.get_valid_token().await.unwrap(), "cached-access");

    // Advance past the point where expires_at - now() <= REFRESH_SKEW.
    clock.advance(std::time::Duration::from_secs(40));
    assert!(provider.get_valid_token().await.is_err());
}
