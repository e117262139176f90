use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Persisted on disk at `StoreConfig::token_store_path`. Bootstrapped out of
/// band (an interactive login flow, or an operator dropping the file in
/// place) — the daemon only ever reads and refreshes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn read(path: &Path) -> Result<StoredToken, AuthError> {
    if !path.exists() {
        return Err(AuthError::NotBootstrapped { path: path.display().to_string() });
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuthError::Io { path: path.display().to_string(), source: e })?;
    serde_json::from_str(&content).map_err(|e| AuthError::Parse { path: path.display().to_string(), source: e })
}

pub fn write(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    let content =
        serde_json::to_string_pretty(token).map_err(|e| AuthError::Parse { path: path.display().to_string(), source: e })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AuthError::Io { path: path.display().to_string(), source: e })?;
    }
    std::fs::write(path, content).map_err(|e| AuthError::Io { path: path.display().to_string(), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let token = StoredToken {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now(),
        };
        write(&path, &token).unwrap();
        let loaded = read(&path).unwrap();
        assert_eq!(loaded.access_token, token.access_token);
    }

    #[test]
    fn missing_file_is_not_bootstrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(read(&path), Err(AuthError::NotBootstrapped { .. })));
    }
}
