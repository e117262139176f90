use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token store I/O error at {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("token store parse error at {path}: {source}")]
    Parse { path: String, source: serde_json::Error },

    #[error("no token store found at {path}; bootstrap one out of band before starting")]
    NotBootstrapped { path: String },

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}
