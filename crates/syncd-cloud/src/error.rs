use thiserror::Error;

/// The only error kinds the dispatcher discriminates on (§4.3).
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http error: {0}")]
    Http(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("request timed out")]
    Timeout,
}

impl CloudError {
    /// True for connect/read timeouts, transport errors and 5xx — the set the
    /// dispatcher's retry policy (§4.4.1) retries on. 4xx other than 429,
    /// validation errors and parse errors are not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Transport(_) | CloudError::Timeout => true,
            CloudError::Http(status) => *status >= 500 || *status == 429,
            CloudError::Parse(_) | CloudError::Server(_) => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CloudError::Http(401))
    }
}
