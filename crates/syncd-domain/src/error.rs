use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown delivery status code: {0}")]
    UnknownStatus(String),
}
