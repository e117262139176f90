use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("another instance is already running (lock held at {0})")]
    AlreadyRunning(String),

    #[error("startup failed: {0}")]
    Startup(String),

    #[error("store error: {0}")]
    Store(#[from] syncd_store::StoreError),

    #[error("connector error: {0}")]
    Connector(#[from] syncd_connector::ConnectorError),

    #[error("cloud error: {0}")]
    Cloud(#[from] syncd_cloud::CloudError),

    #[error("auth error: {0}")]
    Auth(#[from] syncd_auth::AuthError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
