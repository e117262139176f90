use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("ERP I/O error: {0}")]
    ErpIo(String),

    #[error("schema install failed: {0}")]
    SchemaInstall(String),

    #[error("store error: {0}")]
    Store(#[from] syncd_store::StoreError),

    #[error("domain error: {0}")]
    Domain(#[from] syncd_domain::DomainError),

    #[error("file watch error: {0}")]
    Watch(String),

    #[error("connector is not running")]
    NotRunning,
}
