use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("cloud error: {0}")]
    Cloud(#[from] syncd_cloud::CloudError),

    #[error("store error: {0}")]
    Store(#[from] syncd_store::StoreError),
}
