use std::sync::Arc;

use object_store::ObjectStore;
use object_store::gcp::GoogleCloudStorageBuilder;
use types::error::{PredictResult, SyncError};

/// Supplies the store handle for each bucket a request names.
pub trait StoreProvider: Send + Sync + 'static {
    fn store(&self, bucket: &str) -> PredictResult<Arc<dyn ObjectStore>>;
}

/// Resolves buckets against Google Cloud Storage using ambient credentials.
pub struct GcsProvider;

impl StoreProvider for GcsProvider {
    fn store(&self, bucket: &str) -> PredictResult<Arc<dyn ObjectStore>> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(SyncError::from)?;
        Ok(Arc::new(store))
    }
}
