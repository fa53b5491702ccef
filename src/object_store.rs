//! Object store abstraction used to publish transform outputs.

use crate::error::TransformerError;

use async_trait::async_trait;
use std::path::Path;

/// Object store trait.
///
/// Defines the interface the worker uses to upload an output file.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file as an object.
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `key`: Name of the object in the bucket
    /// * `path`: Path of the local file
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), TransformerError>;
}
