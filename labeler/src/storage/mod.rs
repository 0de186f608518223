pub mod s3_service;

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::ImageKey;

use self::s3_service::S3ServiceError;

/// Source of the keys to label.
///
/// `list_keys` yields every matching key exactly once; pagination is never
/// visible to the caller. Any error is fatal for the run.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn verify_bucket(&self) -> Result<(), S3ServiceError>;

    fn list_keys<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, Result<ImageKey, S3ServiceError>>;
}
