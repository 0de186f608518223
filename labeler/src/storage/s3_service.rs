use async_stream::try_stream;
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use futures::stream::BoxStream;
use futures::Stream;
use shared::ImageKey;

use super::ObjectLister;

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    images_only: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Access denied to bucket {bucket}: {message}")]
    AccessDenied { bucket: String, message: String },
    #[error("S3 error: {0}")]
    S3(String),
}

impl S3ServiceError {
    fn from_sdk<E>(bucket: &str, err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let status = err.raw_response().map(|r| r.status().as_u16());
        let code = err.code().map(str::to_string);
        let message = DisplayErrorContext(&err).to_string();
        Self::classify(bucket, code.as_deref(), status, message)
    }

    fn classify(bucket: &str, code: Option<&str>, status: Option<u16>, message: String) -> Self {
        match (code, status) {
            (Some("NoSuchBucket" | "NotFound"), _) | (_, Some(404)) => {
                S3ServiceError::BucketNotFound(bucket.to_string())
            }
            (Some("AccessDenied" | "Forbidden" | "AllAccessDisabled"), _) | (_, Some(403)) => {
                S3ServiceError::AccessDenied {
                    bucket: bucket.to_string(),
                    message,
                }
            }
            _ => S3ServiceError::S3(message),
        }
    }
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String, images_only: bool) -> Self {
        Self {
            client,
            bucket_name,
            images_only,
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn is_supported_image_key(key: &str) -> bool {
        key.rsplit_once('.')
            .map(|(_, ext)| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
    }

    fn accepts(&self, key: &str) -> bool {
        if key.is_empty() || key.ends_with('/') {
            return false;
        }
        !self.images_only || Self::is_supported_image_key(key)
    }

    fn object_stream<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> impl Stream<Item = Result<ImageKey, S3ServiceError>> + Send + 'a {
        try_stream! {
            let mut continuation_token: Option<String> = None;
            let mut page = 0usize;

            loop {
                let mut req = self.client.list_objects_v2().bucket(&self.bucket_name);

                if let Some(prefix) = prefix {
                    req = req.prefix(prefix);
                }

                if let Some(ref token) = continuation_token {
                    req = req.continuation_token(token);
                }

                let resp = req
                    .send()
                    .await
                    .map_err(|e| S3ServiceError::from_sdk(&self.bucket_name, e))?;

                page += 1;
                log::debug!(
                    "Listed page {} of s3://{}/{} ({} objects)",
                    page,
                    self.bucket_name,
                    prefix.unwrap_or(""),
                    resp.contents().len()
                );

                for obj in resp.contents() {
                    let key = obj.key().unwrap_or_default();
                    if !self.accepts(key) {
                        log::debug!("Skipping s3://{}/{}", self.bucket_name, key);
                        continue;
                    }
                    yield ImageKey::new(key);
                }

                if resp.is_truncated() == Some(true) {
                    continuation_token = resp.next_continuation_token().map(str::to_string);
                    if continuation_token.is_none() {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectLister for S3Service {
    async fn verify_bucket(&self) -> Result<(), S3ServiceError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| S3ServiceError::from_sdk(&self.bucket_name, e))?;

        Ok(())
    }

    fn list_keys<'a>(
        &'a self,
        prefix: Option<&'a str>,
    ) -> BoxStream<'a, Result<ImageKey, S3ServiceError>> {
        Box::pin(self.object_stream(prefix))
    }
}
