use async_trait::async_trait;
use aws_sdk_rekognition::Client;
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_rekognition::types::{Image, S3Object};
use shared::{ImageKey, LabelResult};

use super::{DetectionError, DetectionParams, LabelDetector};

#[derive(Clone)]
pub struct RekognitionService {
    client: Client,
    bucket_name: String,
}

impl RekognitionService {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    fn classify(code: Option<&str>, message: String) -> DetectionError {
        match code {
            Some(
                "ThrottlingException"
                | "ProvisionedThroughputExceededException"
                | "LimitExceededException",
            ) => DetectionError::Throttled(message),
            Some(
                "InvalidImageFormatException"
                | "ImageTooLargeException"
                | "InvalidS3ObjectException",
            ) => DetectionError::InvalidImage(message),
            Some("AccessDeniedException") => DetectionError::AccessDenied(message),
            _ => DetectionError::Service(message),
        }
    }
}

#[async_trait]
impl LabelDetector for RekognitionService {
    async fn detect_labels(
        &self,
        key: &ImageKey,
        params: &DetectionParams,
    ) -> Result<Vec<LabelResult>, DetectionError> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&self.bucket_name)
                    .name(key.as_str())
                    .build(),
            )
            .build();

        let max_labels = i32::try_from(params.max_labels).unwrap_or(i32::MAX);

        let resp = self
            .client
            .detect_labels()
            .image(image)
            .min_confidence(params.min_confidence)
            .max_labels(max_labels)
            .send()
            .await
            .map_err(|e| {
                // Service messages are stable across runs; the full context
                // (request ids) is only used when there is none.
                let message = e
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| DisplayErrorContext(&e).to_string());
                Self::classify(e.code(), message)
            })?;

        let labels = resp
            .labels()
            .iter()
            .filter_map(|label| {
                label
                    .name()
                    .map(|name| LabelResult::new(name, label.confidence().unwrap_or(0.0)))
            })
            .collect();

        Ok(labels)
    }
}
