pub mod rekognition_service;

use async_trait::async_trait;
use shared::{FailureKind, ImageKey, LabelResult};

use crate::config::{DEFAULT_MAX_LABELS, DEFAULT_MIN_CONFIDENCE, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub min_confidence: f32,
    pub max_labels: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_labels: DEFAULT_MAX_LABELS,
        }
    }
}

impl From<&PipelineConfig> for DetectionParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            max_labels: config.max_labels,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Throttled: {0}")]
    Throttled(String),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("Detection service error: {0}")]
    Service(String),
}

impl DetectionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DetectionError::Throttled(_) => FailureKind::Throttled,
            DetectionError::InvalidImage(_) => FailureKind::InvalidImage,
            DetectionError::AccessDenied(_) => FailureKind::AccessDenied,
            DetectionError::Service(_) => FailureKind::Service,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DetectionError::Throttled(m)
            | DetectionError::InvalidImage(m)
            | DetectionError::AccessDenied(m)
            | DetectionError::Service(m) => m,
        }
    }
}

/// One remote detection call per key; no retries beyond what the client does.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect_labels(
        &self,
        key: &ImageKey,
        params: &DetectionParams,
    ) -> Result<Vec<LabelResult>, DetectionError>;
}
