use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

/// Key of an object in the source bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub name: String,
    /// Percentage in `[0, 100]` as reported by the detector.
    pub confidence: f32,
}

impl LabelResult {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Throttled,
    InvalidImage,
    AccessDenied,
    Service,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFailure {
    #[serde(rename = "error")]
    pub kind: FailureKind,
    pub message: String,
}

/// Result of one detection call.
///
/// Serialized untagged: a success is a plain array of labels, a failure is an
/// object carrying an `error` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionOutcome {
    Labels(Vec<LabelResult>),
    Failed(DetectionFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub key: ImageKey,
    pub outcome: DetectionOutcome,
}

impl DetectionRecord {
    pub fn labeled(key: ImageKey, labels: Vec<LabelResult>) -> Self {
        Self {
            key,
            outcome: DetectionOutcome::Labels(labels),
        }
    }

    pub fn failed(key: ImageKey, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            key,
            outcome: DetectionOutcome::Failed(DetectionFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Labels of a successful detection; empty for a failed one.
    pub fn labels(&self) -> &[LabelResult] {
        match &self.outcome {
            DetectionOutcome::Labels(labels) => labels,
            DetectionOutcome::Failed(_) => &[],
        }
    }

    pub fn failure(&self) -> Option<&DetectionFailure> {
        match &self.outcome {
            DetectionOutcome::Failed(failure) => Some(failure),
            DetectionOutcome::Labels(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }
}
