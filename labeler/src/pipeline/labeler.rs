use shared::{DetectionRecord, ImageKey};

use crate::detection::{DetectionParams, LabelDetector};

/// Turns one key into one record. Detector failures are folded into the
/// record so a bad image never stops the run.
pub struct Labeler<D> {
    detector: D,
    params: DetectionParams,
}

impl<D: LabelDetector> Labeler<D> {
    pub fn new(detector: D, params: DetectionParams) -> Self {
        Self { detector, params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub async fn label(&self, key: ImageKey) -> DetectionRecord {
        log::debug!(
            "Detecting labels for {} (min confidence {}, max labels {})",
            key,
            self.params.min_confidence,
            self.params.max_labels
        );

        match self.detector.detect_labels(&key, &self.params).await {
            Ok(labels) => {
                log::info!("{}: {} labels", key, labels.len());
                DetectionRecord::labeled(key, labels)
            }
            Err(e) => {
                log::warn!("Detection failed for {}: {}", key, e);
                DetectionRecord::failed(key, e.kind(), e.message())
            }
        }
    }
}
