pub mod aggregator;
pub mod labeler;
pub mod writer;

use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::detection::LabelDetector;
use crate::storage::ObjectLister;
use crate::storage::s3_service::S3ServiceError;
use aggregator::Aggregator;
use labeler::Labeler;
use writer::{ArtifactWriter, WriteReport};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listing failed: {0}")]
    Connectivity(#[from] S3ServiceError),
}

#[derive(Debug)]
pub struct RunSummary {
    pub keys: usize,
    pub failed: usize,
    pub label_rows: usize,
    pub write: WriteReport,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn labeled(&self) -> usize {
        self.keys - self.failed
    }
}

/// Lists, labels and writes, one key at a time.
///
/// A listing failure aborts the run before anything is written. Detection
/// failures are recorded per key and never abort.
pub async fn run<L, D>(
    lister: &L,
    prefix: Option<&str>,
    labeler: &Labeler<D>,
    writer: &ArtifactWriter,
) -> Result<RunSummary, PipelineError>
where
    L: ObjectLister + ?Sized,
    D: LabelDetector,
{
    let started = Instant::now();

    lister.verify_bucket().await?;

    let mut aggregator = Aggregator::new();
    let mut keys = lister.list_keys(prefix);
    while let Some(key) = keys.next().await {
        let record = labeler.label(key?).await;
        aggregator.push(record);
    }

    // An empty listing is still a complete run: the artifacts are rewritten
    // empty and the previous run's per-key files are removed.
    if aggregator.is_empty() {
        log::warn!("No objects found under prefix {:?}", prefix.unwrap_or(""));
    }

    log::info!(
        "Labeled {} keys ({} failed, {} labels)",
        aggregator.len(),
        aggregator.failed_count(),
        aggregator.label_count()
    );

    let write = writer.write_all(&aggregator);

    Ok(RunSummary {
        keys: aggregator.len(),
        failed: aggregator.failed_count(),
        label_rows: aggregator.label_count(),
        write,
        elapsed: started.elapsed(),
    })
}
