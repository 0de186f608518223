use std::collections::HashSet;

use shared::{DetectionRecord, ImageKey};

/// Append-only buffer of records in enumeration order.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<DetectionRecord>,
    seen: HashSet<ImageKey>,
}

/// One CSV line: a single label of a single key.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LabelRow<'a> {
    pub s3_key: &'a str,
    pub label: &'a str,
    pub confidence: f32,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the key was already recorded; the first record wins.
    pub fn push(&mut self, record: DetectionRecord) -> bool {
        if !self.seen.insert(record.key.clone()) {
            log::warn!("Duplicate key {} ignored", record.key);
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }

    pub fn label_count(&self) -> usize {
        self.records.iter().map(|r| r.labels().len()).sum()
    }

    pub fn csv_rows(&self) -> impl Iterator<Item = LabelRow<'_>> {
        self.records.iter().flat_map(|record| {
            record.labels().iter().map(move |label| LabelRow {
                s3_key: record.key.as_str(),
                label: &label.name,
                confidence: label.confidence,
            })
        })
    }
}
