//! Output artifacts.
//!
//! Three views of the same records are written:
//!
//! * a CSV with one row per (key, label). Keys without labels, including
//!   failed detections, produce no rows at all;
//! * a combined JSON object mapping every key to its outcome (a label array,
//!   possibly empty, or an `{"error": .., "message": ..}` object);
//! * one JSON file per key holding exactly that key's outcome.
//!
//! Each artifact is attempted on its own. A failure is reported in the
//! [`WriteReport`] and nothing already written is rolled back.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::{DetectionRecord, ImageKey};

use super::aggregator::Aggregator;
use crate::config::{OutputConfig, normalize_path};

const CSV_HEADER: [&str; 3] = ["s3_key", "label", "confidence"];
const MAX_ENCODED_NAME: usize = 200;
const HASHED_NAME_PREFIX: usize = 120;
/// Separates the prefix from the digest in hashed names. Never emitted by
/// [`ArtifactWriter::file_name_for`] for unhashed names.
const HASH_MARKER: char = '+';
/// Names of the per-key files written by the previous run, one per line.
pub const MANIFEST_FILE: &str = ".label-pipeline-manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ArtifactKind {
    #[strum(serialize = "CSV")]
    Csv,
    #[strum(serialize = "combined JSON")]
    CombinedJson,
    #[strum(serialize = "per-key JSON")]
    PerKeyJson,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Per-key file {0} would overwrite another output")]
    Collides(PathBuf),
}

impl WriteError {
    fn io(path: &Path, source: io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        WriteError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<(ArtifactKind, PathBuf)>,
    pub failures: Vec<(ArtifactKind, WriteError)>,
    pub per_key_files: usize,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Serializes records as one JSON object keyed by image key, in record order.
struct CombinedLabels<'a>(&'a [DetectionRecord]);

impl Serialize for CombinedLabels<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            map.serialize_entry(record.key.as_str(), &record.outcome)?;
        }
        map.end()
    }
}

pub struct ArtifactWriter {
    output: OutputConfig,
}

impl ArtifactWriter {
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    /// Deterministic, collision-free file name for a key's JSON file.
    ///
    /// The key is percent-encoded and then folded to lowercase (see
    /// [`case_safe_encode`]), so distinct keys get distinct names even on
    /// case-insensitive filesystems. Names past the filesystem-safe length are
    /// shortened and suffixed with `+` and the SHA-256 of the raw key; `+` is
    /// always escaped by the encoding, so the two forms never meet.
    pub fn file_name_for(key: &ImageKey) -> String {
        let encoded = case_safe_encode(key.as_str());
        if encoded.len() <= MAX_ENCODED_NAME {
            return format!("{}.json", encoded);
        }

        // Encoded output is pure ASCII, so any byte index is a char boundary.
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        format!(
            "{}{}{}.json",
            &encoded[..HASHED_NAME_PREFIX],
            HASH_MARKER,
            hex::encode(hasher.finalize())
        )
    }

    pub fn per_key_path(&self, key: &ImageKey) -> PathBuf {
        self.output.per_key_dir.join(Self::file_name_for(key))
    }

    pub fn write_all(&self, aggregator: &Aggregator) -> WriteReport {
        let mut report = WriteReport::default();

        match self.write_csv(aggregator) {
            Ok(rows) => {
                log::info!("Saved CSV: {} ({} rows)", self.output.csv_path.display(), rows);
                report
                    .written
                    .push((ArtifactKind::Csv, self.output.csv_path.clone()));
            }
            Err(e) => report.failures.push((ArtifactKind::Csv, e)),
        }

        match self.write_combined_json(aggregator.records()) {
            Ok(()) => {
                log::info!("Saved JSON: {}", self.output.json_path.display());
                report
                    .written
                    .push((ArtifactKind::CombinedJson, self.output.json_path.clone()));
            }
            Err(e) => report.failures.push((ArtifactKind::CombinedJson, e)),
        }

        let (written, failures) = self.write_per_key_json(aggregator.records());
        report.per_key_files = written;
        if failures.is_empty() {
            log::info!(
                "Saved {} per-key JSON files in: {}",
                written,
                self.output.per_key_dir.display()
            );
            report
                .written
                .push((ArtifactKind::PerKeyJson, self.output.per_key_dir.clone()));
        } else {
            report
                .failures
                .extend(failures.into_iter().map(|e| (ArtifactKind::PerKeyJson, e)));
        }

        for (kind, e) in &report.failures {
            log::error!("Failed to write {}: {}", kind, e);
        }

        report
    }

    pub fn write_csv(&self, aggregator: &Aggregator) -> Result<usize, WriteError> {
        let path = &self.output.csv_path;
        ensure_parent_dir(path)?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| WriteError::csv(path, e))?;

        wtr.write_record(CSV_HEADER)
            .map_err(|e| WriteError::csv(path, e))?;

        let mut rows = 0;
        for row in aggregator.csv_rows() {
            wtr.serialize(row).map_err(|e| WriteError::csv(path, e))?;
            rows += 1;
        }
        wtr.flush().map_err(|e| WriteError::io(path, e))?;

        Ok(rows)
    }

    pub fn write_combined_json(&self, records: &[DetectionRecord]) -> Result<(), WriteError> {
        let path = &self.output.json_path;
        ensure_parent_dir(path)?;
        write_json(path, &CombinedLabels(records))
    }

    /// Returns the number of files written and the failures encountered.
    ///
    /// Only files listed in the manifest of the previous run are candidates
    /// for removal; anything else in the directory is left alone. The combined
    /// JSON and the CSV are never removed or overwritten from here.
    pub fn write_per_key_json(&self, records: &[DetectionRecord]) -> (usize, Vec<WriteError>) {
        let dir = &self.output.per_key_dir;
        let mut failures = Vec::new();

        if let Err(e) = fs::create_dir_all(dir) {
            failures.push(WriteError::io(dir, e));
            return (0, failures);
        }

        let names: Vec<String> = records
            .iter()
            .map(|record| Self::file_name_for(&record.key))
            .collect();
        let current: HashSet<&str> = names.iter().map(String::as_str).collect();

        match self.remove_stale(&current) {
            Ok(0) => {}
            Ok(removed) => log::info!("Removed {} stale per-key files from {}", removed, dir.display()),
            Err(e) => failures.push(e),
        }

        let mut written = Vec::with_capacity(names.len());
        for (record, name) in records.iter().zip(&names) {
            let path = dir.join(name);
            if self.is_other_output(&path) {
                failures.push(WriteError::Collides(path));
                continue;
            }
            match write_json(&path, &record.outcome) {
                Ok(()) => written.push(name.as_str()),
                Err(e) => failures.push(e),
            }
        }

        let manifest = dir.join(MANIFEST_FILE);
        let mut contents = written.join("\n");
        contents.push('\n');
        if let Err(e) = fs::write(&manifest, contents) {
            failures.push(WriteError::io(&manifest, e));
        }

        (written.len(), failures)
    }

    /// Removes files recorded by the previous run that the current run does
    /// not produce. Returns how many were removed.
    fn remove_stale(&self, current: &HashSet<&str>) -> Result<usize, WriteError> {
        let dir = &self.output.per_key_dir;
        let manifest = dir.join(MANIFEST_FILE);
        let previous = match fs::read_to_string(&manifest) {
            Ok(previous) => previous,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(WriteError::io(&manifest, e)),
        };

        let mut removed = 0;
        for name in previous.lines() {
            if current.contains(name) || !is_per_key_file_name(name) {
                continue;
            }
            let path = dir.join(name);
            if self.is_other_output(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(WriteError::io(&path, e)),
            }
        }
        Ok(removed)
    }

    fn is_other_output(&self, path: &Path) -> bool {
        same_path(path, &self.output.json_path) || same_path(path, &self.output.csv_path)
    }
}

/// Percent-encodes `key`, then folds the result to lowercase without losing
/// information: an uppercase letter becomes `_` plus its lowercase form, a
/// literal `_` becomes `%5f` and escape digits are lowercased.
fn case_safe_encode(key: &str) -> String {
    let encoded = urlencoding::encode(key);
    let mut out = String::with_capacity(encoded.len() + 8);
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                out.push('%');
                for digit in chars.by_ref().take(2) {
                    out.push(digit.to_ascii_lowercase());
                }
            }
            '_' => out.push_str("%5f"),
            c if c.is_ascii_uppercase() => {
                out.push('_');
                out.push(c.to_ascii_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

/// Whether `name` could have come from [`ArtifactWriter::file_name_for`].
/// Guards removal against a hand-edited manifest.
fn is_per_key_file_name(name: &str) -> bool {
    name.len() > ".json".len()
        && name.ends_with(".json")
        && name.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "-._~%".contains(c) || c == HASH_MARKER
        })
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => normalize_path(a) == normalize_path(b),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), WriteError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), WriteError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    fs::write(path, bytes).map_err(|e| WriteError::io(path, e))
}
