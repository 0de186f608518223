use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_MIN_CONFIDENCE: f32 = 55.0;
pub const DEFAULT_MAX_LABELS: u32 = 25;
pub const CONFIG_FILE_VAR: &str = "LABELER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Conflicting output paths: {0}")]
    Conflict(String),
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    pub per_key_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("labels.csv"),
            json_path: PathBuf::from("labels.json"),
            per_key_dir: PathBuf::from("results_json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint (LocalStack and friends).
    pub endpoint: Option<String>,
    pub profile: Option<String>,
    pub min_confidence: f32,
    pub max_labels: u32,
    /// Skip keys that Rekognition cannot decode (anything but jpeg/png).
    pub images_only: bool,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: None,
            region: None,
            endpoint: None,
            profile: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_labels: DEFAULT_MAX_LABELS,
            images_only: true,
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Builds the configuration from the process environment, seeded from the
    /// YAML file named by `LABELER_CONFIG` when set.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut config = match lookup(CONFIG_FILE_VAR) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = serde_yaml::from_str(&config_str)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("S3_BUCKET_NAME") {
            self.bucket = bucket;
        }
        if let Some(prefix) = lookup("S3_PREFIX") {
            self.prefix = Some(prefix);
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.region = Some(region);
        }
        if let Some(endpoint) = lookup("AWS_ENDPOINT_URL") {
            self.endpoint = Some(endpoint);
        }
        if let Some(profile) = lookup("AWS_PROFILE") {
            self.profile = Some(profile);
        }
        if let Some(value) = lookup("MIN_CONFIDENCE") {
            self.min_confidence = parse_var("MIN_CONFIDENCE", value)?;
        }
        if let Some(value) = lookup("MAX_LABELS") {
            self.max_labels = parse_var("MAX_LABELS", value)?;
        }
        if let Some(value) = lookup("IMAGES_ONLY") {
            self.images_only = parse_bool("IMAGES_ONLY", value)?;
        }
        if let Some(path) = lookup("OUTPUT_CSV") {
            self.output.csv_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("OUTPUT_JSON") {
            self.output.json_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("OUTPUT_JSON_DIR") {
            self.output.per_key_dir = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("S3_BUCKET_NAME"));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(ConfigError::OutOfRange(format!(
                "min_confidence must be within 0-100, got {}",
                self.min_confidence
            )));
        }
        if self.max_labels == 0 {
            return Err(ConfigError::OutOfRange(
                "max_labels must be at least 1".to_string(),
            ));
        }
        let per_key_dir = normalize_path(&self.output.per_key_dir);
        if normalize_path(&self.output.json_path).starts_with(&per_key_dir) {
            return Err(ConfigError::Conflict(format!(
                "combined JSON {} is inside the per-key directory {}",
                self.output.json_path.display(),
                self.output.per_key_dir.display()
            )));
        }
        Ok(())
    }
}

/// Lexical normalization: drops `.` components, so `./out/a.json` and
/// `out/a.json` compare equal. `.` itself becomes the empty path.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_with_only_bucket() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("S3_BUCKET_NAME", "photos")])).unwrap();

        assert_eq!(config.bucket, "photos");
        assert_eq!(config.prefix, None);
        assert_eq!(config.min_confidence, 55.0);
        assert_eq!(config.max_labels, 25);
        assert!(config.images_only);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_missing_bucket_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("S3_BUCKET_NAME")));
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("S3_PREFIX", ""),
            ("MIN_CONFIDENCE", "  "),
        ]))
        .unwrap();

        assert_eq!(config.prefix, None);
        assert_eq!(config.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("S3_PREFIX", "uploads/"),
            ("AWS_REGION", "eu-west-1"),
            ("MIN_CONFIDENCE", "70"),
            ("MAX_LABELS", "10"),
            ("IMAGES_ONLY", "false"),
            ("OUTPUT_CSV", "out/labels.csv"),
            ("OUTPUT_JSON_DIR", "out/per_image"),
        ]))
        .unwrap();

        assert_eq!(config.prefix.as_deref(), Some("uploads/"));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.min_confidence, 70.0);
        assert_eq!(config.max_labels, 10);
        assert!(!config.images_only);
        assert_eq!(config.output.csv_path, PathBuf::from("out/labels.csv"));
        assert_eq!(config.output.json_path, PathBuf::from("labels.json"));
        assert_eq!(config.output.per_key_dir, PathBuf::from("out/per_image"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("MAX_LABELS", "many"),
        ]))
        .unwrap_err();

        match err {
            ConfigError::InvalidValue { var, value } => {
                assert_eq!(var, "MAX_LABELS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_confidence_out_of_range() {
        let err = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("MIN_CONFIDENCE", "120"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange(_)));
    }

    #[test]
    fn test_zero_max_labels_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("MAX_LABELS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange(_)));
    }

    #[test]
    fn test_yaml_file_seeds_then_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bucket: from-yaml\nprefix: raw/\nmin_confidence: 80.5\noutput:\n  csv_path: yaml.csv"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = PipelineConfig::from_lookup(lookup_from(&[
            (CONFIG_FILE_VAR, path.as_str()),
            ("S3_PREFIX", "override/"),
        ]))
        .unwrap();

        assert_eq!(config.bucket, "from-yaml");
        assert_eq!(config.prefix.as_deref(), Some("override/"));
        assert_eq!(config.min_confidence, 80.5);
        assert_eq!(config.max_labels, DEFAULT_MAX_LABELS);
        assert_eq!(config.output.csv_path, PathBuf::from("yaml.csv"));
        assert_eq!(config.output.json_path, PathBuf::from("labels.json"));
    }

    #[test]
    fn test_combined_json_inside_per_key_dir_rejected() {
        for (json, dir) in [
            ("labels.json", "."),
            ("out/labels.json", "out"),
            ("./out/labels.json", "out/"),
            ("out/nested/labels.json", "./out"),
        ] {
            let err = PipelineConfig::from_lookup(lookup_from(&[
                ("S3_BUCKET_NAME", "photos"),
                ("OUTPUT_JSON", json),
                ("OUTPUT_JSON_DIR", dir),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Conflict(_)), "{json} in {dir}");
        }
    }

    #[test]
    fn test_sibling_output_paths_accepted() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("S3_BUCKET_NAME", "photos"),
            ("OUTPUT_JSON", "out/labels.json"),
            ("OUTPUT_JSON_DIR", "out/results_json"),
        ]))
        .unwrap();
        assert_eq!(config.output.per_key_dir, PathBuf::from("out/results_json"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./out/./a.json")), PathBuf::from("out/a.json"));
        assert_eq!(normalize_path(Path::new(".")), PathBuf::new());
    }

    #[test]
    fn test_missing_yaml_file() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(
            CONFIG_FILE_VAR,
            "/nonexistent/labeler.yaml",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
