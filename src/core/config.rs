//! Configuration management with layered hierarchy

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::core::identifier::{IdentifierPattern, PatternError, DEFAULT_ID_PATTERN};
use crate::core::resolver::DEFAULT_EXTENSIONS;
use crate::core::sheets::ID_COLUMN;

/// Project config file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "catalink.yaml";

/// Environment variable holding the description API key
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_IMAGE_ROOT: &str = "Images/Objektbilder/Objektbilder";
const DEFAULT_SHEET_DIR: &str = "Excel-Files/Objektdaten";
const DEFAULT_LINKED_CSV: &str = "linked.csv";
const DEFAULT_MISSES_CSV: &str = "linked_misses.csv";

/// One catalogue spreadsheet export and the data rows to read from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Path, relative to the spreadsheet directory unless absolute
    pub file: PathBuf,

    /// First data row (zero-based, header excluded)
    #[serde(default)]
    pub start: usize,

    /// End of the row range (exclusive); `None` reads to the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<usize>,

    /// Column holding the inventory number (case-insensitive)
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

fn default_id_column() -> String {
    ID_COLUMN.to_string()
}

impl SourceSpec {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            start: 0,
            stop: None,
            id_column: default_id_column(),
        }
    }

    pub fn with_range(mut self, start: usize, stop: usize) -> Self {
        self.start = start;
        self.stop = Some(stop);
        self
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stop {
            Some(stop) => write!(f, "{}:{}-{}", self.file.display(), self.start, stop),
            None if self.start > 0 => write!(f, "{}:{}-", self.file.display(), self.start),
            None => write!(f, "{}", self.file.display()),
        }
    }
}

/// Parses `FILE`, `FILE:START-STOP` or `FILE:START-`
impl FromStr for SourceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty source".to_string());
        }

        let Some((file, range)) = s.rsplit_once(':') else {
            return Ok(Self::new(s));
        };
        let Some((start, stop)) = range.split_once('-') else {
            return Ok(Self::new(s));
        };
        if !start.chars().all(|c| c.is_ascii_digit()) || start.is_empty() {
            return Ok(Self::new(s));
        }

        let start: usize = start
            .parse()
            .map_err(|e| format!("invalid range start in '{}': {}", s, e))?;
        let stop: Option<usize> = if stop.is_empty() {
            None
        } else {
            Some(
                stop.parse()
                    .map_err(|e| format!("invalid range stop in '{}': {}", s, e))?,
            )
        };
        if stop.is_some_and(|stop| stop < start) {
            return Err(format!("range end before start in '{}'", s));
        }

        Ok(Self {
            file: PathBuf::from(file),
            start,
            stop,
            id_column: default_id_column(),
        })
    }
}

/// Settings for the description generator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeConfig {
    /// Chat-completions endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Attempts per object before giving up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Base of the exponential backoff, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_backoff_secs: Option<f64>,

    /// Pause between objects, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_secs: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_images_per_call: Option<usize>,

    /// Number of linked groups to describe per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Result table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Display names for metadata columns (`t1` -> `Inventar-Nr`)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl DescribeConfig {
    fn defaults() -> Self {
        Self {
            endpoint: Some("https://api.openai.com/v1/chat/completions".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            max_tokens: Some(700),
            max_retries: Some(6),
            base_backoff_secs: Some(2.0),
            pause_secs: Some(5.0),
            max_images_per_call: Some(3),
            limit: Some(3),
            output: Some(PathBuf::from("catalog_results.csv")),
            labels: default_labels(),
        }
    }

    /// Pause between objects; missing or out-of-range values give 5 s
    pub fn pause(&self) -> Duration {
        self.pause_secs
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(Duration::from_secs(5))
    }

    fn merge(&mut self, other: DescribeConfig) {
        if other.endpoint.is_some() {
            self.endpoint = other.endpoint;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.base_backoff_secs.is_some() {
            self.base_backoff_secs = other.base_backoff_secs;
        }
        if other.pause_secs.is_some() {
            self.pause_secs = other.pause_secs;
        }
        if other.max_images_per_call.is_some() {
            self.max_images_per_call = other.max_images_per_call;
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        self.labels.extend(other.labels);
    }
}

fn default_labels() -> BTreeMap<String, String> {
    [
        ("t1", "Inventar-Nr"),
        ("t2", "Hersteller"),
        ("t3", "Materialien"),
        ("t4", "Maße"),
        ("t5", "Beschreibung (Excel)"),
        ("t6", "Kategorie"),
        ("t7", "Bezeichnung"),
        ("t8", "Standort / Depot"),
        ("t9", "Provenienz"),
        ("t10", "Zustand"),
        ("t11", "Signatur"),
        ("t12", "Inventarnr. (alt)"),
        ("t13", "Bildangabe (Excel)"),
        ("t14", "Datierung / Jahr"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Catalink configuration with layered hierarchy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image root holding one directory per year
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_root: Option<PathBuf>,

    /// Directory the spreadsheet exports live in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceSpec>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,

    /// Inventory number pattern (four capture groups)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_csv: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub misses_csv: Option<PathBuf>,

    pub describe: DescribeConfig,
}

impl Config {
    /// Built-in defaults for the cataloguing project
    pub fn defaults() -> Self {
        Self {
            image_root: Some(PathBuf::from(DEFAULT_IMAGE_ROOT)),
            sheet_dir: Some(PathBuf::from(DEFAULT_SHEET_DIR)),
            sources: Some(vec![
                SourceSpec::new("Liste_AK Kommunikation.xls").with_range(300, 600),
                SourceSpec::new("Liste_AEG Produktsammlung.xls").with_range(2500, 3000),
            ]),
            allowed_extensions: Some(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()),
            id_pattern: Some(DEFAULT_ID_PATTERN.to_string()),
            linked_csv: Some(PathBuf::from(DEFAULT_LINKED_CSV)),
            misses_csv: Some(PathBuf::from(DEFAULT_MISSES_CSV)),
            describe: DescribeConfig::defaults(),
        }
    }

    /// Load configuration from all sources, merging in priority order
    ///
    /// An explicitly given config file must exist and parse; the implicit
    /// global and project files are skipped with a warning when broken.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // 1. Built-in defaults
        let mut config = Config::defaults();

        // 2. Global user config (~/.config/catalink/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                match Self::read_file(&global_path) {
                    Ok(global) => config.merge(global),
                    Err(e) => warn!("{}", e),
                }
            }
        }

        // 3. Project config (./catalink.yaml) or the file given on the command line
        match explicit {
            Some(path) => config.merge(Self::read_file(path)?),
            None => {
                let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
                if project_path.exists() {
                    match Self::read_file(&project_path) {
                        Ok(project) => config.merge(project),
                        Err(e) => warn!("{}", e),
                    }
                }
            }
        }

        // 4. Environment variables
        if let Ok(root) = std::env::var("CATALINK_IMAGE_ROOT") {
            config.image_root = Some(PathBuf::from(root));
        }
        if let Ok(dir) = std::env::var("CATALINK_SHEET_DIR") {
            config.sheet_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Parse a single YAML config file
    pub fn read_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "catalink")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.image_root.is_some() {
            self.image_root = other.image_root;
        }
        if other.sheet_dir.is_some() {
            self.sheet_dir = other.sheet_dir;
        }
        if other.sources.is_some() {
            self.sources = other.sources;
        }
        if other.allowed_extensions.is_some() {
            self.allowed_extensions = other.allowed_extensions;
        }
        if other.id_pattern.is_some() {
            self.id_pattern = other.id_pattern;
        }
        if other.linked_csv.is_some() {
            self.linked_csv = other.linked_csv;
        }
        if other.misses_csv.is_some() {
            self.misses_csv = other.misses_csv;
        }
        self.describe.merge(other.describe);
    }

    pub fn image_root(&self) -> PathBuf {
        self.image_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_ROOT))
    }

    pub fn sheet_dir(&self) -> PathBuf {
        self.sheet_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHEET_DIR))
    }

    pub fn sources(&self) -> Vec<SourceSpec> {
        self.sources.clone().unwrap_or_default()
    }

    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_extensions
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    /// Compile the configured identifier pattern
    pub fn id_pattern(&self) -> Result<IdentifierPattern, ConfigError> {
        match &self.id_pattern {
            Some(p) if p != DEFAULT_ID_PATTERN => Ok(IdentifierPattern::new(p)?),
            _ => Ok(IdentifierPattern::default()),
        }
    }

    pub fn linked_csv(&self) -> PathBuf {
        self.linked_csv
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LINKED_CSV))
    }

    pub fn misses_csv(&self) -> PathBuf {
        self.misses_csv
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MISSES_CSV))
    }

    /// Read the API key from the environment
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("no {} set; add it to the environment before running describe", API_KEY_VAR)]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_source_spec_parse_plain() {
        let spec: SourceSpec = "Liste_AK.csv".parse().unwrap();
        assert_eq!(spec.file, PathBuf::from("Liste_AK.csv"));
        assert_eq!(spec.start, 0);
        assert_eq!(spec.stop, None);
        assert_eq!(spec.id_column, "t1");
    }

    #[test]
    fn test_source_spec_parse_range() {
        let spec: SourceSpec = "Liste_AK Kommunikation.csv:300-600".parse().unwrap();
        assert_eq!(spec.file, PathBuf::from("Liste_AK Kommunikation.csv"));
        assert_eq!(spec.start, 300);
        assert_eq!(spec.stop, Some(600));
        assert_eq!(spec.to_string(), "Liste_AK Kommunikation.csv:300-600");
    }

    #[test]
    fn test_source_spec_parse_open_range() {
        let spec: SourceSpec = "list.csv:10-".parse().unwrap();
        assert_eq!(spec.start, 10);
        assert_eq!(spec.stop, None);
    }

    #[test]
    fn test_source_spec_parse_drive_letter() {
        let spec: SourceSpec = r"C:\data\list.csv".parse().unwrap();
        assert_eq!(spec.file, PathBuf::from(r"C:\data\list.csv"));
        assert_eq!(spec.start, 0);
    }

    #[test]
    fn test_source_spec_parse_reversed_range() {
        assert!("list.csv:600-300".parse::<SourceSpec>().is_err());
        assert!("".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::defaults();
        assert_eq!(config.sources().len(), 2);
        assert_eq!(config.sources()[0].start, 300);
        assert_eq!(config.allowed_extensions().len(), 6);
        assert_eq!(config.describe.max_retries, Some(6));
        assert_eq!(
            config.describe.labels.get("t1").map(String::as_str),
            Some("Inventar-Nr")
        );
        assert!(config.id_pattern().is_ok());
    }

    #[test]
    fn test_describe_pause_rejects_out_of_range() {
        let mut describe = DescribeConfig::defaults();
        assert_eq!(describe.pause(), Duration::from_secs(5));

        describe.pause_secs = Some(0.5);
        assert_eq!(describe.pause(), Duration::from_millis(500));

        for bad in [1e20, -1.0, f64::NAN, f64::INFINITY] {
            describe.pause_secs = Some(bad);
            assert_eq!(describe.pause(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_merge_takes_precedence() {
        let mut config = Config::defaults();
        let other: Config = serde_yml::from_str(
            r#"
image_root: /srv/images
sources:
  - file: list.csv
    stop: 20
describe:
  model: gpt-4o
  labels:
    t2: Beteiligte
"#,
        )
        .unwrap();

        config.merge(other);
        assert_eq!(config.image_root(), PathBuf::from("/srv/images"));
        assert_eq!(config.sheet_dir(), PathBuf::from(DEFAULT_SHEET_DIR));
        assert_eq!(
            config.sources(),
            vec![SourceSpec {
                file: PathBuf::from("list.csv"),
                start: 0,
                stop: Some(20),
                id_column: "t1".to_string(),
            }]
        );
        assert_eq!(config.describe.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.describe.max_tokens, Some(700));
        assert_eq!(
            config.describe.labels.get("t2").map(String::as_str),
            Some("Beteiligte")
        );
        assert_eq!(
            config.describe.labels.get("t3").map(String::as_str),
            Some("Materialien")
        );
    }

    #[test]
    fn test_read_file_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            Config::read_file(&missing).unwrap_err(),
            ConfigError::Read { .. }
        ));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "sources: [unclosed").unwrap();
        assert!(matches!(
            Config::read_file(&broken).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = Config {
            id_pattern: Some(r"(\d+)/(\d{4})".to_string()),
            ..Config::defaults()
        };
        assert!(matches!(
            config.id_pattern().unwrap_err(),
            ConfigError::Pattern(_)
        ));
    }
}
