//! Configuration loading for the book recommender
//!
//! Two kinds of configuration live here:
//!
//! - [`RecommenderConfig`]: artifact layout, cleaning thresholds, model and query
//!   parameters. Layered with the `config` crate: built-in defaults < optional
//!   config file < `BOOK_RECOMMENDER__*` environment variables.
//! - [`TelemetryConfig`]: log level, format and log directory, read from
//!   `BOOK_RECOMMENDER_LOG_*` environment variables through [`ConfigLoader`].
//!
//! Configuration values are built per call and handed to components explicitly;
//! there is no process-wide instance.
//!
//! # Example
//!
//! ```no_run
//! use book_recommender_core::config::{load_dotenv, RecommenderConfig};
//!
//! # fn example() -> book_recommender_core::Result<()> {
//! load_dotenv();
//! let config = RecommenderConfig::load(None)?;
//! config.validate()?;
//! println!("artifacts in {}", config.artifacts.artifacts_dir.display());
//! # Ok(())
//! # }
//! ```

use crate::error::RecommenderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ENV_PREFIX: &str = "BOOK_RECOMMENDER";
const DEFAULT_CONFIG_FILE: &str = "config/recommender";

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a variable is set but cannot be parsed.
    fn from_env() -> Result<Self, RecommenderError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), RecommenderError>;
}

/// Distance used by the neighbor index
///
/// Ratings are zero-filled, so the choice changes rankings: euclidean distance
/// penalises popular titles with large rating magnitudes, cosine distance only
/// compares the direction of the rating vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance, the common default for brute-force k-NN
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`; rows without ratings are at distance 1 from everything
    Cosine,
    /// L1 distance
    Manhattan,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Manhattan => "manhattan",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = RecommenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            other => Err(RecommenderError::ConfigurationError {
                message: format!(
                    "Unknown distance metric '{}'. Must be one of: euclidean, cosine, manhattan",
                    other
                ),
                key: Some("model.metric".to_string()),
            }),
        }
    }
}

/// Artifact directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Root of every file the pipeline reads or writes
    pub artifacts_dir: PathBuf,
    /// Dataset folder under `artifacts_dir`
    pub dataset_dir: String,
    /// Extracted raw CSV files, under the dataset folder
    pub ingested_dir: String,
    /// Cleaned interaction table, under the dataset folder
    pub clean_data_dir: String,
    /// Transformed rating matrix, under the dataset folder
    pub transformed_data_dir: String,
    /// Inference-time artifacts, under `artifacts_dir`
    pub serialized_objects_dir: String,
    /// Fitted neighbor model, under `artifacts_dir`
    pub trained_model_dir: String,
    pub trained_model_name: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            dataset_dir: "dataset".to_string(),
            ingested_dir: "ingested_data".to_string(),
            clean_data_dir: "clean_data".to_string(),
            transformed_data_dir: "transformed_data".to_string(),
            serialized_objects_dir: "serialized_objects".to_string(),
            trained_model_dir: "trained_model".to_string(),
            trained_model_name: "model.bin".to_string(),
        }
    }
}

impl ArtifactsConfig {
    /// Layout rooted at `dir` with default folder names
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Input files and cleaning thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub books_csv_file: String,
    pub ratings_csv_file: String,
    /// Field delimiter of both input files
    pub delimiter: char,
    /// Users need strictly more raw ratings than this to be kept
    pub min_user_ratings: usize,
    /// Titles need at least this many ratings after the user filter
    pub min_title_ratings: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            books_csv_file: "BX-Books.csv".to_string(),
            ratings_csv_file: "BX-Book-Ratings.csv".to_string(),
            delimiter: ';',
            min_user_ratings: 200,
            min_title_ratings: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub metric: DistanceMetric,
}

/// Query parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Rows fetched from the index, the queried title included
    pub neighbors: usize,
    /// Recommendations returned to the caller
    pub results: usize,
    /// Keep loaded artifacts in memory between queries
    pub cache_enabled: bool,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            neighbors: 6,
            results: 5,
            cache_enabled: true,
        }
    }
}

/// Complete recommender configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub artifacts: ArtifactsConfig,
    pub validation: ValidationConfig,
    pub model: ModelConfig,
    pub recommendation: RecommendationConfig,
}

impl RecommenderConfig {
    /// Load configuration from defaults, a config file and the environment
    ///
    /// With `path = None` the optional file `config/recommender.{toml,yaml,json}`
    /// is read when present. An explicit path must exist. Environment variables
    /// use the form `BOOK_RECOMMENDER__RECOMMENDATION__NEIGHBORS=8`.
    pub fn load(path: Option<&Path>) -> Result<Self, RecommenderError> {
        let defaults = config::Config::try_from(&RecommenderConfig::default())?;

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), RecommenderError> {
        if self.artifacts.trained_model_name.trim().is_empty() {
            return Err(RecommenderError::ConfigurationError {
                message: "trained_model_name must not be empty".to_string(),
                key: Some("artifacts.trained_model_name".to_string()),
            });
        }

        if !self.validation.delimiter.is_ascii() || self.validation.delimiter.is_whitespace() {
            return Err(RecommenderError::ConfigurationError {
                message: format!(
                    "delimiter must be a visible ASCII character, got {:?}",
                    self.validation.delimiter
                ),
                key: Some("validation.delimiter".to_string()),
            });
        }

        if self.validation.min_title_ratings == 0 {
            return Err(RecommenderError::ConfigurationError {
                message: "min_title_ratings must be greater than 0".to_string(),
                key: Some("validation.min_title_ratings".to_string()),
            });
        }

        if self.recommendation.results == 0 {
            return Err(RecommenderError::ConfigurationError {
                message: "results must be greater than 0".to_string(),
                key: Some("recommendation.results".to_string()),
            });
        }

        if self.recommendation.neighbors <= self.recommendation.results {
            return Err(RecommenderError::ConfigurationError {
                message: format!(
                    "neighbors ({}) must exceed results ({}) since the queried title is among them",
                    self.recommendation.neighbors, self.recommendation.results
                ),
                key: Some("recommendation.neighbors".to_string()),
            });
        }

        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Telemetry configuration
///
/// # Environment Variables
///
/// - `BOOK_RECOMMENDER_LOG_LEVEL` (optional): Log level (default: "info", falls back to `RUST_LOG`)
/// - `BOOK_RECOMMENDER_LOG_FORMAT` (optional): `pretty` or `json` (default: "pretty")
/// - `BOOK_RECOMMENDER_LOG_DIR` (optional): Directory for timestamped log files
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "book-recommender".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
        }
    }
}

impl ConfigLoader for TelemetryConfig {
    fn from_env() -> Result<Self, RecommenderError> {
        let log_level = std::env::var("BOOK_RECOMMENDER_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| TelemetryConfig::default().log_level);

        let format = parse_env_var("BOOK_RECOMMENDER_LOG_FORMAT", LogFormat::Pretty)?;

        let log_dir = std::env::var("BOOK_RECOMMENDER_LOG_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            log_level,
            format,
            log_dir,
            ..Self::default()
        })
    }

    fn validate(&self) -> Result<(), RecommenderError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(RecommenderError::ConfigurationError {
                message: format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.log_level,
                    valid_log_levels.join(", ")
                ),
                key: Some("BOOK_RECOMMENDER_LOG_LEVEL".to_string()),
            });
        }

        Ok(())
    }
}

/// Parse an environment variable, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the value cannot be parsed
fn parse_env_var<T>(key: &str, default: T) -> Result<T, RecommenderError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| RecommenderError::ConfigurationError {
                    message: format!("Failed to parse {}: {}", key, e),
                    key: Some(key.to_string()),
                })
        })
        .unwrap_or(Ok(default))
}

/// Load a `.env` file from the working directory if one exists
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}
