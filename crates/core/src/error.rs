//! Error taxonomy shared by the training pipeline and the recommendation service
//!
//! Four families of failures exist:
//!
//! - **Load**: a missing, unreadable or entirely unparsable input or artifact file
//! - **Parse**: a single malformed input row. These never surface here; loaders
//!   skip the row and count it.
//! - **Lookup**: a title absent from the matrix or without a poster. The service
//!   reports these as `Lookup::NotFound`; the `TitleNotFound` / `PosterNotFound`
//!   variants exist for callers that prefer the error path.
//! - **Consistency**: artifacts written by different training runs.

use std::fmt;
use std::path::{Path, PathBuf};

/// Pipeline stage (or query) an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validation,
    Transformation,
    ModelTraining,
    Recommendation,
}

impl Stage {
    /// Training stages in execution order
    pub const TRAINING: [Stage; 3] = [
        Stage::Validation,
        Stage::Transformation,
        Stage::ModelTraining,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "data_validation",
            Stage::Transformation => "data_transformation",
            Stage::ModelTraining => "model_training",
            Stage::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecommenderError {
    #[error("[{stage}] failed to load {}: {message}", path.display())]
    Load {
        stage: Stage,
        path: PathBuf,
        message: String,
    },

    #[error("[{stage}] failed to persist {}: {message}", path.display())]
    Persist {
        stage: Stage,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid rating matrix: {message}")]
    InvalidMatrix { message: String },

    #[error("Stale artifact '{artifact}': expected {expected}, found {found}")]
    StaleArtifact {
        artifact: String,
        expected: String,
        found: String,
    },

    #[error("Title not found: {title}")]
    TitleNotFound { title: String },

    #[error("No poster found for title: {title}")]
    PosterNotFound { title: String },

    #[error("Training aborted before stage {stage}")]
    Aborted { stage: Stage },

    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },
}

impl RecommenderError {
    pub fn load(stage: Stage, path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        RecommenderError::Load {
            stage,
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn persist(stage: Stage, path: impl AsRef<Path>, message: impl fmt::Display) -> Self {
        RecommenderError::Persist {
            stage,
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn invalid_matrix(message: impl Into<String>) -> Self {
        RecommenderError::InvalidMatrix {
            message: message.into(),
        }
    }

    /// True for lookup failures a caller can fix by choosing another title
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RecommenderError::TitleNotFound { .. } | RecommenderError::PosterNotFound { .. }
        )
    }
}

impl From<config::ConfigError> for RecommenderError {
    fn from(err: config::ConfigError) -> Self {
        RecommenderError::ConfigurationError {
            message: err.to_string(),
            key: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_mentions_stage_and_path() {
        let err = RecommenderError::load(Stage::Validation, "data/BX-Books.csv", "not found");
        let message = err.to_string();
        assert!(message.contains("data_validation"));
        assert!(message.contains("data/BX-Books.csv"));
        assert!(message.contains("not found"));
    }

    #[test]
    fn test_not_found_classification() {
        let title = RecommenderError::TitleNotFound {
            title: "Dune".to_string(),
        };
        let poster = RecommenderError::PosterNotFound {
            title: "Dune".to_string(),
        };
        let stale = RecommenderError::StaleArtifact {
            artifact: "model".to_string(),
            expected: "a".to_string(),
            found: "b".to_string(),
        };

        assert!(title.is_not_found());
        assert!(poster.is_not_found());
        assert!(!stale.is_not_found());
    }

    #[test]
    fn test_training_stage_order() {
        assert_eq!(
            Stage::TRAINING,
            [
                Stage::Validation,
                Stage::Transformation,
                Stage::ModelTraining
            ]
        );
        assert_eq!(Stage::ModelTraining.to_string(), "model_training");
    }
}
