//! # Book Recommender Core
//!
//! Ambient building blocks shared by the recommendation engine and its tools.
//!
//! ## Modules
//!
//! - `error`: Error taxonomy (load, persist, lookup, consistency, configuration)
//! - `config`: Layered configuration loading and validation
//! - `telemetry`: Tracing subscriber setup with an explicit shutdown guard
//! - `abort`: Cooperative abort signal checked between training stages

pub mod abort;
pub mod config;
pub mod error;
pub mod telemetry;

pub use abort::AbortSignal;
pub use config::{
    load_dotenv, ArtifactsConfig, ConfigLoader, DistanceMetric, LogFormat, ModelConfig,
    RecommendationConfig, RecommenderConfig, TelemetryConfig, ValidationConfig,
};
pub use error::{RecommenderError, Result, Stage};
pub use telemetry::{init_tracing, TelemetryError, TelemetryGuard};
