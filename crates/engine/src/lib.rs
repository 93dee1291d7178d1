//! Book recommender engine
//!
//! Item-based collaborative filtering over the Book-Crossing ratings: raw
//! catalog and rating files are cleaned, pivoted into a title-by-user rating
//! matrix, indexed for exact nearest-neighbor search, and queried by title.

pub mod artifacts;
pub mod cleaner;
pub mod loader;
pub mod matrix;
pub mod neighbors;
pub mod pipeline;
pub mod service;
pub mod sparse;
pub mod types;

// Re-export key types
pub use artifacts::{ArtifactStore, TrainingManifest};
pub use cleaner::{CleanedTable, CleaningReport, InteractionCleaner};
pub use loader::{load_catalog, load_interactions, LoadReport, Loaded};
pub use matrix::{ArtifactTag, MatrixBuilder, RatingMatrix};
pub use neighbors::{Neighbor, NeighborIndex, NeighborModel};
pub use pipeline::{StageOutcome, TrainingPipeline};
pub use service::{LoadedArtifacts, PosterIndex, RecommendationService};
pub use types::*;

use book_recommender_core::RecommenderConfig;

/// Entry point bundling a configuration with its pipeline and service
#[derive(Debug, Clone)]
pub struct BookRecommender {
    config: RecommenderConfig,
}

impl BookRecommender {
    pub fn new(config: RecommenderConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(RecommenderConfig::default())
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(self.config.artifacts.clone())
    }

    pub fn pipeline(&self) -> TrainingPipeline {
        TrainingPipeline::new(self.config.clone())
    }

    pub fn service(&self) -> RecommendationService {
        RecommendationService::new(self.config.recommendation.clone(), self.store())
    }
}
