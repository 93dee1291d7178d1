//! Training pipeline
//!
//! Runs the stages in order, each one reading the previous stage's persisted
//! output:
//!
//! 1. **Validation**: raw CSV files -> cleaned table (`clean_data.csv`) and the
//!    merged rating table
//! 2. **Transformation**: `clean_data.csv` -> rating matrix, title list
//! 3. **Model training**: rating matrix -> fitted neighbor model
//!
//! The manifest is cleared when a run starts and rewritten once the last stage
//! succeeded, which is how readers learn that a retrain finished. The abort
//! signal is polled between stages.

use crate::artifacts::{ArtifactStore, TrainingManifest};
use crate::cleaner::{CleaningReport, InteractionCleaner};
use crate::loader::{load_catalog, load_interactions};
use crate::matrix::{ArtifactTag, MatrixBuilder};
use crate::neighbors::NeighborIndex;
use book_recommender_core::{AbortSignal, RecommenderConfig, RecommenderError, Result, Stage};
use chrono::Utc;
use tracing::{error, info, info_span};
use uuid::Uuid;

/// What a single stage produced
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Validation(CleaningReport),
    Transformation(ArtifactTag),
    ModelTraining(ArtifactTag),
}

pub struct TrainingPipeline {
    config: RecommenderConfig,
    store: ArtifactStore,
    abort: AbortSignal,
}

impl TrainingPipeline {
    pub fn new(config: RecommenderConfig) -> Self {
        let store = ArtifactStore::new(config.artifacts.clone());
        Self {
            config,
            store,
            abort: AbortSignal::new(),
        }
    }

    /// Use an externally controlled abort signal
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Run every stage
    pub fn run(&self) -> Result<TrainingManifest> {
        self.run_from(Stage::Validation)
    }

    /// Run `first` and every later training stage, then write the manifest
    ///
    /// Earlier stages must have completed in a previous run; their persisted
    /// outputs are reused.
    pub fn run_from(&self, first: Stage) -> Result<TrainingManifest> {
        let run_id = Uuid::new_v4();
        let span = info_span!("training_pipeline", %run_id);
        let _guard = span.enter();

        let stages: Vec<Stage> = Stage::TRAINING
            .iter()
            .copied()
            .skip_while(|stage| *stage != first)
            .collect();
        if stages.is_empty() {
            return Err(RecommenderError::ConfigurationError {
                message: format!("{} is not a training stage", first),
                key: None,
            });
        }

        // Aborted before starting: leave the previous run fully in place
        if self.abort.is_aborted() {
            return Err(RecommenderError::Aborted { stage: first });
        }

        info!(first_stage = %first, "Initializing training pipeline");
        self.store.clear_manifest(first)?;

        let mut cleaning = None;
        let mut matrix_tag = None;

        for stage in stages {
            match self.run_stage(stage) {
                Ok(StageOutcome::Validation(report)) => cleaning = Some(report),
                Ok(StageOutcome::Transformation(_)) => {}
                Ok(StageOutcome::ModelTraining(tag)) => matrix_tag = Some(tag),
                Err(e) => {
                    error!(stage = %stage, error = %e, "Pipeline execution failed");
                    return Err(e);
                }
            }
        }

        let matrix_tag = matrix_tag.ok_or_else(|| RecommenderError::ConfigurationError {
            message: "pipeline finished without training a model".to_string(),
            key: None,
        })?;

        let manifest = TrainingManifest {
            run_id,
            trained_at: Utc::now(),
            matrix_tag,
            metric: self.config.model.metric,
            cleaning,
        };
        self.store.write_manifest(&manifest)?;

        info!(tag = %manifest.matrix_tag, "Training pipeline completed successfully");
        Ok(manifest)
    }

    /// Run one stage after checking the abort signal
    pub fn run_stage(&self, stage: Stage) -> Result<StageOutcome> {
        if self.abort.is_aborted() {
            return Err(RecommenderError::Aborted { stage });
        }

        let span = info_span!("stage", %stage);
        let _guard = span.enter();
        info!("Starting {} stage", stage);

        let outcome = match stage {
            Stage::Validation => self.validate().map(StageOutcome::Validation),
            Stage::Transformation => self.transform().map(StageOutcome::Transformation),
            Stage::ModelTraining => self.train().map(StageOutcome::ModelTraining),
            Stage::Recommendation => Err(RecommenderError::ConfigurationError {
                message: "recommendation is not a training stage".to_string(),
                key: None,
            }),
        }?;

        info!("{} stage completed", stage);
        Ok(outcome)
    }

    fn validate(&self) -> Result<CleaningReport> {
        let validation = &self.config.validation;
        let delimiter = u8::try_from(validation.delimiter).map_err(|_| {
            RecommenderError::ConfigurationError {
                message: format!("delimiter {:?} is not a single byte", validation.delimiter),
                key: Some("validation.delimiter".to_string()),
            }
        })?;

        let ratings = load_interactions(&self.store.ratings_csv_path(validation), delimiter)?;
        let books = load_catalog(&self.store.books_csv_path(validation), delimiter)?;
        info!(
            ratings = ratings.rows.len(),
            ratings_skipped = ratings.report.skipped,
            books = books.rows.len(),
            books_skipped = books.report.skipped,
            "Raw data loaded"
        );

        let table = InteractionCleaner::from_config(validation).clean(&books.rows, &ratings.rows);

        self.store.write_clean_table(&table.rows)?;
        self.store.write_rating_table(&table.rows)?;

        Ok(table.report)
    }

    fn transform(&self) -> Result<ArtifactTag> {
        let interactions = self.store.read_clean_table(Stage::Transformation)?;
        let matrix = MatrixBuilder::new().build(&interactions)?;

        self.store.write_transformed_matrix(&matrix)?;
        self.store.write_pivot(&matrix)?;

        Ok(matrix.tag())
    }

    fn train(&self) -> Result<ArtifactTag> {
        let matrix = self.store.read_transformed_matrix(Stage::ModelTraining)?;
        info!(
            titles = matrix.nrows(),
            users = matrix.ncols(),
            "Pivot data loaded for model training"
        );

        let model = NeighborIndex::new(self.config.model.metric).fit(&matrix)?;
        self.store.write_model(&model)?;

        Ok(model.tag().clone())
    }
}
