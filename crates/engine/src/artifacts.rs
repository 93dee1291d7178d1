//! Artifact persistence
//!
//! Layout under `artifacts_dir` (folder names come from [`ArtifactsConfig`]):
//!
//! ```text
//! dataset/ingested_data/BX-Books.csv            raw catalog (input)
//! dataset/ingested_data/BX-Book-Ratings.csv     raw ratings (input)
//! dataset/clean_data/clean_data.csv             cleaned interaction table
//! dataset/transformed_data/transformed_data.bin rating matrix (training copy)
//! serialized_objects/final_rating.bin           merged rating table (poster lookup)
//! serialized_objects/book_names.bin             ordered row titles
//! serialized_objects/book_pivot.bin             rating matrix (inference copy)
//! trained_model/model.bin                       fitted neighbor model
//! manifest.json                                 last completed training run
//! ```
//!
//! Every write lands in a temporary file in the target directory and is renamed
//! into place only after it was flushed, so a failed write never leaves a
//! partial artifact behind.

use crate::cleaner::CleaningReport;
use crate::matrix::{ArtifactTag, RatingMatrix};
use crate::neighbors::NeighborModel;
use crate::types::{CleanedInteraction, UserId};
use book_recommender_core::{
    ArtifactsConfig, DistanceMetric, RecommenderError, Result, Stage, ValidationConfig,
};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

const CLEAN_DATA_FILE: &str = "clean_data.csv";
const TRANSFORMED_DATA_FILE: &str = "transformed_data.bin";
const FINAL_RATING_FILE: &str = "final_rating.bin";
const BOOK_NAMES_FILE: &str = "book_names.bin";
const BOOK_PIVOT_FILE: &str = "book_pivot.bin";
const MANIFEST_FILE: &str = "manifest.json";

/// Column order of `clean_data.csv`; names match the serde field names
const CLEAN_COLUMNS: [&str; 9] = [
    "user_id",
    "catalog_id",
    "rating",
    "title",
    "author",
    "publication_year",
    "publisher",
    "poster_url",
    "num_of_rating",
];

/// Record of a completed training run, written after every stage succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub matrix_tag: ArtifactTag,
    pub metric: DistanceMetric,
    /// Absent when the run resumed after the validation stage
    pub cleaning: Option<CleaningReport>,
}

/// On-disk form of [`RatingMatrix`]
#[derive(Debug, Serialize, Deserialize)]
struct StoredMatrix {
    titles: Vec<String>,
    users: Vec<UserId>,
    shape: (usize, usize),
    values: Vec<f32>,
}

impl StoredMatrix {
    fn from_matrix(matrix: &RatingMatrix) -> Self {
        Self {
            titles: matrix.titles().to_vec(),
            users: matrix.users().to_vec(),
            shape: matrix.values().dim(),
            values: matrix.values().iter().copied().collect(),
        }
    }

    fn into_matrix(self) -> Result<RatingMatrix> {
        let values = Array2::from_shape_vec(self.shape, self.values).map_err(|e| {
            RecommenderError::invalid_matrix(format!("failed to reconstruct values: {}", e))
        })?;
        RatingMatrix::from_parts(self.titles, self.users, values)
    }
}

/// Reads and writes every artifact of the pipeline
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: ArtifactsConfig,
}

impl ArtifactStore {
    pub fn new(config: ArtifactsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArtifactsConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.artifacts_dir
    }

    fn dataset_dir(&self) -> PathBuf {
        self.config.artifacts_dir.join(&self.config.dataset_dir)
    }

    fn serialized_dir(&self) -> PathBuf {
        self.config
            .artifacts_dir
            .join(&self.config.serialized_objects_dir)
    }

    pub fn ingested_dir(&self) -> PathBuf {
        self.dataset_dir().join(&self.config.ingested_dir)
    }

    pub fn books_csv_path(&self, validation: &ValidationConfig) -> PathBuf {
        self.ingested_dir().join(&validation.books_csv_file)
    }

    pub fn ratings_csv_path(&self, validation: &ValidationConfig) -> PathBuf {
        self.ingested_dir().join(&validation.ratings_csv_file)
    }

    pub fn clean_data_path(&self) -> PathBuf {
        self.dataset_dir()
            .join(&self.config.clean_data_dir)
            .join(CLEAN_DATA_FILE)
    }

    pub fn transformed_data_path(&self) -> PathBuf {
        self.dataset_dir()
            .join(&self.config.transformed_data_dir)
            .join(TRANSFORMED_DATA_FILE)
    }

    pub fn final_rating_path(&self) -> PathBuf {
        self.serialized_dir().join(FINAL_RATING_FILE)
    }

    pub fn book_names_path(&self) -> PathBuf {
        self.serialized_dir().join(BOOK_NAMES_FILE)
    }

    pub fn book_pivot_path(&self) -> PathBuf {
        self.serialized_dir().join(BOOK_PIVOT_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.config
            .artifacts_dir
            .join(&self.config.trained_model_dir)
            .join(&self.config.trained_model_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.artifacts_dir.join(MANIFEST_FILE)
    }

    /// Write the cleaned interaction table as CSV (header row, no index column)
    pub fn write_clean_table(&self, rows: &[CleanedInteraction]) -> Result<PathBuf> {
        let path = self.clean_data_path();
        write_atomic(Stage::Validation, &path, |writer| {
            let mut csv = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer);
            csv.write_record(CLEAN_COLUMNS)?;
            for row in rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
            Ok::<(), csv::Error>(())
        })?;
        info!(rows = rows.len(), path = %path.display(), "Cleaned data saved");
        Ok(path)
    }

    pub fn read_clean_table(&self, stage: Stage) -> Result<Vec<CleanedInteraction>> {
        let path = self.clean_data_path();
        let file = open(stage, &path)?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<CleanedInteraction>, _>>()
            .map_err(|e| RecommenderError::load(stage, &path, e))?;

        debug!(rows = rows.len(), path = %path.display(), "Cleaned data loaded");
        Ok(rows)
    }

    /// Write the merged rating table used for poster lookup
    pub fn write_rating_table(&self, rows: &[CleanedInteraction]) -> Result<PathBuf> {
        let path = self.final_rating_path();
        write_bincode(Stage::Validation, &path, &rows)?;
        info!(rows = rows.len(), path = %path.display(), "Serialized rating table saved");
        Ok(path)
    }

    pub fn read_rating_table(&self, stage: Stage) -> Result<Vec<CleanedInteraction>> {
        read_bincode(stage, &self.final_rating_path())
    }

    /// Write the training copy of the matrix
    pub fn write_transformed_matrix(&self, matrix: &RatingMatrix) -> Result<PathBuf> {
        let path = self.transformed_data_path();
        write_bincode(Stage::Transformation, &path, &StoredMatrix::from_matrix(matrix))?;
        info!(path = %path.display(), "Transformed data saved");
        Ok(path)
    }

    pub fn read_transformed_matrix(&self, stage: Stage) -> Result<RatingMatrix> {
        read_matrix(stage, &self.transformed_data_path())
    }

    /// Write the inference copy of the matrix together with its row titles
    pub fn write_pivot(&self, matrix: &RatingMatrix) -> Result<()> {
        let titles_path = self.book_names_path();
        write_bincode(Stage::Transformation, &titles_path, &matrix.titles())?;
        info!(titles = matrix.nrows(), path = %titles_path.display(), "Book names serialized");

        let pivot_path = self.book_pivot_path();
        write_bincode(
            Stage::Transformation,
            &pivot_path,
            &StoredMatrix::from_matrix(matrix),
        )?;
        info!(path = %pivot_path.display(), "Pivot table serialized");
        Ok(())
    }

    pub fn read_pivot(&self, stage: Stage) -> Result<RatingMatrix> {
        read_matrix(stage, &self.book_pivot_path())
    }

    pub fn read_titles(&self, stage: Stage) -> Result<Vec<String>> {
        read_bincode(stage, &self.book_names_path())
    }

    pub fn write_model(&self, model: &NeighborModel) -> Result<PathBuf> {
        let path = self.model_path();
        write_bincode(Stage::ModelTraining, &path, model)?;
        info!(path = %path.display(), "Trained model saved");
        Ok(path)
    }

    pub fn read_model(&self, stage: Stage) -> Result<NeighborModel> {
        let path = self.model_path();
        let model: NeighborModel = read_bincode(stage, &path)?;
        model
            .check()
            .map_err(|e| RecommenderError::load(stage, &path, e))?;
        Ok(model)
    }

    pub fn write_manifest(&self, manifest: &TrainingManifest) -> Result<PathBuf> {
        let path = self.manifest_path();
        write_atomic(Stage::ModelTraining, &path, |writer| {
            serde_json::to_writer_pretty(writer, manifest)
        })?;
        Ok(path)
    }

    /// Manifest of the last completed run, `None` if training never finished
    pub fn read_manifest(&self, stage: Stage) -> Result<Option<TrainingManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let file = open(stage, &path)?;
        let manifest = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RecommenderError::load(stage, &path, e))?;
        Ok(Some(manifest))
    }

    /// Remove the manifest so readers stop trusting the previous run
    pub fn clear_manifest(&self, stage: Stage) -> Result<()> {
        let path = self.manifest_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecommenderError::persist(stage, &path, e)),
        }
    }
}

fn open(stage: Stage, path: &Path) -> Result<File> {
    File::open(path).map_err(|e| RecommenderError::load(stage, path, e))
}

fn read_matrix(stage: Stage, path: &Path) -> Result<RatingMatrix> {
    let stored: StoredMatrix = read_bincode(stage, path)?;
    stored
        .into_matrix()
        .map_err(|e| RecommenderError::load(stage, path, e))
}

/// Decode a bincode artifact
///
/// Decoding from an in-memory slice bounds every length prefix by the bytes
/// actually present, so a corrupt file fails instead of allocating its claimed
/// size.
fn read_bincode<T: DeserializeOwned>(stage: Stage, path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| RecommenderError::load(stage, path, e))?;
    bincode::deserialize(&bytes)
        .map_err(|e| RecommenderError::load(stage, path, format!("corrupt artifact: {}", e)))
}

fn write_bincode<T: Serialize + ?Sized>(stage: Stage, path: &Path, value: &T) -> Result<()> {
    write_atomic(stage, path, |writer| bincode::serialize_into(writer, value))
}

/// Write `path` through a temporary sibling file and rename it into place
///
/// The temporary file is removed if `write` or the flush fails.
fn write_atomic<E: fmt::Display>(
    stage: Stage,
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&File>) -> std::result::Result<(), E>,
) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| RecommenderError::persist(stage, path, e))?;

    let tmp = NamedTempFile::new_in(parent).map_err(|e| RecommenderError::persist(stage, path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer).map_err(|e| RecommenderError::persist(stage, path, e))?;
        writer
            .flush()
            .map_err(|e| RecommenderError::persist(stage, path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| RecommenderError::persist(stage, path, e))?;
    tmp.persist(path)
        .map_err(|e| RecommenderError::persist(stage, path, e.error))?;

    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixBuilder;
    use crate::neighbors::NeighborIndex;

    fn row(user_id: UserId, catalog_id: &str, title: &str, rating: f32) -> CleanedInteraction {
        CleanedInteraction {
            user_id,
            catalog_id: catalog_id.to_string(),
            rating,
            title: title.to_string(),
            author: "Some; Author, \"Quoted\"".to_string(),
            publication_year: if rating > 5.0 { Some(1999) } else { None },
            publisher: "Pub".to_string(),
            poster_url: format!("http://img/{}.jpg", catalog_id),
            num_of_rating: 2,
        }
    }

    fn table() -> Vec<CleanedInteraction> {
        vec![
            row(1, "a", "Alpha", 8.0),
            row(2, "a", "Alpha", 0.0),
            row(1, "b", "Beta", 3.0),
            row(2, "b", "Beta", 9.0),
        ]
    }

    #[test]
    fn test_clean_table_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));

        let path = store.write_clean_table(&table()).unwrap();
        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("user_id,catalog_id,rating,title,"));

        let loaded = store.read_clean_table(Stage::Transformation).unwrap();
        assert_eq!(loaded, table());
    }

    #[test]
    fn test_empty_clean_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));

        store.write_clean_table(&[]).unwrap();
        assert!(store.read_clean_table(Stage::Transformation).unwrap().is_empty());
    }

    #[test]
    fn test_matrix_model_and_titles_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));
        let matrix = MatrixBuilder::new().build(&table()).unwrap();
        let model = NeighborIndex::default().fit(&matrix).unwrap();

        store.write_transformed_matrix(&matrix).unwrap();
        store.write_pivot(&matrix).unwrap();
        store.write_model(&model).unwrap();

        assert_eq!(store.read_transformed_matrix(Stage::ModelTraining).unwrap(), matrix);
        assert_eq!(store.read_pivot(Stage::Recommendation).unwrap(), matrix);
        assert_eq!(store.read_titles(Stage::Recommendation).unwrap(), matrix.titles());
        assert_eq!(store.read_model(Stage::Recommendation).unwrap(), model);
    }

    #[test]
    fn test_missing_artifact_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));

        let err = store.read_model(Stage::Recommendation).unwrap_err();
        match err {
            RecommenderError::Load { stage, path, .. } => {
                assert_eq!(stage, Stage::Recommendation);
                assert!(path.ends_with("trained_model/model.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_corrupt_artifact_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));
        let path = store.book_pivot_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"definitely not bincode").unwrap();

        assert!(matches!(
            store.read_pivot(Stage::Recommendation),
            Err(RecommenderError::Load { .. })
        ));
    }

    #[test]
    fn test_huge_length_prefix_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));

        // A sequence length near u64::MAX followed by a string length of the same size
        let mut bytes = vec![0xff; 16];
        bytes.extend_from_slice(b"tail");
        for path in [store.book_names_path(), store.model_path()] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, &bytes).unwrap();
        }

        assert!(matches!(
            store.read_titles(Stage::Recommendation),
            Err(RecommenderError::Load { .. })
        ));
        assert!(matches!(
            store.read_model(Stage::Recommendation),
            Err(RecommenderError::Load { .. })
        ));
    }

    #[test]
    fn test_failed_write_leaves_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("artifact.bin");

        write_atomic(Stage::Transformation, &path, |w| w.write_all(b"first")).unwrap();

        let result = write_atomic(Stage::Transformation, &path, |w| {
            w.write_all(b"partial")?;
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        });

        assert!(matches!(result, Err(RecommenderError::Persist { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"first");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_manifest_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(ArtifactsConfig::rooted_at(dir.path()));
        assert!(store.read_manifest(Stage::Recommendation).unwrap().is_none());

        let matrix = MatrixBuilder::new().build(&table()).unwrap();
        let manifest = TrainingManifest {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            matrix_tag: matrix.tag(),
            metric: DistanceMetric::Cosine,
            cleaning: Some(CleaningReport::default()),
        };
        store.write_manifest(&manifest).unwrap();
        assert_eq!(
            store.read_manifest(Stage::Recommendation).unwrap(),
            Some(manifest)
        );

        store.clear_manifest(Stage::Validation).unwrap();
        store.clear_manifest(Stage::Validation).unwrap();
        assert!(store.read_manifest(Stage::Recommendation).unwrap().is_none());
    }
}
