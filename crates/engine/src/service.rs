//! Recommendation service
//!
//! Loads the persisted matrix, row-title list, neighbor model and merged rating
//! table, checks that they describe the same matrix, and answers
//! `recommend(title)` queries against them. The model and the manifest carry
//! the matrix tag; the rating table is the cleaned table the matrix was pivoted
//! from, so its tag is recomputed by pivoting it again.
//!
//! With caching enabled the loaded artifacts are shared between queries. Each
//! query still reads the training manifest and reloads when its run id changed,
//! so a finished retrain is observed by the next query.

use crate::artifacts::ArtifactStore;
use crate::matrix::{MatrixBuilder, RatingMatrix};
use crate::neighbors::NeighborModel;
use crate::types::{CleanedInteraction, Lookup, NotFound, RecommendedBook};
use book_recommender_core::{RecommendationConfig, RecommenderError, Result, Stage};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Poster reference per title
///
/// Several catalog records (editions) can share a title; the record with the
/// lowest catalog id supplies the poster. Records with an empty poster
/// reference are ignored, so a title whose records all lack one has no poster.
#[derive(Debug, Clone, Default)]
pub struct PosterIndex {
    posters: BTreeMap<String, (String, String)>,
}

impl PosterIndex {
    pub fn from_rows(rows: &[CleanedInteraction]) -> Self {
        let mut posters: BTreeMap<String, (String, String)> = BTreeMap::new();
        for row in rows.iter().filter(|row| !row.poster_url.trim().is_empty()) {
            match posters.get_mut(&row.title) {
                Some(entry) if row.catalog_id < entry.0 => {
                    *entry = (row.catalog_id.clone(), row.poster_url.clone());
                }
                Some(_) => {}
                None => {
                    posters.insert(
                        row.title.clone(),
                        (row.catalog_id.clone(), row.poster_url.clone()),
                    );
                }
            }
        }
        Self { posters }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.posters.get(title).map(|(_, poster)| poster.as_str())
    }

    pub fn len(&self) -> usize {
        self.posters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posters.is_empty()
    }
}

/// Artifacts of one training run, checked for mutual consistency
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub matrix: RatingMatrix,
    pub titles: Vec<String>,
    pub model: NeighborModel,
    pub posters: PosterIndex,
    /// Run that produced the artifacts; `None` when no manifest was present
    pub run_id: Option<Uuid>,
}

impl LoadedArtifacts {
    /// Read every artifact from `store` and verify they belong together
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let stage = Stage::Recommendation;
        let manifest = store.read_manifest(stage)?;

        let matrix = store.read_pivot(stage)?;
        let titles = store.read_titles(stage)?;
        let model = store.read_model(stage)?;
        let rating_table = store.read_rating_table(stage)?;

        let tag = matrix.tag();
        if model.tag() != &tag {
            return Err(RecommenderError::StaleArtifact {
                artifact: store.model_path().display().to_string(),
                expected: tag.to_string(),
                found: model.tag().to_string(),
            });
        }
        if titles != matrix.titles() {
            return Err(RecommenderError::StaleArtifact {
                artifact: store.book_names_path().display().to_string(),
                expected: format!("{} titles matching {}", matrix.nrows(), tag),
                found: format!("{} titles", titles.len()),
            });
        }
        if let Some(manifest) = &manifest {
            if manifest.matrix_tag != tag {
                return Err(RecommenderError::StaleArtifact {
                    artifact: store.book_pivot_path().display().to_string(),
                    expected: manifest.matrix_tag.to_string(),
                    found: tag.to_string(),
                });
            }
        }
        let source_tag = MatrixBuilder::new().build(&rating_table)?.tag();
        if source_tag != tag {
            return Err(RecommenderError::StaleArtifact {
                artifact: store.final_rating_path().display().to_string(),
                expected: tag.to_string(),
                found: source_tag.to_string(),
            });
        }

        let posters = PosterIndex::from_rows(&rating_table);
        info!(
            titles = titles.len(),
            posters = posters.len(),
            tag = %tag,
            "Recommendation artifacts loaded"
        );

        Ok(Self {
            matrix,
            titles,
            model,
            posters,
            run_id: manifest.map(|m| m.run_id),
        })
    }

    /// Answer a query against these artifacts
    pub fn recommend(&self, title: &str, config: &RecommendationConfig) -> Result<Lookup> {
        let Some(row) = self.matrix.row_index(title) else {
            debug!(title, "Title not in rating matrix");
            return Ok(Lookup::NotFound(NotFound::Title(title.to_string())));
        };

        let hits = self.model.kneighbors_of_row(row, config.neighbors)?;

        let mut books = Vec::with_capacity(config.results);
        for hit in hits.into_iter().filter(|hit| hit.row != row).take(config.results) {
            let neighbor = self.titles.get(hit.row).ok_or_else(|| {
                RecommenderError::invalid_matrix(format!(
                    "neighbor row {} outside {} titles",
                    hit.row,
                    self.titles.len()
                ))
            })?;
            let Some(poster_url) = self.posters.get(neighbor) else {
                warn!(title = %neighbor, "Recommended title has no poster");
                return Ok(Lookup::NotFound(NotFound::Poster(neighbor.clone())));
            };

            books.push(RecommendedBook {
                title: neighbor.clone(),
                poster_url: poster_url.to_string(),
                distance: hit.distance,
            });
        }

        Ok(Lookup::Found(books))
    }
}

pub struct RecommendationService {
    config: RecommendationConfig,
    store: ArtifactStore,
    cache: RwLock<Option<Arc<LoadedArtifacts>>>,
}

impl RecommendationService {
    pub fn new(config: RecommendationConfig, store: ArtifactStore) -> Self {
        Self {
            config,
            store,
            cache: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Recommend titles similar to `title`, nearest first
    ///
    /// A title absent from the matrix, or a neighbor without a poster, yields
    /// `Lookup::NotFound`. Missing, corrupt or mismatched artifacts are errors.
    #[instrument(skip(self))]
    pub fn recommend(&self, title: &str) -> Result<Lookup> {
        let artifacts = self.artifacts()?;
        let lookup = artifacts.recommend(title, &self.config)?;
        if let Lookup::Found(books) = &lookup {
            info!(results = books.len(), "Recommendations computed");
        }
        Ok(lookup)
    }

    /// Selectable titles, in matrix row order
    pub fn titles(&self) -> Result<Vec<String>> {
        Ok(self.artifacts()?.titles.clone())
    }

    /// Drop cached artifacts; the next query reloads from disk
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        if cache.take().is_some() {
            debug!("Recommendation cache invalidated");
        }
    }

    fn artifacts(&self) -> Result<Arc<LoadedArtifacts>> {
        if !self.config.cache_enabled {
            return LoadedArtifacts::load(&self.store).map(Arc::new);
        }

        let current = self
            .store
            .read_manifest(Stage::Recommendation)?
            .map(|manifest| manifest.run_id);

        // No completed run on record: serve from disk without caching
        let Some(run_id) = current else {
            self.invalidate();
            return LoadedArtifacts::load(&self.store).map(Arc::new);
        };

        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.as_ref() {
                if cached.run_id == Some(run_id) {
                    return Ok(Arc::clone(cached));
                }
            }
        }

        let loaded = Arc::new(LoadedArtifacts::load(&self.store)?);
        if loaded.run_id == Some(run_id) {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            *cache = Some(Arc::clone(&loaded));
            info!(%run_id, "Recommendation cache refreshed");
        }
        Ok(loaded)
    }
}
