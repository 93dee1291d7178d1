//! Brute-force nearest-neighbor index over rating-matrix rows
//!
//! Every query computes the exact distance to every indexed row. The corpus is
//! a few hundred titles, so exactness is cheaper than any approximate structure.

use crate::matrix::{ArtifactTag, RatingMatrix};
use crate::sparse::{CsrMatrix, SparseRow};
use book_recommender_core::{DistanceMetric, RecommenderError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, instrument};

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

/// Fits [`NeighborModel`]s with a fixed metric
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborIndex {
    metric: DistanceMetric,
}

impl NeighborIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    /// Index every row of `matrix`
    ///
    /// # Errors
    /// Returns `InvalidMatrix` if the matrix has no rows.
    #[instrument(skip_all, fields(metric = %self.metric))]
    pub fn fit(&self, matrix: &RatingMatrix) -> Result<NeighborModel> {
        if matrix.nrows() == 0 {
            return Err(RecommenderError::invalid_matrix(
                "cannot fit a neighbor index on a matrix with zero rows",
            ));
        }

        let data = CsrMatrix::from_dense(matrix.values().view());
        let model = NeighborModel::new(self.metric, data, matrix.tag())?;

        info!(
            rows = model.len(),
            stored_cells = model.data.nnz(),
            tag = %model.tag,
            "Neighbor model fitted"
        );

        Ok(model)
    }

    /// Index raw row vectors; every row must have the same width
    pub fn fit_rows(&self, rows: &[Vec<f32>], tag: ArtifactTag) -> Result<NeighborModel> {
        if rows.is_empty() {
            return Err(RecommenderError::invalid_matrix(
                "cannot fit a neighbor index on zero rows",
            ));
        }
        NeighborModel::new(self.metric, CsrMatrix::from_rows(rows)?, tag)
    }
}

/// Fitted index, paired with the tag of the matrix it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborModel {
    metric: DistanceMetric,
    data: CsrMatrix,
    tag: ArtifactTag,
}

impl NeighborModel {
    pub(crate) fn new(metric: DistanceMetric, data: CsrMatrix, tag: ArtifactTag) -> Result<Self> {
        let model = Self { metric, data, tag };
        model.check()?;
        Ok(model)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn tag(&self) -> &ArtifactTag {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structural validation, also run on deserialized models
    pub fn check(&self) -> Result<()> {
        self.data.check()?;
        if self.data.nrows() != self.tag.rows || self.data.ncols() != self.tag.cols {
            return Err(RecommenderError::invalid_matrix(format!(
                "model holds {}x{} rows but is tagged {}",
                self.data.nrows(),
                self.data.ncols(),
                self.tag
            )));
        }
        Ok(())
    }

    /// The `k` rows closest to indexed row `row`, nearest first
    ///
    /// The row itself is part of the result (distance 0). Ties are broken by row
    /// position, and `k` is clamped to the number of rows.
    pub fn kneighbors_of_row(&self, row: usize, k: usize) -> Result<Vec<Neighbor>> {
        if row >= self.len() {
            return Err(RecommenderError::invalid_matrix(format!(
                "row {} out of range for {} indexed rows",
                row,
                self.len()
            )));
        }
        Ok(self.search(&self.data.row(row), k))
    }

    /// The `k` rows closest to a dense query vector, nearest first
    pub fn kneighbors(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.data.ncols() {
            return Err(RecommenderError::invalid_matrix(format!(
                "query has {} features, model expects {}",
                query.len(),
                self.data.ncols()
            )));
        }

        let query = CsrMatrix::from_rows(std::slice::from_ref(&query.to_vec()))?;
        Ok(self.search(&query.row(0), k))
    }

    fn search(&self, query: &SparseRow<'_>, k: usize) -> Vec<Neighbor> {
        let query_norm = query.norm();

        let mut hits: Vec<Neighbor> = self
            .data
            .rows()
            .enumerate()
            .map(|(row, candidate)| Neighbor {
                row,
                distance: distance(self.metric, query, query_norm, &candidate),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.row.cmp(&b.row))
        });
        hits.truncate(k.min(self.len()));
        hits
    }
}

fn distance(metric: DistanceMetric, a: &SparseRow<'_>, a_norm: f32, b: &SparseRow<'_>) -> f32 {
    match metric {
        DistanceMetric::Euclidean => {
            let mut sum = 0.0_f32;
            a.merge_with(b, |x, y| sum += (x - y) * (x - y));
            sum.sqrt()
        }
        DistanceMetric::Manhattan => {
            let mut sum = 0.0_f32;
            a.merge_with(b, |x, y| sum += (x - y).abs());
            sum
        }
        DistanceMetric::Cosine => {
            let b_norm = b.norm();
            if a_norm == 0.0 || b_norm == 0.0 {
                return 1.0;
            }
            (1.0 - a.dot(b) / (a_norm * b_norm)).max(0.0)
        }
    }
}
