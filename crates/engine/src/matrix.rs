//! Title-by-user rating matrix
//!
//! Rows are the distinct titles of the cleaned table in lexicographic order,
//! columns the distinct user ids in ascending order. A cell holds the mean rating
//! of that user for that title, or 0 when the user never rated it. Both orders
//! are derived from the data alone, so identical input always yields an
//! identical matrix.

use crate::types::{CleanedInteraction, UserId};
use book_recommender_core::{RecommenderError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, instrument};

/// Compatibility tag of a rating matrix
///
/// Stored next to every artifact derived from the matrix; two artifacts belong
/// together only if their tags are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactTag {
    pub rows: usize,
    pub cols: usize,
    /// SHA-256 over row labels, column labels and cell values
    pub fingerprint: String,
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.fingerprint.get(..12).unwrap_or(&self.fingerprint);
        write!(f, "{}x{}@{}", self.rows, self.cols, short)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingMatrix {
    titles: Vec<String>,
    users: Vec<UserId>,
    values: Array2<f32>,
}

impl RatingMatrix {
    /// Assemble a matrix from its parts, checking that labels match the shape
    /// and that titles are sorted and unique
    pub fn from_parts(titles: Vec<String>, users: Vec<UserId>, values: Array2<f32>) -> Result<Self> {
        if values.nrows() != titles.len() || values.ncols() != users.len() {
            return Err(RecommenderError::invalid_matrix(format!(
                "shape {}x{} does not match {} titles and {} users",
                values.nrows(),
                values.ncols(),
                titles.len(),
                users.len()
            )));
        }
        if titles.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RecommenderError::invalid_matrix(
                "row titles must be sorted and unique",
            ));
        }
        if users.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RecommenderError::invalid_matrix(
                "column user ids must be sorted and unique",
            ));
        }

        Ok(Self {
            titles,
            users,
            values,
        })
    }

    pub fn nrows(&self) -> usize {
        self.titles.len()
    }

    pub fn ncols(&self) -> usize {
        self.users.len()
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Row position of `title`, by exact match
    pub fn row_index(&self, title: &str) -> Option<usize> {
        self.titles
            .binary_search_by(|candidate| candidate.as_str().cmp(title))
            .ok()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.row(index)
    }

    pub fn get(&self, title: &str, user_id: UserId) -> Option<f32> {
        let row = self.row_index(title)?;
        let col = self.users.binary_search(&user_id).ok()?;
        Some(self.values[[row, col]])
    }

    /// Compute the compatibility tag of this matrix
    pub fn tag(&self) -> ArtifactTag {
        let mut hasher = Sha256::new();
        hasher.update((self.titles.len() as u64).to_le_bytes());
        for title in &self.titles {
            hasher.update((title.len() as u64).to_le_bytes());
            hasher.update(title.as_bytes());
        }
        hasher.update((self.users.len() as u64).to_le_bytes());
        for user in &self.users {
            hasher.update(user.to_le_bytes());
        }
        for value in self.values.iter() {
            hasher.update(value.to_le_bytes());
        }

        ArtifactTag {
            rows: self.nrows(),
            cols: self.ncols(),
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

/// Pivots the cleaned interaction table into a [`RatingMatrix`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixBuilder;

impl MatrixBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Group by `(title, user_id)`, average the ratings and pivot
    #[instrument(skip_all, fields(interactions = interactions.len()))]
    pub fn build(&self, interactions: &[CleanedInteraction]) -> Result<RatingMatrix> {
        let mut cells: BTreeMap<(&str, UserId), (f64, u32)> = BTreeMap::new();
        let mut users: BTreeSet<UserId> = BTreeSet::new();

        for interaction in interactions {
            let cell = cells
                .entry((interaction.title.as_str(), interaction.user_id))
                .or_insert((0.0, 0));
            cell.0 += f64::from(interaction.rating);
            cell.1 += 1;
            users.insert(interaction.user_id);
        }

        let titles: Vec<String> = cells
            .keys()
            .map(|(title, _)| *title)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let users: Vec<UserId> = users.into_iter().collect();

        let mut values = Array2::<f32>::zeros((titles.len(), users.len()));
        let mut row = 0;
        for ((title, user_id), (sum, count)) in &cells {
            // Cells arrive grouped by title in sorted order
            while titles[row].as_str() != *title {
                row += 1;
            }
            let col = users
                .binary_search(user_id)
                .map_err(|_| RecommenderError::invalid_matrix("user id missing from columns"))?;
            values[[row, col]] = (sum / f64::from(*count)) as f32;
        }

        let matrix = RatingMatrix::from_parts(titles, users, values)?;
        info!(
            titles = matrix.nrows(),
            users = matrix.ncols(),
            "Book-user matrix created"
        );

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaned(user_id: UserId, title: &str, rating: f32) -> CleanedInteraction {
        CleanedInteraction {
            user_id,
            catalog_id: format!("{}-id", title),
            rating,
            title: title.to_string(),
            author: String::new(),
            publication_year: None,
            publisher: String::new(),
            poster_url: String::new(),
            num_of_rating: 1,
        }
    }

    #[test]
    fn test_build_orders_rows_and_columns() {
        let interactions = vec![
            cleaned(30, "Zorba", 4.0),
            cleaned(10, "Anna Karenina", 8.0),
            cleaned(20, "Middlemarch", 6.0),
            cleaned(10, "Zorba", 2.0),
        ];

        let matrix = MatrixBuilder::new().build(&interactions).unwrap();

        assert_eq!(matrix.titles(), &["Anna Karenina", "Middlemarch", "Zorba"]);
        assert_eq!(matrix.users(), &[10, 20, 30]);
        assert_eq!(matrix.get("Zorba", 10), Some(2.0));
        assert_eq!(matrix.get("Zorba", 30), Some(4.0));
        assert_eq!(matrix.get("Middlemarch", 10), Some(0.0));
        assert_eq!(matrix.get("Dracula", 10), None);
    }

    #[test]
    fn test_build_averages_repeated_pairs() {
        let interactions = vec![
            cleaned(1, "Emma", 4.0),
            cleaned(1, "Emma", 7.0),
            cleaned(2, "Emma", 0.0),
        ];

        let matrix = MatrixBuilder::new().build(&interactions).unwrap();
        assert_eq!(matrix.get("Emma", 1), Some(5.5));
        assert_eq!(matrix.get("Emma", 2), Some(0.0));
    }

    #[test]
    fn test_build_is_deterministic() {
        let forward = vec![
            cleaned(3, "C", 1.0),
            cleaned(1, "A", 2.0),
            cleaned(2, "B", 3.0),
            cleaned(1, "C", 4.0),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = MatrixBuilder::new().build(&forward).unwrap();
        let b = MatrixBuilder::new().build(&reversed).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.tag(), b.tag());
    }

    #[test]
    fn test_tag_changes_with_content() {
        let a = MatrixBuilder::new().build(&[cleaned(1, "A", 2.0)]).unwrap();
        let b = MatrixBuilder::new().build(&[cleaned(1, "A", 3.0)]).unwrap();

        assert_eq!(a.tag().rows, b.tag().rows);
        assert_ne!(a.tag(), b.tag());
        assert_eq!(a.tag().fingerprint.len(), 64);
    }

    #[test]
    fn test_row_index_is_exact() {
        let matrix = MatrixBuilder::new()
            .build(&[cleaned(1, "Dune", 5.0), cleaned(1, "Dune Messiah", 4.0)])
            .unwrap();

        assert_eq!(matrix.row_index("Dune"), Some(0));
        assert_eq!(matrix.row_index("Dune Messiah"), Some(1));
        assert_eq!(matrix.row_index("dune"), None);
        assert_eq!(matrix.row_index("Dun"), None);
    }

    #[test]
    fn test_from_parts_rejects_shape_mismatch() {
        let result = RatingMatrix::from_parts(
            vec!["A".to_string()],
            vec![1, 2],
            Array2::zeros((1, 3)),
        );
        assert!(matches!(result, Err(RecommenderError::InvalidMatrix { .. })));
    }
}
