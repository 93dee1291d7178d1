//! Record types flowing through the recommender

use book_recommender_core::{RecommenderError, Result};
use serde::{Deserialize, Serialize};

pub type UserId = u64;

/// One catalog entry (a book edition), keyed by its catalog id (ISBN)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub publication_year: Option<u16>,
    pub publisher: String,
    pub poster_url: String,
}

/// One raw rating. Implicit interactions carry a rating of 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub catalog_id: String,
    pub rating: f32,
}

/// A rating that survived cleaning, merged with its catalog record
///
/// This is both the cleaned interaction table and the merged rating table used
/// for poster lookup, so it keeps every catalog column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedInteraction {
    pub user_id: UserId,
    pub catalog_id: String,
    pub rating: f32,
    pub title: String,
    pub author: String,
    pub publication_year: Option<u16>,
    pub publisher: String,
    pub poster_url: String,
    /// Ratings of this title after the active-user filter
    pub num_of_rating: usize,
}

/// One recommended title with its cover image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedBook {
    pub title: String,
    pub poster_url: String,
    /// Distance from the queried title under the model's metric
    pub distance: f32,
}

/// Why a query produced no recommendations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// The queried title is not a row of the rating matrix
    Title(String),
    /// A neighbor title has no row in the merged rating table
    Poster(String),
}

/// Outcome of a recommendation query
///
/// A missing title is an expected answer, not a failure, so it is a variant
/// here rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Vec<RecommendedBook>),
    NotFound(NotFound),
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Convert into a `Result`, turning not-found outcomes into errors
    pub fn into_result(self) -> Result<Vec<RecommendedBook>> {
        match self {
            Lookup::Found(books) => Ok(books),
            Lookup::NotFound(NotFound::Title(title)) => {
                Err(RecommenderError::TitleNotFound { title })
            }
            Lookup::NotFound(NotFound::Poster(title)) => {
                Err(RecommenderError::PosterNotFound { title })
            }
        }
    }
}
