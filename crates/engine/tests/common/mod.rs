//! Synthetic Book-Crossing style fixtures

#![allow(dead_code)]

use book_recommender_core::{ArtifactsConfig, RecommenderConfig, ValidationConfig};
use book_recommender_engine::ArtifactStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const MIN_USER_RATINGS: usize = 20;
pub const MIN_TITLE_RATINGS: usize = 5;

const BOOKS_HEADER: &str = "\"ISBN\";\"Book-Title\";\"Book-Author\";\"Year-Of-Publication\";\"Publisher\";\"Image-URL-S\";\"Image-URL-M\";\"Image-URL-L\"";
const RATINGS_HEADER: &str = "\"User-ID\";\"ISBN\";\"Book-Rating\"";

/// One raw rating as written to the fixture file
#[derive(Debug, Clone)]
pub struct RawRating {
    pub user_id: u64,
    pub isbn: String,
    pub rating: u8,
}

/// Catalog and ratings written under a temporary artifacts directory
pub struct Fixture {
    pub dir: TempDir,
    pub config: RecommenderConfig,
    /// ISBN -> title
    pub catalog: HashMap<String, String>,
    pub ratings: Vec<RawRating>,
}

impl Fixture {
    pub fn raw_counts(&self) -> HashMap<u64, usize> {
        let mut counts = HashMap::new();
        for rating in &self.ratings {
            *counts.entry(rating.user_id).or_insert(0) += 1;
        }
        counts
    }
}

pub fn config_for(dir: &Path) -> RecommenderConfig {
    let mut config = RecommenderConfig {
        artifacts: ArtifactsConfig::rooted_at(dir),
        validation: ValidationConfig {
            min_user_ratings: MIN_USER_RATINGS,
            min_title_ratings: MIN_TITLE_RATINGS,
            ..ValidationConfig::default()
        },
        ..RecommenderConfig::default()
    };
    config.recommendation.cache_enabled = false;
    config
}

fn isbn(n: usize) -> String {
    format!("{:010}", 100_000 + n)
}

/// Build a seeded catalog of 30 titles (10 of them with a second edition)
/// plus a rare title, rated by 15 heavy and 20 light users
pub fn book_crossing(seed: u64) -> Fixture {
    let dir = TempDir::new().unwrap();
    let config = config_for(dir.path());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut catalog = HashMap::new();
    let mut books = vec![BOOKS_HEADER.to_string()];
    for n in 0..40 {
        let id = isbn(n);
        let title = format!("Title {:02}", n % 30);
        books.push(format!(
            "\"{id}\";\"{title}\";\"Author {n}\";\"{year}\";\"Publisher\";\"http://images/{id}.S.jpg\";\"http://images/{id}.M.jpg\";\"http://images/{id}.L.jpg\"",
            year = 1980 + n
        ));
        catalog.insert(id, title);
    }
    let rare = isbn(99);
    books.push(format!(
        "\"{rare}\";\"Rare Title\";\"Nobody\";\"0\";\"Small Press\";\"s\";\"m\";\"http://images/{rare}.L.jpg\""
    ));
    catalog.insert(rare.clone(), "Rare Title".to_string());
    // Wrong number of fields
    books.push("\"0000000001\";\"Broken\";\"x\"".to_string());

    let mut ratings = Vec::new();
    // Heavy users rate most editions and a couple of unknown ids
    for user_id in 1..=15u64 {
        for n in 0..40 {
            if rng.gen_bool(0.8) {
                ratings.push(RawRating {
                    user_id,
                    isbn: isbn(n),
                    rating: rng.gen_range(0..=10),
                });
            }
        }
        ratings.push(RawRating {
            user_id,
            isbn: format!("UNKNOWN{}", user_id),
            rating: 7,
        });
        if user_id <= 2 {
            ratings.push(RawRating {
                user_id,
                isbn: rare.clone(),
                rating: 10,
            });
        }
    }
    // Light users never pass the activity threshold
    for user_id in 1000..1020u64 {
        for n in 0..MIN_USER_RATINGS {
            ratings.push(RawRating {
                user_id,
                isbn: isbn(n),
                rating: rng.gen_range(0..=10),
            });
        }
    }

    let mut lines = vec![RATINGS_HEADER.to_string()];
    lines.extend(
        ratings
            .iter()
            .map(|r| format!("\"{}\";\"{}\";\"{}\"", r.user_id, r.isbn, r.rating)),
    );
    lines.push("\"notanumber\";\"0000000002\";\"5\"".to_string());

    write_inputs(&config, &books.join("\n"), &lines.join("\n"));

    Fixture {
        dir,
        config,
        catalog,
        ratings,
    }
}

/// Write both raw input files where the pipeline expects them
pub fn write_inputs(config: &RecommenderConfig, books: &str, ratings: &str) {
    let store = ArtifactStore::new(config.artifacts.clone());
    fs::create_dir_all(store.ingested_dir()).unwrap();
    fs::write(store.books_csv_path(&config.validation), books).unwrap();
    fs::write(store.ratings_csv_path(&config.validation), ratings).unwrap();
}
