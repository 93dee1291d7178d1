//! Interaction cleaning
//!
//! Turns raw catalog and rating records into the cleaned interaction table:
//!
//! 1. Count ratings per user over the raw table and keep users with strictly
//!    more than `min_user_ratings`.
//! 2. Inner-join the kept ratings with the catalog on catalog id.
//! 3. Count ratings per title in the joined table and keep titles with at least
//!    `min_title_ratings`.
//! 4. Drop repeated `(user_id, title)` pairs, keeping the first occurrence.

use crate::types::{CatalogRecord, CleanedInteraction, InteractionRecord, UserId};
use book_recommender_core::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Row counts after each cleaning step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub raw_interactions: usize,
    pub catalog_records: usize,
    pub active_users: usize,
    pub active_user_interactions: usize,
    pub joined_interactions: usize,
    pub retained_titles: usize,
    pub duplicates_dropped: usize,
    pub cleaned_interactions: usize,
}

/// Cleaned table plus the statistics of how it was produced
#[derive(Debug, Clone)]
pub struct CleanedTable {
    pub rows: Vec<CleanedInteraction>,
    pub report: CleaningReport,
}

/// Threshold filter and catalog join
#[derive(Debug, Clone)]
pub struct InteractionCleaner {
    min_user_ratings: usize,
    min_title_ratings: usize,
}

impl InteractionCleaner {
    pub fn new(min_user_ratings: usize, min_title_ratings: usize) -> Self {
        Self {
            min_user_ratings,
            min_title_ratings,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.min_user_ratings, config.min_title_ratings)
    }

    /// Clean `interactions` against `catalog`
    ///
    /// Catalog ids are expected to be unique; if one repeats, the first record wins.
    #[instrument(skip_all, fields(catalog = catalog.len(), interactions = interactions.len()))]
    pub fn clean(
        &self,
        catalog: &[CatalogRecord],
        interactions: &[InteractionRecord],
    ) -> CleanedTable {
        let mut report = CleaningReport {
            raw_interactions: interactions.len(),
            catalog_records: catalog.len(),
            ..CleaningReport::default()
        };

        // Step 1: active users, counted before the join
        let mut per_user: HashMap<UserId, usize> = HashMap::new();
        for interaction in interactions {
            *per_user.entry(interaction.user_id).or_insert(0) += 1;
        }
        let active_users: HashSet<UserId> = per_user
            .into_iter()
            .filter(|(_, count)| *count > self.min_user_ratings)
            .map(|(user_id, _)| user_id)
            .collect();
        report.active_users = active_users.len();

        // Step 2: inner join on catalog id
        let mut by_id: HashMap<&str, &CatalogRecord> = HashMap::with_capacity(catalog.len());
        for record in catalog {
            by_id.entry(record.id.as_str()).or_insert(record);
        }

        let mut joined: Vec<(&InteractionRecord, &CatalogRecord)> = Vec::new();
        for interaction in interactions {
            if !active_users.contains(&interaction.user_id) {
                continue;
            }
            report.active_user_interactions += 1;

            if let Some(record) = by_id.get(interaction.catalog_id.as_str()) {
                joined.push((interaction, record));
            }
        }
        report.joined_interactions = joined.len();
        debug!(
            active_users = report.active_users,
            joined = report.joined_interactions,
            "Joined active-user ratings with catalog"
        );

        // Step 3: popular titles, counted on the joined table
        let mut per_title: HashMap<&str, usize> = HashMap::new();
        for (_, record) in &joined {
            *per_title.entry(record.title.as_str()).or_insert(0) += 1;
        }
        report.retained_titles = per_title
            .values()
            .filter(|count| **count >= self.min_title_ratings)
            .count();

        // Step 4: first occurrence of each (user, title) pair
        let mut seen: HashSet<(UserId, &str)> = HashSet::new();
        let mut rows = Vec::new();
        for (interaction, record) in &joined {
            let num_of_rating = per_title[record.title.as_str()];
            if num_of_rating < self.min_title_ratings {
                continue;
            }

            if !seen.insert((interaction.user_id, record.title.as_str())) {
                report.duplicates_dropped += 1;
                continue;
            }

            rows.push(CleanedInteraction {
                user_id: interaction.user_id,
                catalog_id: record.id.clone(),
                rating: interaction.rating,
                title: record.title.clone(),
                author: record.author.clone(),
                publication_year: record.publication_year,
                publisher: record.publisher.clone(),
                poster_url: record.poster_url.clone(),
                num_of_rating,
            });
        }
        report.cleaned_interactions = rows.len();

        info!(
            raw = report.raw_interactions,
            active_users = report.active_users,
            titles = report.retained_titles,
            cleaned = report.cleaned_interactions,
            duplicates_dropped = report.duplicates_dropped,
            "Interaction table cleaned"
        );

        CleanedTable { rows, report }
    }
}

impl Default for InteractionCleaner {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, title: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: title.to_string(),
            author: "Author".to_string(),
            publication_year: Some(2000),
            publisher: "Publisher".to_string(),
            poster_url: format!("http://img/{}.jpg", id),
        }
    }

    fn rating(user_id: UserId, catalog_id: &str, rating: f32) -> InteractionRecord {
        InteractionRecord {
            user_id,
            catalog_id: catalog_id.to_string(),
            rating,
        }
    }

    #[test]
    fn test_user_threshold_is_strict_and_uses_raw_counts() {
        let catalog = vec![book("a", "Alpha")];
        // User 1 has 3 raw ratings, 2 of them for unknown catalog ids.
        // User 2 has exactly 2 raw ratings.
        let interactions = vec![
            rating(1, "a", 5.0),
            rating(1, "unknown-1", 4.0),
            rating(1, "unknown-2", 3.0),
            rating(2, "a", 7.0),
            rating(2, "unknown-3", 1.0),
        ];

        let table = InteractionCleaner::new(2, 1).clean(&catalog, &interactions);

        assert_eq!(table.report.active_users, 1);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].user_id, 1);
        assert_eq!(table.report.joined_interactions, 1);
    }

    #[test]
    fn test_title_threshold_counts_after_user_filter() {
        let catalog = vec![book("a", "Alpha"), book("b", "Beta")];
        let mut interactions = Vec::new();
        // Users 1 and 2 are active; user 3 is not.
        for user in [1, 2] {
            interactions.push(rating(user, "a", 8.0));
            interactions.push(rating(user, "b", 6.0));
            interactions.push(rating(user, "missing", 0.0));
        }
        interactions.push(rating(3, "b", 9.0));

        let table = InteractionCleaner::new(2, 2).clean(&catalog, &interactions);

        let titles: HashSet<&str> = table.rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, HashSet::from(["Alpha", "Beta"]));
        assert!(table.rows.iter().all(|r| r.user_id != 3));
        assert!(table.rows.iter().all(|r| r.num_of_rating == 2));

        let strict = InteractionCleaner::new(2, 3).clean(&catalog, &interactions);
        assert!(strict.rows.is_empty());
    }

    #[test]
    fn test_duplicate_user_title_keeps_first_occurrence() {
        // Two editions sharing a title
        let catalog = vec![book("a1", "Alpha"), book("a2", "Alpha")];
        let interactions = vec![
            rating(1, "a2", 3.0),
            rating(1, "a1", 9.0),
            rating(1, "a1", 10.0),
        ];

        let table = InteractionCleaner::new(0, 1).clean(&catalog, &interactions);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].catalog_id, "a2");
        assert_eq!(table.rows[0].rating, 3.0);
        assert_eq!(table.rows[0].num_of_rating, 3);
        assert_eq!(table.report.duplicates_dropped, 2);
    }

    #[test]
    fn test_duplicate_catalog_id_uses_first_record() {
        let catalog = vec![book("a", "First"), book("a", "Second")];
        let interactions = vec![rating(1, "a", 5.0)];

        let table = InteractionCleaner::new(0, 1).clean(&catalog, &interactions);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].title, "First");
    }

    #[test]
    fn test_empty_input_yields_empty_table() {
        let table = InteractionCleaner::default().clean(&[], &[]);
        assert!(table.rows.is_empty());
        assert_eq!(table.report, CleaningReport::default());
    }
}
