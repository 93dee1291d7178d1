//! Delimited-text loaders for the raw catalog and rating files
//!
//! Files are decoded as Latin-1, so every byte sequence is readable. Rows with
//! the wrong number of fields or unparsable values are skipped and counted; only
//! a missing file, a missing column or a file without a single usable row is
//! fatal.

use crate::types::{CatalogRecord, InteractionRecord};
use book_recommender_core::{RecommenderError, Result, Stage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const CATALOG_ID: &str = "ISBN";
const CATALOG_TITLE: &str = "Book-Title";
const CATALOG_AUTHOR: &str = "Book-Author";
const CATALOG_YEAR: &str = "Year-Of-Publication";
const CATALOG_PUBLISHER: &str = "Publisher";
const CATALOG_POSTER: &str = "Image-URL-L";

const RATING_USER: &str = "User-ID";
const RATING_CATALOG_ID: &str = "ISBN";
const RATING_VALUE: &str = "Book-Rating";

/// Per-file load statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub records: usize,
    pub skipped: usize,
}

/// Rows parsed from one file
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub report: LoadReport,
}

/// Load the book catalog
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_catalog(path: &Path, delimiter: u8) -> Result<Loaded<CatalogRecord>> {
    let columns = [
        CATALOG_ID,
        CATALOG_TITLE,
        CATALOG_AUTHOR,
        CATALOG_YEAR,
        CATALOG_PUBLISHER,
        CATALOG_POSTER,
    ];

    read_rows(path, delimiter, &columns, |fields| {
        let id = fields[0].trim();
        let title = fields[1].trim();
        if id.is_empty() || title.is_empty() {
            return None;
        }

        Some(CatalogRecord {
            id: id.to_string(),
            title: title.to_string(),
            author: fields[2].trim().to_string(),
            publication_year: fields[3].trim().parse::<u16>().ok().filter(|y| *y > 0),
            publisher: fields[4].trim().to_string(),
            poster_url: fields[5].trim().to_string(),
        })
    })
}

/// Load the user ratings
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_interactions(path: &Path, delimiter: u8) -> Result<Loaded<InteractionRecord>> {
    let columns = [RATING_USER, RATING_CATALOG_ID, RATING_VALUE];

    read_rows(path, delimiter, &columns, |fields| {
        let user_id = fields[0].trim().parse().ok()?;
        let catalog_id = fields[1].trim();
        if catalog_id.is_empty() {
            return None;
        }
        let rating = fields[2].trim().parse::<f32>().ok().filter(|r| r.is_finite())?;

        Some(InteractionRecord {
            user_id,
            catalog_id: catalog_id.to_string(),
            rating,
        })
    })
}

/// Read `path`, handing the named `columns` of each row to `parse`
///
/// `parse` returning `None` marks the row as malformed.
fn read_rows<T>(
    path: &Path,
    delimiter: u8,
    columns: &[&str],
    parse: impl Fn(&[String]) -> Option<T>,
) -> Result<Loaded<T>> {
    let file = File::open(path).map_err(|e| RecommenderError::load(Stage::Validation, path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| RecommenderError::load(Stage::Validation, path, e))?
        .iter()
        .map(|h| decode_latin1(h).trim().to_string())
        .collect();

    let indices = columns
        .iter()
        .map(|column| {
            headers.iter().position(|h| h == column).ok_or_else(|| {
                RecommenderError::load(
                    Stage::Validation,
                    path,
                    format!("missing column '{}' (found: {})", column, headers.join(", ")),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut report = LoadReport::default();
    let mut fields = Vec::with_capacity(indices.len());

    for record in reader.byte_records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => {
                return Err(RecommenderError::load(Stage::Validation, path, e));
            }
            Err(e) => {
                debug!(error = %e, "Skipping malformed line");
                report.skipped += 1;
                continue;
            }
        };

        fields.clear();
        fields.extend(
            indices
                .iter()
                .map(|&i| record.get(i).map(decode_latin1).unwrap_or_default()),
        );

        match parse(&fields) {
            Some(row) => {
                rows.push(row);
                report.records += 1;
            }
            None => report.skipped += 1,
        }
    }

    if rows.is_empty() {
        return Err(RecommenderError::load(
            Stage::Validation,
            path,
            format!("no parsable records ({} lines skipped)", report.skipped),
        ));
    }

    if report.skipped > 0 {
        warn!(
            skipped = report.skipped,
            records = report.records,
            "Skipped malformed lines"
        );
    }
    info!(records = report.records, "Loaded {}", path.display());

    Ok(Loaded { rows, report })
}

/// Latin-1 maps every byte to the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
