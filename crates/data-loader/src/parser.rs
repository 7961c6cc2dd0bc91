//! Parser for viewing-history CSV exports.
//!
//! Supported formats, detected from the header line:
//! - Letterboxd: `Date,Name,Year,Letterboxd URI,Rating[,...,Watched Date]`
//!   Star ratings (0.5-5) are doubled onto the canonical 0-10 scale.
//! - IMDb: `Const,Your Rating,Date Rated,Title,...,Year,Genres,...`
//!   Ratings are already 1-10.
//! - Native: `movie_id,title,rating[,watched_date,year,genres]`
//!   Ratings are 0-10, genres are pipe-separated.
//!
//! A row that fails to parse does not abort the import: it is recorded in
//! `ImportBatch::errors` and the remaining rows are kept.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// The export a CSV file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Letterboxd,
    Imdb,
    Native,
}

impl ImportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ImportFormat::Letterboxd => "letterboxd",
            ImportFormat::Imdb => "imdb",
            ImportFormat::Native => "native",
        }
    }

    /// Pick the format whose signature columns are all present.
    fn detect(columns: &Columns) -> Option<Self> {
        if columns.has("letterboxd uri") {
            Some(ImportFormat::Letterboxd)
        } else if columns.has("const") && columns.has("your rating") {
            Some(ImportFormat::Imdb)
        } else if columns.has("movie_id") && columns.has("title") {
            Some(ImportFormat::Native)
        } else {
            None
        }
    }

    /// Multiplier taking this export's ratings onto the canonical scale
    fn rating_factor(&self) -> f32 {
        match self {
            ImportFormat::Letterboxd => 2.0,
            ImportFormat::Imdb | ImportFormat::Native => 1.0,
        }
    }
}

/// Result of parsing one CSV export
#[derive(Debug)]
pub struct ImportBatch {
    pub format: ImportFormat,
    pub rows: Vec<ImportedMovie>,
    /// One entry per rejected row
    pub errors: Vec<DataLoadError>,
}

/// Header lookup: lower-cased column name -> position
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_header(fields: &[String]) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();
        Self { index }
    }

    fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Field value for a column, `None` when the column is missing or blank
    fn get<'a>(&self, fields: &'a [String], name: &str) -> Option<&'a str> {
        let idx = *self.index.get(name)?;
        fields
            .get(idx)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Read and parse a CSV export from disk
pub fn read_history_csv(path: &Path) -> Result<ImportBatch> {
    let content = fs::read_to_string(path)?;
    parse_history_csv(&content)
}

/// Parse a CSV export held in memory
pub fn parse_history_csv(content: &str) -> Result<ImportBatch> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or(DataLoadError::EmptyInput)?;
    let header = split_csv_line(header_line);
    let columns = Columns::from_header(&header);
    let format = ImportFormat::detect(&columns).ok_or_else(|| DataLoadError::UnrecognizedFormat {
        header: header_line.trim().to_string(),
    })?;

    let body: Vec<(usize, &str)> = lines.collect();
    debug!("Detected {} export with {} data rows", format.name(), body.len());

    // Rows are independent, parse them in parallel. Indexed collect keeps
    // the file order.
    let parsed: Vec<Result<ImportedMovie>> = body
        .par_iter()
        .map(|&(idx, line)| parse_row(format, &columns, idx + 1, line))
        .collect();

    let mut rows = Vec::with_capacity(parsed.len());
    let mut errors = Vec::new();
    for result in parsed {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => errors.push(e),
        }
    }

    Ok(ImportBatch {
        format,
        rows,
        errors,
    })
}

fn parse_row(
    format: ImportFormat,
    columns: &Columns,
    line_no: usize,
    line: &str,
) -> Result<ImportedMovie> {
    let fields = split_csv_line(line);
    let parse_error = |reason: String| DataLoadError::ParseError {
        format: format.name().to_string(),
        line: line_no,
        reason,
    };

    let (title_col, rating_col, year_col) = match format {
        ImportFormat::Letterboxd => ("name", "rating", "year"),
        ImportFormat::Imdb => ("title", "your rating", "year"),
        ImportFormat::Native => ("title", "rating", "year"),
    };

    let title = columns
        .get(&fields, title_col)
        .ok_or_else(|| parse_error("Missing title".to_string()))?
        .to_string();

    let movie_id = match format {
        ImportFormat::Native => {
            let raw = columns
                .get(&fields, "movie_id")
                .ok_or_else(|| parse_error("Missing movie_id".to_string()))?;
            Some(
                raw.parse::<MovieId>()
                    .map_err(|e| parse_error(format!("Invalid movie_id: {}", e)))?,
            )
        }
        ImportFormat::Letterboxd | ImportFormat::Imdb => None,
    };

    let release_year = columns
        .get(&fields, year_col)
        .map(|y| {
            y.parse::<u16>()
                .map_err(|e| parse_error(format!("Invalid year: {}", e)))
        })
        .transpose()?;

    let rating = columns
        .get(&fields, rating_col)
        .map(|r| parse_rating(format, r).map_err(parse_error))
        .transpose()?;

    let date_value = match format {
        ImportFormat::Letterboxd => columns
            .get(&fields, "watched date")
            .or_else(|| columns.get(&fields, "date")),
        ImportFormat::Imdb => columns.get(&fields, "date rated"),
        ImportFormat::Native => columns.get(&fields, "watched_date"),
    };
    let watched_date = date_value
        .map(|d| parse_date(d).ok_or_else(|| parse_error(format!("Invalid date: {}", d))))
        .transpose()?;

    let genres = match format {
        ImportFormat::Imdb => columns
            .get(&fields, "genres")
            .map(|g| Genre::parse_list(g, ','))
            .unwrap_or_default(),
        ImportFormat::Native => columns
            .get(&fields, "genres")
            .map(|g| Genre::parse_list(g, '|'))
            .unwrap_or_default(),
        ImportFormat::Letterboxd => Vec::new(),
    };

    Ok(ImportedMovie {
        line: line_no,
        movie_id,
        title,
        release_year,
        rating,
        watched_date,
        genres,
    })
}

/// Parse a rating and move it onto the canonical scale.
fn parse_rating(format: ImportFormat, raw: &str) -> std::result::Result<f32, String> {
    let value: f32 = raw
        .parse()
        .map_err(|e| format!("Invalid rating '{}': {}", raw, e))?;
    let canonical = value * format.rating_factor();
    if !is_valid_rating(canonical) {
        return Err(format!(
            "Rating {} is outside the {} scale",
            raw,
            format.name()
        ));
    }
    Ok(canonical)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // IMDb and Letterboxd both export ISO dates; some spreadsheets rewrite
    // them with slashes.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

/// Split one CSV line into fields.
///
/// Handles double-quoted fields and `""` escapes inside them. Fields that
/// span multiple lines are not supported.
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv_line_with_quotes() {
        let fields = split_csv_line(r#"tt0111161,9,"Drama, Crime","Say ""hi""""#);
        assert_eq!(fields, vec!["tt0111161", "9", "Drama, Crime", r#"Say "hi""#]);
    }

    #[test]
    fn test_split_csv_line_trailing_empty_field() {
        assert_eq!(split_csv_line("a,b,"), vec!["a", "b", ""]);
    }

    #[test]
    fn test_letterboxd_ratings_are_doubled() {
        let csv = "Date,Name,Year,Letterboxd URI,Rating\n\
                   2023-01-02,Heat,1995,https://boxd.it/abc,4.5\n\
                   2023-01-03,Alien,1979,https://boxd.it/def,\n";
        let batch = parse_history_csv(csv).unwrap();

        assert_eq!(batch.format, ImportFormat::Letterboxd);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].rating, Some(9.0));
        assert_eq!(batch.rows[0].release_year, Some(1995));
        assert_eq!(batch.rows[0].movie_id, None);
        assert_eq!(batch.rows[1].rating, None);
    }

    #[test]
    fn test_letterboxd_prefers_watched_date() {
        let csv = "Date,Name,Year,Letterboxd URI,Rating,Rewatch,Tags,Watched Date\n\
                   2023-02-01,Heat,1995,https://boxd.it/abc,4,,,2023-01-15\n";
        let batch = parse_history_csv(csv).unwrap();
        assert_eq!(
            batch.rows[0].watched_date,
            NaiveDate::from_ymd_opt(2023, 1, 15)
        );
    }

    #[test]
    fn test_imdb_export() {
        let csv = "Const,Your Rating,Date Rated,Title,URL,Title Type,IMDb Rating,Runtime (mins),Year,Genres,Num Votes,Release Date,Directors\n\
                   tt0113277,8,2022-11-05,Heat,https://imdb.com/title/tt0113277,Movie,8.3,170,1995,\"Action, Crime, Drama\",700000,1995-12-15,Michael Mann\n";
        let batch = parse_history_csv(csv).unwrap();

        assert_eq!(batch.format, ImportFormat::Imdb);
        let row = &batch.rows[0];
        assert_eq!(row.title, "Heat");
        assert_eq!(row.rating, Some(8.0));
        assert_eq!(row.genres.len(), 3);
        assert_eq!(row.watched_date, NaiveDate::from_ymd_opt(2022, 11, 5));
    }

    #[test]
    fn test_native_export() {
        let csv = "movie_id,title,rating,watched_date,year,genres\n\
                   949,Heat,9,2023-03-01,1995,Action|Crime|Sci-Fi\n";
        let batch = parse_history_csv(csv).unwrap();

        let row = &batch.rows[0];
        assert_eq!(row.movie_id, Some(949));
        assert_eq!(row.genres[2].as_str(), "Science Fiction");
    }

    #[test]
    fn test_bad_rows_are_collected_not_fatal() {
        let csv = "movie_id,title,rating\n\
                   1,Good,7\n\
                   x,Bad Id,7\n\
                   3,Too High,11\n\
                   4,Also Good,\n";
        let batch = parse_history_csv(csv).unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.errors.len(), 2);
        assert!(matches!(
            batch.errors[0],
            DataLoadError::ParseError { line: 3, .. }
        ));
    }

    #[test]
    fn test_unrecognized_header() {
        let result = parse_history_csv("foo,bar\n1,2\n");
        assert!(matches!(result, Err(DataLoadError::UnrecognizedFormat { .. })));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_history_csv("\n\n"), Err(DataLoadError::EmptyInput)));
    }
}
