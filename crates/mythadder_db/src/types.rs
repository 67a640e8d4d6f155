//! Row types and table layout shared by the staging and catalog operations.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Catalog columns copied between the two tables, in catalog order.
///
/// `host` is always rebound to the mounting host on the way into the catalog.
pub const CATALOG_FIELDS: &[&str] = &[
    "title",
    "subtitle",
    "director",
    "plot",
    "rating",
    "inetref",
    "year",
    "userrating",
    "length",
    "season",
    "episode",
    "showlevel",
    "filename",
    "coverfile",
    "childid",
    "browse",
    "watched",
    "playcommand",
    "category",
    "trailer",
    "host",
    "screenshot",
    "banner",
    "fanart",
    "insertdate",
];

/// Catalog columns mirrored back onto staging rows on unmount.
///
/// `insertdate` keeps the value from the first time the file was seen.
pub fn mirrored_fields() -> impl Iterator<Item = &'static str> {
    CATALOG_FIELDS
        .iter()
        .copied()
        .filter(|field| *field != "insertdate")
}

/// A video file found by the tree scanner, ready to be upserted.
#[derive(Debug, Clone)]
pub struct StagedFile<'a> {
    pub partition_uuid: &'a str,
    pub partition_label: &'a str,
    pub file_inode: i64,
    /// Absolute path at scan time
    pub filename: &'a str,
    /// Initial title: the file name without its directory
    pub title: &'a str,
    /// Host that scanned the file
    pub host: &'a str,
}

/// A staging row that has never been promoted into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    pub file_inode: i64,
    pub filename: String,
}

/// The parts of a catalog row mythadder reports on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub catalog_id: i64,
    pub title: String,
    pub filename: String,
    pub host: String,
}

/// One row of the staging table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingVideoRow {
    pub partition_uuid: String,
    pub partition_label: String,
    pub file_inode: i64,
    /// Catalog id, 0 until promoted
    pub catalog_id: i64,
    pub title: String,
    pub subtitle: String,
    pub director: String,
    pub plot: Option<String>,
    pub rating: String,
    pub inetref: String,
    pub year: i64,
    pub user_rating: f64,
    pub length: i64,
    pub season: i64,
    pub episode: i64,
    pub show_level: i64,
    pub filename: String,
    pub coverfile: String,
    pub child_id: i64,
    pub browse: bool,
    pub watched: bool,
    pub play_command: Option<String>,
    pub category: i64,
    pub trailer: Option<String>,
    pub host: String,
    pub screenshot: Option<String>,
    pub banner: Option<String>,
    pub fanart: Option<String>,
    pub insert_date: Option<NaiveDateTime>,
}

impl StagingVideoRow {
    pub fn is_promoted(&self) -> bool {
        self.catalog_id != 0
    }
}

/// Parse the textual timestamp both MySQL and SQLite hand back for `insertdate`.
pub(crate) fn parse_insert_date(raw: Option<String>) -> Option<NaiveDateTime> {
    let raw = raw?;
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_fields_skip_insertdate() {
        let fields: Vec<_> = mirrored_fields().collect();
        assert_eq!(fields.len(), CATALOG_FIELDS.len() - 1);
        assert!(!fields.contains(&"insertdate"));
        assert!(fields.contains(&"host"));
    }

    #[test]
    fn test_parse_insert_date() {
        let parsed = parse_insert_date(Some("2024-03-01 12:30:45".to_string())).unwrap();
        assert_eq!(parsed.to_string(), "2024-03-01 12:30:45");
        assert!(parse_insert_date(Some("2024-03-01 12:30:45.250".to_string())).is_some());
        assert!(parse_insert_date(Some("garbage".to_string())).is_none());
        assert!(parse_insert_date(None).is_none());
    }
}
