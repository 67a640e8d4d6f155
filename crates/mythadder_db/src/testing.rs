//! SQLite fixtures standing in for the MythTV database.
//!
//! Creates the two MythTV tables mythadder touches (`settings` and
//! `videometadata`) with MythTV's column set, in a throwaway database file.

use crate::MythDb;
use sqlx::Row;
use tempfile::TempDir;

const SETTINGS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    value TEXT NOT NULL DEFAULT '',
    data TEXT,
    hostname TEXT DEFAULT NULL
)
"#;

const VIDEOMETADATA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS videometadata (
    intid INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    subtitle TEXT NOT NULL,
    tagline TEXT,
    director TEXT NOT NULL,
    studio TEXT,
    plot TEXT,
    rating TEXT NOT NULL,
    inetref TEXT NOT NULL,
    collectionref INTEGER NOT NULL DEFAULT -1,
    homepage TEXT NOT NULL DEFAULT '',
    year INTEGER NOT NULL,
    releasedate DATE,
    userrating REAL NOT NULL,
    length INTEGER NOT NULL,
    playcount INTEGER NOT NULL DEFAULT 0,
    season INTEGER NOT NULL DEFAULT 0,
    episode INTEGER NOT NULL DEFAULT 0,
    showlevel INTEGER NOT NULL,
    filename TEXT NOT NULL,
    hash TEXT NOT NULL DEFAULT '',
    coverfile TEXT NOT NULL,
    childid INTEGER NOT NULL DEFAULT -1,
    browse INTEGER NOT NULL DEFAULT 1,
    watched INTEGER NOT NULL DEFAULT 0,
    processed INTEGER NOT NULL DEFAULT 0,
    playcommand TEXT,
    category INTEGER NOT NULL DEFAULT 0,
    trailer TEXT,
    host TEXT NOT NULL,
    screenshot TEXT,
    banner TEXT,
    fanart TEXT,
    insertdate TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    contenttype INTEGER NOT NULL DEFAULT 0
)
"#;

/// A MythTV-shaped SQLite database in a temp directory (removed on drop).
pub struct TestDb {
    _temp: TempDir,
    pub db: MythDb,
}

impl TestDb {
    /// Database with the MythTV tables but no staging table yet.
    pub async fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let db = MythDb::open_sqlite(temp.path().join("mythconverg.db"))
            .await
            .expect("Failed to open test database");

        for ddl in [SETTINGS_DDL, VIDEOMETADATA_DDL] {
            sqlx::query(ddl)
                .execute(db.pool())
                .await
                .expect("Failed to create MythTV fixture table");
        }

        Self { _temp: temp, db }
    }

    /// Database with the staging table already at the current version.
    pub async fn with_schema() -> Self {
        let env = Self::new().await;
        env.db
            .ensure_schema()
            .await
            .expect("Failed to create staging schema");
        env
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await
            .expect("Failed to query sqlite_master")
            .is_some()
    }

    pub async fn count_settings(&self, key: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM settings WHERE value = ?")
            .bind(key)
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count settings")
            .get::<i64, _>("n")
    }

    pub async fn catalog_count(&self) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM videometadata")
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count catalog rows")
            .get::<i64, _>("n")
    }

    /// Catalog ids in ascending order.
    pub async fn catalog_ids(&self) -> Vec<i64> {
        sqlx::query("SELECT intid FROM videometadata ORDER BY intid")
            .fetch_all(self.db.pool())
            .await
            .expect("Failed to list catalog rows")
            .iter()
            .map(|row| row.get::<i64, _>("intid"))
            .collect()
    }

    /// Insert a catalog row the way MythTV's own scanner would.
    pub async fn insert_catalog_row(&self, title: &str, filename: &str) -> i64 {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .expect("Failed to acquire connection");
        sqlx::query(
            r#"
            INSERT INTO videometadata (
                title, subtitle, director, rating, inetref, year, userrating,
                length, showlevel, filename, coverfile, host
            )
            VALUES (?, '', '', '', '', 0, 0.0, 0, 1, ?, '', 'mythbox')
            "#,
        )
        .bind(title)
        .bind(filename)
        .execute(&mut *conn)
        .await
        .expect("Failed to insert catalog row");

        sqlx::query("SELECT last_insert_rowid() AS id")
            .fetch_one(&mut *conn)
            .await
            .expect("Failed to read inserted rowid")
            .get::<i64, _>("id")
    }

    /// Run an arbitrary statement against the fixture database.
    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql)
            .execute(self.db.pool())
            .await
            .expect("Failed to execute fixture statement");
    }

    /// Edit a catalog title, as a user would from the MythTV frontend.
    pub async fn rename_catalog_row(&self, catalog_id: i64, title: &str) {
        sqlx::query("UPDATE videometadata SET title = ? WHERE intid = ?")
            .bind(title)
            .bind(catalog_id)
            .execute(self.db.pool())
            .await
            .expect("Failed to edit catalog row");
    }
}
