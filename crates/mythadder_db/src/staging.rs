//! Staging table operations (`z_removablevideos`).

use crate::error::Result;
use crate::pool::Dialect;
use crate::types::{parse_insert_date, PendingRow, StagedFile, StagingVideoRow};
use crate::MythDb;
use sqlx::any::AnyRow;
use sqlx::Row;

/// Maximum number of inodes bound into a single DELETE.
const DELETE_BATCH: usize = 500;

const UPSERT_INSERT: &str = r#"
INSERT INTO z_removablevideos (
    partitionuuid, partitionlabel, fileinode, intid, title, subtitle, director,
    rating, inetref, year, userrating, showlevel, filename, coverfile, host
)
VALUES (?, ?, ?, 0, ?, '', '', '', '', 0, 0.0, 1, ?, '', ?)
"#;

const MYSQL_UPSERT_CONFLICT: &str = r#"
ON DUPLICATE KEY UPDATE
    partitionlabel = VALUES(partitionlabel),
    filename = VALUES(filename)
"#;

const SQLITE_UPSERT_CONFLICT: &str = r#"
ON CONFLICT(partitionuuid, fileinode) DO UPDATE SET
    partitionlabel = excluded.partitionlabel,
    filename = excluded.filename
"#;

/// Column list readable through the Any driver on both MySQL and SQLite.
///
/// Unsigned and tinyint columns are widened to signed integers, `userrating`
/// to a double and `insertdate` to text.
const ROW_COLUMNS: &str = r#"
    partitionuuid,
    partitionlabel,
    fileinode,
    CAST(intid AS SIGNED) AS intid,
    title,
    subtitle,
    director,
    plot,
    rating,
    inetref,
    CAST(year AS SIGNED) AS year,
    userrating + 0.0 AS userrating,
    CAST(length AS SIGNED) AS length,
    CAST(season AS SIGNED) AS season,
    CAST(episode AS SIGNED) AS episode,
    CAST(showlevel AS SIGNED) AS showlevel,
    filename,
    coverfile,
    CAST(childid AS SIGNED) AS childid,
    CAST(browse AS SIGNED) AS browse,
    CAST(watched AS SIGNED) AS watched,
    playcommand,
    CAST(category AS SIGNED) AS category,
    trailer,
    host,
    screenshot,
    banner,
    fanart,
    CAST(insertdate AS CHAR) AS insertdate
"#;

impl MythDb {
    /// Insert a scanned file, or refresh label and path of a known one.
    ///
    /// Promoted metadata and the catalog id of an existing row are untouched.
    pub async fn upsert_staged_file(&self, file: &StagedFile<'_>) -> Result<()> {
        let conflict = match self.dialect {
            Dialect::MySql => MYSQL_UPSERT_CONFLICT,
            Dialect::Sqlite => SQLITE_UPSERT_CONFLICT,
        };
        let sql = format!("{UPSERT_INSERT}{conflict}");

        sqlx::query(&sql)
            .bind(file.partition_uuid)
            .bind(file.partition_label)
            .bind(file.file_inode)
            .bind(file.title)
            .bind(file.filename)
            .bind(file.host)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inodes currently staged for a partition.
    pub async fn staged_inodes(&self, partition_uuid: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT fileinode FROM z_removablevideos WHERE partitionuuid = ? ORDER BY fileinode",
        )
        .bind(partition_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get::<i64, _>("fileinode")?))
            .collect()
    }

    /// Delete every staging row of a partition.
    pub async fn delete_partition(&self, partition_uuid: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM z_removablevideos WHERE partitionuuid = ?")
            .bind(partition_uuid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete the given inodes of a partition, in bound-parameter batches.
    pub async fn delete_inodes(&self, partition_uuid: &str, inodes: &[i64]) -> Result<u64> {
        let mut deleted = 0;

        for chunk in inodes.chunks(DELETE_BATCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "DELETE FROM z_removablevideos WHERE partitionuuid = ? AND fileinode IN ({placeholders})"
            );

            let mut query = sqlx::query(&sql).bind(partition_uuid);
            for inode in chunk {
                query = query.bind(*inode);
            }
            deleted += query.execute(&self.pool).await?.rows_affected();
        }

        Ok(deleted)
    }

    /// Staging rows of a partition that were never promoted (`intid = 0`).
    pub async fn pending_rows(&self, partition_uuid: &str) -> Result<Vec<PendingRow>> {
        let rows = sqlx::query(
            r#"
            SELECT fileinode, filename
            FROM z_removablevideos
            WHERE partitionuuid = ? AND intid = 0
            ORDER BY fileinode
            "#,
        )
        .bind(partition_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PendingRow {
                    file_inode: row.try_get("fileinode")?,
                    filename: row.try_get("filename")?,
                })
            })
            .collect()
    }

    /// Record the catalog id assigned to a staging row.
    ///
    /// Returns false when the row no longer exists.
    pub async fn set_catalog_id(
        &self,
        partition_uuid: &str,
        file_inode: i64,
        catalog_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE z_removablevideos SET intid = ? WHERE partitionuuid = ? AND fileinode = ?",
        )
        .bind(catalog_id)
        .bind(partition_uuid)
        .bind(file_inode)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All staging rows of a partition, ordered by inode.
    pub async fn partition_rows(&self, partition_uuid: &str) -> Result<Vec<StagingVideoRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM z_removablevideos WHERE partitionuuid = ? ORDER BY fileinode"
        );
        let rows = sqlx::query(&sql)
            .bind(partition_uuid)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_staging).collect()
    }

    /// A single staging row by identity.
    pub async fn staged_row(
        &self,
        partition_uuid: &str,
        file_inode: i64,
    ) -> Result<Option<StagingVideoRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM z_removablevideos WHERE partitionuuid = ? AND fileinode = ?"
        );
        let row = sqlx::query(&sql)
            .bind(partition_uuid)
            .bind(file_inode)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_staging).transpose()
    }
}

fn row_to_staging(row: &AnyRow) -> Result<StagingVideoRow> {
    Ok(StagingVideoRow {
        partition_uuid: row.try_get("partitionuuid")?,
        partition_label: row.try_get("partitionlabel")?,
        file_inode: row.try_get("fileinode")?,
        catalog_id: row.try_get("intid")?,
        title: row.try_get("title")?,
        subtitle: row.try_get("subtitle")?,
        director: row.try_get("director")?,
        plot: row.try_get("plot")?,
        rating: row.try_get("rating")?,
        inetref: row.try_get("inetref")?,
        year: row.try_get("year")?,
        user_rating: row.try_get("userrating")?,
        length: row.try_get("length")?,
        season: row.try_get("season")?,
        episode: row.try_get("episode")?,
        show_level: row.try_get("showlevel")?,
        filename: row.try_get("filename")?,
        coverfile: row.try_get("coverfile")?,
        child_id: row.try_get("childid")?,
        browse: row.try_get::<i64, _>("browse")? != 0,
        watched: row.try_get::<i64, _>("watched")? != 0,
        play_command: row.try_get("playcommand")?,
        category: row.try_get("category")?,
        trailer: row.try_get("trailer")?,
        host: row.try_get("host")?,
        screenshot: row.try_get("screenshot")?,
        banner: row.try_get("banner")?,
        fanart: row.try_get("fanart")?,
        insert_date: parse_insert_date(row.try_get("insertdate")?),
    })
}
