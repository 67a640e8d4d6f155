//! MythTV catalog operations (`videometadata`).
//!
//! The catalog schema belongs to MythTV. Rows are only inserted, read and
//! deleted here, always by copying between the catalog and the staging table
//! inside the database so column types never round-trip through Rust.

use crate::error::{DbError, Result};
use crate::pool::Dialect;
use crate::types::{mirrored_fields, CatalogEntry, CATALOG_FIELDS};
use crate::MythDb;
use sqlx::Row;

/// `SELECT` list copying a staging row (`rv`) into the catalog column order,
/// with `host` bound to the mounting host.
fn staging_select_list() -> String {
    CATALOG_FIELDS
        .iter()
        .map(|field| match *field {
            "host" => "?".to_string(),
            "insertdate" => "COALESCE(rv.insertdate, CURRENT_TIMESTAMP)".to_string(),
            other => format!("rv.{other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn restore_sql() -> String {
    format!(
        r#"
        INSERT INTO videometadata (intid, {columns})
        SELECT rv.intid, {select}
        FROM z_removablevideos rv
        WHERE rv.partitionuuid = ?
          AND rv.intid != 0
          AND NOT EXISTS (SELECT 1 FROM videometadata vm WHERE vm.intid = rv.intid)
        "#,
        columns = CATALOG_FIELDS.join(", "),
        select = staging_select_list(),
    )
}

fn promote_sql() -> String {
    format!(
        r#"
        INSERT INTO videometadata ({columns})
        SELECT {select}
        FROM z_removablevideos rv
        WHERE rv.partitionuuid = ?
          AND rv.fileinode = ?
          AND rv.intid = 0
        "#,
        columns = CATALOG_FIELDS.join(", "),
        select = staging_select_list(),
    )
}

fn mirror_sql(dialect: Dialect) -> String {
    match dialect {
        Dialect::MySql => {
            let assignments = mirrored_fields()
                .map(|field| format!("rv.{field} = vm.{field}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                r#"
                UPDATE z_removablevideos rv, videometadata vm
                SET {assignments}
                WHERE rv.intid = vm.intid
                  AND rv.intid != 0
                  AND rv.partitionuuid = ?
                "#
            )
        }
        Dialect::Sqlite => {
            let assignments = mirrored_fields()
                .map(|field| format!("{field} = vm.{field}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                r#"
                UPDATE z_removablevideos
                SET {assignments}
                FROM videometadata AS vm
                WHERE z_removablevideos.intid = vm.intid
                  AND z_removablevideos.intid != 0
                  AND z_removablevideos.partitionuuid = ?
                "#
            )
        }
    }
}

/// Id generated by the last insert on the current connection.
fn last_insert_id_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::MySql => "SELECT CAST(LAST_INSERT_ID() AS SIGNED) AS id",
        Dialect::Sqlite => "SELECT last_insert_rowid() AS id",
    }
}

const DELETE_CATALOG_SQL: &str = r#"
DELETE FROM videometadata
WHERE intid IN (
    SELECT intid FROM z_removablevideos
    WHERE partitionuuid = ? AND intid != 0
)
"#;

impl MythDb {
    /// Re-insert the catalog rows of already promoted staging rows.
    ///
    /// Each row keeps its original catalog id and is attributed to `host`.
    /// Rows whose id is still present in the catalog are skipped, so running
    /// this twice never duplicates anything.
    pub async fn restore_promoted(&self, partition_uuid: &str, host: &str) -> Result<u64> {
        let result = sqlx::query(&restore_sql())
            .bind(host)
            .bind(partition_uuid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Insert one never-promoted staging row into the catalog.
    ///
    /// Returns the catalog id the database assigned, or `None` when the
    /// staging row vanished or was promoted in the meantime.
    pub async fn promote_row(
        &self,
        partition_uuid: &str,
        file_inode: i64,
        host: &str,
    ) -> Result<Option<i64>> {
        // The id is per connection, so read it on the one that inserted.
        let mut conn = self.pool.acquire().await?;

        let result = sqlx::query(&promote_sql())
            .bind(host)
            .bind(partition_uuid)
            .bind(file_inode)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(last_insert_id_sql(self.dialect))
            .fetch_one(&mut *conn)
            .await?;
        let id: i64 = row.try_get("id")?;
        if id == 0 {
            return Err(DbError::not_found("catalog id assigned by insert"));
        }
        Ok(Some(id))
    }

    /// Copy current catalog values onto the partition's staging rows.
    pub async fn mirror_from_catalog(&self, partition_uuid: &str) -> Result<u64> {
        let result = sqlx::query(&mirror_sql(self.dialect))
            .bind(partition_uuid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete every catalog row referenced by the partition's staging rows.
    pub async fn delete_catalog_rows(&self, partition_uuid: &str) -> Result<u64> {
        let result = sqlx::query(DELETE_CATALOG_SQL)
            .bind(partition_uuid)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Look up a catalog row by id.
    pub async fn catalog_entry(&self, catalog_id: i64) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(
            "SELECT CAST(intid AS SIGNED) AS intid, title, filename, host FROM videometadata WHERE intid = ?",
        )
        .bind(catalog_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(CatalogEntry {
                catalog_id: row.try_get("intid")?,
                title: row.try_get("title")?,
                filename: row.try_get("filename")?,
                host: row.try_get("host")?,
            })),
            None => Ok(None),
        }
    }
}
