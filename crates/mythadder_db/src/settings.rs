//! Global (host-independent) entries in MythTV's `settings` table.

use crate::error::Result;
use crate::MythDb;
use sqlx::Row;

impl MythDb {
    /// Read a global setting (`hostname IS NULL`).
    pub async fn global_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT data FROM settings WHERE value = ? AND hostname IS NULL")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("data")?),
            None => Ok(None),
        }
    }

    /// Write a global setting, creating it when absent.
    pub async fn set_global_setting(&self, key: &str, value: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE settings SET data = ? WHERE value = ? AND hostname IS NULL")
            .bind(value)
            .bind(key)
            .execute(&self.pool)
            .await?;

        // MySQL reports 0 affected rows when the value is unchanged, so
        // only insert when the key is really missing.
        if updated.rows_affected() == 0 && self.global_setting(key).await?.is_none() {
            sqlx::query("INSERT INTO settings (value, data, hostname) VALUES (?, ?, NULL)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}
