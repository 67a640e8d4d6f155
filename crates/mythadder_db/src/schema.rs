//! Staging table schema and its version marker.
//!
//! The marker lives in MythTV's `settings` table so it is backed up and
//! restored together with the rest of the MythTV database.

use crate::error::{DbError, Result};
use crate::pool::Dialect;
use crate::MythDb;
use tracing::{info, warn};

/// Staging schema version written by this build.
pub const SCHEMA_VERSION: i64 = 1001;

/// Settings key holding the staging schema version.
pub const SCHEMA_VERSION_KEY: &str = "mythadder.DBSchemaVer";

/// One in-place upgrade of the staging table.
#[derive(Debug, Clone, Copy)]
pub struct SchemaUpgrade {
    /// Version this step applies to
    pub from: i64,
    /// Version recorded once the step succeeded
    pub to: i64,
    pub mysql: &'static [&'static str],
    pub sqlite: &'static [&'static str],
}

impl SchemaUpgrade {
    fn statements(&self, dialect: Dialect) -> &'static [&'static str] {
        match dialect {
            Dialect::MySql => self.mysql,
            Dialect::Sqlite => self.sqlite,
        }
    }
}

/// Upgrade chain, ordered by `from`. Empty while 1001 is the only version.
const UPGRADES: &[SchemaUpgrade] = &[];

const MYSQL_STAGING_DDL: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS `z_removablevideos` (
    `partitionuuid` varchar(100) NOT NULL,
    `partitionlabel` varchar(50) NOT NULL DEFAULT '',
    `fileinode` bigint NOT NULL,
    `intid` int(10) unsigned NOT NULL DEFAULT '0',
    `title` varchar(128) NOT NULL DEFAULT '',
    `subtitle` text NOT NULL,
    `director` varchar(128) NOT NULL DEFAULT '',
    `plot` text,
    `rating` varchar(128) NOT NULL DEFAULT '',
    `inetref` varchar(255) NOT NULL DEFAULT '',
    `year` int(10) unsigned NOT NULL DEFAULT '0',
    `userrating` float NOT NULL DEFAULT '0',
    `length` int(10) unsigned NOT NULL DEFAULT '0',
    `season` smallint(5) unsigned NOT NULL DEFAULT '0',
    `episode` smallint(5) unsigned NOT NULL DEFAULT '0',
    `showlevel` int(10) unsigned NOT NULL DEFAULT '1',
    `filename` text NOT NULL,
    `coverfile` text NOT NULL,
    `childid` int(11) NOT NULL DEFAULT '-1',
    `browse` tinyint(1) NOT NULL DEFAULT '1',
    `watched` tinyint(1) NOT NULL DEFAULT '0',
    `playcommand` varchar(255) DEFAULT NULL,
    `category` int(10) unsigned NOT NULL DEFAULT '0',
    `trailer` text,
    `host` text NOT NULL,
    `screenshot` text,
    `banner` text,
    `fanart` text,
    `insertdate` timestamp NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (`partitionuuid`, `fileinode`),
    KEY `director` (`director`),
    KEY `title` (`title`),
    KEY `partitionuuid` (`partitionuuid`)
) DEFAULT CHARSET=utf8
"#];

const SQLITE_STAGING_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS z_removablevideos (
    partitionuuid TEXT NOT NULL,
    partitionlabel TEXT NOT NULL DEFAULT '',
    fileinode BIGINT NOT NULL,
    intid INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    subtitle TEXT NOT NULL DEFAULT '',
    director TEXT NOT NULL DEFAULT '',
    plot TEXT,
    rating TEXT NOT NULL DEFAULT '',
    inetref TEXT NOT NULL DEFAULT '',
    year INTEGER NOT NULL DEFAULT 0,
    userrating REAL NOT NULL DEFAULT 0,
    length INTEGER NOT NULL DEFAULT 0,
    season INTEGER NOT NULL DEFAULT 0,
    episode INTEGER NOT NULL DEFAULT 0,
    showlevel INTEGER NOT NULL DEFAULT 1,
    filename TEXT NOT NULL DEFAULT '',
    coverfile TEXT NOT NULL DEFAULT '',
    childid INTEGER NOT NULL DEFAULT -1,
    browse INTEGER NOT NULL DEFAULT 1,
    watched INTEGER NOT NULL DEFAULT 0,
    playcommand TEXT DEFAULT NULL,
    category INTEGER NOT NULL DEFAULT 0,
    trailer TEXT,
    host TEXT NOT NULL DEFAULT '',
    screenshot TEXT,
    banner TEXT,
    fanart TEXT,
    insertdate TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (partitionuuid, fileinode)
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_removablevideos_director ON z_removablevideos(director)",
    "CREATE INDEX IF NOT EXISTS idx_removablevideos_title ON z_removablevideos(title)",
    "CREATE INDEX IF NOT EXISTS idx_removablevideos_partition ON z_removablevideos(partitionuuid)",
];

impl MythDb {
    /// Ensure the staging table exists at the version this build understands.
    ///
    /// Fails with [`DbError::SchemaTooNew`] before touching anything when a
    /// newer mythadder already upgraded the table.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.ensure_schema_with(UPGRADES, SCHEMA_VERSION).await
    }

    /// Read the persisted schema version, `None` when never written.
    pub async fn schema_version(&self) -> Result<Option<i64>> {
        match self.global_setting(SCHEMA_VERSION_KEY).await? {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| DbError::InvalidSchemaVersion(raw)),
            None => Ok(None),
        }
    }

    pub(crate) async fn ensure_schema_with(
        &self,
        upgrades: &[SchemaUpgrade],
        supported: i64,
    ) -> Result<()> {
        match self.schema_version().await? {
            None => {
                self.create_staging_table().await?;
                self.set_global_setting(SCHEMA_VERSION_KEY, &supported.to_string())
                    .await?;
                info!(version = supported, "Created staging table");
            }
            Some(found) if found > supported => {
                return Err(DbError::SchemaTooNew { found, supported });
            }
            Some(found) => {
                let mut version = found;
                while version < supported {
                    let Some(step) = upgrades.iter().find(|u| u.from == version) else {
                        warn!(
                            version,
                            supported, "No upgrade step registered for staging schema"
                        );
                        break;
                    };
                    for sql in step.statements(self.dialect) {
                        sqlx::query(sql).execute(&self.pool).await?;
                    }
                    self.set_global_setting(SCHEMA_VERSION_KEY, &step.to.to_string())
                        .await?;
                    info!(from = step.from, to = step.to, "Upgraded staging schema");
                    version = step.to;
                }
            }
        }

        Ok(())
    }

    async fn create_staging_table(&self) -> Result<()> {
        let statements = match self.dialect {
            Dialect::MySql => MYSQL_STAGING_DDL,
            Dialect::Sqlite => SQLITE_STAGING_DDL,
        };
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}
