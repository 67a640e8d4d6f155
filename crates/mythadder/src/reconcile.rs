//! Mount and unmount reconciliation between a partition and the catalog.
//!
//! Mounting registers the partition's videos in the staging table, restores
//! rows catalogued on an earlier mount and promotes new ones. Unmounting
//! copies catalog edits back onto the staging rows and removes the catalog
//! rows, so the videos leave the library until the device returns.
//!
//! Only the schema check is fatal. Every later statement is attempted even
//! when an earlier one failed; failures are logged and counted.

use crate::config::MythAdderConfig;
use crate::error::Result;
use crate::event::Partition;
use crate::mount::{resolve_mount_point, MountTable};
use crate::scanner::{DirStatus, Scanner};
use mythadder_db::{DbError, MythDb};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Counters of one mount reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MountReport {
    pub mount_point: Option<PathBuf>,
    pub files_found: usize,
    pub failed_dirs: usize,
    pub stale_deleted: u64,
    pub restored: u64,
    pub promoted: usize,
    /// Statements that failed, including per-file upserts
    pub failures: usize,
}

/// Counters of one unmount reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub mirrored: u64,
    pub catalog_deleted: u64,
    pub failures: usize,
}

/// Everything one device event needs: database, settings, mount table and
/// the host the catalog rows are attributed to.
pub struct Reconciler {
    db: MythDb,
    config: MythAdderConfig,
    mounts: Box<dyn MountTable>,
    host: String,
}

impl Reconciler {
    pub fn new(
        db: MythDb,
        config: MythAdderConfig,
        mounts: Box<dyn MountTable>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            db,
            config,
            mounts,
            host: host.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Handle a device being added.
    ///
    /// A device that never shows up in the mount table is treated as empty,
    /// which drops all of its staging rows.
    pub async fn on_mount(&self, device: &Path, partition: &Partition) -> Result<MountReport> {
        self.db.ensure_schema().await?;

        let mut report = MountReport::default();
        let mount_point = resolve_mount_point(
            self.mounts.as_ref(),
            device,
            self.config.mount_wait(),
            self.config.mount_poll(),
        )
        .await;

        let found = match &mount_point {
            Some(mount_point) => {
                info!(
                    device = %device.display(),
                    mount_point = %mount_point.display(),
                    partition = %partition.uuid,
                    "Scanning partition"
                );
                let outcome = Scanner::new(&self.db, &self.config.extensions, &self.host)
                    .scan(mount_point, partition)
                    .await;
                report.files_found = outcome.files_found;
                report.failed_dirs = outcome.report.count(DirStatus::Failed);
                report.failures += outcome.upsert_failures;
                outcome.inodes
            }
            None => {
                warn!(
                    device = %device.display(),
                    partition = %partition.uuid,
                    wait_secs = self.config.mount_wait_secs,
                    "Device not mounted, treating it as empty"
                );
                BTreeSet::new()
            }
        };
        report.mount_point = mount_point;

        self.delete_stale(&partition.uuid, &found, &mut report).await;
        self.restore(&partition.uuid, &mut report).await;
        self.promote(&partition.uuid, &mut report).await;

        info!(
            partition = %partition.uuid,
            found = report.files_found,
            stale_deleted = report.stale_deleted,
            restored = report.restored,
            promoted = report.promoted,
            failures = report.failures,
            "Mount reconciliation finished"
        );
        Ok(report)
    }

    /// Handle a device being removed.
    pub async fn on_remove(&self, partition_uuid: &str) -> Result<RemoveReport> {
        self.db.ensure_schema().await?;

        let mut report = RemoveReport::default();

        match self.db.mirror_from_catalog(partition_uuid).await {
            Ok(mirrored) => report.mirrored = mirrored,
            Err(err) => {
                log_failure("mirror_from_catalog", partition_uuid, &err);
                report.failures += 1;
            }
        }

        match self.db.delete_catalog_rows(partition_uuid).await {
            Ok(deleted) => report.catalog_deleted = deleted,
            Err(err) => {
                log_failure("delete_catalog_rows", partition_uuid, &err);
                report.failures += 1;
            }
        }

        info!(
            partition = %partition_uuid,
            mirrored = report.mirrored,
            catalog_deleted = report.catalog_deleted,
            failures = report.failures,
            "Unmount reconciliation finished"
        );
        Ok(report)
    }

    /// Drop staging rows whose inode was not seen by the scan.
    async fn delete_stale(&self, partition_uuid: &str, found: &BTreeSet<i64>, report: &mut MountReport) {
        if found.is_empty() {
            match self.db.delete_partition(partition_uuid).await {
                Ok(deleted) => report.stale_deleted = deleted,
                Err(err) => {
                    log_failure("delete_partition", partition_uuid, &err);
                    report.failures += 1;
                }
            }
            return;
        }

        let staged = match self.db.staged_inodes(partition_uuid).await {
            Ok(staged) => staged,
            Err(err) => {
                log_failure("staged_inodes", partition_uuid, &err);
                report.failures += 1;
                return;
            }
        };

        let stale: Vec<i64> = staged
            .into_iter()
            .filter(|inode| !found.contains(inode))
            .collect();
        if stale.is_empty() {
            return;
        }
        debug!(partition = %partition_uuid, count = stale.len(), "Deleting stale staging rows");

        match self.db.delete_inodes(partition_uuid, &stale).await {
            Ok(deleted) => report.stale_deleted = deleted,
            Err(err) => {
                log_failure("delete_inodes", partition_uuid, &err);
                report.failures += 1;
            }
        }
    }

    /// Put previously catalogued rows back under their original ids.
    async fn restore(&self, partition_uuid: &str, report: &mut MountReport) {
        match self.db.restore_promoted(partition_uuid, &self.host).await {
            Ok(restored) => report.restored = restored,
            Err(err) => {
                log_failure("restore_promoted", partition_uuid, &err);
                report.failures += 1;
            }
        }
    }

    /// Catalogue never-promoted rows one by one and record their new ids.
    async fn promote(&self, partition_uuid: &str, report: &mut MountReport) {
        let pending = match self.db.pending_rows(partition_uuid).await {
            Ok(pending) => pending,
            Err(err) => {
                log_failure("pending_rows", partition_uuid, &err);
                report.failures += 1;
                return;
            }
        };

        for row in pending {
            let catalog_id = match self
                .db
                .promote_row(partition_uuid, row.file_inode, &self.host)
                .await
            {
                Ok(Some(id)) => id,
                Ok(None) => {
                    debug!(inode = row.file_inode, "Staging row gone before promotion");
                    continue;
                }
                Err(err) => {
                    log_failure("promote_row", partition_uuid, &err);
                    report.failures += 1;
                    continue;
                }
            };

            match self
                .db
                .set_catalog_id(partition_uuid, row.file_inode, catalog_id)
                .await
            {
                Ok(true) => {
                    info!(
                        inode = row.file_inode,
                        catalog_id,
                        path = %row.filename,
                        "Added video to catalog"
                    );
                    report.promoted += 1;
                }
                Ok(false) => {
                    warn!(
                        inode = row.file_inode,
                        catalog_id, "Staging row vanished after promotion"
                    );
                }
                Err(err) => {
                    error!(
                        statement = "set_catalog_id",
                        partition = %partition_uuid,
                        inode = row.file_inode,
                        catalog_id,
                        error = %err,
                        "Could not record catalog id"
                    );
                    report.failures += 1;
                }
            }
        }
    }
}

fn log_failure(statement: &'static str, partition_uuid: &str, err: &DbError) {
    error!(statement, partition = %partition_uuid, error = %err, "Statement failed");
}
