//! Tree scanner: finds video files on a mounted partition and stages them.
//!
//! The walk runs first and only touches the filesystem; staging upserts
//! follow once the tree has been read. Unreadable directories never stop
//! the scan, they are recorded in the [`WalkReport`].

use crate::event::Partition;
use mythadder_db::{MythDb, StagedFile};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// How far a directory listing got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    /// Every entry was read
    Complete,
    /// Listed, but some entries could not be inspected
    Partial,
    /// The directory could not be listed at all
    Failed,
}

/// Per-directory outcome of one walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    dirs: BTreeMap<PathBuf, DirStatus>,
}

impl WalkReport {
    pub fn status(&self, dir: &Path) -> Option<DirStatus> {
        self.dirs.get(dir).copied()
    }

    pub fn count(&self, status: DirStatus) -> usize {
        self.dirs.values().filter(|s| **s == status).count()
    }

    fn visit(&mut self, dir: &Path) {
        self.dirs.entry(dir.to_path_buf()).or_insert(DirStatus::Complete);
    }

    fn fail(&mut self, dir: &Path) {
        self.dirs.insert(dir.to_path_buf(), DirStatus::Failed);
    }

    fn degrade(&mut self, dir: &Path) {
        let status = self.dirs.entry(dir.to_path_buf()).or_insert(DirStatus::Complete);
        if *status == DirStatus::Complete {
            *status = DirStatus::Partial;
        }
    }
}

/// A video file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
    pub inode: i64,
}

impl FoundFile {
    /// Initial catalog title: the bare file name.
    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of scanning one partition.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Every inode found, including those whose upsert failed
    pub inodes: BTreeSet<i64>,
    pub report: WalkReport,
    pub files_found: usize,
    /// Files left out because their path cannot be stored as text
    pub skipped: usize,
    pub upsert_failures: usize,
}

/// Whether `path` carries one of the (normalized) `extensions`.
pub fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .map(|ext| extensions.iter().any(|allowed| *allowed == ext))
        .unwrap_or(false)
}

/// Inode number of a file, stored signed like the staging column.
pub fn file_inode(metadata: &Metadata) -> Option<i64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        return Some(metadata.ino() as i64);
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}

/// Walk `root` without following symlinks and collect matching files.
pub fn walk_tree(root: &Path, extensions: &[String]) -> (Vec<FoundFile>, WalkReport) {
    let mut report = WalkReport::default();
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                record_walk_error(&mut report, root, &err);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            report.visit(entry.path());
            continue;
        }
        if !file_type.is_file() || !has_video_extension(entry.path(), extensions) {
            continue;
        }

        let parent = entry.path().parent().unwrap_or(root);
        let inode = match entry.metadata() {
            Ok(metadata) => file_inode(&metadata),
            Err(err) => {
                debug!(path = %entry.path().display(), error = %err, "Cannot stat file");
                report.degrade(parent);
                continue;
            }
        };
        let Some(inode) = inode else {
            warn!(path = %entry.path().display(), "No inode available for file");
            continue;
        };

        found.push(FoundFile {
            path: entry.into_path(),
            inode,
        });
    }

    (found, report)
}

fn record_walk_error(report: &mut WalkReport, root: &Path, err: &walkdir::Error) {
    let Some(path) = err.path() else {
        debug!(error = %err, "Walk error without a path");
        return;
    };
    debug!(path = %path.display(), error = %err, "Directory listing failed");

    if path == root || report.status(path).is_some() {
        report.fail(path);
    } else {
        report.degrade(path.parent().unwrap_or(root));
    }
}

/// Stages every video file below a mount point.
pub struct Scanner<'a> {
    db: &'a MythDb,
    extensions: &'a [String],
    host: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(db: &'a MythDb, extensions: &'a [String], host: &'a str) -> Self {
        Self {
            db,
            extensions,
            host,
        }
    }

    /// Walk `mount_point` and upsert a staging row per video file.
    ///
    /// A failed upsert is logged and counted; the file still counts as
    /// present so its staging row is not deleted as stale.
    pub async fn scan(&self, mount_point: &Path, partition: &Partition) -> ScanOutcome {
        let (found, report) = walk_tree(mount_point, self.extensions);
        let mut outcome = ScanOutcome {
            files_found: found.len(),
            report,
            ..ScanOutcome::default()
        };

        for file in &found {
            let Some(filename) = file.path.to_str() else {
                warn!(
                    inode = file.inode,
                    path = %file.path.display(),
                    "Skipping file whose path is not valid UTF-8"
                );
                outcome.skipped += 1;
                continue;
            };
            info!(inode = file.inode, path = %filename, "Found video file");
            outcome.inodes.insert(file.inode);

            let title = file.title();
            let staged = StagedFile {
                partition_uuid: &partition.uuid,
                partition_label: &partition.label,
                file_inode: file.inode,
                filename,
                title: &title,
                host: self.host,
            };
            if let Err(err) = self.db.upsert_staged_file(&staged).await {
                error!(
                    statement = "upsert_staged_file",
                    partition = %partition.uuid,
                    inode = file.inode,
                    error = %err,
                    "Staging upsert failed"
                );
                outcome.upsert_failures += 1;
            }
        }

        let failed = outcome.report.count(DirStatus::Failed);
        let partial = outcome.report.count(DirStatus::Partial);
        if failed > 0 || partial > 0 {
            warn!(
                partition = %partition.uuid,
                failed, partial, "Some directories could not be read completely"
            );
        }

        outcome
    }
}
