//! End-to-end tests for mythadder
//!
//! Drive full add/remove cycles against a temp directory standing in for
//! the mounted partition and a SQLite database shaped like MythTV's.

#![cfg(unix)]

use mythadder::{
    MountEntry, MountReport, MountTable, MythAdderConfig, Partition, Reconciler, RemoveReport,
};
use mythadder_db::testing::TestDb;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEVICE: &str = "/dev/sdb1";
const UUID: &str = "ABCD-1234";

/// Mount table with a fixed set of entries.
struct StaticMounts(Vec<MountEntry>);

impl MountTable for StaticMounts {
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        Ok(self.0.clone())
    }
}

/// Create a test environment with a media tree and a MythTV database
struct TestEnv {
    /// Mounted partition contents (cleaned up on drop)
    media: TempDir,
    fixture: TestDb,
}

impl TestEnv {
    async fn new() -> Self {
        Self {
            media: TempDir::new().expect("Failed to create media dir"),
            fixture: TestDb::new().await,
        }
    }

    fn media_dir(&self) -> &Path {
        self.media.path()
    }

    fn write_file(&self, name: &str) -> PathBuf {
        let path = self.media_dir().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&path, name).expect("Failed to write file");
        path
    }

    fn reconciler(&self, mounted: bool) -> Reconciler {
        let entries = if mounted {
            vec![MountEntry {
                device: DEVICE.to_string(),
                mount_point: self.media_dir().to_path_buf(),
            }]
        } else {
            Vec::new()
        };
        let config = MythAdderConfig {
            mount_wait_secs: 0,
            ..MythAdderConfig::default()
        };
        Reconciler::new(
            self.fixture.db.clone(),
            config,
            Box::new(StaticMounts(entries)),
            "mythbox",
        )
    }

    async fn add(&self, label: &str) -> MountReport {
        self.reconciler(true)
            .on_mount(Path::new(DEVICE), &Partition::new(UUID, label))
            .await
            .expect("mount reconciliation failed")
    }

    async fn add_unmounted(&self) -> MountReport {
        self.reconciler(false)
            .on_mount(Path::new(DEVICE), &Partition::new(UUID, "USB"))
            .await
            .expect("mount reconciliation failed")
    }

    async fn remove(&self) -> RemoveReport {
        self.reconciler(true)
            .on_remove(UUID)
            .await
            .expect("unmount reconciliation failed")
    }

    /// Catalog id per staged file name.
    async fn catalog_ids(&self) -> BTreeMap<String, i64> {
        self.fixture
            .db
            .partition_rows(UUID)
            .await
            .unwrap()
            .into_iter()
            .map(|row| {
                let name = Path::new(&row.filename)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                (name, row.catalog_id)
            })
            .collect()
    }
}

// ============================================================================
// Mount
// ============================================================================

#[tokio::test]
async fn test_first_mount_catalogues_videos() {
    let env = TestEnv::new().await;
    env.write_file("movie.AVI");
    env.write_file("Series/e01.mkv");
    env.write_file("readme.txt");

    let report = env.add("USB").await;

    assert_eq!(report.mount_point.as_deref(), Some(env.media_dir()));
    assert_eq!(report.files_found, 2);
    assert_eq!(report.promoted, 2);
    assert_eq!(report.failures, 0);
    assert_eq!(env.fixture.catalog_count().await, 2);

    for (name, id) in env.catalog_ids().await {
        assert_ne!(id, 0, "{name} was not promoted");
        let entry = env.fixture.db.catalog_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.title, name);
        assert_eq!(entry.host, "mythbox");
    }
}

#[tokio::test]
async fn test_second_mount_is_idempotent() {
    let env = TestEnv::new().await;
    env.write_file("a.mkv");
    env.write_file("b.mp4");

    env.add("USB").await;
    let ids = env.catalog_ids().await;
    let report = env.add("USB").await;

    assert_eq!(report.promoted, 0);
    assert_eq!(report.restored, 0);
    assert_eq!(report.stale_deleted, 0);
    assert_eq!(env.catalog_ids().await, ids);
    assert_eq!(env.fixture.catalog_count().await, 2);
}

#[tokio::test]
async fn test_unmounted_device_drops_staging_rows() {
    let env = TestEnv::new().await;
    env.write_file("a.mkv");
    env.add("USB").await;
    env.remove().await;

    let report = env.add_unmounted().await;

    assert_eq!(report.mount_point, None);
    assert_eq!(report.stale_deleted, 1);
    assert!(env.catalog_ids().await.is_empty());
    assert_eq!(env.fixture.catalog_count().await, 0);
}

#[tokio::test]
async fn test_label_change_updates_staging_row() {
    let env = TestEnv::new().await;
    env.write_file("a.mkv");

    env.add("OLD").await;
    env.add("NEW").await;

    let rows = env.fixture.db.partition_rows(UUID).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].partition_label, "NEW");
}

// ============================================================================
// Full cycles
// ============================================================================

#[tokio::test]
async fn test_add_remove_add_restores_same_ids() {
    let env = TestEnv::new().await;
    let unrelated = env
        .fixture
        .insert_catalog_row("Local recording", "/srv/video/local.mkv")
        .await;
    env.write_file("a.mkv");
    env.write_file("b.mkv");

    env.add("USB").await;
    let ids = env.catalog_ids().await;

    let removed = env.remove().await;
    assert_eq!(removed.catalog_deleted, 2);
    assert_eq!(removed.failures, 0);
    assert_eq!(env.fixture.catalog_ids().await, vec![unrelated]);
    // Staging rows stay behind with their catalog ids.
    assert_eq!(env.catalog_ids().await, ids);

    let report = env.add("USB").await;
    assert_eq!(report.restored, 2);
    assert_eq!(report.promoted, 0);
    assert_eq!(env.catalog_ids().await, ids);
    assert_eq!(env.fixture.catalog_count().await, 3);
}

#[tokio::test]
async fn test_catalog_edits_survive_unplugging() {
    let env = TestEnv::new().await;
    env.write_file("movie.avi");
    env.add("USB").await;
    let id = env.catalog_ids().await["movie.avi"];
    env.fixture.rename_catalog_row(id, "New Title").await;

    env.remove().await;

    let row = env.fixture.db.partition_rows(UUID).await.unwrap().remove(0);
    assert_eq!(row.title, "New Title");
    assert_eq!(row.catalog_id, id);
    assert!(env.fixture.db.catalog_entry(id).await.unwrap().is_none());

    env.add("USB").await;

    let entry = env.fixture.db.catalog_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.title, "New Title");
}

#[tokio::test]
async fn test_deleted_file_leaves_catalog_for_good() {
    let env = TestEnv::new().await;
    env.write_file("a.mkv");
    let gone = env.write_file("b.mkv");
    env.write_file("c.mkv");
    env.add("USB").await;
    let before = env.catalog_ids().await;
    env.remove().await;

    fs::remove_file(gone).unwrap();
    let report = env.add("USB").await;

    assert_eq!(report.stale_deleted, 1);
    assert_eq!(report.restored, 2);
    let after = env.catalog_ids().await;
    assert_eq!(after.len(), 2);
    assert_eq!(after["a.mkv"], before["a.mkv"]);
    assert_eq!(after["c.mkv"], before["c.mkv"]);
    assert_eq!(env.fixture.catalog_count().await, 2);
}

#[tokio::test]
async fn test_renamed_file_keeps_catalog_id() {
    let env = TestEnv::new().await;
    let old = env.write_file("draft.mkv");
    env.add("USB").await;
    let id = env.catalog_ids().await["draft.mkv"];
    env.remove().await;

    let new = env.media_dir().join("Films").join("final.mkv");
    fs::create_dir_all(new.parent().unwrap()).unwrap();
    fs::rename(&old, &new).unwrap();
    let report = env.add("USB").await;

    assert_eq!(report.promoted, 0);
    assert_eq!(env.catalog_ids().await["final.mkv"], id);
    let entry = env.fixture.db.catalog_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.filename, new.to_string_lossy());
}

#[tokio::test]
async fn test_remove_of_unknown_partition_is_harmless() {
    let env = TestEnv::new().await;
    let local = env
        .fixture
        .insert_catalog_row("Local recording", "/srv/video/local.mkv")
        .await;

    let report = env.remove().await;

    assert_eq!(report.mirrored, 0);
    assert_eq!(report.catalog_deleted, 0);
    assert_eq!(env.fixture.catalog_ids().await, vec![local]);
}
