//! Mount point resolution for a freshly added device.
//!
//! udev fires `add` before the automounter has mounted the filesystem, so
//! the mount table is polled until the device shows up or the wait expires.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
}

/// Source of the current mounts.
pub trait MountTable {
    fn entries(&self) -> io::Result<Vec<MountEntry>>;
}

/// The kernel mount table in `/proc/self/mounts` format.
#[derive(Debug, Clone)]
pub struct ProcMounts {
    path: PathBuf,
}

impl ProcMounts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse mount table text, skipping malformed lines.
    pub fn parse(content: &str) -> Vec<MountEntry> {
        content
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let device = fields.next()?;
                let mount_point = fields.next()?;
                Some(MountEntry {
                    device: unescape_field(device),
                    mount_point: PathBuf::from(unescape_field(mount_point)),
                })
            })
            .collect()
    }
}

impl MountTable for ProcMounts {
    fn entries(&self) -> io::Result<Vec<MountEntry>> {
        Ok(Self::parse(&std::fs::read_to_string(&self.path)?))
    }
}

/// Decode the `\ooo` octal escapes the kernel uses for blanks and
/// backslashes in mount table fields.
pub fn unescape_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Wait for `device` to appear in the mount table and return its mount point.
///
/// Polls every `poll` and gives up once `wait` has elapsed. An unreadable
/// table counts as "not mounted yet" for that round.
pub async fn resolve_mount_point(
    table: &dyn MountTable,
    device: &Path,
    wait: Duration,
    poll: Duration,
) -> Option<PathBuf> {
    let deadline = Instant::now() + wait;

    loop {
        match table.entries() {
            Ok(entries) => {
                if let Some(mount_point) = find_mount_point(&entries, device) {
                    return Some(mount_point);
                }
            }
            Err(err) => debug!(error = %err, "Mount table unreadable"),
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(poll.min(deadline - now)).await;
    }
}

/// Mount point of the first entry whose device is exactly `device`.
///
/// Falls back to comparing canonical paths so `/dev/disk/by-uuid/...`
/// links match the node they point at.
pub fn find_mount_point(entries: &[MountEntry], device: &Path) -> Option<PathBuf> {
    if let Some(entry) = entries.iter().find(|e| Path::new(&e.device) == device) {
        return Some(entry.mount_point.clone());
    }

    let canonical = std::fs::canonicalize(device).ok()?;
    entries
        .iter()
        .filter(|e| e.device.starts_with('/'))
        .find(|e| {
            std::fs::canonicalize(&e.device)
                .map(|path| path == canonical)
                .unwrap_or(false)
        })
        .map(|e| e.mount_point.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MOUNTS: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb10 /media/other vfat rw 0 0
/dev/sdc1 /media/My\\040Movies vfat rw 0 0
";

    /// Reports the device as mounted from the given read onward.
    struct DelayedTable {
        reads: AtomicUsize,
        mounted_from: usize,
    }

    impl MountTable for DelayedTable {
        fn entries(&self) -> io::Result<Vec<MountEntry>> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if read < self.mounted_from {
                return Err(io::Error::new(io::ErrorKind::NotFound, "not yet"));
            }
            Ok(vec![MountEntry {
                device: "/dev/sdb1".to_string(),
                mount_point: PathBuf::from("/media/usb"),
            }])
        }
    }

    #[test]
    fn test_parse_mount_table() {
        let entries = ProcMounts::parse(MOUNTS);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].device, "/dev/sda1");
        assert_eq!(entries[1].mount_point, PathBuf::from("/"));
        assert_eq!(entries[3].mount_point, PathBuf::from("/media/My Movies"));
    }

    #[test]
    fn test_unescape_field() {
        assert_eq!(unescape_field("a\\040b"), "a b");
        assert_eq!(unescape_field("tab\\011x"), "tab\tx");
        assert_eq!(unescape_field("back\\134slash"), "back\\slash");
        assert_eq!(unescape_field("trailing\\04"), "trailing\\04");
        assert_eq!(unescape_field("no\\999escape"), "no\\999escape");
    }

    #[test]
    fn test_exact_device_match() {
        let entries = ProcMounts::parse(MOUNTS);
        assert_eq!(find_mount_point(&entries, Path::new("/dev/sdb1")), None);
        assert_eq!(
            find_mount_point(&entries, Path::new("/dev/sdb10")),
            Some(PathBuf::from("/media/other"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_device_matches_target() {
        let tmp = tempfile::TempDir::new().unwrap();
        let node = tmp.path().join("sdb1");
        std::fs::write(&node, b"").unwrap();
        let link = tmp.path().join("by-uuid-ABCD");
        std::os::unix::fs::symlink(&node, &link).unwrap();

        let entries = vec![MountEntry {
            device: node.to_string_lossy().into_owned(),
            mount_point: PathBuf::from("/media/usb"),
        }];
        assert_eq!(
            find_mount_point(&entries, &link),
            Some(PathBuf::from("/media/usb"))
        );
    }

    #[test]
    fn test_proc_mounts_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mounts");
        std::fs::write(&path, MOUNTS).unwrap();

        let entries = ProcMounts::new(&path).entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(ProcMounts::new(tmp.path().join("missing")).entries().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_once_device_appears() {
        let table = DelayedTable {
            reads: AtomicUsize::new(0),
            mounted_from: 3,
        };
        let start = Instant::now();

        let mount = resolve_mount_point(
            &table,
            Path::new("/dev/sdb1"),
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(mount, Some(PathBuf::from("/media/usb")));
        assert_eq!(table.reads.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_deadline() {
        let table = DelayedTable {
            reads: AtomicUsize::new(0),
            mounted_from: usize::MAX,
        };
        let start = Instant::now();

        let mount = resolve_mount_point(
            &table,
            Path::new("/dev/sdb1"),
            Duration::from_millis(2500),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(mount, None);
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
        assert_eq!(table.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_wait_reads_once() {
        let table = DelayedTable {
            reads: AtomicUsize::new(0),
            mounted_from: 2,
        };

        let mount = resolve_mount_point(
            &table,
            Path::new("/dev/sdb1"),
            Duration::ZERO,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(mount, None);
        assert_eq!(table.reads.load(Ordering::SeqCst), 1);
    }
}
