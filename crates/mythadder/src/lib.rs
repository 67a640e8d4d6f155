//! mythadder: keeps the MythTV video catalog in step with removable media.
//!
//! udev runs the binary once per partition event:
//!
//! - `add`: wait for the mount, scan it for videos, stage them in
//!   `z_removablevideos` and put them into `videometadata`
//! - `remove`: copy catalog edits back to the staging rows and take the
//!   partition's videos out of the catalog
//!
//! Files are identified by `(filesystem UUID, inode)`, so catalog ids,
//! titles and watched flags survive renames and unplugging.

pub mod config;
pub mod error;
pub mod event;
pub mod mount;
pub mod reconcile;
pub mod scanner;

pub use config::MythAdderConfig;
pub use error::{MythAdderError, Result};
pub use event::{IgnoreReason, Partition, TriggerArgs, TriggerEvent};
pub use mount::{resolve_mount_point, MountEntry, MountTable, ProcMounts};
pub use reconcile::{MountReport, Reconciler, RemoveReport};
pub use scanner::{DirStatus, ScanOutcome, Scanner, WalkReport};
