//! Trigger parameters handed over by udev.

use clap::Args;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Raw trigger parameters; flags win over the udev environment.
#[derive(Debug, Clone, Default, Args)]
pub struct TriggerArgs {
    /// Device node of the partition
    #[arg(long, env = "DEVNAME")]
    pub device: Option<String>,

    /// Device action: add or remove
    #[arg(long, env = "ACTION")]
    pub action: Option<String>,

    /// Filesystem UUID of the partition
    #[arg(long, env = "ID_FS_UUID")]
    pub uuid: Option<String>,

    /// Filesystem label of the partition
    #[arg(long, env = "ID_FS_LABEL")]
    pub label: Option<String>,

    /// MythTV configuration directory holding mythadder.toml
    #[arg(long, env = "MYTHCONFDIR", default_value = "/etc/mythtv")]
    pub config_dir: PathBuf,
}

/// A partition as identified by its filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub uuid: String,
    pub label: String,
}

impl Partition {
    pub fn new(uuid: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            label: label.into(),
        }
    }
}

/// Why a trigger was not acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NoDevice,
    UnhandledAction(String),
    MissingUuid,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no device name"),
            Self::UnhandledAction(action) if action.is_empty() => write!(f, "no action"),
            Self::UnhandledAction(action) => write!(f, "unhandled action '{action}'"),
            Self::MissingUuid => write!(f, "no filesystem UUID"),
        }
    }
}

/// What one invocation has to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Add { device: PathBuf, partition: Partition },
    Remove { device: PathBuf, partition: Partition },
    Ignored(IgnoreReason),
}

impl TriggerEvent {
    /// Classify the trigger. Blank values count as absent.
    pub fn from_args(args: &TriggerArgs) -> Self {
        let Some(device) = non_blank(&args.device) else {
            return Self::Ignored(IgnoreReason::NoDevice);
        };

        let action = non_blank(&args.action).unwrap_or_default();
        if action != "add" && action != "remove" {
            return Self::Ignored(IgnoreReason::UnhandledAction(action.to_string()));
        }

        let Some(uuid) = non_blank(&args.uuid) else {
            return Self::Ignored(IgnoreReason::MissingUuid);
        };

        let partition = Partition::new(uuid, non_blank(&args.label).unwrap_or_default());
        let device = PathBuf::from(device);
        if action == "add" {
            Self::Add { device, partition }
        } else {
            Self::Remove { device, partition }
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
