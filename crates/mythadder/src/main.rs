//! mythadder binary: udev entry point plus a small diagnostic command.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use mythadder::{
    IgnoreReason, MythAdderConfig, ProcMounts, Reconciler, TriggerArgs, TriggerEvent,
};
use mythadder_db::{redact_url, DbConfig, DbError, MythDb, StagingVideoRow};
use mythadder_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "mythadder",
    about = "Adds videos on removable media to the MythTV catalog",
    long_about = "Run by udev with DEVNAME, ACTION, ID_FS_UUID and ID_FS_LABEL set. \
                  On add the partition is scanned and its videos catalogued; on remove \
                  they are taken out of the catalog again."
)]
struct Cli {
    /// Mirror the log file output on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file (default: $MYTHCONFDIR/mythadder.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// MythTV database URL, overrides the configuration file
    #[arg(long, global = true, env = "MYTHADDER_DATABASE_URL")]
    database_url: Option<String>,

    #[command(flatten)]
    trigger: TriggerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the staged videos of a partition
    Status {
        /// Filesystem UUID of the partition
        uuid: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match MythAdderConfig::locate(cli.config.as_deref(), &cli.trigger.config_dir)
    {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(1);
        }
    };
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }

    let _log_guard = init_logging(LogConfig {
        log_file: config.log_path(),
        filter: &config.log_filter,
        verbose: cli.verbose,
    });

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "Failed to start async runtime");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            if is_schema_conflict(&err) {
                error!("The staging table was written by a newer mythadder; upgrade this host");
            }
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

fn is_schema_conflict(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<DbError>())
        .any(DbError::is_schema_conflict)
}

async fn run(cli: Cli, config: MythAdderConfig) -> Result<()> {
    match cli.command {
        Some(Commands::Status { uuid, json }) => {
            let db = connect(&config).await?;
            let result = print_status(&db, &uuid, json).await;
            db.close().await;
            result
        }
        None => handle_trigger(&cli.trigger, config).await,
    }
}

async fn connect(config: &MythAdderConfig) -> Result<MythDb> {
    let db_config = DbConfig::from_url(&config.database_url)
        .with_context(|| format!("Invalid database URL {}", redact_url(&config.database_url)))?;
    MythDb::open(&db_config)
        .await
        .with_context(|| format!("Failed to connect to {}", redact_url(&config.database_url)))
}

async fn handle_trigger(args: &TriggerArgs, config: MythAdderConfig) -> Result<()> {
    let event = TriggerEvent::from_args(args);
    if let TriggerEvent::Ignored(reason) = &event {
        match reason {
            IgnoreReason::MissingUuid => warn!(device = ?args.device, "Ignoring event: {}", reason),
            _ => debug!("Ignoring event: {}", reason),
        }
        return Ok(());
    }

    let host = config.host().context("Failed to determine hostname")?;
    let db = connect(&config).await?;
    let mounts = Box::new(ProcMounts::new(config.mount_table.clone()));
    let reconciler = Reconciler::new(db.clone(), config, mounts, host);

    let result = match &event {
        TriggerEvent::Add { device, partition } => {
            info!(
                device = %device.display(),
                partition = %partition.uuid,
                label = %partition.label,
                host = %reconciler.host(),
                "Device added"
            );
            reconciler.on_mount(device, partition).await.map(|_| ())
        }
        TriggerEvent::Remove { device, partition } => {
            info!(
                device = %device.display(),
                partition = %partition.uuid,
                "Device removed"
            );
            reconciler.on_remove(&partition.uuid).await.map(|_| ())
        }
        TriggerEvent::Ignored(_) => Ok(()),
    };

    db.close().await;
    result.context("Reconciliation aborted")
}

async fn print_status(db: &MythDb, uuid: &str, json: bool) -> Result<()> {
    let rows = db
        .partition_rows(uuid)
        .await
        .with_context(|| format!("Failed to read staging rows of {}", uuid))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No staged videos for partition {}", uuid);
        return Ok(());
    }

    print_rows(&rows);
    let catalogued = rows.iter().filter(|row| row.is_promoted()).count();
    println!("{} staged, {} with a catalog id", rows.len(), catalogued);
    Ok(())
}

fn print_rows(rows: &[StagingVideoRow]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = ["Inode", "Catalog ID", "Title", "Filename"]
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header);

    for row in rows {
        let catalog_id = if row.is_promoted() {
            Cell::new(row.catalog_id)
        } else {
            Cell::new("-").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(row.file_inode),
            catalog_id,
            Cell::new(&row.title),
            Cell::new(&row.filename),
        ]);
    }

    println!("{}", table);
}
