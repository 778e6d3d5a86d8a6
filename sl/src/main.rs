use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, error, info};

use singlelaunch::cli::{Cli, Command, OutputFormat};
use singlelaunch::config::Config;
use singlelaunch::surface::DemoSurface;
use singlelaunch::{ClosableSurface, Coordinator, RecordStore, SurfaceRegistry};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("singlelaunch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARN") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let log_file = fs::File::create(log_dir.join("singlelaunch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(record_path) = &cli.record_path {
        config.record_path = record_path.clone();
    }

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(record_path = ?config.record_path, "singlelaunch starting");

    match cli.command {
        Command::Show { format } => cmd_show(&config.record_store(), format),
        Command::Clear => cmd_clear(&config.record_store()),
        Command::Path => {
            println!("{}", config.record_path.display());
            Ok(())
        }
        Command::Demo {
            first,
            second,
            settle_delay_ms,
        } => {
            if let Some(ms) = settle_delay_ms {
                config.settle_delay_ms = ms;
            }
            // Keep the demo away from a real slot unless a record path was requested
            let scratch = match cli.record_path {
                Some(_) => None,
                None => {
                    let dir = tempfile::tempdir().context("Failed to create scratch directory")?;
                    config.record_path = dir.path().join(singlelaunch::RECORD_FILE_NAME);
                    Some(dir)
                }
            };
            let result = cmd_demo(&config, &first, &second);
            drop(scratch);
            result
        }
    }
}

fn cmd_show(store: &RecordStore, format: OutputFormat) -> Result<()> {
    let record = store.read()?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&record)?);
        }
        OutputFormat::Text => match record {
            Some(record) => {
                println!(
                    "{} Slot held by {} (surface {})",
                    "●".green(),
                    record.app_name.cyan(),
                    record.surface_handle.to_string().dimmed()
                );
            }
            None if store.exists() => {
                println!("{} Slot is free (malformed record ignored)", "○".yellow());
            }
            None => {
                println!("{} Slot is free", "○".dimmed());
            }
        },
    }
    Ok(())
}

fn cmd_clear(store: &RecordStore) -> Result<()> {
    let _lock = store.lock()?;
    store.clear()?;
    println!("{} Cleared {}", "✓".green(), store.path().display());
    Ok(())
}

fn print_slot(step: &str, store: &RecordStore) -> Result<()> {
    match store.read()? {
        Some(record) => println!(
            "{:<28} store = ({}, {})",
            step,
            record.app_name.cyan(),
            record.surface_handle
        ),
        None => println!("{:<28} store = {}", step, "empty".dimmed()),
    }
    Ok(())
}

/// Launch `coordinator`'s app the way a launcher-started process would
fn launch(coordinator: &Arc<Coordinator>, registry: &Arc<SurfaceRegistry>) -> Result<Option<Arc<DemoSurface>>> {
    if coordinator.is_active()? {
        println!(
            "{} {} is already active, exiting",
            "→".yellow(),
            coordinator.app_name().cyan()
        );
        return Ok(None);
    }

    let view = DemoSurface::create(coordinator.app_name(), registry);
    let owner = coordinator.clone();
    view.on_close(move || {
        if let Err(e) = owner.will_close() {
            error!(app = %owner.app_name(), error = %e, "will_close failed during teardown");
        }
    });
    coordinator.will_present(view.as_ref())?;
    debug!(handle = %view.handle(), "launch: presented");
    Ok(Some(view))
}

fn cmd_demo(config: &Config, first: &str, second: &str) -> Result<()> {
    let registry = Arc::new(SurfaceRegistry::new());
    let first_app = Arc::new(config.coordinator(first, registry.clone()));
    let second_app = Arc::new(config.coordinator(second, registry.clone()));

    println!(
        "Record: {} (settle delay {:?})",
        config.record_path.display(),
        Duration::from_millis(config.settle_delay_ms)
    );

    let first_view = launch(&first_app, &registry)?;
    print_slot(&format!("{} launched", first), first_app.store())?;

    if launch(&first_app, &registry)?.is_some() {
        eyre::bail!("{} presented twice", first);
    }
    print_slot(&format!("{} relaunched", first), first_app.store())?;

    let second_view = launch(&second_app, &registry)?;
    if let Some(view) = &first_view {
        println!(
            "{} {} closed {} time(s)",
            "→".yellow(),
            view.title().cyan(),
            view.close_count()
        );
    }
    print_slot(&format!("{} launched", second), second_app.store())?;

    if let Some(view) = &second_view {
        view.dismiss();
    }
    print_slot(&format!("{} closed", second), second_app.store())?;

    println!(
        "{} {} active: {}",
        "→".yellow(),
        first.cyan(),
        first_app.is_active()?
    );
    println!("{} Demo complete", "✓".green());
    Ok(())
}
