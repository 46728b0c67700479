// Entry point and high-level CLI flow.
//
// One run loads the contracts / payments workbooks, renders the configured
// chapter figures and writes the statistics sheets next to them.
//
// Exit codes:
//   0 - every selected figure and table was written
//   1 - a fatal error (missing or unreadable input, unwritable output)
//   2 - the run finished but at least one figure failed to render
mod aggregate;
mod charts;
mod cli;
mod concentration;
mod config;
mod error;
mod geo;
mod loader;
mod locale;
mod markdown;
mod output;
mod pipeline;
mod province;
mod reports;
mod sample;
mod shaping;
mod types;
mod util;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use output::preview_table_rows;
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);
    info!("satc-report v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("run failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: write a default satc-report.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{} already exists; remove it first or edit it", DEFAULT_CONFIG_FILE);
    }
    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;
    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    Ok(())
}

// RUST_LOG wins over the -v / -q flags when it is set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: logging unavailable: {}", e);
    }
}

fn load_config(args: &Args) -> Result<Config> {
    if let Some(path) = &args.config {
        return Config::load(path);
    }
    Ok(Config::load_default()?.unwrap_or_default())
}

fn run(args: &Args) -> Result<i32> {
    let mut config = load_config(args)?;
    config.merge_with_args(args);
    debug!("Configuration: {:?}", config);

    let summary = pipeline::run(&config, &args.chapters, args.no_charts)?;

    for (chapter, stats) in &summary.statistics {
        println!("\nChapter {} statistics", chapter);
        preview_table_rows(stats, 20);
    }
    println!(
        "{} charts, {} other files under {}",
        summary.rendered.len(),
        summary.files_written.len(),
        config.report.output_dir.display()
    );
    if !summary.skipped.is_empty() {
        println!("Skipped (not enough data): {}", summary.skipped.join(", "));
    }
    if !summary.missing_columns.is_empty() {
        println!("Missing input columns (read as blank or zero):");
        for column in &summary.missing_columns {
            println!("  - {}", column);
        }
    }

    if summary.is_complete() {
        Ok(0)
    } else {
        eprintln!(
            "Error: {} chart(s) failed: {}. Output is incomplete.",
            summary.failed.len(),
            summary.failed.join(", ")
        );
        Ok(2)
    }
}
