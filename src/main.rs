mod ansi;
mod app;
mod config;
mod input;
mod model;
mod output;
mod placeholder;
mod runner;
mod search;
mod store;
mod tui;
mod ui;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::store::JsonStore;

const LOG_ENV: &str = "CMDBOX_LOG";
const LOG_FILE: &str = "cmdbox.log";

#[derive(Debug, Parser)]
#[command(name = "cmdbox", version, about = "Saved shell commands and SQL snippets")]
struct Cli {
    /// Config file. Defaults to ~/.config/cmdbox/config.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store file. Overrides `store_path` from the config
    #[arg(short, long)]
    store: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let loaded = config::load(cli.config.as_deref())?;
    let config = loaded.config;
    let theme = config.theme.build()?;

    let data_dir = config::data_dir()?;
    let _log_guard = init_logging(&data_dir, &config.log_level)?;
    info!(
        config = ?loaded.path,
        version = env!("CARGO_PKG_VERSION"),
        "starting cmdbox"
    );

    let store_path = cli
        .store
        .or(config.store_path)
        .unwrap_or_else(|| JsonStore::default_path(&data_dir));
    let store = JsonStore::open(&store_path)
        .with_context(|| format!("failed to open store {}", store_path.display()))?;

    let mut app = app::AppState::new(Box::new(store), config.max_output_lines);
    tui::run_tui(&mut app, &theme, &config.shell)
}

/// Sends tracing output to `<data dir>/cmdbox.log`; the terminal belongs to
/// the UI. `CMDBOX_LOG` overrides the configured level.
fn init_logging(data_dir: &Path, level: &str) -> Result<WorkerGuard> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let log_path = data_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();
    Ok(guard)
}
