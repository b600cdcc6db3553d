use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use newsvault::config::{Config, LoggingConfig};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(
    name = "newsvault",
    version,
    about = "Daily web-archive capture of regional news outlets",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily capture loop (default)
    Run,

    /// Re-upload artifacts of one day that the remote store is missing
    Reconcile {
        /// Day to reconcile (YYYY-MM-DD, UTC)
        #[arg(long, conflicts_with = "days_back")]
        date: Option<NaiveDate>,

        /// Reconcile the day this many days ago
        #[arg(long)]
        days_back: Option<u32>,
    },

    /// Refresh website_status_code of every catalog outlet
    Probe {
        /// Output catalog path (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Concurrent HEAD requests
        #[arg(long, default_value = "20")]
        concurrency: usize,
    },
}

/// Overrides applied on top of the configuration file
#[derive(Args, Debug)]
struct Options {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "NEWSVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Outlet catalog (JSON)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Idle sleep between checks in seconds, when not once-per-day
    #[arg(long, global = true)]
    sleep: Option<u64>,

    /// Maximum article seeds per outlet
    #[arg(long, global = true)]
    max_articles: Option<usize>,

    /// Log file, written in addition to the console
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Collection name, also the item identifier prefix
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Uploader identity stored in item metadata
    #[arg(long, global = true)]
    uploader: Option<String>,

    /// Media type stored in item metadata
    #[arg(long, global = true)]
    mediatype: Option<String>,

    /// Absolute capture time budget in seconds
    #[arg(long, global = true)]
    time_limit: Option<u64>,

    /// Capture time budget per seed URL in seconds
    #[arg(long, global = true)]
    per_url_budget: Option<u64>,

    /// Capture engine workers
    #[arg(long, global = true)]
    capture_workers: Option<usize>,

    /// Scratch workspace for the capture engine
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Durable collection root
    #[arg(long, global = true)]
    collection_dir: Option<PathBuf>,

    /// Delete local artifacts after a confirmed upload
    #[arg(long, global = true)]
    delete_after_upload: bool,

    /// Upload artifacts to the remote store
    #[arg(long, global = true)]
    upload: bool,

    /// First region index (inclusive)
    #[arg(long, global = true)]
    start: Option<usize>,

    /// Last region index (exclusive)
    #[arg(long, global = true)]
    end: Option<usize>,

    /// Sleep until the next UTC midnight after a completed day
    #[arg(long, global = true)]
    once_per_day: bool,

    /// Concurrent outlet discovery tasks per region
    #[arg(long, global = true)]
    discovery_workers: Option<usize>,

    /// Concurrent background uploads
    #[arg(long, global = true)]
    upload_workers: Option<usize>,

    /// Capture every outlet as its own batch
    #[arg(long, global = true)]
    per_outlet: bool,
}

impl Options {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.paths.catalog = input.clone();
        }
        if let Some(sleep) = self.sleep {
            config.schedule.sleep_secs = sleep;
        }
        if let Some(max) = self.max_articles {
            config.discovery.max_articles = max;
        }
        if let Some(log) = &self.log {
            config.logging.file = Some(log.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(collection) = &self.collection {
            config.upload.collection = collection.clone();
        }
        if let Some(uploader) = &self.uploader {
            config.upload.uploader = uploader.clone();
        }
        if let Some(mediatype) = &self.mediatype {
            config.upload.mediatype = mediatype.clone();
        }
        if let Some(limit) = self.time_limit {
            config.capture.time_limit_secs = Some(limit);
        }
        if let Some(budget) = self.per_url_budget {
            config.capture.per_url_budget_secs = budget;
        }
        if let Some(workers) = self.capture_workers {
            config.capture.workers = workers;
        }
        if let Some(dir) = &self.scratch_dir {
            config.paths.scratch_dir = dir.clone();
        }
        if let Some(dir) = &self.collection_dir {
            config.paths.state_file = dir.join(".newsvault-state.json");
            config.paths.collection_dir = dir.clone();
        }
        if let Some(start) = self.start {
            config.schedule.start = start;
        }
        if let Some(end) = self.end {
            config.schedule.end = Some(end);
        }
        if let Some(workers) = self.discovery_workers {
            config.discovery.workers = workers;
        }
        if let Some(workers) = self.upload_workers {
            config.upload.workers = workers;
        }
        config.upload.delete_after_upload |= self.delete_after_upload;
        config.upload.enabled |= self.upload;
        config.schedule.once_per_day |= self.once_per_day;
        config.discovery.per_outlet |= self.per_outlet;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.options.load_config()?;

    setup_tracing(&config.logging)?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "newsvault starting");

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run(config).await,
        Commands::Reconcile { date, days_back } => {
            commands::reconcile(config, date, days_back).await
        }
        Commands::Probe {
            output,
            concurrency,
        } => commands::probe(config, output, concurrency).await,
    };

    if let Err(e) = &result {
        tracing::error!("newsvault exiting with error: {e:#}");
    }
    result
}

fn setup_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let (json_layer, text_layer) = match logging.format.as_str() {
        "json" => (Some(fmt::layer().json()), None),
        _ => (None, Some(fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
