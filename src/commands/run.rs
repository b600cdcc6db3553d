use anyhow::{Context, Result};

use newsvault::catalog::Catalog;
use newsvault::config::Config;
use newsvault::runner::{ArchivePipeline, DailyRunner, RunStateStore};

pub async fn run(config: Config) -> Result<()> {
    // An unreadable catalog at startup is fatal; later reload failures only fail the cycle
    let catalog = Catalog::load(&config.paths.catalog)
        .with_context(|| format!("Failed to load catalog: {}", config.paths.catalog.display()))?;

    tracing::info!(
        catalog = %config.paths.catalog.display(),
        regions = catalog.len(),
        upload = config.upload.enabled,
        once_per_day = config.schedule.once_per_day,
        per_outlet = config.discovery.per_outlet,
        "Initializing daily run loop"
    );

    let pipeline =
        ArchivePipeline::from_config(&config).context("Failed to initialize pipeline")?;
    let runner = DailyRunner::new(
        pipeline,
        RunStateStore::new(&config.paths.state_file),
        config.schedule.clone(),
        config.upload.collection.clone(),
    );

    tokio::select! {
        () = runner.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}
