use anyhow::{Context, Result};
use std::path::PathBuf;

use newsvault::catalog::probe::probe_file;
use newsvault::config::Config;
use newsvault::discovery::PageFetcher;

pub async fn probe(config: Config, output: Option<PathBuf>, concurrency: usize) -> Result<()> {
    let input = config.paths.catalog.clone();
    let output = output.unwrap_or_else(|| input.clone());

    let fetcher = PageFetcher::new(config.discovery.requests_per_second)
        .context("Failed to create HTTP client")?;

    let summary = probe_file(
        &fetcher,
        &input,
        &output,
        concurrency,
        config.discovery.redirect_timeout(),
    )
    .await
    .with_context(|| format!("Failed to probe catalog: {}", input.display()))?;

    println!("Probed {} outlets", summary.total());
    println!("  Reachable: {}", summary.reachable());
    for (status, count) in &summary.statuses {
        match status {
            Some(code) => println!("  {code}: {count}"),
            None => println!("  unreachable: {count}"),
        }
    }
    println!("Catalog written to {}", output.display());
    Ok(())
}
