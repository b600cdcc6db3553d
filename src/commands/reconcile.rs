use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeDelta, Utc};
use std::sync::Arc;

use newsvault::config::Config;
use newsvault::models::DayContext;
use newsvault::upload::{InternetArchiveStore, Reconciler, RemoteStore, UploadMetadata};

/// Day `days_back` days before `today`
fn target_day(today: NaiveDate, days_back: u32) -> NaiveDate {
    today - TimeDelta::days(i64::from(days_back))
}

pub async fn reconcile(
    config: Config,
    date: Option<NaiveDate>,
    days_back: Option<u32>,
) -> Result<()> {
    if !config.has_credentials() {
        anyhow::bail!("reconcile needs IA_ACCESS_KEY / IA_SECRET_KEY to re-upload artifacts");
    }

    let date = date.unwrap_or_else(|| {
        target_day(
            Utc::now().date_naive(),
            days_back.unwrap_or(config.upload.reconcile_days_back),
        )
    });
    let day = DayContext::new(&config.upload.collection, date);

    tracing::info!(
        item = %day.item_identifier,
        date = %date,
        collection_dir = %config.paths.collection_dir.display(),
        "Starting reconciliation"
    );

    let store: Arc<dyn RemoteStore> = Arc::new(
        InternetArchiveStore::new(&config.upload).context("Failed to create remote store client")?,
    );
    let reconciler = Reconciler::new(
        store,
        UploadMetadata::from(&config.upload),
        &config.paths.collection_dir,
        &config.capture.artifact_extension,
    )
    .with_local_deletion(config.upload.delete_after_upload);

    let report = reconciler
        .reconcile(&day)
        .await
        .with_context(|| format!("Failed to reconcile {}", day.item_identifier))?;

    println!("Reconciliation of {}", report.item_identifier);
    println!("  In sync:     {}", report.in_sync);
    println!("  Re-uploaded: {}", report.reuploaded.len());
    println!("  Failed:      {}", report.failed.len());
    if report.remote_only_expected {
        println!(
            "  Remote only: {} (expected, local copies are deleted after upload)",
            report.remote_only.len()
        );
    } else {
        println!("  Remote only: {}", report.remote_only.len());
        for name in &report.remote_only {
            println!("    {name}");
        }
    }

    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} artifact(s) could not be re-uploaded for {}",
            report.failed.len(),
            report.item_identifier
        );
    }
    Ok(())
}
