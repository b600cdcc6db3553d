//! Region pipeline: discovery, capture, relocation and background upload

use super::{Clock, RegionOutcome, RegionPipeline, SystemClock};
use crate::capture::{ArtifactRelocator, CaptureDispatcher};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::discovery::{
    DiscoveryScheduler, DiscoverySettings, HeuristicClassifier, PageFetcher, RegionDiscovery,
    SeedDiscovery,
};
use crate::error::Result;
use crate::models::{Batch, DayContext, Region, SeedUrl};
use crate::upload::{InternetArchiveStore, RemoteStore, UploadMetadata, UploadPool};
use crate::utils::retry::RetryConfig;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Batch granularity within a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// One batch with the merged seeds of every outlet
    #[default]
    Region,
    /// One batch per outlet that produced seeds
    Outlet,
}

/// Production [`RegionPipeline`]
pub struct ArchivePipeline {
    catalog_path: PathBuf,
    start: usize,
    end: Option<usize>,
    scheduler: DiscoveryScheduler,
    dispatcher: CaptureDispatcher,
    relocator: ArtifactRelocator,
    uploads: Option<Arc<UploadPool>>,
    store: Option<Arc<dyn RemoteStore>>,
    derive: bool,
    granularity: Granularity,
    clock: Arc<dyn Clock>,
}

impl ArchivePipeline {
    pub fn new(
        catalog_path: impl Into<PathBuf>,
        scheduler: DiscoveryScheduler,
        dispatcher: CaptureDispatcher,
        relocator: ArtifactRelocator,
    ) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            start: 0,
            end: None,
            scheduler,
            dispatcher,
            relocator,
            uploads: None,
            store: None,
            derive: true,
            granularity: Granularity::Region,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build the full pipeline from configuration
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client or the remote store client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryConfig::with_delays(
            config.discovery.max_retries,
            config.discovery.retry_base_delay_ms,
            config.discovery.retry_base_delay_ms.saturating_mul(8),
        );
        let fetcher = Arc::new(PageFetcher::with_config(
            config.discovery.requests_per_second,
            retry,
        )?);
        let discovery = Arc::new(SeedDiscovery::new(
            fetcher,
            Arc::new(HeuristicClassifier::default()),
            DiscoverySettings::from(&config.discovery),
        ));
        let scheduler = DiscoveryScheduler::new(
            discovery,
            config.discovery.workers,
            config.discovery.max_articles,
        );
        let dispatcher = CaptureDispatcher::from_config(&config.paths.scratch_dir, &config.capture);
        let relocator = ArtifactRelocator::new(
            &config.paths.scratch_dir,
            &config.paths.collection_dir,
            &config.capture.artifact_extension,
        );

        let mut pipeline = Self::new(&config.paths.catalog, scheduler, dispatcher, relocator)
            .with_window(config.schedule.start, config.schedule.end);
        if config.discovery.per_outlet {
            pipeline = pipeline.with_granularity(Granularity::Outlet);
        }

        if config.upload.enabled {
            let store: Arc<dyn RemoteStore> = Arc::new(InternetArchiveStore::new(&config.upload)?);
            let pool = UploadPool::new(
                Arc::clone(&store),
                UploadMetadata::from(&config.upload),
                config.upload.workers,
                config.upload.delete_after_upload,
            );
            pipeline = pipeline
                .with_uploads(Arc::new(pool), store)
                .with_derive(config.upload.derive);
        } else {
            info!("Uploads disabled, artifacts stay in the collection directory");
        }

        Ok(pipeline)
    }

    /// Regions `[start, end)` of the catalog
    #[must_use]
    pub fn with_window(mut self, start: usize, end: Option<usize>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    #[must_use]
    pub fn with_uploads(mut self, pool: Arc<UploadPool>, store: Arc<dyn RemoteStore>) -> Self {
        self.uploads = Some(pool);
        self.store = Some(store);
        self
    }

    /// Submit the derive task after a completed day
    #[must_use]
    pub fn with_derive(mut self, derive: bool) -> Self {
        self.derive = derive;
        self
    }

    #[must_use]
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upload tasks submitted and not yet joined
    pub fn pending_uploads(&self) -> usize {
        self.uploads.as_ref().map_or(0, |pool| pool.pending())
    }

    /// Seed sets to capture, each with its outlet scope in per-outlet mode
    fn plan_batches(&self, found: RegionDiscovery) -> Vec<(Option<String>, Vec<SeedUrl>)> {
        match self.granularity {
            Granularity::Region => {
                if found.seeds.is_empty() {
                    return Vec::new();
                }
                vec![(None, found.seeds)]
            }
            Granularity::Outlet => {
                let (scopes, seeds): (Vec<_>, Vec<_>) = found
                    .outlets
                    .into_iter()
                    .filter(|outlet| !outlet.is_empty())
                    .map(|outlet| (outlet.scope.clone(), outlet.into_seeds()))
                    .unzip();
                unique_scopes(scopes).into_iter().map(Some).zip(seeds).collect()
            }
        }
    }

    /// Capture one batch; returns whether the engine succeeded and the relocated artifact count
    async fn capture_batch(&self, batch: &Batch) -> (bool, usize) {
        if let Err(e) = self.dispatcher.dispatch(batch).await {
            warn!(
                batch = %batch.archive_name,
                region = %batch.region,
                error = %e,
                "Capture failed, batch yields no artifacts; scratch output kept"
            );
            return (false, 0);
        }

        let report = self.relocator.relocate(batch).await;
        if report.is_clean() {
            self.relocator.cleanup(batch).await;
        } else {
            warn!(
                batch = %batch.archive_name,
                failed = report.failed_moves.len(),
                "Keeping scratch output, some artifacts could not be moved"
            );
        }

        let count = report.artifacts.len();
        if let Some(pool) = &self.uploads {
            for artifact in report.artifacts {
                pool.submit(artifact);
            }
        }
        (true, count)
    }
}

#[async_trait]
impl RegionPipeline for ArchivePipeline {
    async fn load_regions(&self) -> Result<Vec<Region>> {
        let catalog = Catalog::load(&self.catalog_path)?;
        let regions = catalog.window(self.start, self.end).to_vec();
        info!(
            catalog = %self.catalog_path.display(),
            total = catalog.len(),
            selected = regions.len(),
            start = self.start,
            end = ?self.end,
            "Catalog reloaded"
        );
        Ok(regions)
    }

    async fn process_region(&self, day: &DayContext, region: &Region) -> RegionOutcome {
        let mut outcome = RegionOutcome {
            region: region.name.clone(),
            ..Default::default()
        };

        let outlets = region.reachable_outlets();
        if outlets.is_empty() {
            info!(region = %region.name, "No reachable outlets, skipping region");
            return outcome;
        }

        let found = self.scheduler.discover_region(&region.name, &outlets).await;
        outcome.seeds = found.seeds.len();
        if found.is_empty() {
            warn!(region = %region.name, "No seeds discovered, skipping capture");
            return outcome;
        }

        for (scope, seeds) in self.plan_batches(found) {
            let batch = Batch::new(day, region, scope.as_deref(), self.clock.now(), seeds);
            outcome.batches += 1;
            let (captured, artifacts) = self.capture_batch(&batch).await;
            if captured {
                outcome.captured += 1;
            }
            outcome.artifacts += artifacts;
        }

        info!(
            region = %region.name,
            seeds = outcome.seeds,
            batches = outcome.batches,
            captured = outcome.captured,
            artifacts = outcome.artifacts,
            "Region finished"
        );
        outcome
    }

    async fn finish_cycle(&self, day: &DayContext, derive: bool) {
        if let Some(pool) = &self.uploads {
            pool.join_all().await;
        }

        if !(derive && self.derive) {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.submit_derive(&day.item_identifier).await {
                warn!(item = %day.item_identifier, error = %e, "Derive task submission failed");
            }
        }
    }
}

/// Suffix repeated scopes with `-2`, `-3`, ... so no two batches of a region share a path
fn unique_scopes(scopes: Vec<String>) -> Vec<String> {
    let mut used = HashSet::new();
    scopes
        .into_iter()
        .map(|scope| {
            let mut candidate = scope.clone();
            let mut n = 2;
            while !used.insert(candidate.clone()) {
                candidate = format!("{scope}-{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unique_scopes() {
        assert_eq!(
            unique_scopes(strings(&["a-com", "b-com", "a-com", "a-com"])),
            strings(&["a-com", "b-com", "a-com-2", "a-com-3"])
        );
        assert_eq!(
            unique_scopes(strings(&["a-com-2", "a-com", "a-com"])),
            strings(&["a-com-2", "a-com", "a-com-3"])
        );
        assert!(unique_scopes(Vec::new()).is_empty());
    }
}
