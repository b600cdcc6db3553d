//! Region-wide discovery fan-out
//!
//! Runs [`SeedDiscovery`] for every outlet of a region under a bounded number
//! of concurrent tasks and merges the results with exact-string deduplication.
//! All tasks are joined before the merged seed set is returned.

use super::{OutletDiscovery, SeedDiscovery};
use crate::models::{Outlet, SeedUrl};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Aggregated discovery result for one region
#[derive(Debug, Clone, Default)]
pub struct RegionDiscovery {
    /// Union of all outlet seeds, deduplicated by exact URL
    pub seeds: Vec<SeedUrl>,
    /// Per-outlet results, for per-outlet batching
    pub outlets: Vec<OutletDiscovery>,
    /// Outlet tasks that did not return (panicked or cancelled)
    pub failed_tasks: usize,
}

impl RegionDiscovery {
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Merge outlet results in order, dropping repeated URLs
    pub fn merge(outlets: Vec<OutletDiscovery>, failed_tasks: usize) -> Self {
        let mut seen = HashSet::new();
        let seeds = outlets
            .iter()
            .flat_map(OutletDiscovery::seeds)
            .filter(|seed| seen.insert(seed.url.clone()))
            .cloned()
            .collect();

        Self {
            seeds,
            outlets,
            failed_tasks,
        }
    }
}

/// Bounded-concurrency discovery over the outlets of a region
pub struct DiscoveryScheduler {
    discovery: Arc<SeedDiscovery>,
    workers: usize,
    max_articles: usize,
}

impl DiscoveryScheduler {
    pub fn new(discovery: Arc<SeedDiscovery>, workers: usize, max_articles: usize) -> Self {
        Self {
            discovery,
            workers: workers.max(1),
            max_articles,
        }
    }

    /// Discover seeds for every outlet; a failing outlet never affects the others
    pub async fn discover_region(&self, region: &str, outlets: &[&Outlet]) -> RegionDiscovery {
        info!(
            region,
            outlets = outlets.len(),
            workers = self.workers,
            "Starting region discovery"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles: Vec<(String, JoinHandle<OutletDiscovery>)> =
            Vec::with_capacity(outlets.len());

        for outlet in outlets {
            let outlet = (*outlet).clone();
            let website = outlet.website.clone();
            let discovery = Arc::clone(&self.discovery);
            let semaphore = Arc::clone(&semaphore);
            let max_articles = self.max_articles;

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                discovery.discover(&outlet, max_articles).await
            });
            handles.push((website, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut failed_tasks = 0;
        for (website, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(region, outlet = %website, error = %e, "Discovery task failed");
                    failed_tasks += 1;
                }
            }
        }

        let merged = RegionDiscovery::merge(results, failed_tasks);
        info!(
            region,
            seeds = merged.seeds.len(),
            outlets_with_seeds = merged.outlets.iter().filter(|o| !o.is_empty()).count(),
            failed_tasks,
            "Region discovery finished"
        );
        merged
    }
}
