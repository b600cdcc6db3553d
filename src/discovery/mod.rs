//! Seed discovery
//!
//! Per-outlet discovery of candidate article URLs:
//!
//! 1. every feed of the outlet, entry links judged by the classifier
//! 2. if the cap was not reached, links scraped from the (redirect-resolved) homepage
//! 3. if anything was found, the outlet website itself as an extra seed
//!
//! The cap bounds the article seeds only; the website seed is appended after
//! the cap check and is not counted against it. Network failures never escape
//! [`SeedDiscovery::discover`]: a failing path contributes zero seeds and a
//! warning.

pub mod classifier;
pub mod feed;
pub mod fetcher;
pub mod links;
pub mod scheduler;

pub use classifier::{ArticleClassifier, HeuristicClassifier};
pub use fetcher::PageFetcher;
pub use scheduler::{DiscoveryScheduler, RegionDiscovery};

use crate::config::DiscoveryConfig;
use crate::models::{Outlet, SeedSource, SeedUrl};
use crate::utils::error::FetchError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Timeouts and pacing for one discovery engine
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Pause after each accepted URL, unless the cap was just reached
    pub accept_delay: Duration,
    pub feed_timeout: Duration,
    pub page_timeout: Duration,
    pub redirect_timeout: Duration,
    pub force_https_feeds: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for DiscoverySettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            accept_delay: config.accept_delay(),
            feed_timeout: config.feed_timeout(),
            page_timeout: config.page_timeout(),
            redirect_timeout: config.redirect_timeout(),
            force_https_feeds: config.force_https_feeds,
        }
    }
}

/// Seeds found for one outlet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutletDiscovery {
    /// Outlet website
    pub outlet: String,
    /// Collection scope of the outlet in per-outlet mode, see [`Outlet::scope_name`]
    pub scope: String,
    /// Feed and scrape seeds, never more than the cap
    pub articles: Vec<SeedUrl>,
    /// The website itself, present whenever `articles` is non-empty
    pub homepage: Option<SeedUrl>,
    /// Failures that were absorbed
    pub warnings: Vec<String>,
}

impl OutletDiscovery {
    fn new(outlet: &Outlet) -> Self {
        Self {
            outlet: outlet.website.clone(),
            scope: outlet.scope_name(),
            ..Default::default()
        }
    }

    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty() && self.homepage.is_none()
    }

    /// All seeds, articles first, website last
    pub fn seeds(&self) -> impl Iterator<Item = &SeedUrl> {
        self.articles.iter().chain(self.homepage.iter())
    }

    pub fn into_seeds(self) -> Vec<SeedUrl> {
        let mut seeds = self.articles;
        seeds.extend(self.homepage);
        seeds
    }
}

/// Per-outlet seed discovery engine
pub struct SeedDiscovery {
    fetcher: Arc<PageFetcher>,
    classifier: Arc<dyn ArticleClassifier>,
    settings: DiscoverySettings,
}

/// Accumulates accepted seeds for one outlet, enforcing the cap
struct Collector<'a> {
    result: OutletDiscovery,
    seen: HashSet<String>,
    cap: usize,
    delay: Duration,
    outlet: &'a str,
}

impl Collector<'_> {
    fn is_full(&self) -> bool {
        self.result.articles.len() >= self.cap
    }

    /// Accept `url` if new; returns true when the cap has been reached
    async fn accept(&mut self, url: String, source: SeedSource) -> bool {
        if self.is_full() || !self.seen.insert(url.clone()) {
            return self.is_full();
        }

        debug!(outlet = self.outlet, url = %url, source = source.as_str(), "Found article");
        self.result
            .articles
            .push(SeedUrl::new(url, source, self.outlet));

        if self.is_full() {
            return true;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        false
    }
}

impl SeedDiscovery {
    pub fn new(
        fetcher: Arc<PageFetcher>,
        classifier: Arc<dyn ArticleClassifier>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            fetcher,
            classifier,
            settings,
        }
    }

    /// Discover up to `max_articles` article seeds for `outlet`, plus its website
    pub async fn discover(&self, outlet: &Outlet, max_articles: usize) -> OutletDiscovery {
        let mut collector = Collector {
            result: OutletDiscovery::new(outlet),
            seen: HashSet::new(),
            cap: max_articles,
            delay: self.settings.accept_delay,
            outlet: &outlet.website,
        };

        if max_articles == 0 {
            return collector.result;
        }

        for feed_url in &outlet.rss {
            if collector.is_full() {
                break;
            }
            if let Err(e) = self.collect_from_feed(feed_url, &mut collector).await {
                warn!(outlet = %outlet.website, feed = %feed_url, error = %e, "Feed failed, skipping");
                collector.result.warnings.push(format!("feed {feed_url}: {e}"));
            }
        }

        if !collector.is_full() {
            if let Err(e) = self.collect_from_homepage(&outlet.website, &mut collector).await {
                warn!(outlet = %outlet.website, error = %e, "Homepage scrape failed");
                collector
                    .result
                    .warnings
                    .push(format!("homepage {}: {e}", outlet.website));
            }
        }

        let mut result = collector.result;
        if result.articles.is_empty() {
            warn!(outlet = %outlet.website, "No valid URLs found");
        } else {
            result.homepage = Some(SeedUrl::new(
                outlet.website.clone(),
                SeedSource::Homepage,
                outlet.website.clone(),
            ));
            info!(
                outlet = %outlet.display_name(),
                articles = result.articles.len(),
                "Outlet discovery finished"
            );
        }

        result
    }

    async fn collect_from_feed(
        &self,
        feed_url: &str,
        collector: &mut Collector<'_>,
    ) -> Result<(), FetchError> {
        let normalized = feed::normalize_feed_url(feed_url, self.settings.force_https_feeds)?;
        debug!(feed = %normalized, "Processing feed");

        let body = self
            .fetcher
            .fetch_bytes(&normalized, self.settings.feed_timeout)
            .await?;

        for link in feed::parse_feed_links(&body)? {
            if !self.classifier.is_likely_article(&link) {
                continue;
            }
            if collector.accept(link, SeedSource::Feed).await {
                break;
            }
        }
        Ok(())
    }

    async fn collect_from_homepage(
        &self,
        website: &str,
        collector: &mut Collector<'_>,
    ) -> Result<(), FetchError> {
        let resolved = self
            .fetcher
            .resolve_redirects(website, self.settings.redirect_timeout)
            .await;
        let base = Url::parse(&resolved)
            .map_err(|e| FetchError::InvalidUrl(format!("{resolved}: {e}")))?;

        debug!(website, base = %base, "Scraping homepage");
        let html = self
            .fetcher
            .fetch_text(base.as_str(), self.settings.page_timeout)
            .await?;

        for link in links::extract_links(&html, &base) {
            if !self.classifier.is_likely_article(&link) {
                continue;
            }
            if collector.accept(link, SeedSource::Scrape).await {
                break;
            }
        }
        Ok(())
    }
}
