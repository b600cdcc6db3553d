//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use newsvault::capture::{CaptureDispatcher, CommandTemplate, TimeBudget};
use newsvault::discovery::{DiscoverySettings, HeuristicClassifier, PageFetcher, SeedDiscovery};
use newsvault::error::UploadError;
use newsvault::models::{Batch, DayContext, Region, SeedSource, SeedUrl};
use newsvault::upload::{RemoteStore, UploadMetadata};
use newsvault::utils::retry::RetryConfig;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed capture time used across tests: 2025-06-03T01:02:03Z
pub fn capture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 3, 1, 2, 3).unwrap()
}

pub fn test_day() -> DayContext {
    DayContext::new("news", capture_time().date_naive())
}

/// RSS 2.0 document with one item per link
pub fn rss_feed(links: &[String]) -> String {
    let items: String = links
        .iter()
        .enumerate()
        .map(|(i, link)| format!("<item><title>Story {i}</title><link>{link}</link></item>"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test feed</title><link>http://example.com</link><description>t</description>{items}</channel></rss>"#
    )
}

/// HTML page linking to every given href
pub fn html_page(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!("<a href=\"{href}\">link</a>\n"))
        .collect();
    format!("<!DOCTYPE html><html><head><title>Home</title></head><body>{anchors}</body></html>")
}

/// Article-looking URLs under `base`, distinct per `tag`
pub fn article_urls(base: &str, tag: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{base}/2025/06/03/{tag}-story-number-{i}"))
        .collect()
}

/// Discovery settings without pacing, for plain-http mock servers
pub fn fast_settings() -> DiscoverySettings {
    DiscoverySettings {
        accept_delay: Duration::ZERO,
        feed_timeout: Duration::from_secs(5),
        page_timeout: Duration::from_secs(5),
        redirect_timeout: Duration::from_secs(5),
        force_https_feeds: false,
    }
}

pub fn seed_discovery() -> Arc<SeedDiscovery> {
    let fetcher = PageFetcher::with_config(100, RetryConfig::with_delays(0, 1, 1)).unwrap();
    Arc::new(SeedDiscovery::new(
        Arc::new(fetcher),
        Arc::new(HeuristicClassifier::default()),
        fast_settings(),
    ))
}

pub fn batch(region: &str, urls: &[&str]) -> Batch {
    let seeds = urls
        .iter()
        .map(|url| SeedUrl::new(*url, SeedSource::Feed, "https://outlet.example"))
        .collect();
    Batch::new(&test_day(), &Region::new(region), None, capture_time(), seeds)
}

/// `/bin/sh` stand-in for the capture engine that packages the seed file as the artifact
pub const SUCCEEDING_ENGINE: &str =
    r#"mkdir -p "$1/collections/$2" && cp "$3" "$1/collections/$2/$2.wacz""#;

/// `/bin/sh` stand-in for a capture engine that crashes
pub const FAILING_ENGINE: &str = r#"echo "crawler crashed" >&2; exit 3"#;

pub fn shell_dispatcher(scratch: &Path, script: &str) -> CaptureDispatcher {
    let args = ["-c", script, "engine", "{scratch_dir}", "{collection}", "{seed_file}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    CaptureDispatcher::new(
        scratch,
        CommandTemplate::new("/bin/sh", args),
        TimeBudget::Fixed(30),
        1,
    )
}

pub fn metadata() -> UploadMetadata {
    UploadMetadata {
        collection: "test-collection".to_string(),
        uploader: "tester@example.com".to_string(),
        mediatype: "web".to_string(),
    }
}

/// In-memory remote store
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeSet<(String, String)>>,
    derived: Mutex<Vec<String>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, item: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert((item.to_string(), name.to_string()));
    }

    pub fn names(&self, item: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == item)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn derived(&self) -> Vec<String> {
        self.derived.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn upload(
        &self,
        item_identifier: &str,
        remote_name: &str,
        local_path: &Path,
        _metadata: &UploadMetadata,
    ) -> Result<(), UploadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UploadError::Status {
                status: 503,
                body: "slow down".to_string(),
            });
        }
        tokio::fs::metadata(local_path)
            .await
            .map_err(|source| UploadError::Io {
                path: local_path.to_path_buf(),
                source,
            })?;
        self.insert(item_identifier, remote_name);
        Ok(())
    }

    async fn list_names(
        &self,
        item_identifier: &str,
        prefix: &str,
    ) -> Result<BTreeSet<String>, UploadError> {
        Ok(self
            .names(item_identifier)
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    async fn submit_derive(&self, item_identifier: &str) -> Result<(), UploadError> {
        self.derived.lock().unwrap().push(item_identifier.to_string());
        Ok(())
    }
}
