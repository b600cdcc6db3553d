//! Configuration management for newsvault
//!
//! This module handles loading and validating configuration from a TOML file,
//! environment variables and command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed discovery configuration
    pub discovery: DiscoveryConfig,

    /// Capture engine configuration
    pub capture: CaptureConfig,

    /// Remote store and upload configuration
    pub upload: UploadConfig,

    /// File system layout
    pub paths: PathsConfig,

    /// Daily run loop cadence
    pub schedule: ScheduleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Seed discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum article seeds per outlet
    pub max_articles: usize,

    /// Concurrent outlet discoveries per region
    pub workers: usize,

    /// Pause after each accepted article URL, in milliseconds
    pub accept_delay_ms: u64,

    /// Feed fetch timeout in seconds
    pub feed_timeout_secs: u64,

    /// Homepage fetch timeout in seconds
    pub page_timeout_secs: u64,

    /// Redirect resolution (HEAD) timeout in seconds
    pub redirect_timeout_secs: u64,

    /// Retries for 429/5xx answers
    pub max_retries: u32,

    /// Base delay for retry backoff, in milliseconds
    pub retry_base_delay_ms: u64,

    /// Global request rate limit (requests per second)
    pub requests_per_second: u32,

    /// Rewrite feed URLs to https before fetching
    pub force_https_feeds: bool,

    /// Capture each outlet as its own batch instead of one batch per region
    pub per_outlet: bool,
}

/// Capture engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Engine executable
    pub program: String,

    /// Argument template; see [`crate::capture::CommandTemplate`] for placeholders
    pub args: Vec<String>,

    /// Absolute time budget in seconds; overrides the per-URL budget when set
    pub time_limit_secs: Option<u64>,

    /// Seconds of capture time granted per seed URL
    pub per_url_budget_secs: u64,

    /// Engine-internal worker count
    pub workers: usize,

    /// Artifact file extension
    pub artifact_extension: String,
}

/// Remote store and upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload artifacts after capture
    pub enabled: bool,

    /// Remove local artifacts after a confirmed upload
    pub delete_after_upload: bool,

    /// Concurrent uploads (process-wide)
    pub workers: usize,

    /// Collection name, also the item identifier prefix
    pub collection: String,

    /// Uploader identity stored in item metadata
    pub uploader: String,

    /// Media type stored in item metadata
    pub mediatype: String,

    /// S3-like access key
    pub access_key: Option<String>,

    /// S3-like secret key
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,

    /// Upload endpoint
    pub s3_endpoint: String,

    /// Metadata and task API endpoint
    pub api_endpoint: String,

    /// Retries per upload
    pub max_retries: u32,

    /// Submit a derive task after each completed day
    pub derive: bool,

    /// Default age in days of the day checked by `reconcile`
    pub reconcile_days_back: u32,
}

/// File system layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Outlet catalog (JSON)
    pub catalog: PathBuf,

    /// Scratch workspace mounted into the capture engine
    pub scratch_dir: PathBuf,

    /// Durable collection root
    pub collection_dir: PathBuf,

    /// Run-state file
    pub state_file: PathBuf,
}

/// Daily run loop cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Idle sleep between checks when not in once-per-day mode, in seconds
    pub sleep_secs: u64,

    /// Sleep until the next UTC midnight after a completed day
    pub once_per_day: bool,

    /// First region index (inclusive)
    pub start: usize,

    /// Last region index (exclusive); `None` means all remaining regions
    pub end: Option<usize>,

    /// Delay before retrying a failed cycle, in seconds
    pub retry_delay_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Optional log file, written in addition to the console
    pub file: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_articles: 5,
            workers: 20,
            accept_delay_ms: 5000,
            feed_timeout_secs: 10,
            page_timeout_secs: 10,
            redirect_timeout_secs: 5,
            max_retries: 1,
            retry_base_delay_ms: 500,
            requests_per_second: 20,
            force_https_feeds: true,
            per_outlet: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: String::from("docker"),
            args: [
                "run",
                "--rm",
                "-v",
                "{scratch_dir}:/crawls/",
                "webrecorder/browsertrix-crawler",
                "crawl",
                "--urlFile",
                "/crawls/{seed_file_name}",
                "--generateWACZ",
                "--collection",
                "{collection}",
                "--timeLimit",
                "{time_limit}",
                "--workers",
                "{workers}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            time_limit_secs: None,
            per_url_budget_secs: 30,
            workers: 4,
            artifact_extension: String::from("wacz"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delete_after_upload: false,
            workers: 5,
            collection: String::from("local-news-archive"),
            uploader: format!("newsvault/{}", env!("CARGO_PKG_VERSION")),
            mediatype: String::from("web"),
            access_key: None,
            secret_key: None,
            s3_endpoint: String::from("https://s3.us.archive.org"),
            api_endpoint: String::from("https://archive.org"),
            max_retries: 2,
            derive: true,
            reconcile_days_back: 7,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("output.json"),
            scratch_dir: PathBuf::from("tmp"),
            collection_dir: PathBuf::from("collection"),
            state_file: PathBuf::from("collection/.newsvault-state.json"),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sleep_secs: 3600,
            once_per_day: false,
            start: 0,
            end: None,
            retry_delay_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
            file: None,
        }
    }
}

impl Config {
    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Credentials are read from `IA_ACCESS_KEY` / `IA_SECRET_KEY`, logging from
    /// `NEWSVAULT_LOG_LEVEL` / `NEWSVAULT_LOG_FORMAT`.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("IA_ACCESS_KEY") {
            self.upload.access_key = Some(key);
        }
        if let Ok(secret) = std::env::var("IA_SECRET_KEY") {
            self.upload.secret_key = Some(secret);
        }
        if let Ok(level) = std::env::var("NEWSVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("NEWSVAULT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.discovery.max_articles == 0 {
            anyhow::bail!("max_articles must be greater than 0");
        }

        if self.discovery.workers == 0 {
            anyhow::bail!("discovery workers must be greater than 0");
        }

        if self.upload.workers == 0 {
            anyhow::bail!("upload workers must be greater than 0");
        }

        if self.capture.workers == 0 {
            anyhow::bail!("capture workers must be greater than 0");
        }

        if self.capture.program.trim().is_empty() {
            anyhow::bail!("capture program must not be empty");
        }

        if self.capture.time_limit_secs.is_none() && self.capture.per_url_budget_secs == 0 {
            anyhow::bail!("either time_limit_secs or a positive per_url_budget_secs is required");
        }

        if let Some(end) = self.schedule.end {
            if end < self.schedule.start {
                anyhow::bail!(
                    "region window end ({end}) must not be before start ({})",
                    self.schedule.start
                );
            }
        }

        if self.upload.enabled && !self.has_credentials() {
            anyhow::bail!("upload is enabled but IA_ACCESS_KEY / IA_SECRET_KEY are not set");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Whether both remote store credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.upload.access_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.upload.secret_key.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn accept_delay(&self) -> Duration {
        Duration::from_millis(self.accept_delay_ms)
    }

    #[must_use]
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    #[must_use]
    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }
}

impl ScheduleConfig {
    #[must_use]
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_discovery_values() {
        let config = Config::default();
        assert_eq!(config.discovery.max_articles, 5);
        assert_eq!(config.discovery.workers, 20);
        assert_eq!(config.upload.workers, 5);
        assert_eq!(config.upload.mediatype, "web");
        assert_eq!(config.discovery.redirect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_workers() {
        let mut config = Config::default();
        config.discovery.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upload.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_region_window() {
        let mut config = Config::default();
        config.schedule.start = 5;
        config.schedule.end = Some(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_requires_credentials() {
        let mut config = Config::default();
        config.upload.enabled = true;
        assert!(config.validate().is_err());

        config.upload.access_key = Some("key".into());
        config.upload.secret_key = Some("secret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[discovery]
max_articles = 8

[upload]
collection = "test-collection"

[paths]
catalog = "catalog.json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.discovery.max_articles, 8);
        assert_eq!(config.discovery.workers, 20);
        assert_eq!(config.upload.collection, "test-collection");
        assert_eq!(config.paths.catalog, PathBuf::from("catalog.json"));
        assert_eq!(config.capture.program, "docker");
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/newsvault.toml"));
        assert!(result.is_err());
    }
}
