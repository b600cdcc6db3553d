// Core data structures for the newsvault pipeline

use crate::utils::{cleaned_hostname, slugify};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use url::Url;

/// HTTP status codes treated as "reachable": the half-open interval [200, 400)
pub const REACHABLE_STATUS: Range<u16> = 200..400;

/// Whether an outlet with the given last observed status is eligible for discovery
///
/// Unknown status (`None`) is never reachable.
pub fn is_reachable(status: Option<u16>) -> bool {
    status.is_some_and(|code| REACHABLE_STATUS.contains(&code))
}

/// One news source tracked in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outlet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub website: String,
    #[serde(default)]
    pub rss: Vec<String>,
    #[serde(default)]
    pub website_status_code: Option<u16>,
}

impl Outlet {
    /// Create an outlet with no feeds and unknown reachability
    pub fn new(website: impl Into<String>) -> Self {
        Self {
            name: None,
            website: website.into(),
            rss: Vec::new(),
            website_status_code: None,
        }
    }

    pub fn with_feeds(mut self, feeds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.rss = feeds.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.website_status_code = Some(status);
        self
    }

    pub fn is_reachable(&self) -> bool {
        is_reachable(self.website_status_code)
    }

    /// Host used in collection paths (`www.` stripped, dots replaced by dashes)
    pub fn cleaned_host(&self) -> String {
        cleaned_hostname(&self.website).unwrap_or_else(|| slugify(&self.website))
    }

    /// Per-outlet batch scope: the cleaned host, followed by the website path when it has one
    ///
    /// `https://patch.com/virginia/arlington/` becomes `patch-com-virginia-arlington`, so
    /// outlets sharing a host keep separate collection directories.
    pub fn scope_name(&self) -> String {
        let host = self.cleaned_host();
        let path = Url::parse(&self.website)
            .map(|url| slugify(url.path()))
            .unwrap_or_default();
        if path.is_empty() {
            host
        } else {
            format!("{host}-{path}")
        }
    }

    /// Name for log output
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.website)
    }
}

/// Media category partitioning the outlets of a region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Newspaper,
    Tv,
    Radio,
    Broadcast,
    Other(String),
}

impl MediaCategory {
    /// Parse a catalog key; unknown keys are kept verbatim
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "newspaper" => Self::Newspaper,
            "tv" => Self::Tv,
            "radio" => Self::Radio,
            "broadcast" => Self::Broadcast,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Newspaper => "newspaper",
            Self::Tv => "tv",
            Self::Radio => "radio",
            Self::Broadcast => "broadcast",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outlets of one media category within a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaGroup {
    pub category: MediaCategory,
    pub outlets: Vec<Outlet>,
}

/// A named grouping of outlets, processed as one batch per day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub groups: Vec<MediaGroup>,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, category: MediaCategory, outlets: Vec<Outlet>) -> Self {
        self.groups.push(MediaGroup { category, outlets });
        self
    }

    /// Outlets eligible for discovery, in catalog order
    pub fn reachable_outlets(&self) -> Vec<&Outlet> {
        self.groups
            .iter()
            .flat_map(|group| group.outlets.iter())
            .filter(|outlet| outlet.is_reachable())
            .collect()
    }

    pub fn outlet_count(&self) -> usize {
        self.groups.iter().map(|group| group.outlets.len()).sum()
    }

    /// Region name as a path and file name segment
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// How a seed URL was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedSource {
    Feed,
    Scrape,
    /// The outlet's own website, appended after discovery
    Homepage,
}

impl SeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Scrape => "scrape",
            Self::Homepage => "homepage",
        }
    }
}

/// A URL designated for capture, with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUrl {
    pub url: String,
    pub source: SeedSource,
    /// Website of the owning outlet
    pub outlet: String,
}

impl SeedUrl {
    pub fn new(url: impl Into<String>, source: SeedSource, outlet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source,
            outlet: outlet.into(),
        }
    }
}

/// Item identifier shared by every batch of one UTC day: `<collection>-<YYYYMMDD>`
pub fn day_identifier(collection: &str, date: NaiveDate) -> String {
    format!("{collection}-{}", date.format("%Y%m%d"))
}

/// Day-of-month path segment used under the item identifier
pub fn day_segment(date: NaiveDate) -> String {
    date.format("%d").to_string()
}

/// Naming context computed once per daily cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayContext {
    pub date: NaiveDate,
    pub item_identifier: String,
}

impl DayContext {
    pub fn new(collection: &str, date: NaiveDate) -> Self {
        Self {
            date,
            item_identifier: day_identifier(collection, date),
        }
    }

    pub fn day(&self) -> String {
        day_segment(self.date)
    }

    /// Local directory holding every artifact of this day
    pub fn local_day_dir(&self, collection_dir: &Path) -> PathBuf {
        collection_dir.join(&self.item_identifier).join(self.day())
    }
}

/// One seed set handed to the capture engine
///
/// Names are computed once in [`Batch::new`] and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub region: String,
    /// `<outletHost>` path segment: region slug, or the outlet scope in per-outlet mode
    pub scope: String,
    pub item_identifier: String,
    pub archive_name: String,
    pub day: String,
    pub timestamp: DateTime<Utc>,
    pub seeds: Vec<SeedUrl>,
}

impl Batch {
    /// Build a batch for a region, or for a single outlet of it when `outlet_scope` is set
    ///
    /// Outlet scopes must be unique within the region.
    pub fn new(
        day: &DayContext,
        region: &Region,
        outlet_scope: Option<&str>,
        timestamp: DateTime<Utc>,
        seeds: Vec<SeedUrl>,
    ) -> Self {
        let region_slug = region.slug();
        let stamp = timestamp.format("%Y%m%dT%H%M%S");
        let (scope, archive_name) = match outlet_scope {
            Some(scope) => (scope.to_string(), format!("{region_slug}-{scope}-{stamp}")),
            None => (region_slug.clone(), format!("{region_slug}-{stamp}")),
        };

        Self {
            region: region.name.clone(),
            scope,
            item_identifier: day.item_identifier.clone(),
            archive_name,
            day: day.day(),
            timestamp,
            seeds,
        }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn seed_urls(&self) -> impl Iterator<Item = &str> {
        self.seeds.iter().map(|seed| seed.url.as_str())
    }

    /// Durable directory: `<collectionDir>/<itemIdentifier>/<day>/<scope>`
    pub fn durable_dir(&self, collection_dir: &Path) -> PathBuf {
        collection_dir
            .join(&self.item_identifier)
            .join(&self.day)
            .join(&self.scope)
    }

    /// Remote object name for an artifact file of this batch
    pub fn remote_name(&self, file_name: &str) -> String {
        format!("{}/{}/{}", self.day, self.scope, file_name)
    }
}

/// A captured archive file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub item_identifier: String,
    /// Object name under the item, `<day>/<scope>/<file>`
    pub remote_name: String,
    pub local_path: PathBuf,
}

impl Artifact {
    pub fn new(
        item_identifier: impl Into<String>,
        remote_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            item_identifier: item_identifier.into(),
            remote_name: remote_name.into(),
            local_path: local_path.into(),
        }
    }
}

/// Reconciliation state of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Uploaded,
    MissingRemotely,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::MissingRemotely => "missing_remotely",
        }
    }
}

/// Outcome of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub artifact: Artifact,
    pub state: UploadState,
    /// Whether the local copy was removed after a confirmed upload
    pub deleted_locally: bool,
    pub error: Option<String>,
}

impl UploadRecord {
    pub fn pending(artifact: Artifact) -> Self {
        Self {
            artifact,
            state: UploadState::Pending,
            deleted_locally: false,
            error: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.state == UploadState::Uploaded
    }
}
