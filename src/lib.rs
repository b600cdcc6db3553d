//! newsvault - daily web-archive capture of regional news outlets
//!
//! Once per UTC day, every region of an outlet catalog goes through the same
//! pipeline: seed URLs are discovered from feeds and homepages, handed to an
//! external capture engine, the resulting archive files are moved into a
//! durable collection layout and uploaded to a remote store in the background.
//! A separate reconciliation pass re-uploads whatever the remote store is
//! missing.
//!
//! # Architecture
//!
//! - [`catalog`] - Outlet catalog loading and the reachability probe
//! - [`discovery`] - Per-outlet seed discovery and region fan-out
//! - [`capture`] - Capture engine dispatch and artifact relocation
//! - [`upload`] - Remote store, background upload pool, reconciliation
//! - [`runner`] - The daily run loop and its persisted state
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and naming rules
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use newsvault::config::Config;
//! use newsvault::runner::{ArchivePipeline, DailyRunner, RunStateStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let pipeline = ArchivePipeline::from_config(&config)?;
//!     let runner = DailyRunner::new(
//!         pipeline,
//!         RunStateStore::new(&config.paths.state_file),
//!         config.schedule.clone(),
//!         config.upload.collection.clone(),
//!     );
//!     runner.run().await;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod runner;
pub mod upload;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capture::{ArtifactRelocator, CaptureDispatcher};
    pub use crate::catalog::Catalog;
    pub use crate::config::Config;
    pub use crate::discovery::{DiscoveryScheduler, SeedDiscovery};
    pub use crate::error::{ArchiverErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{Artifact, Batch, DayContext, Outlet, Region, SeedUrl};
    pub use crate::runner::{ArchivePipeline, DailyRunner, RunStateStore};
    pub use crate::upload::{InternetArchiveStore, Reconciler, RemoteStore, UploadPool};
}

// Direct re-exports for convenience
pub use models::{Artifact, Batch, Outlet, Region, SeedUrl};
