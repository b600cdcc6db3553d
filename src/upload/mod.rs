//! Remote store access and upload reconciliation
//!
//! Two paths move artifacts to the remote store:
//!
//! - [`pool::UploadPool`]: immediate, background uploads right after relocation
//! - [`reconcile::Reconciler`]: delayed gap detection between the local day
//!   directory and the remote listing
//!
//! Both talk to the store through the [`RemoteStore`] trait.

pub mod archive_org;
pub mod pool;
pub mod reconcile;

pub use archive_org::InternetArchiveStore;
pub use pool::{UploadPool, UploadSummary};
pub use reconcile::{ReconcileReport, Reconciler};

use crate::config::UploadConfig;
use crate::utils::error::UploadError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

/// Item metadata sent with every upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub collection: String,
    pub uploader: String,
    pub mediatype: String,
}

impl From<&UploadConfig> for UploadMetadata {
    fn from(config: &UploadConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            uploader: config.uploader.clone(),
            mediatype: config.mediatype.clone(),
        }
    }
}

/// Durable remote object store
///
/// Objects live under an item identifier and are addressed by a relative name
/// such as `03/ohio/ohio-20250603T010203.wacz`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload one local file as `remote_name` inside `item_identifier`
    async fn upload(
        &self,
        item_identifier: &str,
        remote_name: &str,
        local_path: &Path,
        metadata: &UploadMetadata,
    ) -> Result<(), UploadError>;

    /// Names of objects in the item starting with `prefix`
    async fn list_names(
        &self,
        item_identifier: &str,
        prefix: &str,
    ) -> Result<BTreeSet<String>, UploadError>;

    /// Queue post-processing of the item (best effort)
    async fn submit_derive(&self, item_identifier: &str) -> Result<(), UploadError>;
}
