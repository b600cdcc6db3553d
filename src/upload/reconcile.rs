//! Delayed gap detection between local artifacts and the remote store
//!
//! For one day: `local - remote` is re-uploaded, `remote - local` is reported
//! for an operator, and the intersection is left alone. Nothing is deleted.
//! When local copies are deleted after upload, remote-only names are the
//! normal state and are reported without warnings.
//! Meant to run some days after capture so in-flight uploads are not taken
//! for gaps.

use super::pool::upload_artifact;
use super::{RemoteStore, UploadMetadata};
use crate::models::{Artifact, DayContext, UploadState};
use crate::utils::error::UploadError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Set differences between local and remote artifact names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub only_local: BTreeSet<String>,
    pub only_remote: BTreeSet<String>,
    pub in_sync: BTreeSet<String>,
}

impl ReconcilePlan {
    pub fn new(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> Self {
        Self {
            only_local: local.difference(remote).cloned().collect(),
            only_remote: remote.difference(local).cloned().collect(),
            in_sync: local.intersection(remote).cloned().collect(),
        }
    }
}

/// Outcome of reconciling one day
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub item_identifier: String,
    pub reuploaded: Vec<String>,
    pub failed: Vec<String>,
    pub remote_only: Vec<String>,
    /// Local copies are removed after upload, so `remote_only` is expected
    pub remote_only_expected: bool,
    pub in_sync: usize,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.failed.is_empty() && (self.remote_only_expected || self.remote_only.is_empty())
    }
}

/// Compares a day's local artifacts with the remote item and fills the gaps
pub struct Reconciler {
    store: Arc<dyn RemoteStore>,
    metadata: UploadMetadata,
    collection_dir: PathBuf,
    extension: String,
    local_copies_deleted: bool,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        metadata: UploadMetadata,
        collection_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            store,
            metadata,
            collection_dir: collection_dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            local_copies_deleted: false,
        }
    }

    /// Local artifacts are deleted after a successful upload
    #[must_use]
    pub fn with_local_deletion(mut self, deleted: bool) -> Self {
        self.local_copies_deleted = deleted;
        self
    }

    fn suffix(&self) -> String {
        format!(".{}", self.extension)
    }

    /// Local artifact names of the day, relative to the item directory (`<DD>/<scope>/<file>`)
    pub async fn local_names(&self, day: &DayContext) -> BTreeSet<String> {
        let item_dir = self.collection_dir.join(&day.item_identifier);
        let suffix = self.suffix();
        let mut names = BTreeSet::new();
        let mut pending = vec![day.local_day_dir(&self.collection_dir)];

        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(kind) if kind.is_dir() => pending.push(path),
                    Ok(kind) if kind.is_file() => {
                        if let Some(name) = relative_name(&item_dir, &path) {
                            if name.ends_with(&suffix) {
                                names.insert(name);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        names
    }

    /// Reconcile one day
    ///
    /// # Errors
    ///
    /// Returns the listing error when the remote item cannot be read; individual
    /// re-upload failures are recorded in the report instead.
    pub async fn reconcile(&self, day: &DayContext) -> Result<ReconcileReport, UploadError> {
        let mut report = ReconcileReport {
            item_identifier: day.item_identifier.clone(),
            remote_only_expected: self.local_copies_deleted,
            ..Default::default()
        };

        let day_dir = day.local_day_dir(&self.collection_dir);
        if tokio::fs::metadata(&day_dir).await.is_err() {
            warn!(dir = %day_dir.display(), "No local directory found, skipping");
            return Ok(report);
        }

        info!(item = %day.item_identifier, day = %day.day(), "Checking remote item");
        let local = self.local_names(day).await;
        let suffix = self.suffix();
        let remote: BTreeSet<String> = self
            .store
            .list_names(&day.item_identifier, &format!("{}/", day.day()))
            .await?
            .into_iter()
            .filter(|name| name.ends_with(&suffix))
            .collect();

        let plan = ReconcilePlan::new(&local, &remote);
        report.in_sync = plan.in_sync.len();

        if plan.only_local.is_empty() {
            info!(item = %day.item_identifier, "All local files exist remotely");
        } else {
            info!(
                item = %day.item_identifier,
                missing = plan.only_local.len(),
                "Found missing uploads, uploading"
            );
        }

        let item_dir = self.collection_dir.join(&day.item_identifier);
        for name in plan.only_local {
            debug!(
                item = %day.item_identifier,
                name = %name,
                state = UploadState::MissingRemotely.as_str(),
                "Re-uploading"
            );
            let artifact = Artifact::new(day.item_identifier.clone(), name.clone(), item_dir.join(&name));
            let record = upload_artifact(self.store.as_ref(), artifact, &self.metadata, false).await;
            if record.is_uploaded() {
                report.reuploaded.push(name);
            } else {
                report.failed.push(name);
            }
        }

        if self.local_copies_deleted {
            debug!(
                item = %day.item_identifier,
                count = plan.only_remote.len(),
                "Remote-only files expected, local copies are deleted after upload"
            );
        } else {
            for name in &plan.only_remote {
                warn!(item = %day.item_identifier, name = %name, "File exists remotely but not locally");
            }
        }
        report.remote_only = plan.only_remote.into_iter().collect();

        info!(
            item = %report.item_identifier,
            reuploaded = report.reuploaded.len(),
            failed = report.failed.len(),
            remote_only = report.remote_only.len(),
            in_sync = report.in_sync,
            "Reconciliation finished"
        );
        Ok(report)
    }
}

/// `path` relative to `base`, with `/` separators
fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan() {
        let local = set(&["03/a/a-1.wacz", "03/b/b-1.wacz"]);
        let remote = set(&["03/b/b-1.wacz", "03/c/c-1.wacz"]);

        let plan = ReconcilePlan::new(&local, &remote);
        assert_eq!(plan.only_local, set(&["03/a/a-1.wacz"]));
        assert_eq!(plan.only_remote, set(&["03/c/c-1.wacz"]));
        assert_eq!(plan.in_sync, set(&["03/b/b-1.wacz"]));
    }

    #[test]
    fn test_relative_name() {
        let name = relative_name(
            Path::new("/data/news-20250603"),
            Path::new("/data/news-20250603/03/ohio/x.wacz"),
        );
        assert_eq!(name.as_deref(), Some("03/ohio/x.wacz"));
        assert_eq!(relative_name(Path::new("/a"), Path::new("/b/c")), None);
    }

    proptest! {
        #[test]
        fn prop_plan_partitions_both_sets(
            local in proptest::collection::btree_set("[a-d]{1,2}", 0..12),
            remote in proptest::collection::btree_set("[a-d]{1,2}", 0..12),
        ) {
            let plan = ReconcilePlan::new(&local, &remote);

            for name in &plan.only_local {
                prop_assert!(local.contains(name) && !remote.contains(name));
            }
            for name in &plan.only_remote {
                prop_assert!(remote.contains(name) && !local.contains(name));
            }
            prop_assert_eq!(plan.only_local.len() + plan.in_sync.len(), local.len());
            prop_assert_eq!(plan.only_remote.len() + plan.in_sync.len(), remote.len());
        }
    }
}
