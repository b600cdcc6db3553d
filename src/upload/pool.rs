//! Process-wide background upload pool
//!
//! Relocated artifacts are submitted as soon as they exist so the next capture
//! does not wait on upload latency. Concurrency is bounded by a semaphore and
//! every task handle is kept until [`UploadPool::join_all`] drains them; the
//! daily run loop joins before it marks a day complete.

use super::{RemoteStore, UploadMetadata};
use crate::models::{Artifact, UploadRecord, UploadState};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Results of the tasks drained by one [`UploadPool::join_all`]
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub records: Vec<UploadRecord>,
    /// Tasks that panicked or were cancelled
    pub aborted: usize,
}

impl UploadSummary {
    pub fn uploaded(&self) -> usize {
        self.records.iter().filter(|r| r.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.uploaded() + self.aborted
    }
}

/// Upload one artifact, deleting the local copy only after a successful upload
pub async fn upload_artifact(
    store: &dyn RemoteStore,
    artifact: Artifact,
    metadata: &UploadMetadata,
    delete_after_upload: bool,
) -> UploadRecord {
    let mut record = UploadRecord::pending(artifact);
    let artifact = &record.artifact;

    match store
        .upload(
            &artifact.item_identifier,
            &artifact.remote_name,
            &artifact.local_path,
            metadata,
        )
        .await
    {
        Ok(()) => {
            record.state = UploadState::Uploaded;
            if delete_after_upload {
                match tokio::fs::remove_file(&record.artifact.local_path).await {
                    Ok(()) => {
                        debug!(path = %record.artifact.local_path.display(), "Deleted uploaded artifact");
                        record.deleted_locally = true;
                    }
                    Err(e) => warn!(
                        path = %record.artifact.local_path.display(),
                        error = %e,
                        "Failed to delete uploaded artifact"
                    ),
                }
            }
        }
        Err(e) => {
            error!(
                item = %artifact.item_identifier,
                name = %artifact.remote_name,
                error = %e,
                "Error uploading artifact, keeping local copy"
            );
            record.error = Some(e.to_string());
        }
    }

    record
}

/// Bounded background uploader shared by the whole process
pub struct UploadPool {
    store: Arc<dyn RemoteStore>,
    metadata: Arc<UploadMetadata>,
    semaphore: Arc<Semaphore>,
    delete_after_upload: bool,
    handles: Mutex<Vec<JoinHandle<UploadRecord>>>,
}

impl UploadPool {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        metadata: UploadMetadata,
        workers: usize,
        delete_after_upload: bool,
    ) -> Self {
        Self {
            store,
            metadata: Arc::new(metadata),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            delete_after_upload,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start a background upload; returns immediately
    pub fn submit(&self, artifact: Artifact) {
        let store = Arc::clone(&self.store);
        let metadata = Arc::clone(&self.metadata);
        let semaphore = Arc::clone(&self.semaphore);
        let delete = self.delete_after_upload;

        debug!(name = %artifact.remote_name, "Queueing upload");
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            upload_artifact(store.as_ref(), artifact, &metadata, delete).await
        });

        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Tasks submitted and not yet joined
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wait for every submitted task
    pub async fn join_all(&self) -> UploadSummary {
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return UploadSummary::default();
        }

        info!(tasks = handles.len(), "Waiting for background uploads");
        let mut summary = UploadSummary::default();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(record) => summary.records.push(record),
                Err(e) => {
                    error!(error = %e, "Upload task aborted");
                    summary.aborted += 1;
                }
            }
        }

        info!(
            uploaded = summary.uploaded(),
            failed = summary.failed(),
            "Background uploads joined"
        );
        summary
    }
}
