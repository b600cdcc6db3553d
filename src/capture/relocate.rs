//! Moves captured artifacts from the scratch workspace to the durable layout

use super::seed_file_path;
use crate::models::{Artifact, Batch};
use crate::utils::error::CaptureError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of relocating one batch
#[derive(Debug, Clone, Default)]
pub struct RelocationReport {
    pub artifacts: Vec<Artifact>,
    /// Artifacts that were found but could not be moved; they stay in scratch
    pub failed_moves: Vec<PathBuf>,
}

impl RelocationReport {
    /// Whether the scratch entry may be removed without losing data
    pub fn is_clean(&self) -> bool {
        self.failed_moves.is_empty()
    }
}

/// Relocates artifacts named after a batch into `<collectionDir>/<item>/<day>/<scope>/`
pub struct ArtifactRelocator {
    scratch_dir: PathBuf,
    collection_dir: PathBuf,
    extension: String,
}

impl ArtifactRelocator {
    pub fn new(
        scratch_dir: impl Into<PathBuf>,
        collection_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            collection_dir: collection_dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// `<scratch>/collections/<archiveName>`
    pub fn engine_output_dir(&self, batch: &Batch) -> PathBuf {
        self.scratch_dir.join("collections").join(&batch.archive_name)
    }

    /// Where the engine deposits the single artifact of a batch
    pub fn expected_artifact(&self, batch: &Batch) -> PathBuf {
        self.engine_output_dir(batch)
            .join(format!("{}.{}", batch.archive_name, self.extension))
    }

    /// Move the batch's artifact(s) into the durable layout
    ///
    /// The expected artifact path is used when it exists; otherwise every file
    /// with the artifact extension under the engine output directory is taken
    /// (multi-part output). Finding nothing is a warning, not an error.
    pub async fn relocate(&self, batch: &Batch) -> RelocationReport {
        let mut report = RelocationReport::default();

        let expected = self.expected_artifact(batch);
        let sources = if tokio::fs::metadata(&expected).await.is_ok() {
            vec![expected]
        } else {
            self.find_by_extension(&self.engine_output_dir(batch)).await
        };

        if sources.is_empty() {
            warn!(
                batch = %batch.archive_name,
                dir = %self.engine_output_dir(batch).display(),
                "No artifact found for batch"
            );
            return report;
        }

        let dest_dir = batch.durable_dir(&self.collection_dir);
        if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
            warn!(dir = %dest_dir.display(), error = %e, "Cannot create collection directory");
            report.failed_moves = sources;
            return report;
        }

        for source in sources {
            let Some(file_name) = source.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let dest = dest_dir.join(&file_name);

            match move_file(&source, &dest).await {
                Ok(()) => {
                    info!(from = %source.display(), to = %dest.display(), "Moved artifact");
                    report.artifacts.push(Artifact::new(
                        batch.item_identifier.clone(),
                        batch.remote_name(&file_name),
                        dest,
                    ));
                }
                Err(e) => {
                    warn!(from = %source.display(), error = %e, "Error moving artifact");
                    report.failed_moves.push(source);
                }
            }
        }

        report
    }

    /// Remove the batch's seed file and engine output directory
    ///
    /// Failures are logged, never returned.
    pub async fn cleanup(&self, batch: &Batch) {
        let dir = self.engine_output_dir(batch);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(dir = %dir.display(), "Deleted engine output directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Engine output directory not found")
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to delete engine output"),
        }

        let seed_file = seed_file_path(&self.scratch_dir, batch);
        match tokio::fs::remove_file(&seed_file).await {
            Ok(()) => debug!(file = %seed_file.display(), "Deleted seed file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %seed_file.display(), "Seed file not found")
            }
            Err(e) => warn!(file = %seed_file.display(), error = %e, "Failed to delete seed file"),
        }
    }

    async fn find_by_extension(&self, root: &Path) -> Vec<PathBuf> {
        let suffix = format!(".{}", self.extension);
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(kind) if kind.is_dir() => pending.push(path),
                    Ok(kind) if kind.is_file() => {
                        if path.to_string_lossy().ends_with(&suffix) {
                            found.push(path);
                        }
                    }
                    _ => {}
                }
            }
        }

        found.sort();
        found
    }
}

/// Rename, falling back to copy + remove across file systems
async fn move_file(from: &Path, to: &Path) -> Result<(), CaptureError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    tokio::fs::copy(from, to)
        .await
        .map_err(|e| CaptureError::io("copy artifact", e))?;
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| CaptureError::io("remove relocated artifact", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayContext, Region, SeedSource, SeedUrl};
    use chrono::{TimeZone, Utc};

    fn batch() -> Batch {
        let ts = Utc.with_ymd_and_hms(2025, 6, 3, 1, 2, 3).unwrap();
        let day = DayContext::new("news", ts.date_naive());
        Batch::new(
            &day,
            &Region::new("Ohio"),
            None,
            ts,
            vec![SeedUrl::new("https://a.com", SeedSource::Homepage, "https://a.com")],
        )
    }

    #[tokio::test]
    async fn test_relocate_expected_artifact() {
        let scratch = tempfile::tempdir().unwrap();
        let collection = tempfile::tempdir().unwrap();
        let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
        let batch = batch();

        let expected = relocator.expected_artifact(&batch);
        std::fs::create_dir_all(expected.parent().unwrap()).unwrap();
        std::fs::write(&expected, b"archive").unwrap();

        let report = relocator.relocate(&batch).await;
        assert!(report.is_clean());
        assert_eq!(report.artifacts.len(), 1);

        let artifact = &report.artifacts[0];
        assert_eq!(artifact.item_identifier, "news-20250603");
        assert_eq!(artifact.remote_name, "03/ohio/ohio-20250603T010203.wacz");
        assert_eq!(
            artifact.local_path,
            collection
                .path()
                .join("news-20250603/03/ohio/ohio-20250603T010203.wacz")
        );
        assert!(artifact.local_path.exists());
        assert!(!expected.exists());
    }

    #[tokio::test]
    async fn test_relocate_multi_part_fallback() {
        let scratch = tempfile::tempdir().unwrap();
        let collection = tempfile::tempdir().unwrap();
        let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
        let batch = batch();

        let out = relocator.engine_output_dir(&batch);
        std::fs::create_dir_all(out.join("parts")).unwrap();
        std::fs::write(out.join("parts/part-1.wacz"), b"1").unwrap();
        std::fs::write(out.join("parts/part-2.wacz"), b"2").unwrap();
        std::fs::write(out.join("crawl.log"), b"log").unwrap();

        let report = relocator.relocate(&batch).await;
        let names: Vec<_> = report
            .artifacts
            .iter()
            .map(|a| a.remote_name.as_str())
            .collect();
        assert_eq!(names, vec!["03/ohio/part-1.wacz", "03/ohio/part-2.wacz"]);
    }

    #[tokio::test]
    async fn test_relocate_nothing_found() {
        let scratch = tempfile::tempdir().unwrap();
        let collection = tempfile::tempdir().unwrap();
        let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), ".wacz");

        let report = relocator.relocate(&batch()).await;
        assert!(report.artifacts.is_empty());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_entries() {
        let scratch = tempfile::tempdir().unwrap();
        let collection = tempfile::tempdir().unwrap();
        let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
        let batch = batch();

        let out = relocator.engine_output_dir(&batch);
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(seed_file_path(scratch.path(), &batch), "https://a.com\n").unwrap();

        relocator.cleanup(&batch).await;
        assert!(!out.exists());
        assert!(!seed_file_path(scratch.path(), &batch).exists());

        relocator.cleanup(&batch).await;
    }
}
