//! Capture dispatch and relocation with a shell script standing in for the engine

#![cfg(unix)]

mod common;

use common::{batch, shell_dispatcher, FAILING_ENGINE, SUCCEEDING_ENGINE};
use newsvault::capture::{ArtifactRelocator, CaptureDispatcher, CommandTemplate, TimeBudget};
use newsvault::error::CaptureError;

#[tokio::test]
async fn test_successful_capture_is_relocated() {
    let scratch = tempfile::tempdir().unwrap();
    let collection = tempfile::tempdir().unwrap();
    let batch = batch("Ohio", &["https://a.example/one", "https://a.example/two"]);

    let dispatcher = shell_dispatcher(scratch.path(), SUCCEEDING_ENGINE);
    let report = dispatcher.dispatch(&batch).await.unwrap();
    assert_eq!(report.time_limit, 30);
    assert!(report.seed_file.ends_with("ohio-20250603T010203.txt"));

    let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
    let relocated = relocator.relocate(&batch).await;
    assert!(relocated.is_clean());
    assert_eq!(relocated.artifacts.len(), 1);

    let artifact = &relocated.artifacts[0];
    assert_eq!(artifact.item_identifier, "news-20250603");
    assert_eq!(artifact.remote_name, "03/ohio/ohio-20250603T010203.wacz");
    assert_eq!(
        artifact.local_path,
        collection
            .path()
            .join("news-20250603/03/ohio/ohio-20250603T010203.wacz")
    );

    // the stand-in engine packaged the seed file, one URL per line
    let contents = std::fs::read_to_string(&artifact.local_path).unwrap();
    assert_eq!(contents, "https://a.example/one\nhttps://a.example/two\n");

    relocator.cleanup(&batch).await;
    assert!(!scratch.path().join("ohio-20250603T010203.txt").exists());
    assert!(!scratch
        .path()
        .join("collections/ohio-20250603T010203")
        .exists());
}

#[tokio::test]
async fn test_engine_failure_yields_no_artifacts() {
    let scratch = tempfile::tempdir().unwrap();
    let collection = tempfile::tempdir().unwrap();
    let batch = batch("Ohio", &["https://a.example/one"]);

    let dispatcher = shell_dispatcher(scratch.path(), FAILING_ENGINE);
    let result = dispatcher.dispatch(&batch).await;
    assert!(matches!(result, Err(CaptureError::ExitStatus(_))));

    let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
    let relocated = relocator.relocate(&batch).await;
    assert!(relocated.artifacts.is_empty());
    assert!(relocated.is_clean());
    assert!(!collection.path().join("news-20250603").exists());
}

#[tokio::test]
async fn test_missing_engine_is_a_launch_error() {
    let scratch = tempfile::tempdir().unwrap();
    let dispatcher = CaptureDispatcher::new(
        scratch.path(),
        CommandTemplate::new("/nonexistent/capture-engine", vec!["{seed_file}".into()]),
        TimeBudget::Fixed(10),
        1,
    );

    let result = dispatcher.dispatch(&batch("Ohio", &["https://a.example/one"])).await;
    assert!(matches!(result, Err(CaptureError::Launch { .. })));
}

#[tokio::test]
async fn test_empty_batch_is_rejected_before_launch() {
    let scratch = tempfile::tempdir().unwrap();
    let dispatcher = shell_dispatcher(scratch.path(), SUCCEEDING_ENGINE);

    let result = dispatcher.dispatch(&batch("Ohio", &[])).await;
    assert!(matches!(result, Err(CaptureError::EmptyBatch(_))));
    assert!(!scratch.path().join("ohio-20250603T010203.txt").exists());
}

#[tokio::test]
async fn test_multi_part_output_is_collected() {
    let scratch = tempfile::tempdir().unwrap();
    let collection = tempfile::tempdir().unwrap();
    let batch = batch("Ohio", &["https://a.example/one"]);

    let script = r#"mkdir -p "$1/collections/$2/archive" && touch "$1/collections/$2/archive/part-1.wacz" "$1/collections/$2/archive/part-2.wacz" "$1/collections/$2/pages.jsonl""#;
    shell_dispatcher(scratch.path(), script)
        .dispatch(&batch)
        .await
        .unwrap();

    let relocator = ArtifactRelocator::new(scratch.path(), collection.path(), "wacz");
    let relocated = relocator.relocate(&batch).await;
    let names: Vec<_> = relocated
        .artifacts
        .iter()
        .map(|a| a.remote_name.as_str())
        .collect();
    assert_eq!(names, vec!["03/ohio/part-1.wacz", "03/ohio/part-2.wacz"]);
}
