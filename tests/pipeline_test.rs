//! Region pipeline and daily run loop end to end, with mock outlets and a shell engine

#![cfg(unix)]

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    article_urls, capture_time, rss_feed, seed_discovery, shell_dispatcher, test_day, MemoryStore,
    SUCCEEDING_ENGINE,
};
use newsvault::capture::ArtifactRelocator;
use newsvault::discovery::DiscoveryScheduler;
use newsvault::runner::pipeline::Granularity;
use newsvault::runner::{
    ArchivePipeline, Clock, CycleOutcome, DailyRunner, RegionPipeline, RunStateStore, Sleeper,
    StepOutcome,
};
use newsvault::upload::UploadPool;
use newsvault::config::ScheduleConfig;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fails every batch of the Ohio region, captures the others
const OHIO_FAILS_ENGINE: &str = r#"case "$2" in ohio-*) echo "out of disk" >&2; exit 2;; esac; mkdir -p "$1/collections/$2" && cp "$3" "$1/collections/$2/$2.wacz""#;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
struct RecordingSleeper(Mutex<Vec<Duration>>);

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

struct Workspace {
    scratch: TempDir,
    collection: TempDir,
    catalog: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            scratch: tempfile::tempdir().unwrap(),
            collection: tempfile::tempdir().unwrap(),
            catalog: tempfile::tempdir().unwrap(),
        }
    }

    fn catalog_path(&self) -> std::path::PathBuf {
        self.catalog.path().join("output.json")
    }
}

/// Mount one feed per region slug and write a catalog with Ohio, Iowa and an unreachable Utah
async fn mock_outlets(server: &MockServer, catalog: &Path) {
    let base = server.uri();
    for slug in ["ohio", "iowa"] {
        Mock::given(method("GET"))
            .and(path(format!("/{slug}/feed")))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(rss_feed(&article_urls(
                    &format!("{base}/{slug}"),
                    slug,
                    2,
                ))),
            )
            .mount(server)
            .await;
    }

    let document = serde_json::json!({
        "Ohio": {
            "newspaper": [
                {"website": format!("{base}/ohio"), "rss": [format!("{base}/ohio/feed")], "website_status_code": 200}
            ]
        },
        "Iowa": {
            "tv": [
                {"website": format!("{base}/iowa"), "rss": [format!("{base}/iowa/feed")], "website_status_code": 301}
            ]
        },
        "Utah": {
            "radio": [
                {"website": format!("{base}/utah"), "rss": [format!("{base}/utah/feed")], "website_status_code": 503}
            ]
        }
    });
    std::fs::write(catalog, serde_json::to_string_pretty(&document).unwrap()).unwrap();
}

fn pipeline(
    workspace: &Workspace,
    engine: &str,
    store: &Arc<MemoryStore>,
) -> ArchivePipeline {
    let pool = UploadPool::new(store.clone(), common::metadata(), 2, false);
    ArchivePipeline::new(
        workspace.catalog_path(),
        DiscoveryScheduler::new(seed_discovery(), 4, 2),
        shell_dispatcher(workspace.scratch.path(), engine),
        ArtifactRelocator::new(workspace.scratch.path(), workspace.collection.path(), "wacz"),
    )
    .with_uploads(Arc::new(pool), store.clone())
    .with_clock(Arc::new(FixedClock(capture_time())))
}

#[tokio::test]
async fn test_capture_failure_continues_with_next_region() {
    let server = MockServer::start().await;
    let workspace = Workspace::new();
    mock_outlets(&server, &workspace.catalog_path()).await;
    let store = MemoryStore::new();
    let pipeline = pipeline(&workspace, OHIO_FAILS_ENGINE, &store);

    let regions = pipeline.load_regions().await.unwrap();
    assert_eq!(regions.len(), 3);
    let day = test_day();

    let ohio = pipeline.process_region(&day, &regions[0]).await;
    assert_eq!(ohio.seeds, 3);
    assert_eq!(ohio.batches, 1);
    assert_eq!(ohio.captured, 0);
    assert_eq!(ohio.artifacts, 0);
    assert_eq!(pipeline.pending_uploads(), 0, "no upload for a failed capture");
    // the seed file of a failed capture stays for inspection
    assert!(workspace
        .scratch
        .path()
        .join("ohio-20250603T010203.txt")
        .exists());

    let iowa = pipeline.process_region(&day, &regions[1]).await;
    assert_eq!(iowa.captured, 1);
    assert_eq!(iowa.artifacts, 1);
    assert_eq!(pipeline.pending_uploads(), 1);

    let utah = pipeline.process_region(&day, &regions[2]).await;
    assert_eq!(utah.seeds, 0);
    assert_eq!(utah.batches, 0);

    pipeline.finish_cycle(&day, true).await;
    assert_eq!(pipeline.pending_uploads(), 0);
    assert_eq!(
        store.names("news-20250603"),
        vec!["03/iowa/iowa-20250603T010203.wacz"]
    );
    assert_eq!(store.derived(), vec!["news-20250603"]);
}

#[tokio::test]
async fn test_daily_cycle_runs_once_per_day() {
    let server = MockServer::start().await;
    let workspace = Workspace::new();
    mock_outlets(&server, &workspace.catalog_path()).await;
    let store = MemoryStore::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let clock = Arc::new(FixedClock(capture_time()));

    let runner = DailyRunner::new(
        pipeline(&workspace, SUCCEEDING_ENGINE, &store),
        RunStateStore::new(workspace.collection.path().join(".newsvault-state.json")),
        ScheduleConfig {
            once_per_day: true,
            ..Default::default()
        },
        "news",
    )
    .with_clock(clock)
    .with_sleeper(sleeper.clone());

    match runner.step().await {
        StepOutcome::Cycle(CycleOutcome::Completed { regions }) => {
            let artifacts: usize = regions.iter().map(|r| r.artifacts).sum();
            assert_eq!(artifacts, 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        store.names("news-20250603"),
        vec![
            "03/iowa/iowa-20250603T010203.wacz",
            "03/ohio/ohio-20250603T010203.wacz"
        ]
    );
    assert_eq!(store.derived(), vec!["news-20250603"]);
    let uploads = store.attempts();

    // same day again: straight to Idle, no discovery, capture or upload
    let requests = server.received_requests().await.unwrap().len();
    let second = runner.step().await;
    assert!(matches!(second, StepOutcome::Slept(_)));
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
    assert_eq!(store.attempts(), uploads);
    assert_eq!(store.derived().len(), 1);
    assert_eq!(sleeper.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_per_outlet_batches_use_outlet_scope() {
    let server = MockServer::start().await;
    let workspace = Workspace::new();
    mock_outlets(&server, &workspace.catalog_path()).await;
    let store = MemoryStore::new();
    let pipeline = pipeline(&workspace, SUCCEEDING_ENGINE, &store)
        .with_granularity(Granularity::Outlet)
        .with_window(1, Some(2));

    let regions = pipeline.load_regions().await.unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name, "Iowa");

    let outcome = pipeline.process_region(&test_day(), &regions[0]).await;
    assert_eq!(outcome.artifacts, 1);
    pipeline.finish_cycle(&test_day(), false).await;

    assert_eq!(
        store.names("news-20250603"),
        vec!["03/127-0-0-1-iowa/iowa-127-0-0-1-iowa-20250603T010203.wacz"]
    );
    assert!(store.derived().is_empty());
    assert!(workspace
        .collection
        .path()
        .join("news-20250603/03/127-0-0-1-iowa/iowa-127-0-0-1-iowa-20250603T010203.wacz")
        .exists());
}

/// Outlets on one host, as with a network of local editions, keep separate artifacts
#[tokio::test]
async fn test_per_outlet_batches_on_shared_host_do_not_collide() {
    let server = MockServer::start().await;
    let workspace = Workspace::new();
    mock_outlets(&server, &workspace.catalog_path()).await;

    let base = server.uri();
    let document = serde_json::json!({
        "Virginia": {
            "newspaper": [
                {"website": format!("{base}/ohio"), "rss": [format!("{base}/ohio/feed")], "website_status_code": 200},
                {"website": format!("{base}/iowa"), "rss": [format!("{base}/iowa/feed")], "website_status_code": 200},
                {"website": format!("{base}/iowa/"), "rss": [format!("{base}/iowa/feed")], "website_status_code": 200}
            ]
        }
    });
    std::fs::write(
        workspace.catalog_path(),
        serde_json::to_string_pretty(&document).unwrap(),
    )
    .unwrap();

    let store = MemoryStore::new();
    let pipeline = pipeline(&workspace, SUCCEEDING_ENGINE, &store)
        .with_granularity(Granularity::Outlet);
    let regions = pipeline.load_regions().await.unwrap();
    let outcome = pipeline.process_region(&test_day(), &regions[0]).await;
    assert_eq!(outcome.batches, 3);
    assert_eq!(outcome.artifacts, 3);
    pipeline.finish_cycle(&test_day(), false).await;

    assert_eq!(
        store.names("news-20250603"),
        vec![
            "03/127-0-0-1-iowa-2/virginia-127-0-0-1-iowa-2-20250603T010203.wacz",
            "03/127-0-0-1-iowa/virginia-127-0-0-1-iowa-20250603T010203.wacz",
            "03/127-0-0-1-ohio/virginia-127-0-0-1-ohio-20250603T010203.wacz",
        ]
    );

    // every artifact still holds its own outlet's seeds
    let day_dir = workspace.collection.path().join("news-20250603/03");
    let ohio = std::fs::read_to_string(
        day_dir.join("127-0-0-1-ohio/virginia-127-0-0-1-ohio-20250603T010203.wacz"),
    )
    .unwrap();
    let iowa = std::fs::read_to_string(
        day_dir.join("127-0-0-1-iowa/virginia-127-0-0-1-iowa-20250603T010203.wacz"),
    )
    .unwrap();
    assert!(ohio.contains("/ohio/2025/06/03/ohio-story-number-0"));
    assert!(!ohio.contains("iowa-story"));
    assert!(iowa.contains("/iowa/2025/06/03/iowa-story-number-0"));
}
