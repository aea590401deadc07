use super::*;
use crate::checkpoint::NoOpReplicator;
use crate::error::{Error, FailureReason};
use crate::types::{HarvestSummary, Outcome, ProgressSnapshot, Record, RunStats, Task};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const BASE: &str = "http://site.test";

/// In-memory site: listing and item pages keyed by URL, anything else is a 404
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
    /// Cancelled as soon as the given URL is fetched
    cancel_on: Option<(String, CancellationToken)>,
}

impl FakeSite {
    /// Category listing (single page) plus an item page and payload for every id
    fn with_category(self, category: &str, ids: &[&str]) -> Self {
        let mut site = self.with_listing(category, ids);
        for id in ids {
            site = site.with_item(id);
        }
        site
    }

    /// Single-page listing only; item pages are added separately
    fn with_listing(mut self, category: &str, ids: &[&str]) -> Self {
        let listing = std::iter::once("1".to_string())
            .chain(ids.iter().map(|id| id.to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        self.pages
            .insert(format!("{BASE}/dictionary/{category}"), listing.into_bytes());
        self
    }

    fn with_item(mut self, id: &str) -> Self {
        let payload_url = format!("{BASE}/media/{id}.mp4");
        self.pages.insert(
            format!("{BASE}/sign/{id}"),
            format!("payload:{payload_url}").into_bytes(),
        );
        self.pages
            .insert(payload_url, format!("bytes-of-{id}").into_bytes());
        self
    }

    /// Item page that exists but carries no payload reference
    fn with_bare_item(mut self, id: &str) -> Self {
        self.pages
            .insert(format!("{BASE}/sign/{id}"), b"no payload here".to_vec());
        self
    }

    fn without(mut self, url: &str) -> Self {
        self.pages.remove(url);
        self
    }

    fn cancel_on(mut self, url: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((url.to_string(), token));
        self
    }

    fn calls_matching(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(&self, url: &str, _timeout: Duration) -> crate::Result<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some((trigger, token)) = &self.cancel_on {
            if trigger == url {
                token.cancel();
            }
        }
        self.pages.get(url).cloned().ok_or_else(|| Error::HttpStatus {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Listing: page count then one id per line. Item: `payload:<url>`.
struct FakeExtractor;

impl Extractor for FakeExtractor {
    fn extract(&self, page: &[u8], item_id: &str) -> Option<Record> {
        if item_id == "boom" {
            panic!("extractor blew up on {item_id}");
        }
        let text = String::from_utf8_lossy(page);
        let payload_url = text.strip_prefix("payload:")?.trim().to_string();
        Some(Record {
            item_id: item_id.to_string(),
            payload_url,
            description: Some(format!("the sign for {item_id}")),
            related_ids: Vec::new(),
            categories: Vec::new(),
            discovered_at: Utc::now(),
        })
    }

    fn enumerate_links(&self, page: &[u8]) -> BTreeSet<String> {
        String::from_utf8_lossy(page)
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    fn max_page_index(&self, page: &[u8]) -> u32 {
        String::from_utf8_lossy(page)
            .lines()
            .next()
            .and_then(|l| l.parse().ok())
            .unwrap_or(1)
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: Mutex<Vec<String>>,
    reject: bool,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, key: &str, bytes: &[u8]) -> crate::Result<()> {
        self.puts.lock().unwrap().push(key.to_string());
        if self.reject {
            return Err(Error::Storage(format!("upload of '{key}' rejected")));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
struct RecordingReplicator {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Replicator for RecordingReplicator {
    async fn checkpoint(&self, message: &str) -> crate::Result<CheckpointOutcome> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(CheckpointOutcome::Committed { pushed: true })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn test_config(root: &Path, categories: &[&str], workers: usize) -> Config {
    let mut config = Config {
        base_url: BASE.into(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        num_workers: workers,
        ..Default::default()
    };
    config.retry.retry_attempts = 2;
    config.retry.retry_delay = Duration::ZERO;
    config.retry.request_delay = Duration::ZERO;
    config.timeouts.queue_pop_timeout = Duration::from_millis(50);
    config.storage.object_store.bucket = "media".into();
    config.paths.metadata_dir = root.join("metadata");
    config.paths.payload_dir = root.join("videos");
    config.paths.progress_file = root.join("progress.json");
    config.paths.log_dir = None;
    config.checkpoint.enabled = false;
    config
}

struct Rig {
    harvester: Harvester,
    site: Arc<FakeSite>,
    store: Arc<MemoryStore>,
    replicator: Arc<RecordingReplicator>,
}

async fn rig(config: Config, site: FakeSite, store: MemoryStore) -> Rig {
    let site = Arc::new(site);
    let store = Arc::new(store);
    let replicator = Arc::new(RecordingReplicator::default());
    let harvester = Harvester::builder(config)
        .fetcher(site.clone())
        .extractor(Arc::new(FakeExtractor))
        .object_store(store.clone())
        .replicator(replicator.clone())
        .build()
        .await
        .unwrap();
    Rig {
        harvester,
        site,
        store,
        replicator,
    }
}

fn on_disk_snapshot(root: &Path) -> ProgressSnapshot {
    serde_json::from_slice(&std::fs::read(root.join("progress.json")).unwrap()).unwrap()
}

#[tokio::test]
async fn harvests_every_listed_item() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["a"], 2);
    let rig = rig(
        config,
        FakeSite::default().with_category("a", &["hello", "world"]),
        MemoryStore::default(),
    )
    .await;

    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(
        summary,
        HarvestSummary {
            total: 2,
            successful: 2,
            failed: 0,
            skipped: 0,
            interrupted: false,
        }
    );
    for id in ["hello", "world"] {
        let path = dir.path().join("metadata").join("a").join(format!("{id}.json"));
        let artifact: crate::types::MetadataArtifact =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(artifact.record.item_id, id);
        assert_eq!(artifact.category, "a");
        assert_eq!(artifact.object_key.as_deref(), Some(format!("a/{id}.mp4").as_str()));
        assert_eq!(artifact.payload_size, format!("bytes-of-{id}").len() as u64);
        assert_eq!(
            rig.store.objects.lock().unwrap()[&format!("a/{id}.mp4")],
            format!("bytes-of-{id}").into_bytes()
        );
    }

    let snap = on_disk_snapshot(dir.path());
    assert_eq!(
        snap.completed_item_ids,
        BTreeSet::from(["hello".to_string(), "world".to_string()])
    );
    assert!(snap.failed_items.is_empty());
    assert_eq!(snap.stats.successful, 2);
    assert_eq!(
        rig.replicator.messages.lock().unwrap().last().map(String::as_str),
        Some("Final: 2 items completed, 0 failed")
    );
}

#[tokio::test]
async fn item_without_payload_is_recorded_as_no_video_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["f"], 1);
    let site = FakeSite::default()
        .with_listing("f", &["foo"])
        .with_bare_item("foo");
    let rig = rig(config, site, MemoryStore::default()).await;

    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.successful, 0);
    let snap = on_disk_snapshot(dir.path());
    assert!(!snap.is_completed("foo"));
    assert_eq!(snap.failed_items.len(), 1);
    assert_eq!(snap.failed_items[0].item_id, "foo");
    assert_eq!(snap.failed_items[0].reason, FailureReason::NoVideoFound);
    assert!(!dir.path().join("metadata").join("f").join("foo.json").exists());
    assert!(rig.store.puts.lock().unwrap().is_empty());
    assert_eq!(
        rig.replicator.messages.lock().unwrap().last().map(String::as_str),
        Some("Final: 0 items completed, 1 failed")
    );
}

#[tokio::test]
async fn fetch_failures_map_to_their_reasons() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["a"], 2);
    let site = FakeSite::default()
        .with_category("a", &["nopage", "nopayload", "fine"])
        .without(&format!("{BASE}/sign/nopage"))
        .without(&format!("{BASE}/media/nopayload.mp4"));
    let rig = rig(config, site, MemoryStore::default()).await;

    rig.harvester.run().await.unwrap();

    let snap = rig.harvester.progress().snapshot().await;
    let reasons: HashMap<_, _> = snap
        .failed_items
        .iter()
        .map(|f| (f.item_id.as_str(), f.reason))
        .collect();
    assert_eq!(reasons["nopage"], FailureReason::FailedToFetchPage);
    assert_eq!(reasons["nopayload"], FailureReason::FailedToDownloadVideo);
    assert!(snap.is_completed("fine"));
    // Each failing fetch used every attempt
    assert_eq!(rig.site.calls_matching("/sign/nopage"), 2);
    assert_eq!(rig.site.calls_matching("/media/nopayload.mp4"), 2);
}

#[tokio::test]
async fn resumed_run_skips_completed_items_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["a"], 2);

    let mut snapshot = ProgressSnapshot::fresh();
    snapshot.mark_success("A");
    snapshot.mark_success("B");
    let progress = crate::progress::ProgressStore::from_snapshot(&config.paths.progress_file, snapshot);

    let site = Arc::new(FakeSite::default().with_category("a", &["A", "B"]));
    let harvester = Harvester::builder(config)
        .fetcher(site.clone())
        .extractor(Arc::new(FakeExtractor))
        .object_store(Arc::new(MemoryStore::default()))
        .replicator(Arc::new(NoOpReplicator))
        .progress(progress)
        .build()
        .await
        .unwrap();

    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.successful, 0);
    assert_eq!(site.calls.lock().unwrap().as_slice(), [format!("{BASE}/dictionary/a")]);
    assert!(!dir.path().join("metadata").join("a").join("A.json").exists());
}

#[tokio::test]
async fn second_run_over_same_state_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();

    let first = rig(
        test_config(dir.path(), &["a"], 3),
        FakeSite::default().with_category("a", &["x", "y", "z"]),
        MemoryStore::default(),
    )
    .await;
    assert_eq!(first.harvester.run().await.unwrap().successful, 3);
    let after_first = on_disk_snapshot(dir.path());

    let second = rig(
        test_config(dir.path(), &["a"], 3),
        FakeSite::default().with_category("a", &["x", "y", "z"]),
        MemoryStore::default(),
    )
    .await;
    let summary = second.harvester.run().await.unwrap();

    assert_eq!(summary.successful, 0);
    assert_eq!(summary.skipped, 3);
    assert!(second.store.puts.lock().unwrap().is_empty());
    let after_second = on_disk_snapshot(dir.path());
    assert_eq!(after_first.completed_item_ids, after_second.completed_item_ids);
    assert_eq!(after_first.started_at, after_second.started_at);
}

#[tokio::test]
async fn many_workers_lose_no_items() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<String> = (0..200).map(|i| format!("item{i:03}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let rig = rig(
        test_config(dir.path(), &["a"], 16),
        FakeSite::default().with_category("a", &id_refs),
        MemoryStore::default(),
    )
    .await;

    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(summary.total, 200);
    assert_eq!(summary.successful, 200);
    let snap = on_disk_snapshot(dir.path());
    assert_eq!(snap.completed_item_ids.len(), 200);

    let puts = rig.store.puts.lock().unwrap();
    let unique: BTreeSet<_> = puts.iter().collect();
    assert_eq!(puts.len(), 200, "every item uploaded exactly once");
    assert_eq!(unique.len(), 200);

    let artifacts = std::fs::read_dir(dir.path().join("metadata").join("a"))
        .unwrap()
        .count();
    assert_eq!(artifacts, 200);
}

#[tokio::test]
async fn rejected_upload_fails_item_without_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        test_config(dir.path(), &["a"], 1),
        FakeSite::default().with_category("a", &["hello"]),
        MemoryStore {
            reject: true,
            ..Default::default()
        },
    )
    .await;

    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(summary.failed, 1);
    let snap = on_disk_snapshot(dir.path());
    assert_eq!(snap.failed_items[0].reason, FailureReason::FailedToUpload);
    assert!(!dir.path().join("metadata").join("a").join("hello.json").exists());
}

#[tokio::test]
async fn local_only_storage_writes_payload_copy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &["a"], 1);
    config.storage.upload_to_object_store = false;
    config.storage.save_locally = true;

    let rig = rig(
        config,
        FakeSite::default().with_category("a", &["hello"]),
        MemoryStore::default(),
    )
    .await;
    rig.harvester.run().await.unwrap();

    let payload = dir.path().join("videos").join("a").join("hello.mp4");
    assert_eq!(std::fs::read(&payload).unwrap(), b"bytes-of-hello");
    assert!(rig.store.puts.lock().unwrap().is_empty(), "store ignored when upload disabled");

    let artifact: crate::types::MetadataArtifact = serde_json::from_slice(
        &std::fs::read(dir.path().join("metadata").join("a").join("hello.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(artifact.object_key, None);
    assert_eq!(artifact.local_path, Some(payload));
}

#[tokio::test]
async fn workers_checkpoint_every_n_successes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &["a"], 1);
    config.commit_every_n_successes = 2;

    let rig = rig(
        config,
        FakeSite::default().with_category("a", &["v", "w", "x", "y", "z"]),
        MemoryStore::default(),
    )
    .await;
    rig.harvester.run().await.unwrap();

    assert_eq!(
        *rig.replicator.messages.lock().unwrap(),
        vec![
            "Progress: a - 2 items from worker 0".to_string(),
            "Progress: a - 4 items from worker 0".to_string(),
            "Final: 5 items completed, 0 failed".to_string(),
        ]
    );
}

#[tokio::test]
async fn cancellation_finishes_in_flight_item_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let site = FakeSite::default()
        .with_category("a", &["i1", "i2", "i3", "i4", "i5"])
        .cancel_on(&format!("{BASE}/sign/i1"), token.clone());

    let site = Arc::new(site);
    let replicator = Arc::new(RecordingReplicator::default());
    let harvester = Harvester::builder(test_config(dir.path(), &["a"], 1))
        .fetcher(site.clone())
        .extractor(Arc::new(FakeExtractor))
        .object_store(Arc::new(MemoryStore::default()))
        .replicator(replicator.clone())
        .cancel_token(token)
        .build()
        .await
        .unwrap();

    let summary = harvester.run().await.unwrap();

    assert_eq!(
        summary,
        HarvestSummary {
            total: 5,
            successful: 1,
            failed: 0,
            skipped: 4,
            interrupted: true,
        }
    );
    assert_eq!(site.calls_matching("/sign/"), 1);
    let snap = on_disk_snapshot(dir.path());
    assert_eq!(snap.completed_item_ids, BTreeSet::from(["i1".to_string()]));
    assert!(snap.failed_items.is_empty(), "skipped items are not failures");
    assert_eq!(
        replicator.messages.lock().unwrap().last().map(String::as_str),
        Some("Final: 1 items completed, 0 failed")
    );
}

#[tokio::test]
async fn panicking_pipeline_is_an_internal_error_and_worker_continues() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        test_config(dir.path(), &["a"], 1),
        FakeSite::default().with_category("a", &["boom", "calm"]),
        MemoryStore::default(),
    )
    .await;

    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    let snap = rig.harvester.progress().snapshot().await;
    assert_eq!(snap.failed_items[0].item_id, "boom");
    assert_eq!(snap.failed_items[0].reason, FailureReason::Internal);
    assert!(snap.is_completed("calm"));
}

#[tokio::test]
async fn empty_task_list_is_an_error_but_progress_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        test_config(dir.path(), &["zzz"], 2),
        FakeSite::default(),
        MemoryStore::default(),
    )
    .await;

    match rig.harvester.run().await {
        Err(Error::NoTasks) => {}
        other => panic!("expected NoTasks, got {other:?}"),
    }
    assert!(dir.path().join("progress.json").exists());
    assert!(rig.replicator.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn events_cover_the_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        test_config(dir.path(), &["a"], 2),
        FakeSite::default().with_category("a", &["hello", "world"]),
        MemoryStore::default(),
    )
    .await;
    let mut events = rig.harvester.subscribe();

    rig.harvester.run().await.unwrap();

    let mut finished_items = Vec::new();
    let mut workers_started = 0;
    let mut workers_finished = 0;
    let mut summary = None;
    let mut discovered = None;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::DiscoveryComplete { tasks } => discovered = Some(tasks),
            Event::WorkerStarted { .. } => workers_started += 1,
            Event::WorkerFinished { .. } => workers_finished += 1,
            Event::ItemFinished { task, outcome, .. } => finished_items.push((task, outcome)),
            Event::Finished { summary: s } => summary = Some(s),
            Event::Checkpoint { .. } => {}
        }
    }

    assert_eq!(discovered, Some(2));
    assert_eq!(workers_started, 2);
    assert_eq!(workers_finished, 2);
    finished_items.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        finished_items,
        vec![
            (Task::new("a", "hello"), Outcome::Success),
            (Task::new("a", "world"), Outcome::Success),
        ]
    );
    assert_eq!(summary.map(|s| s.successful), Some(2));
}

#[tokio::test]
async fn run_stats_are_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let rig = rig(
        test_config(dir.path(), &["a"], 2),
        FakeSite::default().with_category("a", &["hello"]),
        MemoryStore::default(),
    )
    .await;

    rig.harvester.run().await.unwrap();
    let summary = rig.harvester.run().await.unwrap();

    assert_eq!(
        rig.harvester.progress().stats().await,
        RunStats {
            total: 1,
            successful: 0,
            failed: 0,
            skipped: 1,
        }
    );
    assert_eq!(summary.skipped, 1);
}
