use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam::channel::Receiver;
use serde_json::json;

use kiosk_sync::api::{ContentApi, RemoteArticle, RemoteAsset, RemoteIssue, RemoteVolume};
use kiosk_sync::bus::{Signal, SignalBus, SyncOutcome};
use kiosk_sync::config::ResolvedConfig;
use kiosk_sync::domain::{GlobalId, Sku};
use kiosk_sync::error::SyncError;
use kiosk_sync::pipeline::SyncService;
use kiosk_sync::store::Database;
use kiosk_sync::tracker::DownloadTracker;

const BASE: &str = "https://api.test/";

#[derive(Default)]
struct MockApi {
    volumes: HashMap<String, RemoteVolume>,
    issues: HashMap<String, RemoteIssue>,
    articles: HashMap<String, RemoteArticle>,
    media: HashMap<String, RemoteAsset>,
    fail_issues: HashSet<String>,
    fail_downloads: HashSet<String>,
    downloads: Mutex<Vec<String>>,
}

impl MockApi {
    fn with_volume(mut self, value: serde_json::Value) -> Self {
        let volume: RemoteVolume = serde_json::from_value(value).unwrap();
        self.volumes.insert(volume.id.clone(), volume);
        self
    }

    fn with_issue(mut self, value: serde_json::Value) -> Self {
        let issue: RemoteIssue = serde_json::from_value(value).unwrap();
        self.issues.insert(issue.id.clone(), issue);
        self
    }

    fn with_article(mut self, value: serde_json::Value) -> Self {
        let article: RemoteArticle = serde_json::from_value(value).unwrap();
        self.articles.insert(article.id.clone(), article);
        self
    }

    fn with_asset(mut self, value: serde_json::Value) -> Self {
        let asset: RemoteAsset = serde_json::from_value(value).unwrap();
        self.media.insert(asset.id.clone(), asset);
        self
    }

    fn failing_issue(mut self, id: &str) -> Self {
        self.fail_issues.insert(id.to_string());
        self
    }

    fn failing_download(mut self, url: &str) -> Self {
        self.fail_downloads.insert(url.to_string());
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl ContentApi for MockApi {
    fn volume(&self, id: &GlobalId) -> Result<RemoteVolume, SyncError> {
        self.volumes
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("volume {id}")))
    }

    fn volume_by_sku(&self, sku: &Sku) -> Result<RemoteVolume, SyncError> {
        Err(SyncError::NotFound(format!("volume sku {sku}")))
    }

    fn issue(&self, id: &GlobalId) -> Result<RemoteIssue, SyncError> {
        if self.fail_issues.contains(id.as_str()) {
            return Err(SyncError::ApiStatus {
                status: 500,
                message: "server error".to_string(),
            });
        }
        self.issues
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("issue {id}")))
    }

    fn issue_by_sku(&self, sku: &Sku) -> Result<RemoteIssue, SyncError> {
        self.issues
            .values()
            .find(|issue| issue.sku == sku.as_str())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("issue sku {sku}")))
    }

    fn article(&self, id: &GlobalId) -> Result<RemoteArticle, SyncError> {
        self.articles
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("article {id}")))
    }

    fn article_by_sku(&self, sku: &Sku) -> Result<RemoteArticle, SyncError> {
        Err(SyncError::NotFound(format!("article sku {sku}")))
    }

    fn media(&self, ids: &[GlobalId]) -> Result<Vec<RemoteAsset>, SyncError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.media.get(id.as_str()).cloned())
            .collect())
    }

    fn download_file(&self, url: &str, destination: &Utf8Path) -> Result<(), SyncError> {
        if self.fail_downloads.contains(url) {
            return Err(SyncError::Http(format!("connection refused: {url}")));
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent.as_std_path()).unwrap();
        }
        std::fs::write(destination.as_std_path(), b"binary").unwrap();
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn gid(value: &str) -> GlobalId {
    value.parse().unwrap()
}

fn service(
    api: Arc<MockApi>,
    folder: Utf8PathBuf,
) -> (SyncService, Receiver<Signal>) {
    let config = ResolvedConfig {
        schema_version: 1,
        client_key: "ck-test".to_string(),
        base_url: BASE.to_string(),
        preview: false,
        storage_folder: folder.clone(),
        workers: 4,
    };
    let db = Database::open(folder).unwrap();
    let bus = SignalBus::new();
    let signals = bus.subscribe();
    let tracker = Arc::new(DownloadTracker::new(bus.clone()));
    (SyncService::new(api, db, tracker, bus, config), signals)
}

/// Drains signals until the parent's sync settles; returns everything seen
/// on the way plus the final outcome.
fn wait_complete(signals: &Receiver<Signal>, parent: &GlobalId) -> (Vec<Signal>, SyncOutcome) {
    let mut seen = Vec::new();
    loop {
        let signal = signals
            .recv_timeout(Duration::from_secs(10))
            .expect("sync did not complete in time");
        seen.push(signal.clone());
        if let Signal::DownloadComplete { parent_id, outcome } = signal {
            if parent_id == *parent {
                return (seen, outcome);
            }
        }
    }
}

fn sample_catalog() -> MockApi {
    MockApi::default()
        .with_volume(json!({
            "id": "v1",
            "title": "Season One",
            "meta": {
                "publishedBy": "29th Street",
                "publishedDate": "2026-01-01T00:00:00Z",
                "published": true
            },
            "featuredImage": "m-cover",
            "media": [{"id": "m-cover"}],
            "issues": [{"id": "i1"}, {"id": "i2"}]
        }))
        .with_issue(json!({
            "id": "i1",
            "title": "Issue One",
            "sku": "com.29thstreet.i1",
            "meta": {
                "publishedDate": "2026-01-10T00:00:00Z",
                "updated": {"date": "2026-01-10T00:00:00Z"}
            },
            "articles": [{"id": "a1"}],
            "media": [{"id": "m-i1"}]
        }))
        .with_issue(json!({
            "id": "i2",
            "title": "Issue Two",
            "meta": {"publishedDate": "2026-02-10T00:00:00Z"},
            "media": [{"id": "m-i2"}]
        }))
        .with_article(json!({
            "id": "a1",
            "title": "Feature Story",
            "type": "story",
            "isFeatured": true,
            "meta": {"updated": {"date": "2026-01-12T00:00:00Z"}},
            "media": [{"id": "m-a1"}, {"id": "m-a2"}]
        }))
        .with_asset(json!({
            "id": "m-cover",
            "cdnUrl": "https://cdn.test/m-cover.png",
            "cdnUrlThumb": "https://cdn.test/m-cover_t.png",
            "meta": {"type": "image", "updated": {"date": "2026-01-05T00:00:00Z"}}
        }))
        .with_asset(json!({
            "id": "m-i1",
            "cdnUrl": "https://cdn.test/m-i1.png",
            "meta": {"type": "image", "updated": {"date": "2026-01-05T00:00:00Z"}}
        }))
        .with_asset(json!({
            "id": "m-i2",
            "cdnUrl": "https://cdn.test/m-i2.png",
            "meta": {"type": "image", "updated": {"date": "2026-01-05T00:00:00Z"}}
        }))
        .with_asset(json!({
            "id": "m-a1",
            "cdnUrl": "https://cdn.test/m-a1.png",
            "meta": {"type": "image", "updated": {"date": "2026-01-05T00:00:00Z"}}
        }))
        .with_asset(json!({
            "id": "m-a2",
            "cdnUrl": "https://cdn.test/m-a2.mp3",
            "meta": {"type": "audio", "updated": {"date": "2026-01-05T00:00:00Z"}}
        }))
}

#[test]
fn volume_sync_materializes_whole_tree() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(Arc::clone(&api), folder.clone());

    service.sync_volume(&gid("v1"));
    let (seen, outcome) = wait_complete(&signals, &gid("v1"));

    // volume + 2 issues + 1 article + 5 assets
    assert_eq!(outcome.total, 9);
    assert_eq!(outcome.complete, 9);
    assert!(outcome.is_clean());

    let repo = service.repository();
    let volume = repo.get_volume(&gid("v1")).unwrap();
    assert_eq!(volume.publisher, "29th Street");
    assert_eq!(volume.cover_asset_id, Some(gid("m-cover")));

    let issues = repo.issues_for_volume(&gid("v1"));
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].global_id, gid("i2")); // newest first
    assert_eq!(repo.issue_by_sku("com.29thstreet.i1").unwrap().global_id, gid("i1"));

    let relations = service.relations();
    assert_eq!(relations.articles_in_issue(&gid("i1")), vec![gid("a1")]);
    assert_eq!(
        relations.assets_in_article(&gid("a1")),
        vec![gid("m-a1"), gid("m-a2")]
    );
    assert_eq!(relations.assets_in_volume(&gid("v1")), vec![gid("m-cover")]);
    assert_eq!(relations.assets_in_issue(&gid("i2")), vec![gid("m-i2")]);

    let article = repo.get_article(&gid("a1")).unwrap();
    assert!(article.featured);
    assert_eq!(article.placement, 1);

    // article assets land in the owning issue's folder
    assert!(folder.join("i1/original-m-a1.png").as_std_path().exists());
    assert!(folder.join("i1/original-m-a2.mp3").as_std_path().exists());
    assert!(folder.join("v1/original-m-cover.png").as_std_path().exists());
    assert!(folder.join("v1/thumb-m-cover_t.png").as_std_path().exists());

    // articles settle before the whole sync does
    let articles_at = seen
        .iter()
        .position(|s| matches!(s, Signal::ArticlesDownloadComplete { .. }))
        .expect("articles signal missing");
    assert_eq!(
        seen.iter()
            .filter(|s| matches!(s, Signal::ImageDownloaded { .. }))
            .count(),
        5
    );
    assert!(articles_at < seen.len() - 1);
}

#[test]
fn resync_skips_unchanged_content() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(Arc::clone(&api), folder);

    service.sync_issue(&gid("i1"));
    let (_, first) = wait_complete(&signals, &gid("i1"));
    // issue + article + 2 article assets + 1 issue asset
    assert_eq!(first.total, 5);
    assert_eq!(first.complete, 5);
    let downloads_after_first = api.download_count();

    service.sync_issue(&gid("i1"));
    let (_, second) = wait_complete(&signals, &gid("i1"));

    // the unchanged article is skipped but its assets are still rechecked
    assert_eq!(second.total, 5);
    assert_eq!(second.complete, 1);
    assert_eq!(second.skipped, 4);
    assert!(second.is_clean());
    assert_eq!(api.download_count(), downloads_after_first);
}

#[test]
fn resync_restores_missing_binary_under_unchanged_article() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(Arc::clone(&api), folder.clone());

    service.sync_issue(&gid("i1"));
    wait_complete(&signals, &gid("i1"));

    let cached = folder.join("i1/original-m-a1.png");
    std::fs::remove_file(cached.as_std_path()).unwrap();
    let downloads_before = api.download_count();

    service.sync_issue(&gid("i1"));
    let (_, outcome) = wait_complete(&signals, &gid("i1"));

    assert!(outcome.is_clean());
    assert_eq!(outcome.complete, 2); // issue + the re-fetched asset
    assert_eq!(outcome.skipped, 3);
    assert!(cached.as_std_path().exists());
    assert_eq!(api.download_count(), downloads_before + 1);
}

#[test]
fn issue_sync_fires_issue_signal() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(api, folder);

    service.sync_issue(&gid("i2"));
    let (seen, outcome) = wait_complete(&signals, &gid("i2"));

    assert!(outcome.is_clean());
    assert!(seen
        .iter()
        .any(|s| matches!(s, Signal::IssueDownloadComplete { issue_id } if *issue_id == gid("i2"))));
}

#[test]
fn sku_resolution_returns_global_id() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(api, folder);

    let sku: Sku = "com.29thstreet.i1".parse().unwrap();
    let resolved = service.sync_issue_by_sku(&sku).unwrap();
    assert_eq!(resolved, gid("i1"));

    let (_, outcome) = wait_complete(&signals, &resolved);
    assert!(outcome.is_clean());

    let missing: Sku = "com.29thstreet.unknown".parse().unwrap();
    assert!(matches!(
        service.sync_issue_by_sku(&missing),
        Err(SyncError::NotFound(_))
    ));
}

#[test]
fn parent_fetch_failure_still_completes() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(MockApi::default().failing_issue("i1"));
    let (service, signals) = service(api, folder);

    service.sync_issue(&gid("i1"));
    let (_, outcome) = wait_complete(&signals, &gid("i1"));

    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.errors, 1);
    assert!(!outcome.is_clean());
    assert!(outcome.failed_urls[0].contains("/issues/i1"));
    assert!(service.repository().get_issue(&gid("i1")).is_none());
}

#[test]
fn failed_child_degrades_but_completes() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog().failing_issue("i2"));
    let (service, signals) = service(api, folder);

    service.sync_volume(&gid("v1"));
    let (_, outcome) = wait_complete(&signals, &gid("v1"));

    assert_eq!(outcome.errors, 1);
    assert!(outcome.failed_urls[0].contains("/issues/i2"));
    // the rest of the tree still landed
    let repo = service.repository();
    assert!(repo.get_volume(&gid("v1")).is_some());
    assert!(repo.get_issue(&gid("i1")).is_some());
    assert!(repo.get_issue(&gid("i2")).is_none());
}

#[test]
fn cdn_failure_falls_back_to_origin() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(
        MockApi::default()
            .with_issue(json!({
                "id": "i9",
                "title": "Fallback Issue",
                "meta": {"publishedDate": "2026-03-01T00:00:00Z"},
                "media": [{"id": "m9"}]
            }))
            .with_asset(json!({
                "id": "m9",
                "cdnUrl": "https://cdn.test/m9.png",
                "url": "https://origin.test/m9.png",
                "meta": {"type": "image"}
            }))
            .failing_download("https://cdn.test/m9.png"),
    );
    let (service, signals) = service(Arc::clone(&api), folder.clone());

    service.sync_issue(&gid("i9"));
    let (_, outcome) = wait_complete(&signals, &gid("i9"));

    assert!(outcome.is_clean());
    assert!(folder.join("i9/original-m9.png").as_std_path().exists());
    assert_eq!(
        api.downloads.lock().unwrap().as_slice(),
        ["https://origin.test/m9.png"]
    );
}

#[test]
fn cancellation_settles_everything_as_error() {
    let temp = tempfile::tempdir().unwrap();
    let folder = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
    let api = Arc::new(sample_catalog());
    let (service, signals) = service(api, folder);

    service.cancel();
    service.sync_volume(&gid("v1"));
    let (_, outcome) = wait_complete(&signals, &gid("v1"));

    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.errors, 1);
    assert!(service.repository().get_volume(&gid("v1")).is_none());
}
