use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use camino::Utf8PathBuf;
use crossbeam::channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::api::{
    ContentApi, RemoteArticle, RemoteAsset, RemoteChildRef, RemoteIssue, RemoteMeta, RemoteVolume,
    article_url, issue_url, media_url, volume_url,
};
use crate::bus::{Signal, SignalBus};
use crate::config::ResolvedConfig;
use crate::domain::{AssetKind, DownloadStatus, EntityKind, GlobalId, Sku};
use crate::error::SyncError;
use crate::fs_util;
use crate::model::{Article, Asset, AssetOwner, Issue, RelationKind, Volume};
use crate::relations::RelationStore;
use crate::repository::{Repository, is_strictly_newer};
use crate::store::Database;
use crate::tracker::DownloadTracker;

/// Unit of work for the download pool. Fetch jobs pull a payload from the
/// API; payload jobs materialize one already-fetched payload. Every job
/// carries the tracker parent it reports into.
enum Job {
    Volume {
        volume_id: GlobalId,
    },
    VolumePayload {
        parent: GlobalId,
        payload: RemoteVolume,
    },
    Issue {
        issue_id: GlobalId,
        parent: GlobalId,
        volume_id: Option<GlobalId>,
    },
    IssuePayload {
        parent: GlobalId,
        volume_id: Option<GlobalId>,
        payload: RemoteIssue,
    },
    Article {
        article_id: GlobalId,
        parent: GlobalId,
        issue_id: Option<GlobalId>,
        placement: u32,
    },
    ArticlePayload {
        parent: GlobalId,
        issue_id: Option<GlobalId>,
        placement: u32,
        payload: RemoteArticle,
    },
    /// One batched metadata fetch for all assets of a single owner.
    Media {
        parent: GlobalId,
        owner: AssetOwner,
        refs: Vec<(GlobalId, u32)>,
        folder: Utf8PathBuf,
    },
}

/// Drives a full sync: fetches entity trees from the content API, writes
/// them through the repository, and caches asset binaries, fanning child
/// fetches out over a fixed pool of worker threads. All `sync_*` entry
/// points return immediately; completion is observed through the signal
/// bus or the tracker.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    api: Arc<dyn ContentApi>,
    db: Database,
    repo: Repository,
    relations: RelationStore,
    tracker: Arc<DownloadTracker>,
    bus: SignalBus,
    config: ResolvedConfig,
    jobs: Sender<Job>,
    cancelled: AtomicBool,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn ContentApi>,
        db: Database,
        tracker: Arc<DownloadTracker>,
        bus: SignalBus,
        config: ResolvedConfig,
    ) -> Self {
        let (jobs, job_queue) = unbounded::<Job>();
        let inner = Arc::new(SyncInner {
            api,
            repo: Repository::new(db.clone()),
            relations: RelationStore::new(db.clone()),
            db,
            tracker,
            bus,
            config,
            jobs,
            cancelled: AtomicBool::new(false),
        });

        // Workers hold only a weak handle; once the last service clone is
        // dropped the channel disconnects and the pool drains out.
        for _ in 0..inner.config.workers {
            let ctx = Arc::downgrade(&inner);
            let queue = job_queue.clone();
            thread::spawn(move || worker_loop(ctx, queue));
        }

        Self { inner }
    }

    /// Starts a volume sync. Registered before dispatch so the parent is
    /// trackable the instant this returns.
    pub fn sync_volume(&self, volume_id: &GlobalId) {
        let url = volume_url(&self.inner.config.base_url, volume_id.as_str());
        info!(volume = %volume_id, "sync requested");
        self.inner.tracker.begin(volume_id, EntityKind::Volume);
        self.inner.tracker.register_pending(volume_id, &url);
        self.inner.send(Job::Volume {
            volume_id: volume_id.clone(),
        });
    }

    /// Resolves a volume SKU, then syncs it. The lookup itself is the only
    /// blocking call; the sync proper runs on the pool.
    pub fn sync_volume_by_sku(&self, sku: &Sku) -> Result<GlobalId, SyncError> {
        let payload = self.inner.api.volume_by_sku(sku)?;
        let volume_id: GlobalId = payload.id.parse()?;
        let url = volume_url(&self.inner.config.base_url, volume_id.as_str());
        info!(sku = %sku, volume = %volume_id, "sync requested");
        self.inner.tracker.begin(&volume_id, EntityKind::Volume);
        self.inner.tracker.register_pending(&volume_id, &url);
        self.inner.send(Job::VolumePayload {
            parent: volume_id.clone(),
            payload,
        });
        Ok(volume_id)
    }

    pub fn sync_issue(&self, issue_id: &GlobalId) {
        let url = issue_url(&self.inner.config.base_url, issue_id.as_str());
        info!(issue = %issue_id, "sync requested");
        self.inner.tracker.begin(issue_id, EntityKind::Issue);
        self.inner.tracker.register_pending(issue_id, &url);
        self.inner.send(Job::Issue {
            issue_id: issue_id.clone(),
            parent: issue_id.clone(),
            volume_id: None,
        });
    }

    pub fn sync_issue_by_sku(&self, sku: &Sku) -> Result<GlobalId, SyncError> {
        let payload = self.inner.api.issue_by_sku(sku)?;
        let issue_id: GlobalId = payload.id.parse()?;
        let url = issue_url(&self.inner.config.base_url, issue_id.as_str());
        info!(sku = %sku, issue = %issue_id, "sync requested");
        self.inner.tracker.begin(&issue_id, EntityKind::Issue);
        self.inner.tracker.register_pending(&issue_id, &url);
        self.inner.send(Job::IssuePayload {
            parent: issue_id.clone(),
            volume_id: None,
            payload,
        });
        Ok(issue_id)
    }

    pub fn sync_article(&self, article_id: &GlobalId) {
        let url = article_url(&self.inner.config.base_url, article_id.as_str());
        info!(article = %article_id, "sync requested");
        self.inner.tracker.begin(article_id, EntityKind::Article);
        self.inner.tracker.register_pending(article_id, &url);
        self.inner.send(Job::Article {
            article_id: article_id.clone(),
            parent: article_id.clone(),
            issue_id: None,
            placement: 0,
        });
    }

    pub fn sync_article_by_sku(&self, sku: &Sku) -> Result<GlobalId, SyncError> {
        let payload = self.inner.api.article_by_sku(sku)?;
        let article_id: GlobalId = payload.id.parse()?;
        let url = article_url(&self.inner.config.base_url, article_id.as_str());
        info!(sku = %sku, article = %article_id, "sync requested");
        self.inner.tracker.begin(&article_id, EntityKind::Article);
        self.inner.tracker.register_pending(&article_id, &url);
        self.inner.send(Job::ArticlePayload {
            parent: article_id.clone(),
            issue_id: None,
            placement: 0,
            payload,
        });
        Ok(article_id)
    }

    /// Cooperative cancellation: jobs already queued still pass through the
    /// pool, but each one settles its URLs as Error instead of fetching, so
    /// every in-flight parent still reaches completion.
    pub fn cancel(&self) {
        info!("sync cancelled");
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn repository(&self) -> Repository {
        self.inner.repo.clone()
    }

    pub fn relations(&self) -> RelationStore {
        self.inner.relations.clone()
    }

    pub fn tracker(&self) -> Arc<DownloadTracker> {
        Arc::clone(&self.inner.tracker)
    }

    pub fn bus(&self) -> SignalBus {
        self.inner.bus.clone()
    }
}

fn worker_loop(ctx: Weak<SyncInner>, jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        let Some(ctx) = ctx.upgrade() else { break };
        ctx.run(job);
    }
}

impl SyncInner {
    fn send(&self, job: Job) {
        // Failure means the pool is gone, which only happens on teardown.
        let _ = self.jobs.send(job);
    }

    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(&self, job: Job) {
        match job {
            Job::Volume { volume_id } => {
                let url = volume_url(&self.config.base_url, volume_id.as_str());
                if self.cancelled() {
                    self.tracker.mark(&volume_id, &url, DownloadStatus::Error);
                    return;
                }
                match self.api.volume(&volume_id) {
                    Ok(payload) => self.process_volume(&volume_id, payload),
                    Err(err) => {
                        warn!(volume = %volume_id, error = %err, "volume fetch failed");
                        self.tracker.mark(&volume_id, &url, DownloadStatus::Error);
                    }
                }
            }
            Job::VolumePayload { parent, payload } => self.process_volume(&parent, payload),
            Job::Issue {
                issue_id,
                parent,
                volume_id,
            } => {
                let url = issue_url(&self.config.base_url, issue_id.as_str());
                if self.cancelled() {
                    self.tracker.mark(&parent, &url, DownloadStatus::Error);
                    return;
                }
                match self.api.issue(&issue_id) {
                    Ok(payload) => self.process_issue(&parent, volume_id, payload),
                    Err(err) => {
                        warn!(issue = %issue_id, error = %err, "issue fetch failed");
                        self.tracker.mark(&parent, &url, DownloadStatus::Error);
                    }
                }
            }
            Job::IssuePayload {
                parent,
                volume_id,
                payload,
            } => self.process_issue(&parent, volume_id, payload),
            Job::Article {
                article_id,
                parent,
                issue_id,
                placement,
            } => {
                let url = article_url(&self.config.base_url, article_id.as_str());
                if self.cancelled() {
                    self.tracker.mark(&parent, &url, DownloadStatus::Error);
                    return;
                }
                match self.api.article(&article_id) {
                    Ok(payload) => self.process_article(&parent, issue_id, placement, payload),
                    Err(err) => {
                        warn!(article = %article_id, error = %err, "article fetch failed");
                        self.tracker.mark(&parent, &url, DownloadStatus::Error);
                    }
                }
            }
            Job::ArticlePayload {
                parent,
                issue_id,
                placement,
                payload,
            } => self.process_article(&parent, issue_id, placement, payload),
            Job::Media {
                parent,
                owner,
                refs,
                folder,
            } => self.process_media(&parent, owner, refs, &folder),
        }
    }

    fn process_volume(&self, parent: &GlobalId, payload: RemoteVolume) {
        let url = volume_url(&self.config.base_url, &payload.id);
        let volume_id: GlobalId = match payload.id.parse() {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "volume payload carries an invalid id");
                self.tracker.mark(parent, &url, DownloadStatus::Error);
                return;
            }
        };
        let folder = self.db.asset_folder(volume_id.as_str());
        let record = Volume {
            global_id: volume_id.clone(),
            title: payload.title,
            subtitle: payload.subtitle,
            description: payload.description,
            publisher: payload.meta.published_by.clone(),
            release_date: payload.meta.release_date.clone(),
            published_date: payload.meta.published_date.clone(),
            published: payload.meta.published.unwrap_or(false),
            cover_asset_id: payload.featured_image.parse().ok(),
            keywords: payload.keywords,
            custom_meta: payload.custom_meta,
            asset_folder: folder.to_string(),
        };
        if let Err(err) = self.repo.upsert_volume(record) {
            warn!(volume = %volume_id, error = %err, "volume write failed");
            self.tracker.mark(parent, &url, DownloadStatus::Error);
            return;
        }
        debug!(volume = %volume_id, issues = payload.issues.len(), "volume stored");

        // Register every child before the parent URL settles, so the sync
        // can never report complete with children still unregistered.
        for child in &payload.issues {
            let Ok(issue_id) = child.id.parse::<GlobalId>() else {
                warn!(volume = %volume_id, raw = %child.id, "skipping issue with invalid id");
                continue;
            };
            let child_url = issue_url(&self.config.base_url, issue_id.as_str());
            self.tracker.register_pending(parent, &child_url);
            self.send(Job::Issue {
                issue_id,
                parent: parent.clone(),
                volume_id: Some(volume_id.clone()),
            });
        }
        self.queue_media(
            parent,
            AssetOwner::Volume {
                volume_id: volume_id.clone(),
            },
            &payload.media,
            folder,
        );
        self.tracker.mark(parent, &url, DownloadStatus::Complete);
    }

    fn process_issue(&self, parent: &GlobalId, volume_id: Option<GlobalId>, payload: RemoteIssue) {
        let url = issue_url(&self.config.base_url, &payload.id);
        let issue_id: GlobalId = match payload.id.parse() {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "issue payload carries an invalid id");
                self.tracker.mark(parent, &url, DownloadStatus::Error);
                return;
            }
        };
        let folder = self.db.asset_folder(issue_id.as_str());
        let last_updated = remote_timestamp(&payload.meta);
        let record = Issue {
            global_id: issue_id.clone(),
            volume_id,
            title: payload.title,
            description: payload.description,
            display_date: payload.meta.display_date.clone(),
            published_date: payload.meta.published_date.clone(),
            last_updated,
            sku: payload.sku.parse().ok(),
            cover_asset_id: payload.cover_phone.parse().ok(),
            custom_meta: payload.custom_meta,
            asset_folder: folder.to_string(),
        };
        if let Err(err) = self.repo.upsert_issue(record) {
            warn!(issue = %issue_id, error = %err, "issue write failed");
            self.tracker.mark(parent, &url, DownloadStatus::Error);
            return;
        }

        let article_ids: Vec<GlobalId> = payload
            .articles
            .iter()
            .filter_map(|child| child.id.parse().ok())
            .collect();
        if let Err(err) = self.repo.prune_issue_articles(&issue_id, &article_ids) {
            warn!(issue = %issue_id, error = %err, "stale article prune failed");
        }
        debug!(issue = %issue_id, articles = article_ids.len(), "issue stored");

        for (index, article_id) in article_ids.iter().enumerate() {
            let placement = (index + 1) as u32;
            if let Err(err) = self.relations.upsert(
                RelationKind::ArticleInIssue {
                    issue_id: issue_id.clone(),
                    article_id: article_id.clone(),
                },
                placement,
            ) {
                warn!(issue = %issue_id, article = %article_id, error = %err, "relation write failed");
            }
            let child_url = article_url(&self.config.base_url, article_id.as_str());
            self.tracker.register_pending(parent, &child_url);
            self.send(Job::Article {
                article_id: article_id.clone(),
                parent: parent.clone(),
                issue_id: Some(issue_id.clone()),
                placement,
            });
        }
        self.queue_media(
            parent,
            AssetOwner::Issue {
                issue_id: issue_id.clone(),
            },
            &payload.media,
            folder,
        );
        self.tracker.mark(parent, &url, DownloadStatus::Complete);
    }

    fn process_article(
        &self,
        parent: &GlobalId,
        issue_id: Option<GlobalId>,
        placement: u32,
        payload: RemoteArticle,
    ) {
        let url = article_url(&self.config.base_url, &payload.id);
        let article_id: GlobalId = match payload.id.parse() {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "article payload carries an invalid id");
                self.tracker.mark(parent, &url, DownloadStatus::Error);
                return;
            }
        };

        let folder = match &issue_id {
            Some(issue_id) => self.db.asset_folder(issue_id.as_str()),
            None => self.db.asset_folder(article_id.as_str()),
        };
        let last_updated = remote_timestamp(&payload.meta);
        if let Some(existing) = self.repo.get_article(&article_id) {
            if !is_strictly_newer(&last_updated, &existing.last_updated) {
                debug!(article = %article_id, "article unchanged, rechecking assets only");
                // the record is current but a cached binary may have gone
                // missing since; every asset re-runs its own timestamp and
                // file check
                self.queue_media(
                    parent,
                    AssetOwner::Article {
                        article_id: article_id.clone(),
                        issue_id: issue_id.clone(),
                    },
                    &payload.media,
                    folder,
                );
                self.tracker
                    .mark(parent, &url, DownloadStatus::SkippedUnchanged);
                return;
            }
        }
        let record = Article {
            global_id: article_id.clone(),
            issue_id: issue_id.clone(),
            title: payload.title,
            body: payload.body,
            description: payload.description,
            author_name: payload.author_name,
            author_url: payload.author_url,
            section: payload.section,
            article_type: payload.article_type,
            keywords: payload.keywords,
            commentary: payload.commentary,
            custom_meta: payload.custom_meta,
            placement,
            featured: payload.is_featured,
            thumbnail_url: Some(payload.thumbnail).filter(|t| !t.is_empty()),
            last_updated,
            written_by: client_stamp(),
        };
        if let Err(err) = self.repo.upsert_article(record) {
            warn!(article = %article_id, error = %err, "article write failed");
            self.tracker.mark(parent, &url, DownloadStatus::Error);
            return;
        }
        debug!(article = %article_id, media = payload.media.len(), "article stored");

        self.queue_media(
            parent,
            AssetOwner::Article {
                article_id: article_id.clone(),
                issue_id,
            },
            &payload.media,
            folder,
        );
        self.tracker.mark(parent, &url, DownloadStatus::Complete);
    }

    /// Registers each asset's tracker URL, then queues one batched metadata
    /// fetch for the whole owner.
    fn queue_media(
        &self,
        parent: &GlobalId,
        owner: AssetOwner,
        children: &[RemoteChildRef],
        folder: Utf8PathBuf,
    ) {
        let refs: Vec<(GlobalId, u32)> = children
            .iter()
            .enumerate()
            .filter_map(|(index, child)| {
                child
                    .id
                    .parse()
                    .ok()
                    .map(|id: GlobalId| (id, (index + 1) as u32))
            })
            .collect();
        if refs.is_empty() {
            return;
        }
        for (asset_id, _) in &refs {
            let key = media_url(&self.config.base_url, asset_id.as_str());
            self.tracker.register_pending(parent, &key);
        }
        self.send(Job::Media {
            parent: parent.clone(),
            owner,
            refs,
            folder,
        });
    }

    fn process_media(
        &self,
        parent: &GlobalId,
        owner: AssetOwner,
        refs: Vec<(GlobalId, u32)>,
        folder: &camino::Utf8Path,
    ) {
        let mark_all = |status: DownloadStatus| {
            for (asset_id, _) in &refs {
                let key = media_url(&self.config.base_url, asset_id.as_str());
                self.tracker.mark(parent, &key, status);
            }
        };
        if self.cancelled() {
            mark_all(DownloadStatus::Error);
            return;
        }

        let ids: Vec<GlobalId> = refs.iter().map(|(id, _)| id.clone()).collect();
        let payloads = match self.api.media(&ids) {
            Ok(payloads) => payloads,
            Err(err) => {
                warn!(parent = %parent, error = %err, "media metadata fetch failed");
                mark_all(DownloadStatus::Error);
                return;
            }
        };

        let mut seen: Vec<GlobalId> = Vec::with_capacity(payloads.len());
        for remote in payloads {
            let Ok(asset_id) = remote.id.parse::<GlobalId>() else {
                continue;
            };
            let Some(&(_, placement)) = refs.iter().find(|(id, _)| *id == asset_id) else {
                continue;
            };
            seen.push(asset_id.clone());
            let key = media_url(&self.config.base_url, asset_id.as_str());
            let status = self.materialize_asset(&asset_id, &owner, placement, remote, folder);
            self.tracker.mark(parent, &key, status);
        }

        // Refs the server did not return can never settle on their own.
        for (asset_id, _) in &refs {
            if !seen.contains(asset_id) {
                warn!(parent = %parent, asset = %asset_id, "asset missing from media response");
                let key = media_url(&self.config.base_url, asset_id.as_str());
                self.tracker.mark(parent, &key, DownloadStatus::Error);
            }
        }
    }

    /// Writes the asset record, then caches its binaries. The record commit
    /// stands on its own: a failed download leaves the metadata in place and
    /// reports Error for this URL only.
    fn materialize_asset(
        &self,
        asset_id: &GlobalId,
        owner: &AssetOwner,
        placement: u32,
        remote: RemoteAsset,
        folder: &camino::Utf8Path,
    ) -> DownloadStatus {
        if let Err(err) = self
            .relations
            .upsert(relation_for(owner, asset_id), placement)
        {
            warn!(asset = %asset_id, error = %err, "relation write failed");
        }

        let last_updated = remote_timestamp(&remote.meta);
        if let Some(existing) = self.repo.get_asset(asset_id) {
            let current = existing.original_path(folder.as_str());
            if !is_strictly_newer(&last_updated, &existing.last_updated)
                && fs_util::file_has_content(&current)
            {
                debug!(asset = %asset_id, "asset unchanged, skipping");
                return DownloadStatus::SkippedUnchanged;
            }
        }

        let (original, original_fallback) = remote.original_urls();
        let (thumb, thumb_fallback) = remote.thumb_urls();
        let original_file = if original.is_empty() {
            String::new()
        } else {
            fs_util::original_file_name(original)
        };
        let thumb_file = if thumb.is_empty() {
            String::new()
        } else {
            fs_util::thumb_file_name(thumb)
        };

        let record = Asset {
            global_id: asset_id.clone(),
            kind: AssetKind::from_wire(&remote.meta.media_type),
            caption: remote.caption.clone(),
            source: remote.source.clone(),
            owner: owner.clone(),
            original_file: original_file.clone(),
            thumb_file: thumb_file.clone(),
            placement,
            custom_meta: remote.custom_meta.clone(),
            last_updated,
        };
        if let Err(err) = self.repo.upsert_asset(record) {
            warn!(asset = %asset_id, error = %err, "asset write failed");
            return DownloadStatus::Error;
        }

        if original.is_empty() {
            return DownloadStatus::Complete;
        }
        if let Err(err) = fs_util::ensure_dir(folder) {
            warn!(asset = %asset_id, error = %err, "asset folder creation failed");
            return DownloadStatus::Error;
        }
        let destination = folder.join(&original_file);
        if let Err(err) =
            cache_binary(self.api.as_ref(), original, original_fallback, &destination)
        {
            warn!(asset = %asset_id, url = %original, error = %err, "asset download failed");
            return DownloadStatus::Error;
        }
        if !thumb.is_empty() {
            let thumb_destination = folder.join(&thumb_file);
            // A missing thumbnail degrades rendering, not the sync.
            if let Err(err) =
                cache_binary(self.api.as_ref(), thumb, thumb_fallback, &thumb_destination)
            {
                warn!(asset = %asset_id, url = %thumb, error = %err, "thumbnail download failed");
            }
        }
        self.bus.publish(Signal::ImageDownloaded {
            asset_id: asset_id.clone(),
        });
        DownloadStatus::Complete
    }
}

fn relation_for(owner: &AssetOwner, asset_id: &GlobalId) -> RelationKind {
    match owner {
        AssetOwner::Issue { issue_id } => RelationKind::AssetInIssue {
            issue_id: issue_id.clone(),
            asset_id: asset_id.clone(),
        },
        AssetOwner::Article {
            article_id,
            issue_id,
        } => RelationKind::AssetInArticle {
            article_id: article_id.clone(),
            asset_id: asset_id.clone(),
            issue_id: issue_id.clone(),
        },
        AssetOwner::Volume { volume_id } => RelationKind::AssetInVolume {
            volume_id: volume_id.clone(),
            asset_id: asset_id.clone(),
        },
    }
}

/// Timestamp a payload was last touched at, preferring the explicit update
/// stamp over publication and creation dates.
fn remote_timestamp(meta: &RemoteMeta) -> String {
    if let Some(updated) = meta.updated_date() {
        return updated.to_string();
    }
    if !meta.published_date.is_empty() {
        return meta.published_date.clone();
    }
    meta.created.clone()
}

fn client_stamp() -> String {
    format!("kiosk-sync/{}", env!("CARGO_PKG_VERSION"))
}

/// CDN first, origin second. The fallback only runs when the preferred copy
/// fails outright.
fn cache_binary(
    api: &dyn ContentApi,
    primary: &str,
    fallback: Option<&str>,
    destination: &camino::Utf8Path,
) -> Result<(), SyncError> {
    match api.download_file(primary, destination) {
        Ok(()) => Ok(()),
        Err(err) => match fallback {
            Some(fallback_url) => {
                warn!(url = %primary, error = %err, "retrying download from origin");
                api.download_file(fallback_url, destination)
            }
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_timestamp_preference() {
        let meta: RemoteMeta = serde_json::from_str(
            r#"{"publishedDate": "2026-01-01T00:00:00Z",
                "updated": {"date": "2026-02-01T00:00:00Z"}}"#,
        )
        .unwrap();
        assert_eq!(remote_timestamp(&meta), "2026-02-01T00:00:00Z");

        let meta: RemoteMeta =
            serde_json::from_str(r#"{"publishedDate": "2026-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(remote_timestamp(&meta), "2026-01-01T00:00:00Z");

        let meta: RemoteMeta = serde_json::from_str(r#"{"created": "2025-12-01"}"#).unwrap();
        assert_eq!(remote_timestamp(&meta), "2025-12-01");
    }

    #[test]
    fn relation_shapes_follow_owner() {
        let asset: GlobalId = "m1".parse().unwrap();
        let owner = AssetOwner::Article {
            article_id: "a1".parse().unwrap(),
            issue_id: Some("i1".parse().unwrap()),
        };
        match relation_for(&owner, &asset) {
            RelationKind::AssetInArticle { issue_id, .. } => {
                assert_eq!(issue_id, Some("i1".parse().unwrap()));
            }
            other => panic!("unexpected relation: {other:?}"),
        }
    }
}
