use std::collections::HashMap;

use parking_lot::Mutex;

use crate::bus::{Signal, SignalBus, SyncOutcome};
use crate::domain::{DownloadStatus, EntityKind, GlobalId};

/// Substring that marks a tracker key as an article request.
const ARTICLE_URL_MARKER: &str = "/articles/";

struct ParentEntry {
    kind: EntityKind,
    statuses: HashMap<String, DownloadStatus>,
    /// Latched once "articles complete" has fired for this parent.
    articles_signalled: bool,
}

/// Per-URL completion state for every in-flight sync, keyed by the
/// top-level parent's global id. One tracker-wide lock serialises all
/// read-modify-write cycles; parent sets are small and contention is
/// short-lived, so a finer grain buys nothing.
pub struct DownloadTracker {
    parents: Mutex<HashMap<GlobalId, ParentEntry>>,
    bus: SignalBus,
}

impl DownloadTracker {
    pub fn new(bus: SignalBus) -> Self {
        Self {
            parents: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Opens a tracking entry for a top-level sync. Idempotent.
    pub fn begin(&self, parent: &GlobalId, kind: EntityKind) {
        self.parents
            .lock()
            .entry(parent.clone())
            .or_insert_with(|| ParentEntry {
                kind,
                statuses: HashMap::new(),
                articles_signalled: false,
            });
    }

    /// Registers a URL as pending. Must be called before the fetch for that
    /// URL is dispatched, so a fast completion can never race an
    /// unregistered entry.
    pub fn register_pending(&self, parent: &GlobalId, url: &str) {
        let mut parents = self.parents.lock();
        if let Some(entry) = parents.get_mut(parent) {
            entry
                .statuses
                .entry(url.to_string())
                .or_insert(DownloadStatus::Pending);
        }
    }

    /// Records the status of one URL, then evaluates the aggregate
    /// conditions and fires completion signals. Safe under concurrent
    /// invocation from many finishing downloads; the whole cycle runs
    /// inside the tracker lock and the parent entry is removed the moment
    /// it completes, so "all complete" fires exactly once.
    pub fn mark(&self, parent: &GlobalId, url: &str, status: DownloadStatus) {
        let mut signals: Vec<Signal> = Vec::new();

        {
            let mut parents = self.parents.lock();
            let Some(entry) = parents.get_mut(parent) else {
                return;
            };
            let Some(slot) = entry.statuses.get_mut(url) else {
                return;
            };
            *slot = status;

            let article_urls: Vec<&DownloadStatus> = entry
                .statuses
                .iter()
                .filter(|(key, _)| key.contains(ARTICLE_URL_MARKER))
                .map(|(_, status)| status)
                .collect();
            if !entry.articles_signalled
                && !article_urls.is_empty()
                && article_urls.iter().all(|status| status.is_settled())
            {
                entry.articles_signalled = true;
                signals.push(Signal::ArticlesDownloadComplete {
                    parent_id: parent.clone(),
                });
            }

            let all_settled = entry.statuses.values().all(|status| status.is_settled());
            if all_settled {
                if let Some(done) = parents.remove(parent) {
                    if done.kind == EntityKind::Issue {
                        signals.push(Signal::IssueDownloadComplete {
                            issue_id: parent.clone(),
                        });
                    }
                    signals.push(Signal::DownloadComplete {
                        parent_id: parent.clone(),
                        outcome: outcome_of(&done.statuses),
                    });
                }
            }
        }

        for signal in signals {
            self.bus.publish(signal);
        }
    }

    /// Settled URLs over total, integer division. A parent with nothing
    /// registered (or no entry at all) is not in progress: 100.
    pub fn progress_percent(&self, parent: &GlobalId) -> u8 {
        let parents = self.parents.lock();
        let Some(entry) = parents.get(parent) else {
            return 100;
        };
        let total = entry.statuses.len();
        if total == 0 {
            return 100;
        }
        let settled = entry
            .statuses
            .values()
            .filter(|status| status.is_settled())
            .count();
        (settled * 100 / total) as u8
    }

    /// Parents that still have at least one pending URL.
    pub fn active_parents(&self) -> Vec<GlobalId> {
        self.parents
            .lock()
            .iter()
            .filter(|(_, entry)| {
                entry
                    .statuses
                    .values()
                    .any(|status| !status.is_settled())
            })
            .map(|(parent, _)| parent.clone())
            .collect()
    }

    /// Snapshot of one URL's status, mainly for diagnostics and tests.
    pub fn status_of(&self, parent: &GlobalId, url: &str) -> Option<DownloadStatus> {
        self.parents
            .lock()
            .get(parent)
            .and_then(|entry| entry.statuses.get(url))
            .copied()
    }
}

fn outcome_of(statuses: &HashMap<String, DownloadStatus>) -> SyncOutcome {
    let mut outcome = SyncOutcome {
        total: statuses.len(),
        ..SyncOutcome::default()
    };
    for (url, status) in statuses {
        match status {
            DownloadStatus::Complete => outcome.complete += 1,
            DownloadStatus::SkippedUnchanged => outcome.skipped += 1,
            DownloadStatus::Error => {
                outcome.errors += 1;
                outcome.failed_urls.push(url.clone());
            }
            DownloadStatus::Pending => {}
        }
    }
    outcome.failed_urls.sort();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SignalBus;

    fn gid(value: &str) -> GlobalId {
        value.parse().unwrap()
    }

    fn tracker() -> (DownloadTracker, crossbeam::channel::Receiver<Signal>) {
        let bus = SignalBus::new();
        let receiver = bus.subscribe();
        (DownloadTracker::new(bus), receiver)
    }

    #[test]
    fn progress_math() {
        let (tracker, _rx) = tracker();
        let parent = gid("v1");
        tracker.begin(&parent, EntityKind::Volume);
        for url in ["u1", "u2", "u3", "u4"] {
            tracker.register_pending(&parent, url);
        }
        tracker.mark(&parent, "u1", DownloadStatus::Complete);
        tracker.mark(&parent, "u2", DownloadStatus::Error);

        assert_eq!(tracker.progress_percent(&parent), 50);
        assert_eq!(tracker.active_parents(), vec![parent]);
    }

    #[test]
    fn empty_parent_reports_done() {
        let (tracker, _rx) = tracker();
        let parent = gid("v1");
        tracker.begin(&parent, EntityKind::Volume);

        assert_eq!(tracker.progress_percent(&parent), 100);
        assert!(tracker.active_parents().is_empty());
        assert_eq!(tracker.progress_percent(&gid("unknown")), 100);
    }

    #[test]
    fn articles_complete_fires_before_all_complete() {
        let (tracker, rx) = tracker();
        let parent = gid("v1");
        tracker.begin(&parent, EntityKind::Volume);
        tracker.register_pending(&parent, "https://api/articles/a1");
        tracker.register_pending(&parent, "https://api/articles/a2");
        tracker.register_pending(&parent, "https://api/media/m1");

        tracker.mark(&parent, "https://api/articles/a1", DownloadStatus::Complete);
        assert!(rx.try_recv().is_err());

        // error still counts as settled for the aggregate checks
        tracker.mark(&parent, "https://api/articles/a2", DownloadStatus::Error);
        assert_eq!(
            rx.try_recv().unwrap(),
            Signal::ArticlesDownloadComplete { parent_id: parent.clone() }
        );
        assert!(rx.try_recv().is_err());

        tracker.mark(&parent, "https://api/media/m1", DownloadStatus::Complete);
        match rx.try_recv().unwrap() {
            Signal::DownloadComplete { parent_id, outcome } => {
                assert_eq!(parent_id, parent);
                assert_eq!(outcome.total, 3);
                assert_eq!(outcome.complete, 2);
                assert_eq!(outcome.errors, 1);
                assert_eq!(outcome.failed_urls, vec!["https://api/articles/a2".to_string()]);
                assert!(!outcome.is_clean());
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn all_complete_fires_exactly_once() {
        let (tracker, rx) = tracker();
        let parent = gid("v1");
        tracker.begin(&parent, EntityKind::Volume);
        tracker.register_pending(&parent, "u1");
        tracker.mark(&parent, "u1", DownloadStatus::Complete);

        // late marks for a completed parent are ignored
        tracker.mark(&parent, "u1", DownloadStatus::Error);

        let signals: Vec<Signal> = rx.try_iter().collect();
        assert_eq!(signals.len(), 1);
        assert!(matches!(signals[0], Signal::DownloadComplete { .. }));
    }

    #[test]
    fn issue_parent_also_fires_issue_signal() {
        let (tracker, rx) = tracker();
        let parent = gid("i1");
        tracker.begin(&parent, EntityKind::Issue);
        tracker.register_pending(&parent, "https://api/issues/i1");
        tracker.mark(&parent, "https://api/issues/i1", DownloadStatus::Complete);

        let signals: Vec<Signal> = rx.try_iter().collect();
        assert_eq!(signals.len(), 2);
        assert_eq!(
            signals[0],
            Signal::IssueDownloadComplete { issue_id: parent.clone() }
        );
        assert!(matches!(signals[1], Signal::DownloadComplete { .. }));
    }

    #[test]
    fn skipped_counts_as_settled_not_error() {
        let (tracker, rx) = tracker();
        let parent = gid("i1");
        tracker.begin(&parent, EntityKind::Issue);
        tracker.register_pending(&parent, "https://api/media/m1");
        tracker.mark(
            &parent,
            "https://api/media/m1",
            DownloadStatus::SkippedUnchanged,
        );

        let signals: Vec<Signal> = rx.try_iter().collect();
        match signals.last().unwrap() {
            Signal::DownloadComplete { outcome, .. } => {
                assert_eq!(outcome.skipped, 1);
                assert_eq!(outcome.errors, 0);
                assert!(outcome.is_clean());
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
