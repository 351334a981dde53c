use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::GlobalId;

/// Aggregate result of one sync fan-out. Completion fires regardless of
/// embedded errors; callers inspect the counts to tell a clean sync from a
/// degraded one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub total: usize,
    pub complete: usize,
    pub errors: usize,
    pub skipped: usize,
    pub failed_urls: Vec<String>,
}

impl SyncOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Signals the host app can subscribe to around a sync lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum Signal {
    /// An issue synced as part of a volume (or on its own) has no pending
    /// work left.
    IssueDownloadComplete { issue_id: GlobalId },
    /// Every article request under the parent has settled; asset requests
    /// may still be in flight.
    ArticlesDownloadComplete { parent_id: GlobalId },
    /// Every registered URL under the parent has settled. Fires exactly
    /// once per sync.
    DownloadComplete {
        parent_id: GlobalId,
        outcome: SyncOutcome,
    },
    /// An asset binary finished caching to disk.
    ImageDownloaded { asset_id: GlobalId },
}

/// Multi-subscriber fan-out. Every subscriber gets every signal; receivers
/// that have been dropped are pruned on the next publish.
#[derive(Clone)]
pub struct SignalBus {
    senders: Arc<Mutex<Vec<Sender<Signal>>>>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<Signal> {
        let (sender, receiver) = unbounded();
        self.senders.lock().push(sender);
        receiver
    }

    pub fn publish(&self, signal: Signal) {
        self.senders
            .lock()
            .retain(|sender| sender.send(signal.clone()).is_ok());
    }
}
