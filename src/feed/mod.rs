//! Change feed adapter over a watched page subtree.
//!
//! Wraps the host page's live-region observation primitive: a watched region
//! produces an ordered sequence of mutation batches, delivered sequentially
//! on an unbounded channel. No two batches for the same region are processed
//! concurrently — the consumer task drains them one at a time.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::page::{
    MutationBatch, MutationKind, MutationRecord, ObserveConfig, PageHandle, PageNode,
};

/// Predicate locating the watched region in the current page tree.
pub type RegionLocator = Arc<dyn Fn(&PageNode) -> Option<Vec<usize>> + Send + Sync>;

/// Consumed interface of the observation primitive.
pub trait ChangeFeed: Send + Sync {
    /// Start observing. Returns the batch receiver; `None` if observation
    /// was already started once for this feed.
    fn observe(&self, config: ObserveConfig) -> Option<mpsc::UnboundedReceiver<MutationBatch>>;

    /// Stop observing. In-flight batches drain; no new ones are delivered.
    fn disconnect(&self);
}

struct FeedState {
    config: ObserveConfig,
    sender: Option<mpsc::UnboundedSender<MutationBatch>>,
    receiver: Option<mpsc::UnboundedReceiver<MutationBatch>>,
}

/// In-memory feed bound to a [`PageHandle`] region. Applying a new subtree
/// replaces the watched region in the page and emits one mutation batch,
/// the way the host page's observer coalesces its records.
#[derive(Clone)]
pub struct ScriptedFeed {
    page: PageHandle,
    locator: RegionLocator,
    state: Arc<Mutex<FeedState>>,
}

impl ScriptedFeed {
    pub fn new(page: PageHandle, locator: RegionLocator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            page,
            locator,
            state: Arc::new(Mutex::new(FeedState {
                config: ObserveConfig::default(),
                sender: Some(tx),
                receiver: Some(rx),
            })),
        }
    }

    /// Replace the watched region with `subtree` and notify observers.
    /// A no-op when the region is absent from the page or the feed has been
    /// disconnected.
    pub fn apply(&self, subtree: PageNode) {
        let Some(path) = self.page.read(|root| (self.locator)(root)) else {
            debug!("Watched region not present, dropping update");
            return;
        };
        if !self.page.replace_at(&path, subtree) {
            return;
        }

        let state = self.state.lock().unwrap();
        let Some(sender) = &state.sender else {
            return;
        };
        let mut batch = Vec::new();
        if state.config.child_list {
            batch.push(MutationRecord {
                kind: MutationKind::ChildList,
                path: path.clone(),
            });
        }
        if state.config.character_data {
            batch.push(MutationRecord {
                kind: MutationKind::CharacterData,
                path,
            });
        }
        if !batch.is_empty() {
            let _ = sender.send(batch);
        }
    }
}

impl ChangeFeed for ScriptedFeed {
    fn observe(&self, config: ObserveConfig) -> Option<mpsc::UnboundedReceiver<MutationBatch>> {
        let mut state = self.state.lock().unwrap();
        state.config = config;
        state.receiver.take()
    }

    fn disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        state.sender = None;
    }
}
