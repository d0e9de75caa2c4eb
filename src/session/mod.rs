//! Session record, shared live-session handle and the store collaborator
//! interface.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::capture::{ChatBlock, TranscriptBlock};

pub mod lifecycle;
pub mod store;

pub use lifecycle::{LifecyclePhase, SessionLifecycleController};
pub use store::JsonFileStore;

/// Delivery state of a closed session's webhook post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookPostStatus {
    #[default]
    New,
    Successful,
    Failed,
}

/// Persisted shape of one session. Field names match the records written
/// by earlier releases, so old stores keep deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub meeting_start_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_end_timestamp: Option<String>,
    pub meeting_title: String,
    #[serde(default)]
    pub transcript: Vec<TranscriptBlock>,
    #[serde(default)]
    pub chat_messages: Vec<ChatBlock>,
    #[serde(default)]
    pub webhook_post_status: WebhookPostStatus,
}

impl SessionRecord {
    pub fn new(title: &str) -> Self {
        Self {
            meeting_start_timestamp: crate::capture::now_iso(),
            meeting_end_timestamp: None,
            meeting_title: title.to_string(),
            transcript: Vec::new(),
            chat_messages: Vec::new(),
            webhook_post_status: WebhookPostStatus::New,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() && self.chat_messages.is_empty()
    }

    /// Insert a chat block unless an existing block from the same sender is
    /// contained in the candidate's text. The host page appends trailing
    /// control text (pin affordance label) to a message after it stabilizes,
    /// so the longer near-duplicate must lose to the original.
    pub fn push_unique_chat(&mut self, block: ChatBlock) -> bool {
        let exists = self
            .chat_messages
            .iter()
            .any(|m| m.sender_name == block.sender_name && block.text.contains(&m.text));
        if exists {
            return false;
        }
        self.chat_messages.push(block);
        true
    }

    pub fn close(&mut self, end_timestamp: &str) {
        self.meeting_end_timestamp = Some(end_timestamp.to_string());
    }

    /// Distinct speaker names in speaking order.
    pub fn participants(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for block in &self.transcript {
            if !seen.contains(&block.speaker_name) {
                seen.push(block.speaker_name.clone());
            }
        }
        seen
    }
}

/// Outcome of the best-effort startup recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// An unsaved prior session was closed and filed.
    Recovered,
    /// A prior session existed but held no data.
    NothingToRecover,
    /// No prior session was pending.
    NoRecoveryNeeded,
}

/// Session lifecycle events emitted to the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Ended,
}

/// Durable persistence collaborator. The core only ever writes: `set` runs
/// after every finalized block, `finalize` at session end. Reads belong to
/// the outer layers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrite the live session snapshot. Each call carries the full
    /// current arrays; last write wins.
    async fn set(&self, record: &SessionRecord) -> Result<()>;

    /// File the closed session and clear the live snapshot.
    async fn finalize(&self, record: &SessionRecord) -> Result<()>;

    /// Recover an unsaved prior session, if one is pending.
    async fn recover_last(&self) -> Result<RecoveryOutcome>;
}

/// Shared handle to the live session.
///
/// The record is owned here behind a mutex taken only for short synchronous
/// sections; persistence is fire-and-forget so the reconciliation path never
/// blocks on storage. Out-of-order completion of the spawned writes is
/// harmless: every write carries the full, monotonically growing arrays.
#[derive(Clone)]
pub struct SessionHandle {
    record: Arc<Mutex<SessionRecord>>,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(record: SessionRecord, store: Arc<dyn SessionStore>) -> Self {
        Self {
            record: Arc::new(Mutex::new(record)),
            store,
        }
    }

    pub fn snapshot(&self) -> SessionRecord {
        self.record.lock().unwrap().clone()
    }

    pub fn append_transcript(&self, block: TranscriptBlock) {
        self.record.lock().unwrap().transcript.push(block);
        self.persist();
    }

    /// Returns true when the block was actually inserted.
    pub fn push_unique_chat(&self, block: ChatBlock) -> bool {
        let inserted = self.record.lock().unwrap().push_unique_chat(block);
        if inserted {
            self.persist();
        }
        inserted
    }

    pub fn set_title(&self, title: &str) {
        self.record.lock().unwrap().meeting_title = title.to_string();
        self.persist();
    }

    pub fn close(&self, end_timestamp: &str) {
        self.record.lock().unwrap().close(end_timestamp);
    }

    /// Spawn a write of the current snapshot. Completion is observed only
    /// for logging.
    pub fn persist(&self) {
        let snapshot = self.snapshot();
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.set(&snapshot).await {
                warn!("Session persist failed: {:#}", e);
            }
        });
    }
}
