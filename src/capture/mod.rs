//! Capture core data model shared by the transcript and chat reconcilers.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

pub mod chat;
pub mod health;
pub mod transcript;

pub use chat::ChatReconciler;
pub use health::{CaptureError, CaptureHealth};
pub use transcript::{ExtractionStrategy, TranscriptReconciler};

/// Reserved label the host page uses for the local participant.
pub const SELF_PLACEHOLDER: &str = "You";

/// One finalized speaker turn. Immutable once appended; never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptBlock {
    pub speaker_name: String,
    pub timestamp_iso: String,
    pub text: String,
}

/// One chat message. Immutable once appended; uniqueness enforced at
/// insertion (see [`crate::session::SessionRecord::push_unique_chat`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBlock {
    pub sender_name: String,
    pub timestamp_iso: String,
    pub text: String,
}

/// In-progress, not-yet-finalized utterance.
///
/// Invariant: a non-empty `speaker` implies a non-empty `turn_started_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptBuffer {
    pub speaker: String,
    pub text: String,
    pub turn_started_at: String,
}

impl TranscriptBuffer {
    pub fn start(speaker: &str, text: &str, timestamp: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            text: text.to_string(),
            turn_started_at: timestamp.to_string(),
        }
    }
}

/// Reconciler state: either between turns or accumulating one.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TurnState {
    #[default]
    Idle,
    Accumulating(TranscriptBuffer),
}

/// One-time, best-effort resolved display name of the local participant.
///
/// Captured opportunistically before the session starts; when unresolved,
/// the placeholder is kept. Substitution happens at block-finalization
/// time only — stored blocks are never rewritten retroactively.
#[derive(Clone, Default)]
pub struct SelfName {
    inner: Arc<Mutex<Option<String>>>,
}

impl SelfName {
    pub fn resolve(&self, name: &str) {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return;
        }
        let mut slot = self.inner.lock().unwrap();
        if slot.is_none() {
            *slot = Some(trimmed.to_string());
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }

    /// Substitute the self placeholder with the resolved name, if any.
    pub fn substitute(&self, raw: &str, placeholder: &str) -> String {
        if raw == placeholder {
            if let Some(resolved) = self.get() {
                return resolved;
            }
        }
        raw.to_string()
    }
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_name_resolves_once() {
        let name = SelfName::default();
        assert_eq!(name.get(), None);
        name.resolve("  Alice  ");
        name.resolve("Bob");
        assert_eq!(name.get(), Some("Alice".to_string()));
    }

    #[test]
    fn test_self_name_ignores_empty() {
        let name = SelfName::default();
        name.resolve("   ");
        assert_eq!(name.get(), None);
    }

    #[test]
    fn test_substitute_only_replaces_placeholder() {
        let name = SelfName::default();
        assert_eq!(name.substitute("You", SELF_PLACEHOLDER), "You");
        name.resolve("Alice");
        assert_eq!(name.substitute("You", SELF_PLACEHOLDER), "Alice");
        assert_eq!(name.substitute("Bob", SELF_PLACEHOLDER), "Bob");
    }

    #[test]
    fn test_block_serialization_field_names() {
        let block = TranscriptBlock {
            speaker_name: "Alice".to_string(),
            timestamp_iso: "2026-01-01T00:00:00Z".to_string(),
            text: "Hi".to_string(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"speakerName\""));
        assert!(json.contains("\"timestampIso\""));
    }
}
