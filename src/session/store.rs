//! JSON file store: `current.json` holds the live session snapshot,
//! `meetings.json` the closed sessions, both under the data dir.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{RecoveryOutcome, SessionRecord, SessionStore};

pub struct JsonFileStore {
    current_path: PathBuf,
    meetings_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            current_path: data_dir.join("current.json"),
            meetings_path: data_dir.join("meetings.json"),
        }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(&crate::global::data_dir()?))
    }

    pub fn meetings_path(&self) -> &Path {
        &self.meetings_path
    }

    pub async fn load_meetings(&self) -> Result<Vec<SessionRecord>> {
        Ok(read_json(&self.meetings_path).await?.unwrap_or_default())
    }

    /// Apply `f` to the meeting at `index` and write the list back.
    pub async fn update_meeting(
        &self,
        index: usize,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<SessionRecord> {
        let mut meetings = self.load_meetings().await?;
        let meeting = meetings
            .get_mut(index)
            .with_context(|| format!("No meeting at index {}", index))?;
        f(meeting);
        let updated = meeting.clone();
        write_json(&self.meetings_path, &meetings).await?;
        Ok(updated)
    }

    async fn append_meeting(&self, record: &SessionRecord) -> Result<()> {
        let mut meetings = self.load_meetings().await?;
        meetings.push(record.clone());
        write_json(&self.meetings_path, &meetings).await
    }

    async fn clear_current(&self) -> Result<()> {
        match fs::remove_file(&self.current_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to clear live session snapshot"),
        }
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn set(&self, record: &SessionRecord) -> Result<()> {
        write_json(&self.current_path, record).await
    }

    async fn finalize(&self, record: &SessionRecord) -> Result<()> {
        self.append_meeting(record).await?;
        self.clear_current().await?;
        info!("Session filed: {}", record.meeting_title);
        Ok(())
    }

    async fn recover_last(&self) -> Result<RecoveryOutcome> {
        let Some(mut pending) = read_json::<SessionRecord>(&self.current_path).await? else {
            return Ok(RecoveryOutcome::NoRecoveryNeeded);
        };
        if pending.is_empty() {
            self.clear_current().await?;
            return Ok(RecoveryOutcome::NothingToRecover);
        }

        // Best available end time: the last captured block's timestamp.
        let end = pending
            .transcript
            .last()
            .map(|b| b.timestamp_iso.clone())
            .or_else(|| pending.chat_messages.last().map(|b| b.timestamp_iso.clone()))
            .unwrap_or_else(crate::capture::now_iso);
        pending.close(&end);

        self.append_meeting(&pending).await?;
        self.clear_current().await?;
        info!("Recovered unsaved session: {}", pending.meeting_title);
        Ok(RecoveryOutcome::Recovered)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            let value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No file at {:?}", path);
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create data directory")?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TranscriptBlock;

    fn record_with_block(title: &str) -> SessionRecord {
        let mut record = SessionRecord::new(title);
        record.transcript.push(TranscriptBlock {
            speaker_name: "Alice".to_string(),
            timestamp_iso: "2026-02-01T10:00:00Z".to_string(),
            text: "Hi".to_string(),
        });
        record
    }

    #[tokio::test]
    async fn test_set_then_finalize_moves_record_to_meetings() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let record = record_with_block("Standup");
        store.set(&record).await.unwrap();
        store.finalize(&record).await.unwrap();

        let meetings = store.load_meetings().await.unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].meeting_title, "Standup");
        assert_eq!(
            store.recover_last().await.unwrap(),
            RecoveryOutcome::NoRecoveryNeeded
        );
    }

    #[tokio::test]
    async fn test_recover_last_files_pending_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.set(&record_with_block("Interrupted")).await.unwrap();
        assert_eq!(
            store.recover_last().await.unwrap(),
            RecoveryOutcome::Recovered
        );

        let meetings = store.load_meetings().await.unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(
            meetings[0].meeting_end_timestamp.as_deref(),
            Some("2026-02-01T10:00:00Z")
        );

        // Second recovery finds nothing pending.
        assert_eq!(
            store.recover_last().await.unwrap(),
            RecoveryOutcome::NoRecoveryNeeded
        );
    }

    #[tokio::test]
    async fn test_recover_last_discards_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        store.set(&SessionRecord::new("Empty")).await.unwrap();
        assert_eq!(
            store.recover_last().await.unwrap(),
            RecoveryOutcome::NothingToRecover
        );
        assert!(store.load_meetings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_meeting_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.finalize(&record_with_block("Standup")).await.unwrap();

        let updated = store
            .update_meeting(0, |m| {
                m.webhook_post_status = super::super::WebhookPostStatus::Successful;
            })
            .await
            .unwrap();
        assert_eq!(
            updated.webhook_post_status,
            super::super::WebhookPostStatus::Successful
        );

        let meetings = store.load_meetings().await.unwrap();
        assert_eq!(
            meetings[0].webhook_post_status,
            super::super::WebhookPostStatus::Successful
        );
    }

    #[tokio::test]
    async fn test_update_meeting_out_of_range_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.update_meeting(3, |_| {}).await.is_err());
    }
}
