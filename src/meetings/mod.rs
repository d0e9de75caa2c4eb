//! Stored-meetings surface: listing, export and webhook re-posting.

use anyhow::{Context, Result};
use chrono::DateTime;
use std::path::PathBuf;
use tracing::warn;

use crate::export;
use crate::session::store::JsonFileStore;
use crate::session::{RecoveryOutcome, SessionRecord, SessionStore, WebhookPostStatus};
use crate::webhook::{WebhookBodyType, WebhookPoster};

/// One line of the meetings listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingSummary {
    pub index: usize,
    pub title: String,
    pub started: String,
    pub duration: String,
    pub post_status: WebhookPostStatus,
}

pub struct Meetings {
    store: JsonFileStore,
}

impl Meetings {
    pub fn new(store: JsonFileStore) -> Self {
        Self { store }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(JsonFileStore::open_default()?))
    }

    pub async fn list(&self) -> Result<Vec<MeetingSummary>> {
        let meetings = self.store.load_meetings().await?;
        Ok(meetings
            .iter()
            .enumerate()
            .map(|(index, m)| MeetingSummary {
                index,
                title: m.meeting_title.clone(),
                started: m.meeting_start_timestamp.clone(),
                duration: duration_label(m),
                post_status: m.webhook_post_status,
            })
            .collect())
    }

    pub async fn get(&self, index: usize) -> Result<SessionRecord> {
        let meetings = self.store.load_meetings().await?;
        meetings
            .into_iter()
            .nth(index)
            .with_context(|| format!("No meeting at index {}", index))
    }

    /// Export the meeting at `index` as a text file into `dir`.
    pub async fn export_at(&self, index: usize, dir: &PathBuf) -> Result<PathBuf> {
        let record = self.get(index).await?;
        export::export_to_dir(&record, dir).await
    }

    /// Post the meeting at `index` to the webhook and record the outcome.
    pub async fn post_at(
        &self,
        index: usize,
        url: &str,
        body_type: WebhookBodyType,
    ) -> Result<()> {
        let record = self.get(index).await?;
        let poster = WebhookPoster::new(url, body_type)?;
        let outcome = poster.post(&record).await;
        let status = match &outcome {
            Ok(()) => WebhookPostStatus::Successful,
            Err(e) => {
                warn!("Webhook post failed: {:#}", e);
                WebhookPostStatus::Failed
            }
        };
        self.store
            .update_meeting(index, |m| m.webhook_post_status = status)
            .await?;
        outcome
    }

    /// File any unsaved prior session.
    pub async fn recover(&self) -> Result<RecoveryOutcome> {
        self.store.recover_last().await
    }
}

/// "1h 12m" style label, or "unknown" when either timestamp is unusable.
fn duration_label(record: &SessionRecord) -> String {
    let Some(end) = &record.meeting_end_timestamp else {
        return "unknown".to_string();
    };
    let parse = |s: &str| DateTime::parse_from_rfc3339(s).ok();
    match (parse(&record.meeting_start_timestamp), parse(end)) {
        (Some(start), Some(end)) if end >= start => {
            let minutes = (end - start).num_minutes();
            if minutes >= 60 {
                format!("{}h {}m", minutes / 60, minutes % 60)
            } else {
                format!("{}m", minutes)
            }
        }
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TranscriptBlock;

    fn record(title: &str, start: &str, end: &str) -> SessionRecord {
        let mut record = SessionRecord::new(title);
        record.meeting_start_timestamp = start.to_string();
        record.transcript.push(TranscriptBlock {
            speaker_name: "Alice".to_string(),
            timestamp_iso: start.to_string(),
            text: "Hi".to_string(),
        });
        record.close(end);
        record
    }

    #[tokio::test]
    async fn test_list_reports_duration_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .finalize(&record(
                "Standup",
                "2026-02-01T10:00:00+00:00",
                "2026-02-01T10:25:00+00:00",
            ))
            .await
            .unwrap();
        store
            .finalize(&record(
                "Review",
                "2026-02-01T13:00:00+00:00",
                "2026-02-01T14:40:00+00:00",
            ))
            .await
            .unwrap();

        let meetings = Meetings::new(store);
        let listed = meetings.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Standup");
        assert_eq!(listed[0].duration, "25m");
        assert_eq!(listed[1].duration, "1h 40m");
        assert_eq!(listed[0].post_status, WebhookPostStatus::New);
    }

    #[tokio::test]
    async fn test_duration_unknown_without_end() {
        let record = SessionRecord::new("Open");
        assert_eq!(duration_label(&record), "unknown");
    }

    #[tokio::test]
    async fn test_export_at_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .finalize(&record(
                "Standup",
                "2026-02-01T10:00:00+00:00",
                "2026-02-01T10:25:00+00:00",
            ))
            .await
            .unwrap();

        let meetings = Meetings::new(store);
        let out = dir.path().join("exports");
        let path = meetings.export_at(0, &out).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_post_at_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store
            .finalize(&record(
                "Standup",
                "2026-02-01T10:00:00+00:00",
                "2026-02-01T10:25:00+00:00",
            ))
            .await
            .unwrap();

        let meetings = Meetings::new(JsonFileStore::new(dir.path()));
        let result = meetings
            .post_at(0, "http://127.0.0.1:1/hook", WebhookBodyType::Simple)
            .await;
        assert!(result.is_err());
        let listed = meetings.list().await.unwrap();
        assert_eq!(listed[0].post_status, WebhookPostStatus::Failed);
    }
}
