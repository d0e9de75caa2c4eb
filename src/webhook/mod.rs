//! Webhook delivery of closed sessions.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::export;
use crate::session::SessionRecord;

/// Shape of the posted body. `Simple` flattens transcript and chat into
/// readable text; `Advanced` carries the structured arrays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookBodyType {
    #[default]
    Simple,
    Advanced,
}

pub struct WebhookPoster {
    client: reqwest::Client,
    url: String,
    body_type: WebhookBodyType,
}

impl WebhookPoster {
    pub fn new(url: &str, body_type: WebhookBodyType) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build webhook client")?,
            url: url.to_string(),
            body_type,
        })
    }

    pub fn body(&self, record: &SessionRecord) -> serde_json::Value {
        match self.body_type {
            WebhookBodyType::Simple => json!({
                "meetingTitle": record.meeting_title,
                "meetingStartTimestamp": record.meeting_start_timestamp,
                "meetingEndTimestamp": record.meeting_end_timestamp,
                "transcript": export::transcript_text(record),
                "chatMessages": export::chat_text(record),
            }),
            WebhookBodyType::Advanced => json!({
                "meetingTitle": record.meeting_title,
                "meetingStartTimestamp": record.meeting_start_timestamp,
                "meetingEndTimestamp": record.meeting_end_timestamp,
                "transcript": record.transcript,
                "chatMessages": record.chat_messages,
            }),
        }
    }

    pub async fn post(&self, record: &SessionRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.body(record))
            .send()
            .await
            .context("Webhook request failed")?;
        let status = response.status();
        if status.is_success() {
            info!("Webhook accepted session: {}", record.meeting_title);
            Ok(())
        } else {
            warn!("Webhook rejected session with {}", status);
            Err(anyhow!("Webhook returned {}", status))
        }
    }
}
