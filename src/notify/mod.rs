//! User-facing notices and fire-and-forget diagnostics reporting.
//!
//! The banner surface itself lives outside this crate; the core only talks
//! to the [`Notifier`] trait. Diagnostics carry a stable error code so
//! field reports stay greppable across releases.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A user-visible notice. `status` 200 means "running fine"; anything else
/// renders as a warning banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusNotice {
    pub status: u16,
    pub message: String,
}

impl StatusNotice {
    pub fn running() -> Self {
        Self {
            status: 200,
            message: "Meetscribe is running. Do not turn off captions.".to_string(),
        }
    }

    pub fn degraded() -> Self {
        Self {
            status: 400,
            message: "Meetscribe hit an unexpected page structure. Capture may be incomplete."
                .to_string(),
        }
    }

    pub fn manual_mode() -> Self {
        Self {
            status: 400,
            message: "Meetscribe is idle. Turn on captions to start capturing.".to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == 200
    }
}

/// Banner surface, implemented by the embedding layer.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &StatusNotice);
}

/// Default surface: log only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &StatusNotice) {
        if notice.is_enabled() {
            info!("Notice: {}", notice.message);
        } else {
            warn!("Notice: {}", notice.message);
        }
    }
}

/// Stable diagnostic codes, one per failure site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    CaptionRegistration,
    ChatRegionWait,
    ChatRegistration,
    EndControlMissing,
    TranscriptCallback,
    ChatCallback,
    TitleMissing,
    StatusFetch,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaptionRegistration => "001",
            Self::ChatRegionWait => "002",
            Self::ChatRegistration => "003",
            Self::EndControlMissing => "004",
            Self::TranscriptCallback => "005",
            Self::ChatCallback => "006",
            Self::TitleMissing => "007",
            Self::StatusFetch => "008",
        }
    }
}

/// Posts anonymous error codes to a diagnostics endpoint. Delivery is
/// fire-and-forget: the result is only ever logged, never awaited by the
/// capture path.
#[derive(Clone)]
pub struct Reporter {
    client: reqwest::Client,
    endpoint: Option<String>,
    version: String,
}

impl Reporter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn report(&self, code: ErrorCode, error: &dyn std::fmt::Display) {
        warn!("Capture error [{}]: {}", code.as_str(), error);
        let Some(endpoint) = self.endpoint.clone() else {
            debug!("No report endpoint configured, keeping error local");
            return;
        };
        let client = self.client.clone();
        let version = self.version.clone();
        let error = error.to_string();
        tokio::spawn(async move {
            let result = client
                .get(&endpoint)
                .query(&[
                    ("version", version.as_str()),
                    ("code", code.as_str()),
                    ("error", error.as_str()),
                ])
                .send()
                .await;
            if let Err(e) = result {
                debug!("Diagnostics report failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorCode::CaptionRegistration.as_str(), "001");
        assert_eq!(ErrorCode::TranscriptCallback.as_str(), "005");
        assert_eq!(ErrorCode::ChatCallback.as_str(), "006");
        assert_eq!(ErrorCode::StatusFetch.as_str(), "008");
    }

    #[test]
    fn test_notice_enabled() {
        assert!(StatusNotice::running().is_enabled());
        assert!(!StatusNotice::degraded().is_enabled());
    }

    #[tokio::test]
    async fn test_reporter_without_endpoint_is_a_noop() {
        let reporter = Reporter::new(None);
        reporter.report(ErrorCode::TitleMissing, &"missing");
    }
}
