//! Remote kill switch / banner text fetch.
//!
//! A small JSON document at the configured endpoint controls whether capture
//! runs and what the startup banner says. Any fetch or parse failure is
//! reported and treated as "enabled": the endpoint being down must never
//! stop capture.

use tracing::{debug, info};

use crate::notify::{ErrorCode, Reporter, StatusNotice};

pub async fn check_status(endpoint: Option<&str>, reporter: &Reporter) -> StatusNotice {
    let Some(endpoint) = endpoint else {
        debug!("No status endpoint configured, assuming enabled");
        return StatusNotice::running();
    };
    match fetch(endpoint).await {
        Ok(notice) => {
            info!("Remote status: {} ({})", notice.status, notice.message);
            notice
        }
        Err(err) => {
            reporter.report(ErrorCode::StatusFetch, &err);
            StatusNotice::running()
        }
    }
}

async fn fetch(endpoint: &str) -> Result<StatusNotice, reqwest::Error> {
    reqwest::get(endpoint).await?.json::<StatusNotice>().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_endpoint_defaults_to_enabled() {
        let notice = check_status(None, &Reporter::new(None)).await;
        assert!(notice.is_enabled());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_defaults_to_enabled() {
        let notice = check_status(Some("http://127.0.0.1:1/status"), &Reporter::new(None)).await;
        assert!(notice.is_enabled());
    }
}
