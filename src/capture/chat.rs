//! Chat panel reconciliation.
//!
//! The chat live region retains full history and fires many redundant
//! notifications per message, so only the most recently appended message
//! element is read; deduplication happens at insertion time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::capture::health::{CaptureError, CaptureHealth};
use crate::capture::{now_iso, ChatBlock, SelfName};
use crate::notify::{ErrorCode, Notifier, Reporter, StatusNotice};
use crate::page::{selectors, MutationBatch, PageHandle, PageNode};
use crate::session::SessionHandle;

pub fn locate_chat_region(root: &PageNode) -> Option<Vec<usize>> {
    root.find_path(&|n| {
        n.attr("aria-live") == Some(selectors::CHAT_REGION_ARIA_LIVE)
            && n.has_class(selectors::CHAT_REGION_CLASS)
    })
}

pub struct ChatReconciler {
    page: PageHandle,
    self_placeholder: String,
    self_name: SelfName,
    health: CaptureHealth,
    session: SessionHandle,
    notifier: Arc<dyn Notifier>,
    reporter: Reporter,
    ended: Arc<AtomicBool>,
}

impl ChatReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: PageHandle,
        self_placeholder: String,
        self_name: SelfName,
        session: SessionHandle,
        notifier: Arc<dyn Notifier>,
        reporter: Reporter,
        ended: Arc<AtomicBool>,
    ) -> Self {
        Self {
            page,
            self_placeholder,
            self_name,
            health: CaptureHealth::default(),
            session,
            notifier,
            reporter,
            ended,
        }
    }

    pub fn health(&self) -> CaptureHealth {
        self.health
    }

    pub fn on_mutation(&mut self, batch: &MutationBatch) {
        for _record in batch {
            if let Err(err) = self.process_snapshot() {
                self.capture_failure(ErrorCode::ChatCallback, &err);
            }
        }
    }

    fn process_snapshot(&mut self) -> Result<(), CaptureError> {
        let Some((sender, text)) = self.read_last_message()? else {
            return Ok(());
        };
        if sender.is_empty() || text.is_empty() {
            return Ok(());
        }
        let block = ChatBlock {
            sender_name: self.self_name.substitute(&sender, &self.self_placeholder),
            timestamp_iso: now_iso(),
            text,
        };
        if self.session.push_unique_chat(block) {
            debug!("Chat message captured from {}", sender);
        }
        Ok(())
    }

    /// Sender and text of the last message element, or `None` when the
    /// region is absent or empty.
    fn read_last_message(&self) -> Result<Option<(String, String)>, CaptureError> {
        self.page.read(|root| {
            let Some(path) = locate_chat_region(root) else {
                return Ok(None);
            };
            let region = root.node_at(&path).ok_or(CaptureError::ChatRegionMissing)?;
            let Some(message) = region.children.last() else {
                return Ok(None);
            };
            let sender = message
                .children
                .first()
                .and_then(|header| header.children.first())
                .ok_or_else(|| CaptureError::ChatStructure("missing sender node".to_string()))?
                .text_content();
            let text = message
                .children
                .last()
                .and_then(|body| body.children.last())
                .ok_or_else(|| CaptureError::ChatStructure("missing text node".to_string()))?
                .text_content();
            Ok(Some((sender.trim().to_string(), text.trim().to_string())))
        })
    }

    fn capture_failure(&mut self, code: ErrorCode, err: &CaptureError) {
        let first = self.health.degrade();
        if first && !self.ended.load(Ordering::SeqCst) {
            self.notifier.notify(&StatusNotice::degraded());
            self.reporter.report(code, err);
        } else {
            debug!("Suppressed capture error [{}]: {}", code.as_str(), err);
        }
    }
}
