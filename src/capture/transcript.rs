//! Mutation-driven transcript reconciliation state machine.
//!
//! The caption region only ever shows a sliding window of recent speech:
//! the host page silently truncates old text and drops or merges nodes.
//! This reconciler turns repeated snapshots of that window into a clean
//! sequence of finalized transcript blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::capture::health::{CaptureError, CaptureHealth};
use crate::capture::{now_iso, SelfName, TranscriptBlock, TranscriptBuffer, TurnState};
use crate::notify::{ErrorCode, Notifier, Reporter, StatusNotice};
use crate::page::{selectors, MutationBatch, PageHandle, PageNode};
use crate::session::SessionHandle;

/// How caption slots are read out of the page. Chosen once at registration
/// and pinned for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Ordered child list of the aria region, ignoring the trailing
    /// "jump to bottom" control entry.
    Modern,
    /// Pre-redesign container, nested child-node indexing.
    Legacy,
}

impl ExtractionStrategy {
    /// Locate the caption region in the page. The modern structural match
    /// is tried first; the legacy match is the fallback.
    pub fn detect(root: &PageNode) -> Option<(Vec<usize>, ExtractionStrategy)> {
        if let Some(path) = root.find_path(&|n| {
            n.attr("role") == Some(selectors::CAPTION_REGION_ROLE)
                && n.attr("tabindex") == Some(selectors::CAPTION_REGION_TABINDEX)
        }) {
            return Some((path, Self::Modern));
        }
        root.find_path(&|n| n.has_class(selectors::LEGACY_CAPTION_CLASS))
            .map(|path| (path, Self::Legacy))
    }

    pub fn locate(&self, root: &PageNode) -> Option<Vec<usize>> {
        match self {
            Self::Modern => root.find_path(&|n| {
                n.attr("role") == Some(selectors::CAPTION_REGION_ROLE)
                    && n.attr("tabindex") == Some(selectors::CAPTION_REGION_TABINDEX)
            }),
            Self::Legacy => root.find_path(&|n| n.has_class(selectors::LEGACY_CAPTION_CLASS)),
        }
    }
}

/// Tunable reconciliation policy. The thresholds are reverse-engineered
/// from observed host behavior, not structural guarantees, hence config.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub self_placeholder: String,
    /// Modern strategy: a same-speaker text shrinking by more than this
    /// many chars means the page silently reset the speaker's window.
    pub modern_shrink_threshold: usize,
    /// Legacy strategy: force-remove a slot node once its text grows past
    /// this length, before the page starts dropping leading text.
    pub legacy_overflow_limit: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            self_placeholder: crate::capture::SELF_PLACEHOLDER.to_string(),
            modern_shrink_threshold: 250,
            legacy_overflow_limit: 250,
        }
    }
}

/// An extracted (speaker, text) pair plus the path of its backing node.
#[derive(Debug, Clone, PartialEq)]
struct Slot {
    speaker: String,
    text: String,
    path: Vec<usize>,
}

pub struct TranscriptReconciler {
    page: PageHandle,
    strategy: ExtractionStrategy,
    options: CaptureOptions,
    state: TurnState,
    self_name: SelfName,
    health: CaptureHealth,
    session: SessionHandle,
    notifier: Arc<dyn Notifier>,
    reporter: Reporter,
    ended: Arc<AtomicBool>,
}

impl TranscriptReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: PageHandle,
        strategy: ExtractionStrategy,
        options: CaptureOptions,
        self_name: SelfName,
        session: SessionHandle,
        notifier: Arc<dyn Notifier>,
        reporter: Reporter,
        ended: Arc<AtomicBool>,
    ) -> Self {
        Self {
            page,
            strategy,
            options,
            state: TurnState::Idle,
            self_name,
            health: CaptureHealth::default(),
            session,
            notifier,
            reporter,
            ended,
        }
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn health(&self) -> CaptureHealth {
        self.health
    }

    /// Change-notification entry point. Each record triggers a re-read of
    /// the current region state; nothing is ever thrown across this
    /// boundary, so one bad notification cannot stop future ones.
    pub fn on_mutation(&mut self, batch: &MutationBatch) {
        for _record in batch {
            if let Err(err) = self.process_snapshot() {
                self.capture_failure(ErrorCode::TranscriptCallback, &err);
            }
        }
        if let TurnState::Accumulating(buf) = &self.state {
            debug!("Transcript buffer [{}]: {}", buf.speaker, preview(&buf.text));
        }
    }

    /// Flush a non-empty in-progress turn; called once at session end,
    /// after the feed has drained.
    pub fn flush_final(&mut self) {
        if let TurnState::Accumulating(buf) = std::mem::take(&mut self.state) {
            self.finalize_buffer(buf);
        }
    }

    fn process_snapshot(&mut self) -> Result<(), CaptureError> {
        let Some(slots) = self.read_slots()? else {
            // Region not in the page right now; nothing to reconcile.
            return Ok(());
        };

        let Some(slot) = slots.last().cloned() else {
            // Speech gap: nobody is speaking, or the last speaker stopped.
            debug!("No active transcript");
            if let TurnState::Accumulating(buf) = std::mem::take(&mut self.state) {
                self.finalize_buffer(buf);
            }
            return Ok(());
        };

        if slot.speaker.is_empty() || slot.text.is_empty() {
            // Slot exists but its content has not settled yet.
            return Ok(());
        }

        match std::mem::take(&mut self.state) {
            TurnState::Idle => {
                self.state = TurnState::Accumulating(TranscriptBuffer::start(
                    &slot.speaker,
                    &slot.text,
                    &now_iso(),
                ));
            }
            TurnState::Accumulating(mut buf) => {
                if buf.speaker != slot.speaker {
                    // Speaker turnover: always flush, then start fresh.
                    self.finalize_buffer(buf);
                    self.state = TurnState::Accumulating(TranscriptBuffer::start(
                        &slot.speaker,
                        &slot.text,
                        &now_iso(),
                    ));
                } else {
                    match self.strategy {
                        ExtractionStrategy::Modern => {
                            let shrink =
                                buf.text.len() as i64 - slot.text.len() as i64;
                            if shrink > self.options.modern_shrink_threshold as i64 {
                                // The page reset this speaker's window
                                // (seen after ~30 min of continuous speech).
                                // Same speaker continues in a fresh block.
                                let speaker = buf.speaker.clone();
                                self.finalize_buffer(buf);
                                buf = TranscriptBuffer::start(&speaker, "", &now_iso());
                            }
                        }
                        ExtractionStrategy::Legacy => {
                            if slot.text.len() > self.options.legacy_overflow_limit {
                                // Force a fresh backing node before the page
                                // starts dropping leading text. The next
                                // notification picks the new node up through
                                // the ordinary turnover path; the logical
                                // turn continues.
                                info!(
                                    "Force-removing overflowing caption node ({} chars)",
                                    slot.text.len()
                                );
                                self.page.remove_at(&slot.path);
                            }
                        }
                    }
                    buf.text = slot.text.clone();
                    self.state = TurnState::Accumulating(buf);
                }
            }
        }
        Ok(())
    }

    /// Current slots, or `None` when the region (or its inner container)
    /// is absent. An empty vec means the region is present but holds no
    /// meaningful speaker entries.
    fn read_slots(&self) -> Result<Option<Vec<Slot>>, CaptureError> {
        let strategy = self.strategy;
        self.page.read(|root| {
            let Some(region_path) = strategy.locate(root) else {
                return Ok(None);
            };
            let region = root
                .node_at(&region_path)
                .ok_or(CaptureError::CaptionRegionMissing)?;
            match strategy {
                ExtractionStrategy::Modern => {
                    // The last child is the "jump to bottom" control, never
                    // a speaker slot.
                    if region.children.len() <= 1 {
                        return Ok(Some(Vec::new()));
                    }
                    let count = region.children.len() - 1;
                    let mut slots = Vec::with_capacity(count);
                    for (i, node) in region.children[..count].iter().enumerate() {
                        let mut path = region_path.clone();
                        path.push(i);
                        slots.push(read_slot(node, path)?);
                    }
                    Ok(Some(slots))
                }
                ExtractionStrategy::Legacy => {
                    let Some(container) = region
                        .children
                        .get(1)
                        .and_then(|wrap| wrap.children.first())
                    else {
                        return Ok(None);
                    };
                    let mut slots = Vec::with_capacity(container.children.len());
                    for (i, node) in container.children.iter().enumerate() {
                        let mut path = region_path.clone();
                        path.extend([1, 0, i]);
                        slots.push(read_slot(node, path)?);
                    }
                    Ok(Some(slots))
                }
            }
        })
    }

    fn finalize_buffer(&mut self, buf: TranscriptBuffer) {
        if buf.speaker.is_empty() || buf.text.is_empty() {
            return;
        }
        let block = TranscriptBlock {
            speaker_name: self
                .self_name
                .substitute(&buf.speaker, &self.options.self_placeholder),
            timestamp_iso: buf.turn_started_at,
            text: buf.text,
        };
        self.session.append_transcript(block);
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

fn read_slot(node: &PageNode, path: Vec<usize>) -> Result<Slot, CaptureError> {
    let speaker = node
        .children
        .first()
        .ok_or_else(|| CaptureError::SlotStructure("missing speaker node".to_string()))?
        .text_content();
    let text = node
        .children
        .get(1)
        .ok_or_else(|| CaptureError::SlotStructure("missing text node".to_string()))?
        .text_content();
    Ok(Slot {
        speaker: speaker.trim().to_string(),
        text: text.trim().to_string(),
        path,
    })
}

fn preview(text: &str) -> String {
    if text.len() > 125 {
        let head: String = text.chars().take(50).collect();
        let tail: String = text
            .chars()
            .rev()
            .take(50)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{} ... {}", head, tail)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::page::{MutationKind, MutationRecord};
    use crate::session::testing::MemoryStore;
    use crate::session::SessionRecord;

    fn slot_node(speaker: &str, text: &str) -> PageNode {
        PageNode::elem("div").with_children(vec![
            PageNode::elem("div").with_text(speaker),
            PageNode::elem("div").with_text(text),
        ])
    }

    fn modern_region(slots: &[(&str, &str)]) -> PageNode {
        let mut children: Vec<PageNode> = slots
            .iter()
            .map(|(speaker, text)| slot_node(speaker, text))
            .collect();
        children.push(PageNode::elem("button").with_text("Jump to bottom"));
        PageNode::elem("div")
            .with_attr("role", "region")
            .with_attr("tabindex", "0")
            .with_children(children)
    }

    fn legacy_region(slots: &[(&str, &str)]) -> PageNode {
        let container = PageNode::elem("div").with_children(
            slots
                .iter()
                .map(|(speaker, text)| slot_node(speaker, text))
                .collect(),
        );
        PageNode::elem("div").with_class("a4cQT").with_children(vec![
            PageNode::elem("div"),
            PageNode::elem("div").with_children(vec![container]),
        ])
    }

    struct Harness {
        page: PageHandle,
        store: Arc<MemoryStore>,
        reconciler: TranscriptReconciler,
        session: SessionHandle,
    }

    fn harness(region: PageNode) -> Harness {
        let page = PageHandle::new(PageNode::elem("body").with_children(vec![region]));
        let (_, strategy) =
            page.read(|root| ExtractionStrategy::detect(root)).expect("region present");
        let store = Arc::new(MemoryStore::default());
        let session = SessionHandle::new(SessionRecord::new("Test"), store.clone());
        let reconciler = TranscriptReconciler::new(
            page.clone(),
            strategy,
            CaptureOptions::default(),
            SelfName::default(),
            session.clone(),
            Arc::new(LogNotifier),
            Reporter::new(None),
            Arc::new(AtomicBool::new(false)),
        );
        Harness {
            page,
            store,
            reconciler,
            session,
        }
    }

    fn notify(h: &mut Harness) {
        h.reconciler.on_mutation(&vec![MutationRecord {
            kind: MutationKind::ChildList,
            path: vec![0],
        }]);
    }

    fn set_region(h: &Harness, region: PageNode) {
        h.page.replace_at(&[0], region);
    }

    #[tokio::test]
    async fn test_gap_sequence_never_appends_empty_blocks() {
        let mut h = harness(modern_region(&[]));
        for _ in 0..3 {
            notify(&mut h);
        }
        assert_eq!(*h.reconciler.state(), TurnState::Idle);
        assert!(h.session.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_continuation_emits_single_block_on_gap() {
        let mut h = harness(modern_region(&[("Alice", "Hel")]));
        notify(&mut h);
        set_region(&h, modern_region(&[("Alice", "Hello there")]));
        notify(&mut h);
        set_region(&h, modern_region(&[("Alice", "Hello there, friends")]));
        notify(&mut h);
        assert!(h.session.snapshot().transcript.is_empty());

        set_region(&h, modern_region(&[]));
        notify(&mut h);

        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].speaker_name, "Alice");
        assert_eq!(transcript[0].text, "Hello there, friends");
        assert_eq!(*h.reconciler.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_turnover_flushes_previous_speaker_first() {
        let mut h = harness(modern_region(&[("A", "x")]));
        notify(&mut h);
        set_region(&h, modern_region(&[("A", "x"), ("B", "y")]));
        notify(&mut h);
        set_region(&h, modern_region(&[]));
        notify(&mut h);

        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].speaker_name, "A");
        assert_eq!(transcript[0].text, "x");
        assert_eq!(transcript[1].speaker_name, "B");
        assert_eq!(transcript[1].text, "y");
    }

    #[tokio::test]
    async fn test_modern_window_reset_finalizes_before_continuing() {
        let long = "a".repeat(1000);
        let short = "b".repeat(700);
        let mut h = harness(modern_region(&[("Alice", &long)]));
        notify(&mut h);

        // Delta of -300 exceeds the shrink threshold: block boundary.
        set_region(&h, modern_region(&[("Alice", &short)]));
        notify(&mut h);

        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].text, long);
        match h.reconciler.state() {
            TurnState::Accumulating(buf) => {
                assert_eq!(buf.speaker, "Alice");
                assert_eq!(buf.text, short);
            }
            TurnState::Idle => panic!("same speaker should keep accumulating"),
        }
    }

    #[tokio::test]
    async fn test_modern_small_shrink_is_not_a_boundary() {
        let long = "a".repeat(400);
        let shorter = "a".repeat(300);
        let mut h = harness(modern_region(&[("Alice", &long)]));
        notify(&mut h);
        set_region(&h, modern_region(&[("Alice", &shorter)]));
        notify(&mut h);
        assert!(h.session.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_overflow_force_removes_slot_node() {
        let long = "a".repeat(300);
        let mut h = harness(legacy_region(&[("Alice", "short")]));
        notify(&mut h);
        set_region(&h, legacy_region(&[("Alice", &long)]));
        notify(&mut h);

        // No block boundary: the turn continues under a fresh node.
        assert!(h.session.snapshot().transcript.is_empty());
        match h.reconciler.state() {
            TurnState::Accumulating(buf) => assert_eq!(buf.text, long),
            TurnState::Idle => panic!("turn should continue"),
        }
        // The backing slot node was removed from the page.
        let remaining = h.page.read(|root| {
            root.node_at(&[0, 1, 0]).map(|c| c.children.len())
        });
        assert_eq!(remaining, Some(0));
    }

    #[tokio::test]
    async fn test_self_placeholder_substitution_at_finalization() {
        let self_name = SelfName::default();
        let mut h = harness(modern_region(&[("You", "mine")]));
        h.reconciler.self_name = self_name.clone();
        notify(&mut h);
        self_name.resolve("Alice");
        set_region(&h, modern_region(&[]));
        notify(&mut h);

        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript[0].speaker_name, "Alice");
    }

    #[tokio::test]
    async fn test_no_retroactive_rewrite_when_name_resolves_late() {
        let self_name = SelfName::default();
        let mut h = harness(modern_region(&[("You", "mine")]));
        h.reconciler.self_name = self_name.clone();
        notify(&mut h);
        set_region(&h, modern_region(&[]));
        notify(&mut h);

        self_name.resolve("Alice");
        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript[0].speaker_name, "You");
    }

    #[tokio::test]
    async fn test_structure_failure_latches_once_and_keeps_running() {
        let broken = PageNode::elem("div")
            .with_attr("role", "region")
            .with_attr("tabindex", "0")
            .with_children(vec![
                PageNode::elem("div").with_children(vec![PageNode::elem("div").with_text("A")]),
                PageNode::elem("button").with_text("Jump to bottom"),
            ]);
        let mut h = harness(broken);
        notify(&mut h);
        assert!(h.reconciler.health().is_degraded());

        // Structure recovers; extraction is re-attempted and succeeds.
        set_region(&h, modern_region(&[("A", "hello")]));
        notify(&mut h);
        set_region(&h, modern_region(&[]));
        notify(&mut h);
        assert_eq!(h.session.snapshot().transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_final_pushes_pending_buffer() {
        let mut h = harness(modern_region(&[("Alice", "last words")]));
        notify(&mut h);
        h.reconciler.flush_final();
        let transcript = h.session.snapshot().transcript;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].text, "last words");
    }

    #[tokio::test]
    async fn test_persist_called_per_finalized_block() {
        let mut h = harness(modern_region(&[("A", "x")]));
        notify(&mut h);
        set_region(&h, modern_region(&[("B", "y")]));
        notify(&mut h);
        set_region(&h, modern_region(&[]));
        notify(&mut h);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(h.store.sets.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_strategy_detection_prefers_modern() {
        let root = PageNode::elem("body").with_children(vec![
            legacy_region(&[]),
            modern_region(&[]),
        ]);
        let (path, strategy) = ExtractionStrategy::detect(&root).unwrap();
        assert_eq!(strategy, ExtractionStrategy::Modern);
        assert_eq!(path, vec![1]);

        let legacy_only = PageNode::elem("body").with_children(vec![legacy_region(&[])]);
        let (_, strategy) = ExtractionStrategy::detect(&legacy_only).unwrap();
        assert_eq!(strategy, ExtractionStrategy::Legacy);
    }
}
