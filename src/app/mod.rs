//! Replay driver: runs a full session lifecycle against a scripted page.
//!
//! A capture script is a JSON list of timed page events, the same sequence
//! the live page would produce. Replaying one exercises the whole pipeline:
//! start detection, reconciliation, persistence, teardown and delivery.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::meetings::Meetings;
use crate::notify::{LogNotifier, Reporter};
use crate::page::{selectors, PageHandle, PageNode};
use crate::session::store::JsonFileStore;
use crate::session::{LifecyclePhase, SessionLifecycleController};

/// One timed page event.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    /// Wait this long before applying the event.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptAction {
    /// The page resolved the local participant's display name.
    SelfName { name: String },
    /// The end-call affordance rendered; the session is live.
    EndControlAppears,
    /// New caption region contents.
    CaptionRegion { region: PageNode },
    /// New chat region contents.
    ChatRegion { region: PageNode },
    /// The user clicked the end-call affordance.
    EndCallClick,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureScript {
    #[serde(default)]
    pub title: Option<String>,
    pub steps: Vec<ScriptStep>,
}

impl CaptureScript {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }
}

// Fixed slots of the scripted page. The end control is appended last, after
// these.
pub const SELF_NAME_SLOT: usize = 0;
pub const TITLE_SLOT: usize = 1;

/// A page in the pre-session state: name and title placeholders, control
/// affordances, empty caption and chat regions. No end-call control yet.
pub fn initial_page(title: &str) -> PageNode {
    PageNode::elem("body").with_children(vec![
        PageNode::elem("div").with_class(selectors::SELF_NAME_CLASS),
        PageNode::elem("div")
            .with_class(selectors::MEETING_TITLE_CLASS)
            .with_text(title),
        PageNode::elem("i")
            .with_class(selectors::CONTROL_ICON_CLASS)
            .with_text(selectors::CAPTIONS_GLYPH),
        PageNode::elem("i")
            .with_class(selectors::CONTROL_ICON_CLASS)
            .with_text(selectors::CHAT_TOGGLE_GLYPH),
        PageNode::elem("div")
            .with_attr("role", selectors::CAPTION_REGION_ROLE)
            .with_attr("tabindex", selectors::CAPTION_REGION_TABINDEX)
            .with_children(vec![PageNode::elem("button").with_text("Jump to bottom")]),
        PageNode::elem("div")
            .with_attr("aria-live", selectors::CHAT_REGION_ARIA_LIVE)
            .with_class(selectors::CHAT_REGION_CLASS),
    ])
}

fn end_control() -> PageNode {
    PageNode::elem("i")
        .with_class(selectors::CONTROL_ICON_CLASS)
        .with_text(selectors::END_CALL_GLYPH)
}

pub async fn run_replay(config: &Config, script_path: &PathBuf) -> Result<()> {
    let script = CaptureScript::load(script_path)?;
    let store = Arc::new(JsonFileStore::open_default()?);
    let outcome = replay(config, script, store.clone()).await?;
    if let Some(outcome) = outcome {
        println!(
            "Session filed as meeting {} in {}",
            outcome.filed_index,
            store.meetings_path().display()
        );
        deliver(config, outcome).await?;
    }
    Ok(())
}

/// Index of the session the replay filed, when one was filed.
struct ReplayOutcome {
    filed_index: usize,
}

async fn replay(
    config: &Config,
    script: CaptureScript,
    store: Arc<JsonFileStore>,
) -> Result<Option<ReplayOutcome>> {
    let title = script.title.as_deref().unwrap_or("Meeting");
    let page = PageHandle::new(initial_page(title));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = SessionLifecycleController::new(
        page.clone(),
        config.lifecycle_options(),
        config.capture_options(),
        store.clone(),
        Arc::new(LogNotifier),
        Reporter::new(config.status.report_endpoint.clone()),
        events_tx,
    )?;

    if !controller.prepare().await? {
        info!("Capture disabled remotely, not starting");
        return Ok(None);
    }

    for step in script.steps {
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        match step.action {
            ScriptAction::SelfName { name } => {
                page.set_text_at(&[SELF_NAME_SLOT], &name);
            }
            ScriptAction::EndControlAppears => {
                page.append_child_at(&[], end_control());
                controller.wait_for_start().await;
            }
            ScriptAction::CaptionRegion { region } => match controller.transcript_feed() {
                Some(feed) => feed.apply(region),
                None => warn!("Caption update before session start, dropping"),
            },
            ScriptAction::ChatRegion { region } => match controller.chat_feed() {
                Some(feed) => feed.apply(region),
                None => warn!("Chat update before session start, dropping"),
            },
            ScriptAction::EndCallClick => {
                controller.end().await?;
                break;
            }
        }
    }
    // A script may simply run out of events mid-session.
    if controller.phase() == LifecyclePhase::Active {
        controller.end().await?;
    }

    let mut ended = false;
    while let Ok(event) = events_rx.try_recv() {
        info!("Session event: {:?}", event);
        ended |= event == crate::session::SessionEvent::Ended;
    }
    if !ended {
        return Ok(None);
    }
    let filed = store.load_meetings().await?;
    Ok(filed.len().checked_sub(1).map(|filed_index| ReplayOutcome { filed_index }))
}

/// Post-session delivery per config: webhook auto-post.
async fn deliver(config: &Config, outcome: ReplayOutcome) -> Result<()> {
    if !config.webhook.auto_post {
        return Ok(());
    }
    let Some(url) = &config.webhook.url else {
        info!("No webhook URL configured, skipping auto-post");
        return Ok(());
    };
    let meetings = Meetings::open_default()?;
    if let Err(e) = meetings
        .post_at(outcome.filed_index, url, config.webhook.body_type)
        .await
    {
        warn!("Auto-post failed, session kept for manual posting: {:#}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::find_by_class;

    #[test]
    fn test_initial_page_slots_match_constants() {
        let page = initial_page("Weekly sync");
        assert_eq!(
            find_by_class(&page, selectors::SELF_NAME_CLASS),
            Some(vec![SELF_NAME_SLOT])
        );
        assert_eq!(
            find_by_class(&page, selectors::MEETING_TITLE_CLASS),
            Some(vec![TITLE_SLOT])
        );
        // No end-call control before the session starts.
        assert!(page
            .find_path(&|n| n.text_content() == selectors::END_CALL_GLYPH)
            .is_none());
    }

    #[test]
    fn test_script_parses_tagged_events() {
        let script: CaptureScript = serde_json::from_str(
            r#"{
                "title": "Weekly sync",
                "steps": [
                    {"event": "self_name", "name": "Alice"},
                    {"delay_ms": 10, "event": "end_control_appears"},
                    {"event": "caption_region", "region": {"tag": "div"}},
                    {"event": "end_call_click"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(
            script.steps[0].action,
            ScriptAction::SelfName { ref name } if name == "Alice"
        ));
        assert_eq!(script.steps[1].delay_ms, 10);
        assert!(matches!(script.steps[3].action, ScriptAction::EndCallClick));
    }
}
