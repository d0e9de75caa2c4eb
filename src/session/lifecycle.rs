//! Session lifecycle: start detection, reconciler registration, teardown.
//!
//! The session is considered started when the end-call affordance first
//! appears in the page — counter-intuitive, but that control only renders
//! once the session is live, which makes it the reliable signal. The same
//! affordance's activation (a user click, wired in by the embedding layer
//! as a call to [`SessionLifecycleController::end`]) ends the session.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capture::chat::locate_chat_region;
use crate::capture::transcript::CaptureOptions;
use crate::capture::{ChatReconciler, ExtractionStrategy, SelfName, TranscriptReconciler};
use crate::capture::health::CaptureError;
use crate::config::OperationMode;
use crate::feed::{ChangeFeed, RegionLocator, ScriptedFeed};
use crate::notify::{ErrorCode, Notifier, Reporter, StatusNotice};
use crate::page::{find_by_class, find_control, selectors, ObserveConfig, PageHandle};
use crate::session::{SessionEvent, SessionHandle, SessionRecord, SessionStore};
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    NotStarted,
    Active,
    /// Terminal. All later errors are suppressed: page teardown races are
    /// expected and not actionable.
    Ended,
}

/// Cadences and mode switches, lifted out of [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub operation_mode: OperationMode,
    pub start_poll_interval: Duration,
    pub name_poll_interval: Duration,
    pub title_refresh_delay: Duration,
    pub recovery_timeout: Duration,
    pub status_endpoint: Option<String>,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::Auto,
            start_poll_interval: Duration::from_millis(100),
            name_poll_interval: Duration::from_millis(100),
            title_refresh_delay: Duration::from_millis(5000),
            recovery_timeout: Duration::from_millis(2000),
            status_endpoint: None,
        }
    }
}

pub struct SessionLifecycleController {
    page: PageHandle,
    options: LifecycleOptions,
    capture_options: CaptureOptions,
    store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    reporter: Reporter,
    events: mpsc::UnboundedSender<SessionEvent>,
    self_name: SelfName,
    phase: LifecyclePhase,
    status_notice: StatusNotice,
    session: Option<SessionHandle>,
    transcript_feed: Option<ScriptedFeed>,
    chat_feed: Option<ScriptedFeed>,
    feed_tasks: Vec<JoinHandle<()>>,
    aux_tasks: Vec<JoinHandle<()>>,
    started: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    end_glyph: Regex,
    captions_glyph: Regex,
    chat_glyph: Regex,
}

impl SessionLifecycleController {
    pub fn new(
        page: PageHandle,
        options: LifecycleOptions,
        capture_options: CaptureOptions,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        reporter: Reporter,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        Ok(Self {
            page,
            options,
            capture_options,
            store,
            notifier,
            reporter,
            events,
            self_name: SelfName::default(),
            phase: LifecyclePhase::NotStarted,
            status_notice: StatusNotice::running(),
            session: None,
            transcript_feed: None,
            chat_feed: None,
            feed_tasks: Vec::new(),
            aux_tasks: Vec::new(),
            started: Arc::new(AtomicBool::new(false)),
            ended: Arc::new(AtomicBool::new(false)),
            end_glyph: Regex::new(selectors::END_CALL_GLYPH).context("end glyph pattern")?,
            captions_glyph: Regex::new(selectors::CAPTIONS_GLYPH).context("captions pattern")?,
            chat_glyph: Regex::new(selectors::CHAT_TOGGLE_GLYPH).context("chat pattern")?,
        })
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn self_name(&self) -> SelfName {
        self.self_name.clone()
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session.clone()
    }

    pub fn transcript_feed(&self) -> Option<ScriptedFeed> {
        self.transcript_feed.clone()
    }

    pub fn chat_feed(&self) -> Option<ScriptedFeed> {
        self.chat_feed.clone()
    }

    /// Startup: best-effort recovery raced against its deadline, then the
    /// remote status check. Returns false when capture is remotely disabled;
    /// in that case only the downtime notice is shown.
    pub async fn prepare(&mut self) -> Result<bool> {
        match tokio::time::timeout(self.options.recovery_timeout, self.store.recover_last()).await
        {
            Ok(Ok(outcome)) => info!("Startup recovery: {:?}", outcome),
            Ok(Err(e)) => warn!("Startup recovery failed: {:#}", e),
            // Abandoned, never retried within this startup: recovery must
            // not delay the current session.
            Err(_) => warn!(
                "Startup recovery timed out after {:?}",
                self.options.recovery_timeout
            ),
        }

        self.status_notice =
            status::check_status(self.options.status_endpoint.as_deref(), &self.reporter).await;
        if !self.status_notice.is_enabled() {
            self.notifier.notify(&self.status_notice);
            return Ok(false);
        }

        self.spawn_self_name_poll();
        Ok(true)
    }

    /// Poll until the end-call affordance first appears, then activate.
    pub async fn wait_for_start(&mut self) {
        if self.phase != LifecyclePhase::NotStarted {
            return;
        }
        let mut ticker = tokio::time::interval(self.options.start_poll_interval);
        loop {
            ticker.tick().await;
            let found = self
                .page
                .read(|root| find_control(root, selectors::CONTROL_ICON_CLASS, &self.end_glyph))
                .is_some();
            if found {
                break;
            }
        }
        self.activate();
    }

    fn activate(&mut self) {
        info!("Session started");
        self.phase = LifecyclePhase::Active;
        self.started.store(true, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Started);

        let title = self
            .page
            .read(|root| {
                find_by_class(root, selectors::MEETING_TITLE_CLASS)
                    .and_then(|path| root.node_at(&path).map(|n| n.text_content()))
            })
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Meeting".to_string());
        let session = SessionHandle::new(SessionRecord::new(title.trim()), self.store.clone());
        session.persist();
        self.session = Some(session);

        if let Err(err) = self.register_transcript() {
            self.reporter.report(ErrorCode::CaptionRegistration, &err);
            self.notifier.notify(&StatusNotice::degraded());
        }
        match self.register_chat() {
            Ok(()) => {}
            Err(err @ CaptureError::ChatRegionMissing) => {
                self.reporter.report(ErrorCode::ChatRegionWait, &err);
                self.notifier.notify(&StatusNotice::degraded());
            }
            Err(err) => {
                self.reporter.report(ErrorCode::ChatRegistration, &err);
                self.notifier.notify(&StatusNotice::degraded());
            }
        }

        // The affordance was just sighted, but the page may re-render
        // between detection and the click hookup the embedding layer does.
        let end_control_present = self
            .page
            .read(|root| find_control(root, selectors::CONTROL_ICON_CLASS, &self.end_glyph))
            .is_some();
        if !end_control_present {
            self.reporter
                .report(ErrorCode::EndControlMissing, &"end control vanished");
            self.notifier.notify(&StatusNotice::degraded());
        }

        if self.transcript_feed.is_some() || self.chat_feed.is_some() {
            let notice = match self.options.operation_mode {
                OperationMode::Manual => StatusNotice::manual_mode(),
                OperationMode::Auto => self.status_notice.clone(),
            };
            self.notifier.notify(&notice);
        }

        self.spawn_title_refresh();
    }

    fn register_transcript(&mut self) -> Result<(), CaptureError> {
        let (_, strategy) = self
            .page
            .read(|root| ExtractionStrategy::detect(root))
            .ok_or(CaptureError::CaptionRegionMissing)?;
        info!("Caption extraction strategy: {:?}", strategy);

        match self.options.operation_mode {
            OperationMode::Manual => info!("Manual mode selected, leaving captions off"),
            OperationMode::Auto => {
                let captions = self.page.read(|root| {
                    find_control(root, selectors::CONTROL_ICON_CLASS, &self.captions_glyph)
                });
                match captions {
                    Some(path) => self.page.click(&path),
                    None => warn!("Captions affordance not found, cannot auto-enable"),
                }
            }
        }

        let locator: RegionLocator = Arc::new(move |root| strategy.locate(root));
        let feed = ScriptedFeed::new(self.page.clone(), locator);
        let Some(mut rx) = feed.observe(ObserveConfig::all()) else {
            return Ok(());
        };
        let mut reconciler = TranscriptReconciler::new(
            self.page.clone(),
            strategy,
            self.capture_options.clone(),
            self.self_name.clone(),
            self.session.clone().ok_or(CaptureError::CaptionRegionMissing)?,
            self.notifier.clone(),
            self.reporter.clone(),
            self.ended.clone(),
        );
        self.feed_tasks.push(tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                reconciler.on_mutation(&batch);
            }
            // Feed disconnected: flush whatever turn is still open.
            reconciler.flush_final();
        }));
        self.transcript_feed = Some(feed);
        Ok(())
    }

    fn register_chat(&mut self) -> Result<(), CaptureError> {
        // Opening the chat panel once makes the live region render; it can
        // be closed again right away.
        let toggle = self
            .page
            .read(|root| find_control(root, selectors::CONTROL_ICON_CLASS, &self.chat_glyph))
            .ok_or_else(|| CaptureError::ChatStructure("chat toggle not found".to_string()))?;
        self.page.click(&toggle);
        self.page.click(&toggle);

        self.page
            .read(locate_chat_region)
            .ok_or(CaptureError::ChatRegionMissing)?;

        let locator: RegionLocator = Arc::new(locate_chat_region);
        let feed = ScriptedFeed::new(self.page.clone(), locator);
        let Some(mut rx) = feed.observe(ObserveConfig::all()) else {
            return Ok(());
        };
        let mut reconciler = ChatReconciler::new(
            self.page.clone(),
            self.capture_options.self_placeholder.clone(),
            self.self_name.clone(),
            self.session.clone().ok_or(CaptureError::ChatRegionMissing)?,
            self.notifier.clone(),
            self.reporter.clone(),
            self.ended.clone(),
        );
        self.feed_tasks.push(tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                reconciler.on_mutation(&batch);
            }
        }));
        self.chat_feed = Some(feed);
        Ok(())
    }

    /// End the session: deregister feeds, flush the in-progress buffer,
    /// persist the closed record, file it, and emit `Ended` exactly once.
    pub async fn end(&mut self) -> Result<()> {
        if self.phase != LifecyclePhase::Active {
            debug!("End requested in phase {:?}, ignoring", self.phase);
            return Ok(());
        }
        info!("Session ending");
        self.phase = LifecyclePhase::Ended;
        self.ended.store(true, Ordering::SeqCst);

        if let Some(feed) = &self.transcript_feed {
            feed.disconnect();
        }
        if let Some(feed) = &self.chat_feed {
            feed.disconnect();
        }
        for task in self.feed_tasks.drain(..) {
            let _ = task.await;
        }
        for task in self.aux_tasks.drain(..) {
            task.abort();
        }

        let Some(session) = &self.session else {
            return Ok(());
        };
        session.close(&crate::capture::now_iso());
        let snapshot = session.snapshot();
        if let Err(e) = self.store.set(&snapshot).await {
            warn!("Final session persist failed: {:#}", e);
        }
        self.store
            .finalize(&snapshot)
            .await
            .context("Failed to file closed session")?;
        let _ = self.events.send(SessionEvent::Ended);
        Ok(())
    }

    /// Best-effort capture of the local display name before the session
    /// starts; stops as soon as the name resolves or the session begins.
    fn spawn_self_name_poll(&mut self) {
        let page = self.page.clone();
        let self_name = self.self_name.clone();
        let started = self.started.clone();
        let ended = self.ended.clone();
        let interval = self.options.name_poll_interval;
        self.aux_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if started.load(Ordering::SeqCst) || ended.load(Ordering::SeqCst) {
                    break;
                }
                let name = page.read(|root| {
                    find_by_class(root, selectors::SELF_NAME_CLASS)
                        .and_then(|path| root.node_at(&path).map(|n| n.text_content()))
                });
                if let Some(name) = name {
                    if !name.trim().is_empty() {
                        info!("Resolved local display name");
                        self_name.resolve(&name);
                        break;
                    }
                }
            }
        }));
    }

    /// The page fills in the real meeting title only after a delay.
    fn spawn_title_refresh(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let page = self.page.clone();
        let reporter = self.reporter.clone();
        let ended = self.ended.clone();
        let delay = self.options.title_refresh_delay;
        self.aux_tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if ended.load(Ordering::SeqCst) {
                return;
            }
            let title = page.read(|root| {
                find_by_class(root, selectors::MEETING_TITLE_CLASS)
                    .and_then(|path| root.node_at(&path).map(|n| n.text_content()))
            });
            match title {
                Some(title) if !title.trim().is_empty() => session.set_title(title.trim()),
                _ => reporter.report(ErrorCode::TitleMissing, &"title element not found"),
            }
        }));
    }
}
