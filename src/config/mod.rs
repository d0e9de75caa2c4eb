use crate::capture::transcript::CaptureOptions;
use crate::global;
use crate::session::lifecycle::LifecycleOptions;
use crate::webhook::WebhookBodyType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub behavior: BehaviorConfig,
    pub webhook: WebhookConfig,
    pub recovery: RecoveryConfig,
    pub status: StatusConfig,
    pub export: ExportConfig,
}

/// Whether captions are turned on automatically at session start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Placeholder the page shows for the local participant.
    pub self_placeholder: String,
    /// Same-speaker shrink larger than this many chars means the caption
    /// window was silently reset.
    pub modern_shrink_threshold: usize,
    /// Legacy caption layout: force-remove a slot once its text grows past
    /// this length.
    pub legacy_overflow_limit: usize,
    pub name_poll_interval_ms: u64,
    pub start_poll_interval_ms: u64,
    /// The page fills the real meeting title in late; refresh after this.
    pub title_refresh_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            self_placeholder: crate::capture::SELF_PLACEHOLDER.to_string(),
            modern_shrink_threshold: 250,
            legacy_overflow_limit: 250,
            name_poll_interval_ms: 100,
            start_poll_interval_ms: 100,
            title_refresh_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub operation_mode: OperationMode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Post every closed session automatically. On by default, but inert
    /// until a URL is configured.
    pub auto_post: bool,
    pub body_type: WebhookBodyType,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            auto_post: true,
            body_type: WebhookBodyType::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Startup recovery is abandoned after this long, never retried.
    pub timeout_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub endpoint: Option<String>,
    pub report_endpoint: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Defaults to the exports directory under the data dir.
    pub directory: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            self_placeholder: self.capture.self_placeholder.clone(),
            modern_shrink_threshold: self.capture.modern_shrink_threshold,
            legacy_overflow_limit: self.capture.legacy_overflow_limit,
        }
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            operation_mode: self.behavior.operation_mode,
            start_poll_interval: Duration::from_millis(self.capture.start_poll_interval_ms),
            name_poll_interval: Duration::from_millis(self.capture.name_poll_interval_ms),
            title_refresh_delay: Duration::from_millis(self.capture.title_refresh_delay_ms),
            recovery_timeout: Duration::from_millis(self.recovery.timeout_ms),
            status_endpoint: self.status.endpoint.clone(),
        }
    }

    pub fn export_dir(&self) -> Result<PathBuf> {
        match &self.export.directory {
            Some(dir) => Ok(dir.clone()),
            None => global::exports_dir(),
        }
    }
}
