use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;
use validator::{Validate, ValidationError};

use crate::constants::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is missing")]
    MissingBotToken,
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Startup configuration shared by every component.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct BotConfig {
    #[validate(length(min = 1))]
    pub bot_token: String,

    // Upstream services
    #[validate(custom = "validate_http_url")]
    pub telegram_api_url: String,
    #[validate(custom = "validate_http_url")]
    pub holder_api_url: String,
    #[validate(custom = "validate_http_url")]
    pub market_api_url: String,
    #[validate(custom = "validate_http_url")]
    pub visual_base_url: String,
    #[validate(custom = "validate_http_url")]
    pub webdriver_url: String,

    /// Where captured visualizations are written before upload.
    pub screenshot_dir: PathBuf,
    /// Prometheus exporter port; exporter is off when unset.
    pub metrics_port: Option<u16>,
}

impl BotConfig {
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let bot_token = env.bot_token.clone().ok_or(ConfigError::MissingBotToken)?;

        let metrics_port = env
            .metrics_port
            .as_deref()
            .map(|raw| {
                raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                    key: "METRICS_PORT",
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            bot_token,
            telegram_api_url: env.telegram_api_url.clone(),
            holder_api_url: env.holder_api_url.clone(),
            market_api_url: env.market_api_url.clone(),
            visual_base_url: env.visual_base_url.clone(),
            webdriver_url: env.webdriver_url.clone(),
            screenshot_dir: env
                .screenshot_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            metrics_port,
        })
    }

    pub fn validate_all(&self) -> Result<()> {
        if let Err(e) = self.validate() {
            return Err(anyhow!("Configuration validation failed: {}", e));
        }
        if self.screenshot_dir.as_os_str().is_empty() {
            return Err(anyhow!("Configuration validation failed: empty screenshot dir"));
        }
        Ok(())
    }
}

// Keeps the bot token out of logs.
impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"<redacted>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("holder_api_url", &self.holder_api_url)
            .field("market_api_url", &self.market_api_url)
            .field("visual_base_url", &self.visual_base_url)
            .field("webdriver_url", &self.webdriver_url)
            .field("screenshot_dir", &self.screenshot_dir)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("invalid_http_url")),
    }
}

/// Timeouts and pool sizing. Only the defaults are used in production.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RuntimeConfig {
    pub http_timeout: Duration,
    pub page_load_timeout: Duration,
    pub render_settle: Duration,
    pub screenshot_timeout: Duration,
    pub request_deadline: Duration,
    #[validate(range(min = 1, max = 300))]
    pub long_poll_timeout_secs: u64,
    #[validate(range(min = 1, max = 64))]
    pub worker_pool_size: usize,
}

impl RuntimeConfig {
    pub fn validate_all(&self) -> Result<()> {
        if let Err(e) = self.validate() {
            return Err(anyhow!("Runtime configuration validation failed: {}", e));
        }
        if self.request_deadline <= self.http_timeout {
            return Err(anyhow!(
                "request deadline {:?} must exceed the HTTP timeout {:?}",
                self.request_deadline,
                self.http_timeout
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            page_load_timeout: Duration::from_secs(PAGE_LOAD_TIMEOUT_SECS),
            render_settle: Duration::from_secs(RENDER_SETTLE_SECS),
            screenshot_timeout: Duration::from_secs(SCREENSHOT_TIMEOUT_SECS),
            request_deadline: Duration::from_secs(REQUEST_DEADLINE_SECS),
            long_poll_timeout_secs: LONG_POLL_TIMEOUT_SECS,
            worker_pool_size: WORKER_POOL_SIZE,
        }
    }
}
