use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::SyncSettings;
use crate::retry::RetryPolicy;
use crate::upload::UploadSettings;

/// Environment variable consulted when `[credential].app_token` is unset.
pub const APP_TOKEN_ENV: &str = "HSYNC_APP_TOKEN";

/// Upper bound for `[sync].lookback_days` (about a century).
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ingest: IngestConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub endpoint: String,
    pub tenant_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialConfig {
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub app_token: Option<String>,
    #[serde(default = "default_expires_in_hours")]
    pub expires_in_hours: u32,
    /// Use this token directly instead of asking the token service.
    #[serde(default)]
    pub static_token: Option<String>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            app_token: None,
            expires_in_hours: default_expires_in_hours(),
            static_token: None,
        }
    }
}

fn default_expires_in_hours() -> u32 {
    24
}

impl CredentialConfig {
    /// App token from config, falling back to [`APP_TOKEN_ENV`].
    pub fn resolve_app_token(&self) -> String {
        self.app_token
            .clone()
            .or_else(|| std::env::var(APP_TOKEN_ENV).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_delay_secs: 2,
            backoff: "fixed".to_string(),
            timeout_secs: 30,
        }
    }
}

fn default_batch_size() -> usize {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_backoff() -> String {
    "fixed".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl UploadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        match self.backoff.as_str() {
            "exponential" => {
                RetryPolicy::exponential(self.max_retries, delay, Duration::from_secs(60))
            }
            _ => RetryPolicy::fixed(self.max_retries, delay),
        }
    }

    pub fn settings(&self) -> UploadSettings {
        UploadSettings {
            batch_size: self.batch_size,
            retry: self.retry_policy(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub export_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_lookback_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "text".to_string()
}

impl Config {
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            endpoint: self.ingest.endpoint.clone(),
            tenant_id: self.ingest.tenant_id.clone(),
            upload: self.upload.settings(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate ingest
    if config.ingest.tenant_id.trim().is_empty() {
        bail!("ingest.tenant_id must not be empty");
    }
    let endpoint = config.ingest.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        bail!(
            "ingest.endpoint must be an http(s) URL, got '{}'",
            config.ingest.endpoint
        );
    }

    // Validate credential
    if config.credential.static_token.is_none() && config.credential.token_url.is_none() {
        bail!("credential.token_url or credential.static_token must be set");
    }

    // Validate upload
    if config.upload.batch_size == 0 {
        bail!("upload.batch_size must be > 0");
    }
    match config.upload.backoff.as_str() {
        "fixed" | "exponential" => {}
        other => bail!(
            "Unknown upload.backoff: '{}'. Must be fixed or exponential.",
            other
        ),
    }

    // Validate sync
    if config.sync.lookback_days == 0 || config.sync.lookback_days > MAX_LOOKBACK_DAYS {
        bail!(
            "sync.lookback_days must be between 1 and {}",
            MAX_LOOKBACK_DAYS
        );
    }

    match config.logging.format.as_str() {
        "text" | "json" => {}
        other => bail!("Unknown logging.format: '{}'. Must be text or json.", other),
    }

    Ok(())
}
