//! Runtime configuration
//!
//! `ApiConfig` is built once and handed to the GOGDB client; it never changes
//! after construction. `BotConfig` wraps it together with the process-level
//! settings read from the environment.

use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_ROOT: &str = "https://www.gogdb.org/data";
pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for talking to the GOGDB data API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    root: String,
    retries: u32,
    concurrency: usize,
    request_timeout: Duration,
    retry_delay: Duration,
}

impl ApiConfig {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
            retries: DEFAULT_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: DEFAULT_TIMEOUT,
            retry_delay: Duration::ZERO,
        }
    }

    /// Extra attempts allowed after the first failed one
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Maximum in-flight requests within one batch; zero is treated as one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub api: ApiConfig,
    pub listen: String,
    pub prefix: String,
    pub footer: String,
    /// Embed author line; omitted when unset
    pub author: Option<String>,
    pub log_level: String,
}

impl BotConfig {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup("GOGDB_HOST").unwrap_or_else(|| DEFAULT_ROOT.to_string());
        let mut api = ApiConfig::new(root);

        if let Some(raw) = lookup("GOGDB_RETRIES") {
            let retries = raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid GOGDB_RETRIES value: {}", raw))?;
            api = api.with_retries(retries);
        }
        if let Some(raw) = lookup("GOGDB_CONCURRENCY") {
            let concurrency = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid GOGDB_CONCURRENCY value: {}", raw))?;
            api = api.with_concurrency(concurrency);
        }
        if let Some(raw) = lookup("GOGDB_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid GOGDB_TIMEOUT_SECS value: {}", raw))?;
            api = api.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("GOGDB_RETRY_DELAY_MS") {
            let millis = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid GOGDB_RETRY_DELAY_MS value: {}", raw))?;
            api = api.with_retry_delay(Duration::from_millis(millis));
        }

        Ok(Self {
            api,
            listen: lookup("BOT_LISTEN").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            prefix: lookup("BOT_PREFIX").unwrap_or_else(|| "!".to_string()),
            footer: lookup("BOT_FOOTER").unwrap_or_else(|| "Powered by GOGDB".to_string()),
            author: lookup("BOT_AUTHOR").filter(|name| !name.trim().is_empty()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}
