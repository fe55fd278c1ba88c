//! Configuration loading for the restock crawler.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `RESTOCK_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifications::DedupStrategy;
use crate::notifications::formatter::MIN_COMPACT_LENGTH;

const ENV_PREFIX: &str = "RESTOCK_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `RESTOCK_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
    /// Days after which idle notification threads are purged (0 disables)
    #[serde(default)]
    pub thread_retention_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_fe: Option<NvidiaFeConfig>,
}

/// What to crawl and how to filter it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CrawlConfig {
    /// Maximum number of sources crawled concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// JSON feed URLs, grouped by shop before scheduling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default)]
    pub include_regex: String,
    #[serde(default)]
    pub exclude_regex: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_ranges: Vec<PriceRangeConfig>,
    #[serde(default = "default_currency_api_base")]
    pub currency_api_base: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default)]
    pub disable_notifications: bool,
}

/// Price bounds applied to products whose name matches `model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PriceRangeConfig {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub min: f64,
    /// Upper bound, 0 means unbounded
    #[serde(default)]
    pub max: f64,
    #[serde(default = "default_range_currency")]
    pub currency: String,
}

/// Single-instance lock settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GuardConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
    #[serde(default)]
    pub pid_wait_timeout_seconds: u64,
}

/// Liveness thresholds, in seconds since the freshest product update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_warning_seconds")]
    pub warning_seconds: u64,
    #[serde(default = "default_monitor_critical_seconds")]
    pub critical_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub enable_replies: bool,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub dedup: DedupStrategy,
    #[serde(default)]
    pub enable_replies: bool,
    #[serde(default = "default_webhook_max_length")]
    pub max_length: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<HashtagRule>,
}

/// Maps a product name pattern to the hashtags appended to its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagRule {
    pub pattern: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NvidiaFeConfig {
    pub locations: Vec<String>,
    pub gpus: Vec<String>,
    pub user_agent: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_nvidia_api_base")]
    pub api_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            crawl: CrawlConfig::default(),
            guard: GuardConfig::default(),
            monitor: MonitorConfig::default(),
            telegram: None,
            webhook: None,
            thread_retention_days: 0,
            nvidia_fe: None,
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            urls: Vec::new(),
            include_regex: String::new(),
            exclude_regex: String::new(),
            price_ranges: Vec::new(),
            currency_api_base: default_currency_api_base(),
            http_timeout_seconds: default_http_timeout_seconds(),
            disable_notifications: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warning_seconds: default_monitor_warning_seconds(),
            critical_seconds: default_monitor_critical_seconds(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if let Some(telegram) = config.telegram.as_mut() {
            telegram.token = REDACTED.to_string();
        }
        // Webhook URLs usually embed an access token
        if let Some(webhook) = config.webhook.as_mut() {
            webhook.url = REDACTED.to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crawl.validate()?;
        self.monitor.validate()?;

        if let Some(telegram) = &self.telegram {
            if telegram.chat_id.is_none() && telegram.channel_name.is_none() {
                return Err(ConfigError::MissingTelegramChat);
            }
        }

        if let Some(webhook) = &self.webhook {
            if url::Url::parse(&webhook.url).is_err() {
                return Err(ConfigError::InvalidWebhookUrl {
                    value: webhook.url.clone(),
                });
            }
            if webhook.max_length < MIN_COMPACT_LENGTH {
                return Err(ConfigError::InvalidMaxLength {
                    value: webhook.max_length,
                    min: MIN_COMPACT_LENGTH,
                });
            }
            for rule in &webhook.hashtags {
                compile_regex("WEBHOOK_HASHTAGS", &rule.pattern)?;
            }
        }

        if let Some(nvidia) = &self.nvidia_fe {
            if nvidia.user_agent.trim().is_empty() {
                return Err(ConfigError::MissingNvidiaUserAgent);
            }
        }

        Ok(())
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }

        compile_regex("INCLUDE_REGEX", &self.include_regex)?;
        compile_regex("EXCLUDE_REGEX", &self.exclude_regex)?;

        for range in &self.price_ranges {
            if range.model.is_empty() {
                return Err(ConfigError::MissingPriceRangeModel {
                    name: range.name.clone(),
                });
            }
            compile_regex(&format!("PRICE_RANGE_{}_MODEL", range.name), &range.model)?;
            if range.max != 0.0 && range.max < range.min {
                return Err(ConfigError::InvalidPriceRange {
                    name: range.name.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
        }

        Ok(())
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.critical_seconds <= self.warning_seconds {
            return Err(ConfigError::InvalidMonitorThresholds {
                warning: self.warning_seconds,
                critical: self.critical_seconds,
            });
        }
        Ok(())
    }
}

fn compile_regex(field: &str, pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Ok(());
    }
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidRegex {
            field: field.to_string(),
            source,
        })
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://restock.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_workers() -> usize {
    1
}

fn default_currency_api_base() -> String {
    "https://cdn.jsdelivr.net/gh/fawazahmed0/currency-api@1/latest".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

fn default_range_currency() -> String {
    "USD".to_string()
}

fn default_monitor_warning_seconds() -> u64 {
    3600
}

fn default_monitor_critical_seconds() -> u64 {
    7200
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_webhook_max_length() -> usize {
    280
}

fn default_nvidia_api_base() -> String {
    "https://api.store.nvidia.com".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for RESTOCK_{key}")]
    InvalidValue { key: String, value: String },
    #[error("crawl workers must be at least 1")]
    InvalidWorkers,
    #[error("invalid regular expression in {field}: {source}")]
    InvalidRegex { field: String, source: regex::Error },
    #[error("price range {name} has no model pattern; set RESTOCK_PRICE_RANGE_{name}_MODEL")]
    MissingPriceRangeModel { name: String },
    #[error("price range {name} has max ({max}) lower than min ({min})")]
    InvalidPriceRange { name: String, min: f64, max: f64 },
    #[error(
        "monitor critical threshold ({critical}s) must be greater than warning threshold ({warning}s)"
    )]
    InvalidMonitorThresholds { warning: u64, critical: u64 },
    #[error("telegram requires RESTOCK_TELEGRAM_CHAT_ID or RESTOCK_TELEGRAM_CHANNEL_NAME")]
    MissingTelegramChat,
    #[error("invalid webhook url '{value}'")]
    InvalidWebhookUrl { value: String },
    #[error("unknown dedup strategy '{value}', expected 'product_url' or 'content_hash'")]
    UnknownDedupStrategy { value: String },
    #[error("message max length {value} is below the minimum of {min}")]
    InvalidMaxLength { value: usize, min: usize },
    #[error("invalid hashtag rules: {source}")]
    InvalidHashtags { source: serde_json::Error },
    #[error("NVIDIA store source requires RESTOCK_NVIDIA_FE_USER_AGENT")]
    MissingNvidiaUserAgent,
}

/// Loads configuration using layered `.env` files and `RESTOCK_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads and validates configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let workers = match layered.remove("WORKERS") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "WORKERS".to_string(),
                value,
            })?,
            None => default_workers(),
        };

        let crawl = CrawlConfig {
            workers,
            urls: layered.remove("URLS").map(split_list).unwrap_or_default(),
            include_regex: layered.remove("INCLUDE_REGEX").unwrap_or_default(),
            exclude_regex: layered.remove("EXCLUDE_REGEX").unwrap_or_default(),
            price_ranges: Vec::new(),
            currency_api_base: layered
                .remove("CURRENCY_API_BASE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_currency_api_base),
            http_timeout_seconds: layered
                .remove("HTTP_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout_seconds),
            disable_notifications: layered
                .remove("DISABLE_NOTIFICATIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        };

        let guard = GuardConfig {
            pid_file: layered
                .remove("PID_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            pid_wait_timeout_seconds: layered
                .remove("PID_WAIT_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        };

        let monitor = MonitorConfig {
            warning_seconds: layered
                .remove("MONITOR_WARNING_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_warning_seconds),
            critical_seconds: layered
                .remove("MONITOR_CRITICAL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_monitor_critical_seconds),
        };

        let telegram = match layered.remove("TELEGRAM_TOKEN").filter(|v| !v.is_empty()) {
            Some(token) => Some(TelegramConfig {
                token,
                chat_id: layered
                    .remove("TELEGRAM_CHAT_ID")
                    .and_then(|v| v.trim().parse().ok()),
                channel_name: layered
                    .remove("TELEGRAM_CHANNEL_NAME")
                    .filter(|v| !v.is_empty()),
                enable_replies: layered
                    .remove("TELEGRAM_ENABLE_REPLIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                api_base: layered
                    .remove("TELEGRAM_API_BASE")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(default_telegram_api_base),
            }),
            None => None,
        };

        let webhook = match layered.remove("WEBHOOK_URL").filter(|v| !v.is_empty()) {
            Some(url) => {
                let dedup = match layered.remove("WEBHOOK_DEDUP") {
                    Some(value) => value
                        .parse()
                        .map_err(|_| ConfigError::UnknownDedupStrategy { value })?,
                    None => DedupStrategy::default(),
                };
                let hashtags = match layered.remove("WEBHOOK_HASHTAGS") {
                    Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                        .map_err(|source| ConfigError::InvalidHashtags { source })?,
                    _ => Vec::new(),
                };
                Some(WebhookConfig {
                    url,
                    dedup,
                    enable_replies: layered
                        .remove("WEBHOOK_ENABLE_REPLIES")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(false),
                    max_length: layered
                        .remove("WEBHOOK_MAX_LENGTH")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_else(default_webhook_max_length),
                    hashtags,
                })
            }
            None => None,
        };

        let thread_retention_days = layered
            .remove("THREAD_RETENTION_DAYS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let nvidia_locations = layered
            .remove("NVIDIA_FE_LOCATIONS")
            .map(split_list)
            .unwrap_or_default();
        let nvidia_gpus = layered
            .remove("NVIDIA_FE_GPUS")
            .map(split_list)
            .unwrap_or_default();
        let nvidia_fe = if nvidia_locations.is_empty() || nvidia_gpus.is_empty() {
            None
        } else {
            Some(NvidiaFeConfig {
                locations: nvidia_locations,
                gpus: nvidia_gpus,
                user_agent: layered.remove("NVIDIA_FE_USER_AGENT").unwrap_or_default(),
                timeout_seconds: layered
                    .remove("NVIDIA_FE_TIMEOUT_SECONDS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_http_timeout_seconds),
                api_base: layered
                    .remove("NVIDIA_FE_API_BASE")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(default_nvidia_api_base),
            })
        };

        let price_ranges = collect_price_ranges(&layered)?;

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            crawl: CrawlConfig {
                price_ranges,
                ..crawl
            },
            guard,
            monitor,
            telegram,
            webhook,
            thread_retention_days,
            nvidia_fe,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("RESTOCK_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_list(value: String) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Collects `PRICE_RANGE_<NAME>_<SETTING>` keys into ranges ordered by name.
fn collect_price_ranges(
    layered: &BTreeMap<String, String>,
) -> Result<Vec<PriceRangeConfig>, ConfigError> {
    let mut ranges: BTreeMap<String, PriceRangeConfig> = BTreeMap::new();

    for (key, value) in layered {
        let Some(suffix) = key.strip_prefix("PRICE_RANGE_") else {
            continue;
        };
        let Some((name, setting)) = suffix.rsplit_once('_') else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let entry = ranges
            .entry(name.to_string())
            .or_insert_with(|| PriceRangeConfig {
                name: name.to_string(),
                model: String::new(),
                min: 0.0,
                max: 0.0,
                currency: default_range_currency(),
            });

        let invalid = || ConfigError::InvalidValue {
            key: key.clone(),
            value: value.clone(),
        };

        match setting {
            "MODEL" => entry.model = value.clone(),
            "MIN" => entry.min = value.trim().parse().map_err(|_| invalid())?,
            "MAX" => entry.max = value.trim().parse().map_err(|_| invalid())?,
            "CURRENCY" => {
                if !value.trim().is_empty() {
                    entry.currency = value.trim().to_uppercase();
                }
            }
            _ => {
                tracing::debug!(key = %key, "ignoring unknown price range setting");
            }
        }
    }

    Ok(ranges.into_values().collect())
}
