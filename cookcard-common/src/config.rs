//! Configuration loading for Cook Card services
//!
//! Configuration is resolved from a TOML file with environment override:
//! `COOKCARD_CONFIG` names the file path, falling back to `cookcard.toml`
//! in the working directory. A missing file yields the built-in defaults;
//! a present-but-malformed file is a hard startup error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file path
pub const CONFIG_PATH_ENV: &str = "COOKCARD_CONFIG";

/// Default config file path (relative to working directory)
pub const DEFAULT_CONFIG_PATH: &str = "cookcard.toml";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address for the extraction service
    pub bind_addr: String,
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Quota and budget limits
    pub limits: LimitsConfig,
    /// Pre-gate density heuristics
    pub pre_gate: PreGateConfig,
    /// Extraction cache settings
    pub cache: CacheConfig,
    /// External provider endpoints
    pub providers: ProvidersConfig,
    /// Retry policy for provider calls
    pub retry: RetryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5741".to_string(),
            database_path: PathBuf::from("cookcard.db"),
            limits: LimitsConfig::default(),
            pre_gate: PreGateConfig::default(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Quota and budget limits
///
/// Requests are counted per user; vision minutes are counted per user and
/// globally. Counter windows are hourly, monthly, and daily respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Extraction requests allowed per user per hour
    pub hourly_rate: f64,
    /// Extractions allowed per user per month
    pub monthly_quota: f64,
    /// Vision minutes allowed per user per day (L4 only)
    pub daily_l4_user_minutes: f64,
    /// Vision minutes allowed across all users per day (L4 only)
    pub daily_l4_global_minutes: f64,
    /// Estimated vision minutes when the video duration is unknown
    pub default_video_minutes: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hourly_rate: 10.0,
            monthly_quota: 100.0,
            daily_l4_user_minutes: 10.0,
            daily_l4_global_minutes: 500.0,
            default_video_minutes: 2.0,
        }
    }
}

/// Pre-gate density heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreGateConfig {
    /// Minimum source text length (chars) to consider an LLM call
    pub min_chars: usize,
    /// Minimum whitespace-delimited token count
    pub min_tokens: usize,
    /// Maximum fraction of tokens that may be hashtags
    pub max_hashtag_ratio: f32,
}

impl Default for PreGateConfig {
    fn default() -> Self {
        Self {
            min_chars: 80,
            min_tokens: 12,
            max_hashtag_ratio: 0.5,
        }
    }
}

/// Extraction cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache row time-to-live in days (read-time check, no eviction sweep)
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_days: 30 }
    }
}

/// External provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Link-metadata (oEmbed) endpoint
    pub oembed: ProviderConfig,
    /// Platform description/comment/transcript endpoint
    pub platform: ProviderConfig,
    /// Hosted text-completion model endpoint
    pub llm: LlmProviderConfig,
    /// Hosted multimodal (video vision) model endpoint
    pub vision: LlmProviderConfig,
}

/// Single provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider endpoint
    pub endpoint: String,
    /// Optional API key (sent as bearer token when present)
    pub api_key: Option<String>,
    /// Hard request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            timeout_seconds: 15,
        }
    }
}

/// Hosted model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// Base URL of the model endpoint
    pub endpoint: String,
    /// API key (sent as bearer token when present)
    pub api_key: Option<String>,
    /// Model identifier sent with each request
    pub model: String,
    /// Hard request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            model: String::new(),
            timeout_seconds: 30,
        }
    }
}

/// Retry policy for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per provider call (including the first)
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (doubled per attempt)
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the resolved path
    ///
    /// Resolution: `COOKCARD_CONFIG` env var, else `cookcard.toml`.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
