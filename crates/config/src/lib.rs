//! Configuration loading, validation, and management for finchat.
//!
//! Loads configuration from `~/.finchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chart ranges the market endpoints accept.
pub const SUPPORTED_RANGES: &[&str] = &["1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "ytd", "max"];

/// The root configuration structure.
///
/// Maps directly to `~/.finchat/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model endpoint and sampling settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Market data and news settings
    #[serde(default)]
    pub market: MarketConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("gateway", &self.gateway)
            .field("market", &self.market)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout for one model invocation
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model_name() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_model_timeout() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_model_name(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of model → tools → model round trips per request
    #[serde(default = "default_max_round_trips")]
    pub max_round_trips: u32,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Capacity of the bounded event channel used for streaming
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_round_trips() -> u32 {
    8
}
fn default_tool_timeout() -> u64 {
    20
}
fn default_stream_buffer() -> usize {
    32
}
fn default_system_prompt() -> String {
    "You are a helpful financial assistant. Answer questions about stocks, \
     markets and companies concisely. Use the search tool when you need \
     current information, and say so when you are unsure."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_round_trips: default_max_round_trips(),
            tool_timeout_secs: default_tool_timeout(),
            stream_buffer: default_stream_buffer(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Forward thoughts and tool events on the chat stream
    #[serde(default)]
    pub expose_agent_events: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
            expose_agent_events: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finnhub_api_key: Option<String>,

    /// How far back company news is fetched
    #[serde(default = "default_lookback_days")]
    pub news_lookback_days: u32,

    #[serde(default = "default_range")]
    pub default_range: String,
}

fn default_lookback_days() -> u32 {
    7
}
fn default_range() -> String {
    "1mo".into()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            finnhub_api_key: None,
            news_lookback_days: default_lookback_days(),
            default_range: default_range(),
        }
    }
}

impl std::fmt::Debug for MarketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketConfig")
            .field("finnhub_api_key", &redact(&self.finnhub_api_key))
            .field("news_lookback_days", &self.news_lookback_days)
            .field("default_range", &self.default_range)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.finchat/config.toml).
    ///
    /// Environment variables override file values:
    /// - `FINCHAT_API_KEY`, then `OPENAI_API_KEY`
    /// - `FINCHAT_BASE_URL`, `FINCHAT_MODEL`, `FINCHAT_PORT`
    /// - `FINNHUB_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = lookup("FINCHAT_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("FINCHAT_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("FINCHAT_MODEL") {
            self.model.name = model;
        }
        if let Some(key) = lookup("FINNHUB_API_KEY") {
            self.market.finnhub_api_key = Some(key);
        }
        if let Some(port) = lookup("FINCHAT_PORT") {
            self.gateway.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("FINCHAT_PORT is not a valid port: {port}")))?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".finchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.timeout_secs == 0 || self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeouts must be greater than 0".into()));
        }

        if self.agent.max_round_trips == 0 {
            return Err(ConfigError::ValidationError("agent.max_round_trips must be at least 1".into()));
        }

        if self.agent.stream_buffer == 0 {
            return Err(ConfigError::ValidationError("agent.stream_buffer must be at least 1".into()));
        }

        if !SUPPORTED_RANGES.contains(&self.market.default_range.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "market.default_range '{}' is not one of {}",
                self.market.default_range,
                SUPPORTED_RANGES.join(", ")
            )));
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
