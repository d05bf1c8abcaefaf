//! Configuration loading, validation, and management for Threadwise.
//!
//! Loads configuration from `~/.threadwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.threadwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model for the primary session
    #[serde(default = "default_model")]
    pub model: String,

    /// Model for delegate sub-queries (defaults to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_model: Option<String>,

    /// Sampling temperature for the primary session
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per primary response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Context assembly budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Multi-round streaming loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Delegate sub-query settings
    #[serde(default)]
    pub delegate: DelegateConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Summary store settings
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
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
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("delegate_model", &self.delegate_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("context", &self.context)
            .field("orchestrator", &self.orchestrator)
            .field("delegate", &self.delegate)
            .field("breaker", &self.breaker)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Context ceiling of the model, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Fraction of the ceiling above which adaptive fetches shrink
    #[serde(default = "default_soft_limit_ratio")]
    pub soft_limit_ratio: f32,

    /// Tokens held back for the response
    #[serde(default = "default_response_reserve")]
    pub response_reserve: u32,

    #[serde(default = "default_fixed_limit")]
    pub fixed_limit: usize,

    #[serde(default = "default_adaptive_initial")]
    pub adaptive_initial: usize,

    #[serde(default = "default_adaptive_cap")]
    pub adaptive_cap: usize,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_unlimited_cap")]
    pub unlimited_cap: usize,

    /// How many recent history messages are scanned for attachments
    #[serde(default = "default_attachment_scan")]
    pub attachment_scan_messages: usize,
}

fn default_context_window() -> u32 {
    200_000
}
fn default_soft_limit_ratio() -> f32 {
    0.7
}
fn default_response_reserve() -> u32 {
    4096
}
fn default_fixed_limit() -> usize {
    50
}
fn default_adaptive_initial() -> usize {
    30
}
fn default_adaptive_cap() -> usize {
    200
}
fn default_page_size() -> usize {
    100
}
fn default_unlimited_cap() -> usize {
    1000
}
fn default_attachment_scan() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            soft_limit_ratio: default_soft_limit_ratio(),
            response_reserve: default_response_reserve(),
            fixed_limit: default_fixed_limit(),
            adaptive_initial: default_adaptive_initial(),
            adaptive_cap: default_adaptive_cap(),
            page_size: default_page_size(),
            unlimited_cap: default_unlimited_cap(),
            attachment_scan_messages: default_attachment_scan(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum generation rounds per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Attempts per generation call
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay; attempt n waits base × 2^n
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// System preamble for the primary session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_iterations() -> usize {
    5
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_system_prompt() -> String {
    "You are Threadwise, a helpful assistant participating in a chat channel. \
     Answer concisely. Use the available tools to list or create threads, and \
     use delegate_query to look up details in another thread instead of guessing."
        .into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Concurrent delegate generations per gateway
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    #[serde(default = "default_max_hint_chars")]
    pub max_hint_chars: usize,

    #[serde(default = "default_delegate_temperature")]
    pub temperature: f32,

    #[serde(default = "default_delegate_max_tokens")]
    pub max_tokens: u32,

    /// Messages fetched when context assembly for a thread fails
    #[serde(default = "default_fallback_message_limit")]
    pub fallback_message_limit: usize,
}

fn default_max_concurrent() -> usize {
    3
}
fn default_max_query_chars() -> usize {
    2000
}
fn default_max_hint_chars() -> usize {
    500
}
fn default_delegate_temperature() -> f32 {
    0.2
}
fn default_delegate_max_tokens() -> u32 {
    1024
}
fn default_fallback_message_limit() -> usize {
    50
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_query_chars: default_max_query_chars(),
            max_hint_chars: default_max_hint_chars(),
            temperature: default_delegate_temperature(),
            max_tokens: default_delegate_max_tokens(),
            fallback_message_limit: default_fallback_message_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial call
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_cooldown_secs() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Database file (defaults to `~/.threadwise/windows.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The database path, falling back to the config directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("windows.db"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.threadwise/config.toml).
    ///
    /// Also checks environment variables:
    /// - `THREADWISE_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `THREADWISE_MODEL` overrides `model`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("THREADWISE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("THREADWISE_MODEL") {
            config.model = model;
        }

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

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".threadwise")
    }

    /// The model used for delegate sub-queries.
    pub fn delegate_model(&self) -> &str {
        self.delegate_model.as_deref().unwrap_or(&self.model)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("temperature", self.temperature), ("delegate.temperature", self.delegate.temperature)] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        let ratio = self.context.soft_limit_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context.soft_limit_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if self.context.response_reserve >= self.context.context_window {
            return Err(ConfigError::ValidationError(
                "context.response_reserve must be smaller than context.context_window".into(),
            ));
        }

        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be > 0".into(),
            ));
        }

        if self.orchestrator.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry_attempts must be > 0".into(),
            ));
        }

        if self.delegate.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "delegate.max_concurrent must be > 0".into(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "breaker.failure_threshold must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "in_memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"in_memory\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_model(),
            delegate_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context: ContextConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            delegate: DelegateConfig::default(),
            breaker: BreakerConfig::default(),
            store: StoreConfig::default(),
        }
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
