//! Configuration loading, validation, and management for Freshmate.
//!
//! Loads configuration from `~/.freshmate/config.toml` with environment
//! variable fallbacks for endpoints and keys. Validates all settings at
//! startup; nothing reads the environment once a request is in flight.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.freshmate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pantry inventory service
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Recipe search service
    #[serde(default)]
    pub recipes: RecipesConfig,

    /// Chat-completion model endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Where conversation history lives
    #[serde(default)]
    pub history: HistoryConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

const REDACTED: &str = "[REDACTED]";

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => REDACTED,
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// --- Outbound client settings ---

/// Transport settings shared by every outbound client: timeouts, retry
/// schedule and rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt; total attempts = max_retries + 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Spread backoff delays by ±20%.
    #[serde(default = "default_true")]
    pub jitter: bool,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: f64,

    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: f64,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_max_retry_delay_ms() -> u64 {
    30_000
}
fn default_rate_limit() -> f64 {
    10.0
}
fn default_burst_capacity() -> f64 {
    10.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            jitter: true,
            rate_limit_per_second: default_rate_limit(),
            burst_capacity: default_burst_capacity(),
        }
    }
}

impl ClientConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if !self.rate_limit_per_second.is_finite() || self.rate_limit_per_second <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.rate_limit_per_second must be > 0"
            )));
        }
        if !self.burst_capacity.is_finite() || self.burst_capacity < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.burst_capacity must be >= 1"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{section}.timeout_secs must be > 0"
            )));
        }
        if self.max_retry_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "{section}.max_retry_delay_ms must be >= retry_base_delay_ms"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_inventory_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(flatten)]
    pub client: ClientConfig,
}

fn default_inventory_url() -> String {
    "http://localhost:3000".into()
}
fn default_api_version() -> String {
    "v1".into()
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_inventory_url(),
            api_version: default_api_version(),
            client: ClientConfig::default(),
        }
    }
}

impl InventoryConfig {
    /// Base URL with the API version appended, e.g. `http://host:3000/v1`.
    pub fn full_base_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RecipesConfig {
    #[serde(default = "default_recipes_url")]
    pub base_url: String,

    /// Service key; sent as the `apiKey` query parameter and as the bearer
    /// credential for recipe calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(flatten)]
    pub client: ClientConfig,
}

fn default_recipes_url() -> String {
    "https://api.spoonacular.com".into()
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self {
            base_url: default_recipes_url(),
            api_key: None,
            client: ClientConfig::default(),
        }
    }
}

impl std::fmt::Debug for RecipesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipesConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("client", &self.client)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(flatten)]
    pub client: ClientConfig,
}

fn default_model_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_url(),
            api_key: None,
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            client: ClientConfig::default(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("client", &self.client)
            .finish()
    }
}

// --- Conversation settings ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool calls a single turn may make across all dispatch cycles.
    #[serde(default = "default_tool_call_budget")]
    pub tool_call_budget: u32,

    /// Wall-clock deadline for a whole turn.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,

    /// Most recent messages sent to the model. 0 = unlimited.
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Fold older messages into a rolling summary once this many have
    /// accumulated since the last one. 0 = never summarise.
    #[serde(default = "default_summarize_after_messages")]
    pub summarize_after_messages: usize,

    /// Replace the built-in system prompt entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_tool_call_budget() -> u32 {
    8
}
fn default_turn_timeout_secs() -> u64 {
    120
}
fn default_max_history_messages() -> usize {
    40
}
fn default_summarize_after_messages() -> usize {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tool_call_budget: default_tool_call_budget(),
            turn_timeout_secs: default_turn_timeout_secs(),
            max_history_messages: default_max_history_messages(),
            summarize_after_messages: default_summarize_after_messages(),
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,

    /// Directory for the file backend. Defaults to `~/.freshmate/history`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl HistoryConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("history"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.freshmate/config.toml).
    ///
    /// Environment fallbacks, applied only when the file leaves a value at
    /// its default or unset:
    /// - `FRESHMATE_INVENTORY_URL`, `FRESHMATE_RECIPES_URL`, `FRESHMATE_MODEL_URL`
    /// - `FRESHMATE_RECIPES_API_KEY`, `FRESHMATE_MODEL_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Fill endpoints and keys from `lookup` where the file did not set them.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.inventory.base_url == default_inventory_url() {
            if let Some(url) = lookup("FRESHMATE_INVENTORY_URL") {
                self.inventory.base_url = url;
            }
        }
        if self.recipes.base_url == default_recipes_url() {
            if let Some(url) = lookup("FRESHMATE_RECIPES_URL") {
                self.recipes.base_url = url;
            }
        }
        if self.model.base_url == default_model_url() {
            if let Some(url) = lookup("FRESHMATE_MODEL_URL") {
                self.model.base_url = url;
            }
        }
        if self.recipes.api_key.is_none() {
            self.recipes.api_key = lookup("FRESHMATE_RECIPES_API_KEY");
        }
        if self.model.api_key.is_none() {
            self.model.api_key = lookup("FRESHMATE_MODEL_API_KEY");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".freshmate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inventory.client.validate("inventory")?;
        self.recipes.client.validate("recipes")?;
        self.model.client.validate("model")?;

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.tool_call_budget < 1 {
            return Err(ConfigError::ValidationError(
                "agent.tool_call_budget must be >= 1".into(),
            ));
        }

        if self.agent.turn_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// A copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for key in [&mut config.recipes.api_key, &mut config.model.api_key] {
            if key.is_some() {
                *key = Some(REDACTED.into());
            }
        }
        config
    }

    /// The effective configuration as TOML, secrets redacted.
    pub fn to_display_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(&self.redacted())
            .map_err(|e| ConfigError::ValidationError(format!("cannot render config: {e}")))
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

impl From<ConfigError> for freshmate_core::Error {
    fn from(err: ConfigError) -> Self {
        freshmate_core::Error::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inventory.api_version, "v1");
        assert_eq!(config.inventory.client.timeout_secs, 30);
        assert_eq!(config.inventory.client.max_retries, 3);
        assert_eq!(config.recipes.base_url, "https://api.spoonacular.com");
        assert_eq!(config.history.backend, HistoryBackend::Memory);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(
            parsed.inventory.client.rate_limit_per_second,
            config.inventory.client.rate_limit_per_second
        );
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml_str = r#"
[inventory]
base_url = "http://pantry.local:3000/"
rate_limit_per_second = 2.5

[agent]
tool_call_budget = 3

[history]
backend = "file"
dir = "/var/lib/freshmate"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.inventory.full_base_url(), "http://pantry.local:3000/v1");
        assert_eq!(config.inventory.client.rate_limit_per_second, 2.5);
        assert_eq!(config.inventory.client.max_retries, 3);
        assert_eq!(config.agent.tool_call_budget, 3);
        assert_eq!(config.agent.turn_timeout_secs, 120);
        assert_eq!(config.agent.summarize_after_messages, 8);
        assert_eq!(config.history.backend, HistoryBackend::File);
        assert_eq!(
            config.history.resolved_dir(),
            PathBuf::from("/var/lib/freshmate")
        );
    }

    #[test]
    fn display_toml_hides_keys() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-live-123".into());
        config.recipes.api_key = Some("spoon-456".into());

        let shown = config.to_display_toml().unwrap();
        assert!(!shown.contains("sk-live-123"));
        assert!(!shown.contains("spoon-456"));
        assert!(shown.contains("[REDACTED]"));
        assert_eq!(config.model.api_key.as_deref(), Some("sk-live-123"));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let mut config = AppConfig::default();
        config.recipes.client.rate_limit_per_second = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recipes.rate_limit_per_second"));
    }

    #[test]
    fn zero_budget_and_timeout_rejected() {
        let mut config = AppConfig::default();
        config.agent.tool_call_budget = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.inventory.client.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
    }

    #[test]
    fn load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\ntemperature = 3.5").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not = [valid").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_fills_only_unset_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FRESHMATE_INVENTORY_URL", "http://env-pantry:3000"),
            ("FRESHMATE_MODEL_URL", "http://env-model/v1"),
            ("FRESHMATE_RECIPES_API_KEY", "env-recipe-key"),
            ("FRESHMATE_MODEL_API_KEY", "env-model-key"),
        ]);
        let mut config = AppConfig::default();
        config.model.base_url = "http://configured/v1".into();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.inventory.base_url, "http://env-pantry:3000");
        assert_eq!(config.model.base_url, "http://configured/v1");
        assert_eq!(config.recipes.api_key.as_deref(), Some("env-recipe-key"));
        assert_eq!(config.model.api_key.as_deref(), Some("env-model-key"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.recipes.api_key = Some("sp-secret".into());
        config.model.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sp-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("8787"));
    }
}
