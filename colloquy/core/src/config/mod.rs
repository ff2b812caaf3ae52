//! TOML Configuration File Support
//!
//! Centralized configuration loading for colloquy, supporting a TOML
//! configuration file at `~/.config/colloquy/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/colloquy/config.toml` (typically `~/.config/colloquy/config.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! platform = "google-ai"          # or "vertex-ai"
//! model = "gemini-2.5-flash"
//! timeout_secs = 120
//! # project = "my-project"        # Vertex AI only
//! # location = "us-central1"      # Vertex AI only
//!
//! [session]
//! system_instruction = "You are a helpful cooking assistant."
//! streaming = true
//! temperature = 0.7
//!
//! [limits]
//! max_message_size = 102400
//! max_attachments = 16
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::Platform;
use crate::validation::SessionLimits;

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Vertex AI region used when none is configured
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Which Google API surface to talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    /// Generative Language API
    #[default]
    GoogleAi,
    /// Vertex AI
    VertexAi,
}

impl PlatformKind {
    /// Parse the names accepted in the environment
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google-ai" | "googleai" | "gemini" => Some(Self::GoogleAi),
            "vertex-ai" | "vertexai" | "vertex" => Some(Self::VertexAi),
            _ => None,
        }
    }
}

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// API surface
    pub platform: Option<PlatformKind>,

    /// API root URL
    pub base_url: Option<String>,

    /// API key, or access token on Vertex AI (prefer the environment for secrets)
    pub api_key: Option<String>,

    /// Google Cloud project (Vertex AI)
    pub project: Option<String>,

    /// Google Cloud region (Vertex AI)
    pub location: Option<String>,

    /// Model name
    pub model: Option<String>,

    /// HTTP request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// System instruction sent with every request
    pub system_instruction: Option<String>,

    /// Whether responses are streamed
    pub streaming: Option<bool>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Output token cap
    pub max_output_tokens: Option<u32>,

    /// Capacity of the update broadcast channel
    pub update_buffer: Option<usize>,
}

/// Limits section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum message size in bytes
    pub max_message_size: Option<usize>,

    /// Maximum attachments per message
    pub max_attachments: Option<usize>,

    /// Maximum size of one attachment in bytes
    pub max_attachment_bytes: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColloquyToml {
    /// Backend configuration section
    pub backend: BackendToml,

    /// Session configuration section
    pub session: SessionToml,

    /// Limits configuration section
    pub limits: LimitsToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Connection settings for the HTTP backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// API surface
    pub platform: PlatformKind,
    /// API root URL; the platform default when `None`
    pub base_url: Option<String>,
    /// API key, or access token on Vertex AI
    pub api_key: Option<String>,
    /// Google Cloud project (Vertex AI)
    pub project: Option<String>,
    /// Google Cloud region (Vertex AI)
    pub location: Option<String>,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            platform: PlatformKind::GoogleAi,
            base_url: None,
            api_key: None,
            project: None,
            location: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl BackendSettings {
    /// Resolve the platform
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if Vertex AI is selected
    /// without a project.
    pub fn platform(&self) -> Result<Platform, ConfigError> {
        match self.platform {
            PlatformKind::GoogleAi => Ok(Platform::GoogleAi),
            PlatformKind::VertexAi => {
                let project = self
                    .project
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        ConfigError::ValidationError(
                            "vertex-ai platform requires a project".to_string(),
                        )
                    })?;
                let location = self
                    .location
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .unwrap_or(DEFAULT_VERTEX_LOCATION);
                Ok(Platform::VertexAi {
                    project: project.to_string(),
                    location: location.to_string(),
                })
            }
        }
    }
}

/// Per-session settings handed to the controller
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Model name
    pub model: String,
    /// System instruction
    pub system_instruction: Option<String>,
    /// Stream responses by default
    pub streaming: bool,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_output_tokens: Option<u32>,
    /// Capacity of the update broadcast channel
    pub update_buffer: usize,
    /// Input limits
    pub limits: SessionLimits,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_instruction: None,
            streaming: true,
            temperature: None,
            max_output_tokens: None,
            update_buffer: 256,
            limits: SessionLimits::default(),
        }
    }
}

impl SessionConfig {
    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system_instruction(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }
}

/// Centralized configuration for colloquy
///
/// Consolidates configuration from multiple sources and tracks where it came
/// from. Use [`load_config`] to load configuration with proper priority
/// handling.
#[derive(Clone, Debug)]
pub struct ColloquyConfig {
    /// Backend connection settings
    pub backend: BackendSettings,

    /// Session settings
    pub session: SessionConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ColloquyConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            session: SessionConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ColloquyConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check the resolved values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model must not be empty".to_string(),
            ));
        }
        if let Some(t) = self.session.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "temperature {t} outside 0.0..=2.0"
                )));
            }
        }
        self.backend.platform()?;
        if self.backend.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeout must be positive".to_string(),
            ));
        }
        if self.session.update_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "update_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/colloquy/config.toml` or
/// `~/.config/colloquy/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("colloquy").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ColloquyConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ColloquyConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `env`
fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ColloquyConfig, ConfigError> {
    let mut config = ColloquyConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ColloquyToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Environment overrides file values
    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ColloquyConfig, toml: &ColloquyToml) {
    // Backend settings
    if let Some(platform) = toml.backend.platform {
        config.backend.platform = platform;
    }
    if toml.backend.base_url.is_some() {
        config.backend.base_url.clone_from(&toml.backend.base_url);
    }
    if toml.backend.api_key.is_some() {
        config.backend.api_key.clone_from(&toml.backend.api_key);
    }
    if toml.backend.project.is_some() {
        config.backend.project.clone_from(&toml.backend.project);
    }
    if toml.backend.location.is_some() {
        config.backend.location.clone_from(&toml.backend.location);
    }
    if let Some(ref model) = toml.backend.model {
        config.session.model.clone_from(model);
    }
    if let Some(secs) = toml.backend.timeout_secs {
        config.backend.timeout = Duration::from_secs(secs);
    }

    // Session settings
    if toml.session.system_instruction.is_some() {
        config
            .session
            .system_instruction
            .clone_from(&toml.session.system_instruction);
    }
    if let Some(streaming) = toml.session.streaming {
        config.session.streaming = streaming;
    }
    if toml.session.temperature.is_some() {
        config.session.temperature = toml.session.temperature;
    }
    if toml.session.max_output_tokens.is_some() {
        config.session.max_output_tokens = toml.session.max_output_tokens;
    }
    if let Some(buffer) = toml.session.update_buffer {
        config.session.update_buffer = buffer;
    }

    // Limits
    if let Some(size) = toml.limits.max_message_size {
        config.session.limits.max_message_size = size;
    }
    if let Some(count) = toml.limits.max_attachments {
        config.session.limits.max_attachments = count;
    }
    if let Some(bytes) = toml.limits.max_attachment_bytes {
        config.session.limits.max_attachment_bytes = bytes;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ColloquyConfig, env: impl Fn(&str) -> Option<String>) {
    // COLLOQUY_API_KEY wins over the vendor-wide variable
    if let Some(key) = env("COLLOQUY_API_KEY").or_else(|| env("GEMINI_API_KEY")) {
        config.backend.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("COLLOQUY_BASE_URL") {
        config.backend.base_url = Some(url);
        config.source = ConfigSource::Env;
    }
    if let Some(platform) = env("COLLOQUY_PLATFORM") {
        if let Some(kind) = PlatformKind::parse(&platform) {
            config.backend.platform = kind;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(project) = env("COLLOQUY_VERTEX_PROJECT").or_else(|| env("GOOGLE_CLOUD_PROJECT")) {
        config.backend.project = Some(project);
        config.source = ConfigSource::Env;
    }
    if let Some(location) = env("COLLOQUY_VERTEX_LOCATION") {
        config.backend.location = Some(location);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("COLLOQUY_MODEL") {
        config.session.model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("COLLOQUY_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.backend.timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }

    if let Some(system) = env("COLLOQUY_SYSTEM_INSTRUCTION") {
        config.session.system_instruction = Some(system);
        config.source = ConfigSource::Env;
    }
    if let Some(streaming) = env("COLLOQUY_STREAMING") {
        config.session.streaming = streaming != "0" && streaming.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }

    if let Some(size) = env("COLLOQUY_MAX_MESSAGE_SIZE") {
        if let Ok(s) = size.parse::<usize>() {
            config.session.limits.max_message_size = s;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(count) = env("COLLOQUY_MAX_ATTACHMENTS") {
        if let Ok(n) = count.parse::<usize>() {
            config.session.limits.max_attachments = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(bytes) = env("COLLOQUY_MAX_ATTACHMENT_BYTES") {
        if let Ok(n) = bytes.parse::<usize>() {
            config.session.limits.max_attachment_bytes = n;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Model override
    pub model: Option<String>,

    /// System instruction override
    pub system_instruction: Option<String>,

    /// Streaming override
    pub streaming: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set system instruction override
    #[must_use]
    pub fn with_system_instruction(mut self, system: String) -> Self {
        self.system_instruction = Some(system);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ColloquyConfig) {
        if self.model.is_some() || self.system_instruction.is_some() || self.streaming.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref model) = self.model {
            config.session.model.clone_from(model);
        }

        if let Some(ref system) = self.system_instruction {
            config.session.system_instruction = Some(system.clone());
        }

        if let Some(streaming) = self.streaming {
            config.session.streaming = streaming;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
