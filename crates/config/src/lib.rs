//! Configuration loading, validation, and management for clinreact.
//!
//! Loads configuration from `~/.clinreact/config.toml` with environment
//! variable overrides. Validates all settings at startup. Nothing here is
//! global: the loaded struct is passed into the transport, the tools and the
//! loop controller when they are constructed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.clinreact/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat-completion endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// FHIR server used by the patient and immunization tools
    #[serde(default)]
    pub fhir: FhirConfig,

    /// CVX reference table used by the vaccine-code tool
    #[serde(default)]
    pub vaccine_codes: VaccineCodeConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Provider ────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; local servers usually need none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-attempt timeout
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:1234/v1".into()
}
fn default_model() -> String {
    "mistral-7b-instruct-v0.3".into()
}
fn default_provider_timeout() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff() -> u64 {
    500
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_provider_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .finish()
    }
}

// ── Agent ───────────────────────────────────────────────────────────────

/// How the message history is handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPolicy {
    /// One role-tagged entry per message.
    #[default]
    Structured,
    /// Everything concatenated into a single `user` entry.
    Flattened,
}

/// How each question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Free-form tool-augmented reasoning.
    #[default]
    React,
    /// Fixed vaccination-status check: extract patient and disease, compare
    /// the patient's immunizations against the disease's CVX codes.
    VaccineCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: AnswerMode,

    /// Maximum model calls per question
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default)]
    pub render_policy: RenderPolicy,

    /// Tools the model may dispatch to. Empty = every registered tool.
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// Extra trailing role-signature patterns (regex, matched case-insensitively)
    #[serde(default)]
    pub signature_patterns: Vec<String>,

    /// Ask the user to pick when a name search returns several patients
    #[serde(default = "default_true")]
    pub disambiguate: bool,

    /// Which tool returns patient candidates
    #[serde(default = "default_name_resolution_tool")]
    pub name_resolution_tool: String,

    /// Answer from general knowledge when the patient path is abandoned
    #[serde(default = "default_true")]
    pub general_fallback: bool,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Wall-clock budget for one question
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    6
}
fn default_allowed_tools() -> Vec<String> {
    vec!["GetPatientByName".into(), "GetAllImmunizations".into()]
}
fn default_name_resolution_tool() -> String {
    "GetPatientByName".into()
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_session_timeout() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AnswerMode::default(),
            max_steps: default_max_steps(),
            render_policy: RenderPolicy::default(),
            allowed_tools: default_allowed_tools(),
            signature_patterns: vec![],
            disambiguate: true,
            name_resolution_tool: default_name_resolution_tool(),
            general_fallback: true,
            tool_timeout_secs: default_tool_timeout(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

// ── FHIR ────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct FhirConfig {
    #[serde(default = "default_fhir_url")]
    pub base_url: String,

    /// HTTP basic auth user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_fhir_url() -> String {
    "http://127.0.0.1:8080/csp/healthshare/demo/fhir/r4".into()
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            base_url: default_fhir_url(),
            username: None,
            password: None,
        }
    }
}

impl std::fmt::Debug for FhirConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

// ── Vaccine codes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaccineCodeConfig {
    /// SQLite database holding the `cvx_codes` table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// CDC CVX export (pipe-delimited `web_cvx` text) loaded into the table
    /// at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_file: Option<String>,
}

// ── Loading ─────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.clinreact/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup.
    ///
    /// - `CLINREACT_API_KEY` (then `OPENAI_API_KEY`) when no key is configured
    /// - `CLINREACT_BASE_URL`, `CLINREACT_MODEL`
    /// - `CLINREACT_FHIR_URL`, `CLINREACT_FHIR_USER`, `CLINREACT_FHIR_PASSWORD`
    /// - `CLINREACT_CVX_DB`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("CLINREACT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("CLINREACT_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup("CLINREACT_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("CLINREACT_FHIR_URL") {
            self.fhir.base_url = url;
        }
        if let Some(user) = lookup("CLINREACT_FHIR_USER") {
            self.fhir.username = Some(user);
        }
        if let Some(password) = lookup("CLINREACT_FHIR_PASSWORD") {
            self.fhir.password = Some(password);
        }
        if let Some(db) = lookup("CLINREACT_CVX_DB") {
            self.vaccine_codes.database = Some(db);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".clinreact")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.provider.timeout_secs == 0
            || self.agent.tool_timeout_secs == 0
            || self.agent.session_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        if let Some(bad) = self
            .agent
            .allowed_tools
            .iter()
            .find(|t| t.is_empty() || !t.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(ConfigError::ValidationError(format!(
                "agent.allowed_tools entry '{bad}' is not a tool name"
            )));
        }

        if self.agent.mode == AnswerMode::VaccineCheck && self.vaccine_codes.database.is_none() {
            return Err(ConfigError::ValidationError(
                "agent.mode = \"vaccine_check\" needs vaccine_codes.database".into(),
            ));
        }

        if self.vaccine_codes.import_file.is_some() && self.vaccine_codes.database.is_none() {
            return Err(ConfigError::ValidationError(
                "vaccine_codes.import_file needs vaccine_codes.database".into(),
            ));
        }

        for pattern in &self.agent.signature_patterns {
            regex_lite::Regex::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "agent.signature_patterns entry '{pattern}' is invalid: {e}"
                ))
            })?;
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
