//! Configuration loading, validation, and management for membound.
//!
//! Loads configuration from `~/.membound/config.toml` with environment
//! variable overrides. Validates all settings up front: an out-of-range value
//! or an unknown policy name is an error, never a silent default.

use membound_core::ContextError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable overriding [`ContextConfig::policy`].
pub const ENV_POLICY: &str = "MEMBOUND_POLICY";
/// Environment variable overriding [`ContextConfig::max_tokens`].
pub const ENV_MAX_TOKENS: &str = "MEMBOUND_MAX_TOKENS";

/// The root configuration structure.
///
/// Maps directly to `~/.membound/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Active retention policy
    #[serde(default)]
    pub policy: PolicyKind,

    /// Token budget for the retained context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Upper bound on any embedding or summarizer call made during a reclaim
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub hybrid: HybridConfig,

    #[serde(default)]
    pub importance: ImportanceConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub assembler: AssemblerConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_max_tokens() -> usize {
    512
}
fn default_backend_timeout_ms() -> u64 {
    2_000
}
fn default_true() -> bool {
    true
}

/// Which retention policy the buffer runs on overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Sliding,
    Importance,
    Semantic,
    RollingSummary,
    Hybrid,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 5] = [
        Self::Sliding,
        Self::Importance,
        Self::Semantic,
        Self::RollingSummary,
        Self::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sliding => "sliding",
            Self::Importance => "importance",
            Self::Semantic => "semantic",
            Self::RollingSummary => "rolling_summary",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ConfigError::ValidationError(format!("unknown policy '{s}'")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Cosine similarity at or above which two spans share a cluster, in (0, 1]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

fn default_similarity_threshold() -> f32 {
    0.85
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Share of the overflow reclaimed by sliding eviction before importance
    /// selection runs, in [0, 1]
    #[serde(default = "default_fast_evict_fraction")]
    pub fast_evict_fraction: f32,
}

fn default_fast_evict_fraction() -> f32 {
    0.5
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            fast_evict_fraction: default_fast_evict_fraction(),
        }
    }
}

/// Weights for the built-in recency scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceConfig {
    /// Per-step decay applied to older spans, in (0, 1]
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,

    #[serde(default = "default_system_weight")]
    pub system_weight: f64,

    #[serde(default = "default_one")]
    pub user_weight: f64,

    #[serde(default = "default_one")]
    pub assistant_weight: f64,

    #[serde(default = "default_summary_weight")]
    pub summary_weight: f64,
}

fn default_recency_decay() -> f64 {
    0.9
}
fn default_system_weight() -> f64 {
    4.0
}
fn default_summary_weight() -> f64 {
    2.0
}
fn default_one() -> f64 {
    1.0
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            recency_decay: default_recency_decay(),
            system_weight: default_system_weight(),
            user_weight: default_one(),
            assistant_weight: default_one(),
            summary_weight: default_summary_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Largest summary the summarizer is asked for
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: usize,

    /// Reject summaries that introduce facts absent from their source
    #[serde(default)]
    pub qa_gate: bool,

    /// Fraction of summary facts that must be grounded, in [0, 1]
    #[serde(default = "default_qa_threshold")]
    pub qa_threshold: f64,
}

fn default_max_summary_tokens() -> usize {
    128
}
fn default_qa_threshold() -> f64 {
    0.75
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_summary_tokens: default_max_summary_tokens(),
            qa_gate: false,
            qa_threshold: default_qa_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Maximum cached vectors before least-recently-used eviction; 0 = unbounded
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize {
    1_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Inserted between consecutive spans
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Prefix every span with `role: `
    #[serde(default = "default_true")]
    pub role_tags: bool,
}

fn default_separator() -> String {
    "\n".into()
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            role_tags: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether snapshots are published at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of recent turns the metrics collector aggregates over
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    100
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_window(),
        }
    }
}

impl ContextConfig {
    /// Load configuration from the default path (~/.membound/config.toml),
    /// then apply `MEMBOUND_POLICY` / `MEMBOUND_MAX_TOKENS` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from a specific file path, then apply the same
    /// environment overrides as [`ContextConfig::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path` with overrides taken from `lookup`.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::read(path)?;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(policy) = lookup(ENV_POLICY) {
            self.policy = policy.parse()?;
            tracing::info!(policy = %self.policy, "Policy overridden from environment");
        }

        if let Some(raw) = lookup(ENV_MAX_TOKENS) {
            self.max_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{ENV_MAX_TOKENS} must be a positive integer, got '{raw}'"))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".membound")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.backend_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("backend_timeout_ms must be > 0".into()));
        }

        let threshold = self.semantic.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "semantic.similarity_threshold must be in (0, 1]".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.hybrid.fast_evict_fraction) {
            return Err(ConfigError::ValidationError(
                "hybrid.fast_evict_fraction must be in [0, 1]".into(),
            ));
        }

        let decay = self.importance.recency_decay;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(ConfigError::ValidationError(
                "importance.recency_decay must be in (0, 1]".into(),
            ));
        }

        let weights = [
            self.importance.system_weight,
            self.importance.user_weight,
            self.importance.assistant_weight,
            self.importance.summary_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::ValidationError(
                "importance weights must be finite and >= 0".into(),
            ));
        }

        if self.summary.max_summary_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "summary.max_summary_tokens must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.summary.qa_threshold) {
            return Err(ConfigError::ValidationError(
                "summary.qa_threshold must be in [0, 1]".into(),
            ));
        }

        if self.telemetry.window == 0 {
            return Err(ConfigError::ValidationError("telemetry.window must be > 0".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            max_tokens: default_max_tokens(),
            backend_timeout_ms: default_backend_timeout_ms(),
            semantic: SemanticConfig::default(),
            hybrid: HybridConfig::default(),
            importance: ImportanceConfig::default(),
            summary: SummaryConfig::default(),
            embedding: EmbeddingConfig::default(),
            assembler: AssemblerConfig::default(),
            telemetry: TelemetryConfig::default(),
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

impl From<ConfigError> for ContextError {
    fn from(err: ConfigError) -> Self {
        ContextError::InvalidConfiguration(err.to_string())
    }
}
