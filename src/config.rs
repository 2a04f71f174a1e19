//! Generation run configuration, persisted as TOML.
//!
//! A run config names the source table, the target (one barcode or a whole
//! collection), the summarization strategy thresholds, the provider and its
//! generation parameters, the conversation settings, and checkpoint cadence.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tokenizer::TokenizerKind;

/// Errors from configuration handling.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(grokken::config::read),
        help("Ensure the config file exists. `grokken init-config <path>` writes a default one.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(grokken::config::parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(grokken::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for `{field}`: {message}")]
    #[diagnostic(code(grokken::config::invalid), help("Fix the value and rerun."))]
    Invalid { field: String, message: String },

    #[error("config must name exactly one of `barcode` or `collection`")]
    #[diagnostic(
        code(grokken::config::target),
        help("Set `barcode = \"...\"` for a single book or `collection = \"...\"` for a batch.")
    )]
    Target,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ── Strategy ────────────────────────────────────────────────────────────

/// Token budgets deciding how a book is summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Model context window.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Target length of each segment summary.
    #[serde(default = "default_segment_summary_tokens")]
    pub segment_summary_tokens: usize,
    /// Target length of the final (or short-book) summary.
    #[serde(default = "default_final_summary_tokens")]
    pub final_summary_tokens: usize,
    /// Q&A turns across the whole-document conversation.
    #[serde(default = "default_qa_turns")]
    pub qa_turns: usize,
    /// Books below this many tokens are summarized in one call.
    #[serde(default = "default_short_book_threshold")]
    pub short_book_threshold: usize,
}

fn default_max_context_tokens() -> usize {
    131_000
}
fn default_segment_summary_tokens() -> usize {
    8_000
}
fn default_final_summary_tokens() -> usize {
    16_000
}
fn default_qa_turns() -> usize {
    5
}
fn default_short_book_threshold() -> usize {
    131_000
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            segment_summary_tokens: default_segment_summary_tokens(),
            final_summary_tokens: default_final_summary_tokens(),
            qa_turns: default_qa_turns(),
            short_book_threshold: default_short_book_threshold(),
        }
    }
}

// ── Provider ────────────────────────────────────────────────────────────

/// Which backend serves generation requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Provider selection and default generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub name: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum output tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Override the API base URL (proxies, gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key, if not the backend default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_model() -> String {
    "gpt-5.2".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    128_000
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: ProviderKind::default(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_url: None,
            api_key_env: None,
        }
    }
}

// ── Conversation ────────────────────────────────────────────────────────

/// Simulated-reader conversation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaConfig {
    /// Generate a short conversation after each segment summary.
    #[serde(default = "default_true")]
    pub segment_qa: bool,
    #[serde(default = "default_segment_qa_turns")]
    pub segment_qa_turns: usize,
    /// Skip per-segment Q&A when the summarization round-trip reached this
    /// many tokens; the training sample would overflow the sequence length.
    #[serde(default = "default_segment_qa_token_threshold")]
    pub segment_qa_token_threshold: u64,
    /// Chance of a synthesis question on the first turn of a later segment.
    #[serde(default = "default_synthesis_probability")]
    pub synthesis_probability: f64,
    /// Chance of asking the reader to reference an earlier chapter.
    #[serde(default = "default_cross_reference_probability")]
    pub cross_reference_probability: f64,
    /// Character budget for history sent with each answer request.
    #[serde(default = "default_max_conversation_chars")]
    pub max_conversation_chars: usize,
}

fn default_true() -> bool {
    true
}
fn default_segment_qa_turns() -> usize {
    5
}
fn default_segment_qa_token_threshold() -> u64 {
    105_000
}
fn default_synthesis_probability() -> f64 {
    0.4
}
fn default_cross_reference_probability() -> f64 {
    0.5
}
fn default_max_conversation_chars() -> usize {
    320_000
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            segment_qa: true,
            segment_qa_turns: default_segment_qa_turns(),
            segment_qa_token_threshold: default_segment_qa_token_threshold(),
            synthesis_probability: default_synthesis_probability(),
            cross_reference_probability: default_cross_reference_probability(),
            max_conversation_chars: default_max_conversation_chars(),
        }
    }
}

// ── Run ─────────────────────────────────────────────────────────────────

/// A complete generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Run name, recorded in checkpoints.
    pub name: String,
    /// JSONL source table with `barcode`, `text`, `title`, `author`, `date`.
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Checkpoint after every N segments.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    /// Resume the matching document from this checkpoint file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<PathBuf>,
    /// Pick up `checkpoint_<barcode>.json` from the output dir when present.
    #[serde(default)]
    pub auto_resume: bool,
    /// Seed for question-style selection; random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub tokenizer: TokenizerKind,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub qa: QaConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output/generation")
}
fn default_checkpoint_every() -> usize {
    1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            source: PathBuf::from("data/books.jsonl"),
            barcode: None,
            collection: None,
            output_dir: default_output_dir(),
            checkpoint_every: default_checkpoint_every(),
            resume_from: None,
            auto_resume: false,
            seed: None,
            tokenizer: TokenizerKind::default(),
            strategy: StrategyConfig::default(),
            provider: ProviderConfig::default(),
            qa: QaConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check cross-field constraints serde can't express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.barcode.is_some() == self.collection.is_some() {
            return Err(ConfigError::Target);
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(invalid(
                "provider.temperature",
                format!("{} is outside 0.0..=2.0", self.provider.temperature),
            ));
        }
        if self.provider.max_retries > 10 {
            return Err(invalid(
                "provider.max_retries",
                format!("{} exceeds the limit of 10", self.provider.max_retries),
            ));
        }
        if self.provider.max_tokens == 0 {
            return Err(invalid("provider.max_tokens", "must be positive".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(invalid("checkpoint_every", "must be at least 1".into()));
        }
        let s = &self.strategy;
        for (field, value) in [
            ("strategy.max_context_tokens", s.max_context_tokens),
            ("strategy.segment_summary_tokens", s.segment_summary_tokens),
            ("strategy.final_summary_tokens", s.final_summary_tokens),
            ("strategy.qa_turns", s.qa_turns),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be positive".into()));
            }
        }
        for (field, p) in [
            ("qa.synthesis_probability", self.qa.synthesis_probability),
            (
                "qa.cross_reference_probability",
                self.qa.cross_reference_probability,
            ),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid(field, format!("{p} is outside 0.0..=1.0")));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_book() -> GenerationConfig {
        GenerationConfig {
            barcode: Some("32044010149714".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_match_production_values() {
        let c = GenerationConfig::default();
        assert_eq!(c.strategy.max_context_tokens, 131_000);
        assert_eq!(c.strategy.segment_summary_tokens, 8_000);
        assert_eq!(c.strategy.short_book_threshold, 131_000);
        assert_eq!(c.provider.model, "gpt-5.2");
        assert_eq!(c.provider.max_retries, 3);
        assert_eq!(c.qa.segment_qa_token_threshold, 105_000);
        assert_eq!(c.checkpoint_every, 1);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let c: GenerationConfig = toml::from_str(
            r#"
name = "principia"
source = "books.jsonl"
collection = "principia"

[provider]
name = "anthropic"
model = "claude-sonnet-4-5-20250929"
"#,
        )
        .unwrap();
        assert_eq!(c.provider.name, ProviderKind::Anthropic);
        assert_eq!(c.provider.temperature, 0.7);
        assert_eq!(c.strategy.qa_turns, 5);
        assert_eq!(c.tokenizer, TokenizerKind::O200k);
        c.validate().unwrap();
    }

    #[test]
    fn target_must_be_exactly_one() {
        let none = GenerationConfig::default();
        assert!(matches!(none.validate(), Err(ConfigError::Target)));

        let both = GenerationConfig {
            collection: Some("principia".into()),
            ..single_book()
        };
        assert!(matches!(both.validate(), Err(ConfigError::Target)));
        single_book().validate().unwrap();
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut c = single_book();
        c.provider.temperature = 2.5;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_checkpoint_cadence_rejected() {
        let mut c = single_book();
        c.checkpoint_every = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("run.toml");
        let mut c = single_book();
        c.seed = Some(7);
        c.qa.segment_qa = false;
        c.save(&path).unwrap();
        let loaded = GenerationConfig::load(&path).unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn unknown_provider_is_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            "name = \"x\"\nsource = \"s\"\nbarcode = \"b\"\n[provider]\nname = \"llamafile\"\n",
        )
        .unwrap();
        assert!(matches!(
            GenerationConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
