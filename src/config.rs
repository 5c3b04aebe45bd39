use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::budget::{DEFAULT_MODEL_LIMIT, ModelLimits, SnapPolicy};
use crate::completion::classify::{DEFAULT_CONTEXT_PATTERNS, DEFAULT_TRANSIENT_PATTERNS};
use crate::completion::openai::DEFAULT_BASE_URL;
use crate::completion::retry::{
    DEFAULT_BACKOFF_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_PROMPT_CHARS,
};
use crate::completion::{Backoff, ErrorClassifier, RetryPolicy};
use crate::summarize::DEFAULT_SYSTEM_PROMPT;
use crate::tokenizer::{BpeTokenizer, Encoding, TokenizerError};

pub const CONFIG_FILENAME: &str = ".tokentrim.json";
pub const GLOBAL_CONFIG_DIR: &str = "tokentrim";
pub const GLOBAL_CONFIG_FILENAME: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config found at {}", path.display())]
    NotFound { path: PathBuf },
    #[error("invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value in {}: {reason}", path.display())]
    InvalidValue { path: PathBuf, reason: String },
    #[error("failed to read {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub tokenizer: TokenizerConfig,
    pub models: ModelsConfig,
    pub trim: TrimConfig,
    pub completion: CompletionConfig,
    pub summarize: SummarizeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenizerConfig {
    /// BPE table: cl100k_base, o200k_base, p50k_base or r50k_base
    pub encoding: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    /// Model used when none is given on the command line
    pub default_model: String,
    /// Context window for models missing from the table
    pub default_limit: usize,
    /// Extra or overridden context windows, by exact model name
    pub limits: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimConfig {
    /// Fraction of the budget kept free, in [0, 1)
    pub safety_margin: f64,
    pub snap: SnapPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub max_attempts: u32,
    /// Wait after each failed attempt, in seconds; the last entry repeats
    pub backoff_secs: Vec<u64>,
    /// Use exponential backoff with jitter instead of the fixed schedule
    pub exponential_backoff: bool,
    /// Prompts at or below this length are never halved
    pub min_prompt_chars: usize,
    /// Overall limit for one call including retries (None = unlimited)
    pub deadline_secs: Option<u64>,
    pub request_timeout_secs: u64,
    /// Replaces the built-in context-length patterns when set
    pub context_patterns: Option<Vec<String>>,
    /// Replaces the built-in transient-error patterns when set
    pub transient_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummarizeConfig {
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: String,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default().name().to_string(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-3.5-turbo".to_string(),
            default_limit: DEFAULT_MODEL_LIMIT,
            limits: HashMap::new(),
        }
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            safety_margin: 0.1,
            snap: SnapPolicy::WhenOverBudget,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            exponential_backoff: false,
            min_prompt_chars: DEFAULT_MIN_PROMPT_CHARS,
            deadline_secs: None,
            request_timeout_secs: 120,
            context_patterns: None,
            transient_patterns: None,
        }
    }
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 512,
            temperature: Some(0.3),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Returns the path to the global config file, if the platform config dir exists.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILENAME))
}

/// Reads a JSON file as a `serde_json::Value`. Returns empty `{}` if the file doesn't exist.
fn load_json_file(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Recursively merges two JSON values. Objects merge key-by-key; arrays and scalars
/// in `overlay` replace whatever is in `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Loads and merges global + local config files, then deserializes into `Config`.
/// Global config errors are logged and skipped; local config errors propagate.
pub fn load_and_merge(
    global_path: Option<&Path>,
    local_path: &Path,
) -> Result<Config, ConfigError> {
    let global_value = match global_path {
        Some(path) => match load_json_file(path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load global config, skipping");
                Value::Object(serde_json::Map::new())
            }
        },
        None => Value::Object(serde_json::Map::new()),
    };

    let local_value = load_json_file(local_path)?;
    let merged = deep_merge(global_value, local_value);

    let config: Config =
        serde_json::from_value(merged).map_err(|e| ConfigError::InvalidJson {
            path: local_path.to_path_buf(),
            source: e,
        })?;
    config.check(local_path)?;
    Ok(config)
}

impl Config {
    pub fn load(dir: &str) -> Result<Self, ConfigError> {
        let local_path = Path::new(dir).join(CONFIG_FILENAME);
        load_and_merge(global_config_path().as_deref(), &local_path)
    }

    pub fn validate_file(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.check(path)?;
        Ok(config)
    }

    pub fn validate(dir: &str) -> Result<Config, ConfigError> {
        let config_path = Path::new(dir).join(CONFIG_FILENAME);
        Self::validate_file(&config_path)
    }

    /// Range checks serde cannot express.
    fn check(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            path: path.to_path_buf(),
            reason,
        };
        if let Err(e) = self.tokenizer.encoding.parse::<Encoding>() {
            return Err(invalid(format!("tokenizer.encoding: {e}")));
        }
        if !(0.0..1.0).contains(&self.trim.safety_margin) {
            return Err(invalid(format!(
                "trim.safety_margin must be in [0, 1), got {}",
                self.trim.safety_margin
            )));
        }
        if self.completion.max_attempts == 0 {
            return Err(invalid("completion.max_attempts must be at least 1".to_string()));
        }
        if self.models.default_limit == 0 {
            return Err(invalid("models.default_limit must be positive".to_string()));
        }
        if let Some((model, _)) = self.models.limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(invalid(format!("models.limits.{model} must be positive")));
        }
        Ok(())
    }

    pub fn encoding(&self) -> Result<Encoding, TokenizerError> {
        self.tokenizer.encoding.parse()
    }

    pub fn tokenizer(&self) -> Result<BpeTokenizer, TokenizerError> {
        BpeTokenizer::new(self.encoding()?)
    }

    pub fn model_limits(&self) -> ModelLimits {
        ModelLimits::with_overrides(&self.models.limits, self.models.default_limit)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let c = &self.completion;
        let backoff = if c.exponential_backoff {
            let initial = c.backoff_secs.first().copied().unwrap_or(DEFAULT_BACKOFF_SECS[0]);
            let max = c.backoff_secs.last().copied().unwrap_or(DEFAULT_BACKOFF_SECS[2]);
            Backoff::Exponential {
                initial: Duration::from_secs(initial),
                max: Duration::from_secs(max.max(initial)),
                multiplier: 2.0,
                jitter: 0.25,
            }
        } else {
            Backoff::Fixed(c.backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect())
        };
        RetryPolicy {
            max_attempts: c.max_attempts,
            backoff,
            min_prompt_chars: c.min_prompt_chars,
            deadline: c.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn classifier(&self) -> ErrorClassifier {
        let c = &self.completion;
        let or_default = |patterns: &Option<Vec<String>>, defaults: &[&str]| -> Vec<String> {
            patterns
                .clone()
                .unwrap_or_else(|| defaults.iter().map(|p| p.to_string()).collect())
        };
        ErrorClassifier::with_patterns(
            or_default(&c.context_patterns, DEFAULT_CONTEXT_PATTERNS),
            or_default(&c.transient_patterns, DEFAULT_TRANSIENT_PATTERNS),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.completion.request_timeout_secs.max(1))
    }

    /// API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.completion.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
