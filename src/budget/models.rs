use std::collections::HashMap;

/// Ceiling used for any model missing from the table.
pub const DEFAULT_MODEL_LIMIT: usize = 4096;

const BUILTIN_LIMITS: &[(&str, usize)] = &[
    ("gpt-3.5-turbo", 4_096),
    ("gpt-3.5-turbo-16k", 16_384),
    ("gpt-3.5-turbo-0125", 16_385),
    ("gpt-3.5-turbo-1106", 16_385),
    ("gpt-4", 8_192),
    ("gpt-4-32k", 32_768),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-turbo-preview", 128_000),
    ("gpt-4-1106-preview", 128_000),
    ("gpt-4-0125-preview", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("gpt-4.1-nano", 1_047_576),
    ("o1", 200_000),
    ("o1-mini", 128_000),
    ("o3", 200_000),
    ("o3-mini", 200_000),
    ("o4-mini", 200_000),
    ("claude-3-haiku-20240307", 200_000),
    ("claude-3-sonnet-20240229", 200_000),
    ("claude-3-opus-20240229", 200_000),
    ("claude-3-5-sonnet-20241022", 200_000),
    ("gemini-1.5-flash", 1_048_576),
    ("gemini-1.5-pro", 2_097_152),
];

/// Maps model identifiers to their context window, in tokens.
///
/// Built once at startup and shared read-only. Lookups are exact; unknown
/// models get the default ceiling instead of an error.
#[derive(Debug, Clone)]
pub struct ModelLimits {
    limits: HashMap<String, usize>,
    default_limit: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelLimits {
    pub fn builtin() -> Self {
        Self {
            limits: BUILTIN_LIMITS
                .iter()
                .map(|(name, limit)| (name.to_string(), *limit))
                .collect(),
            default_limit: DEFAULT_MODEL_LIMIT,
        }
    }

    /// Built-in table with `overrides` layered on top. Zero limits are ignored.
    pub fn with_overrides(overrides: &HashMap<String, usize>, default_limit: usize) -> Self {
        let mut table = Self::builtin();
        for (name, limit) in overrides {
            if *limit == 0 {
                tracing::warn!(model = %name, "Ignoring zero token limit override");
                continue;
            }
            table.limits.insert(name.clone(), *limit);
        }
        if default_limit > 0 {
            table.default_limit = default_limit;
        }
        table
    }

    pub fn max_tokens(&self, model: &str) -> usize {
        match self.limits.get(model) {
            Some(limit) => *limit,
            None => {
                tracing::debug!(model, default = self.default_limit, "Unknown model, using default limit");
                self.default_limit
            }
        }
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.limits.contains_key(model)
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// All entries sorted by model name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .limits
            .iter()
            .map(|(name, limit)| (name.as_str(), *limit))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_models() {
        let limits = ModelLimits::builtin();
        assert_eq!(limits.max_tokens("gpt-4"), 8_192);
        assert_eq!(limits.max_tokens("gpt-3.5-turbo"), 4_096);
        assert_eq!(limits.max_tokens("gpt-4o"), 128_000);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let limits = ModelLimits::builtin();
        assert_eq!(limits.max_tokens("my-local-llama"), DEFAULT_MODEL_LIMIT);
        assert!(!limits.is_known("my-local-llama"));
    }

    #[test]
    fn test_lookup_is_exact() {
        let limits = ModelLimits::builtin();
        assert_eq!(limits.max_tokens("GPT-4"), DEFAULT_MODEL_LIMIT);
        assert_eq!(limits.max_tokens("gpt-4 "), DEFAULT_MODEL_LIMIT);
    }

    #[test]
    fn test_overrides() {
        let overrides = HashMap::from([
            ("gpt-4".to_string(), 10_000),
            ("llama3".to_string(), 8_000),
            ("broken".to_string(), 0),
        ]);
        let limits = ModelLimits::with_overrides(&overrides, 2048);
        assert_eq!(limits.max_tokens("gpt-4"), 10_000);
        assert_eq!(limits.max_tokens("llama3"), 8_000);
        assert!(!limits.is_known("broken"));
        assert_eq!(limits.max_tokens("unknown"), 2048);
        // untouched builtin entries survive
        assert_eq!(limits.max_tokens("gpt-4o"), 128_000);
    }

    #[test]
    fn test_iter_sorted() {
        let limits = ModelLimits::builtin();
        let names: Vec<&str> = limits.iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), BUILTIN_LIMITS.len());
    }
}
