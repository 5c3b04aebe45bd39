//! Error classification for retry decisions.

use super::ProviderError;

/// How the retry loop should react to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request exceeded the model's context window. Retried with a
    /// shorter prompt.
    ContextOverflow,
    /// Rate limiting, timeouts, 5xx, dropped connections. Retried after a
    /// backoff.
    Transient,
    /// Anything else. Never retried.
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }
}

pub const DEFAULT_CONTEXT_PATTERNS: &[&str] = &[
    "maximum context length",
    "context_length_exceeded",
    "context length",
    "context window",
    "too many tokens",
    "reduce the length",
];

pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "timeout",
    "timed out",
    "econnreset",
    "connection reset",
    "temporarily unavailable",
    "overloaded",
];

/// Maps provider errors to an [`ErrorClass`].
///
/// Message patterns are matched case-insensitively as substrings; purely
/// numeric patterns (status codes) only match when not embedded in a longer
/// number. Context patterns win over everything else, then the structured
/// HTTP status, then the transient patterns.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    context_patterns: Vec<String>,
    transient_patterns: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_patterns(
            DEFAULT_CONTEXT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            DEFAULT_TRANSIENT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        )
    }
}

impl ErrorClassifier {
    pub fn with_patterns(context_patterns: Vec<String>, transient_patterns: Vec<String>) -> Self {
        let normalize = |patterns: Vec<String>| -> Vec<String> {
            patterns
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            context_patterns: normalize(context_patterns),
            transient_patterns: normalize(transient_patterns),
        }
    }

    pub fn classify(&self, err: &ProviderError) -> ErrorClass {
        let message = err.message.to_lowercase();

        if matches_any(&message, &self.context_patterns) {
            return ErrorClass::ContextOverflow;
        }

        match err.status {
            Some(408 | 429 | 500..=599) => return ErrorClass::Transient,
            Some(401 | 403) => return ErrorClass::Fatal,
            _ => {}
        }

        if matches_any(&message, &self.transient_patterns) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

fn matches_any(haystack: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| contains_pattern(haystack, p))
}

fn contains_pattern(haystack: &str, pattern: &str) -> bool {
    if !pattern.bytes().all(|b| b.is_ascii_digit()) {
        return haystack.contains(pattern);
    }
    let bytes = haystack.as_bytes();
    haystack.match_indices(pattern).any(|(start, m)| {
        let end = start + m.len();
        let before = start > 0 && bytes[start - 1].is_ascii_digit();
        let after = end < bytes.len() && bytes[end].is_ascii_digit();
        !before && !after
    })
}
