pub mod models;
pub mod sentences;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tokenizer::Tokenizer;
pub use models::{DEFAULT_MODEL_LIMIT, ModelLimits};

/// Whether trimmed text should end on a sentence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapPolicy {
    /// Plain token slicing, sentence boundaries are ignored.
    Never,
    /// Text that fits is returned unchanged; text over budget is cut at the
    /// last sentence end that fits.
    #[default]
    WhenOverBudget,
    /// Like `WhenOverBudget`, but text that fits is also cut back to its last
    /// sentence end.
    Always,
}

impl std::str::FromStr for SnapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(SnapPolicy::Never),
            "when_over_budget" | "over" => Ok(SnapPolicy::WhenOverBudget),
            "always" => Ok(SnapPolicy::Always),
            other => Err(format!(
                "unknown snap policy '{other}' (expected never, when_over_budget or always)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Input fit the budget and was returned as is.
    Unchanged,
    /// Input fit, but the tail after the last sentence end was dropped.
    Snapped,
    /// Cut at the last sentence end within budget.
    SentenceBoundary,
    /// No sentence end fit; cut at the token budget.
    TokenSlice,
    /// Empty input or zero budget.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimmed {
    pub text: String,
    pub tokens: usize,
    pub outcome: TrimOutcome,
}

impl Trimmed {
    fn empty() -> Self {
        Self {
            text: String::new(),
            tokens: 0,
            outcome: TrimOutcome::Empty,
        }
    }

    pub fn was_cut(&self) -> bool {
        !matches!(self.outcome, TrimOutcome::Unchanged)
    }
}

/// A single trim call. Nothing outlives the call.
#[derive(Debug, Clone, Copy)]
pub struct TrimRequest<'a> {
    pub text: &'a str,
    pub budget: usize,
    pub safety_margin: f64,
    pub snap: SnapPolicy,
}

/// `floor(budget * (1 - margin))`, with the margin clamped into `[0, 1]`.
pub fn allowed_tokens(budget: usize, safety_margin: f64) -> usize {
    let margin = if safety_margin.is_nan() {
        0.0
    } else {
        safety_margin.clamp(0.0, 1.0)
    };
    // Epsilon absorbs float error such as 1.0 - 0.9 = 0.0999..98
    (budget as f64 * (1.0 - margin) + 1e-9).floor() as usize
}

/// Token-aware text trimmer.
///
/// Produces the longest prefix of the input that encodes to no more than the
/// allowed number of tokens, preferring to end on a sentence boundary.
#[derive(Clone)]
pub struct TokenBudget {
    tokenizer: Arc<dyn Tokenizer>,
    safety_margin: f64,
    snap: SnapPolicy,
}

impl TokenBudget {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            safety_margin: 0.0,
            snap: SnapPolicy::default(),
        }
    }

    pub fn with_safety_margin(mut self, safety_margin: f64) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn with_snap(mut self, snap: SnapPolicy) -> Self {
        self.snap = snap;
        self
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn count(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    pub fn allowed(&self, budget: usize) -> usize {
        allowed_tokens(budget, self.safety_margin)
    }

    pub fn fits(&self, text: &str, budget: usize) -> bool {
        self.count(text) <= self.allowed(budget)
    }

    pub fn trim(&self, text: &str, budget: usize) -> Trimmed {
        self.trim_request(&TrimRequest {
            text,
            budget,
            safety_margin: self.safety_margin,
            snap: self.snap,
        })
    }

    /// Trims to the context window of `model`.
    pub fn trim_for_model(&self, text: &str, model: &str, limits: &ModelLimits) -> Trimmed {
        self.trim(text, limits.max_tokens(model))
    }

    pub fn trim_request(&self, req: &TrimRequest<'_>) -> Trimmed {
        let text = req.text.trim();
        let allowed = allowed_tokens(req.budget, req.safety_margin);
        if text.is_empty() || allowed == 0 {
            return Trimmed::empty();
        }

        let tokens = self.tokenizer.encode(text);
        if tokens.len() <= allowed {
            if req.snap == SnapPolicy::Always
                && let Some(end) = sentences::last_boundary_at_or_before(text, text.len())
                && end < text.len()
            {
                let snapped = &text[..end];
                return Trimmed {
                    tokens: self.tokenizer.count(snapped),
                    text: snapped.to_string(),
                    outcome: TrimOutcome::Snapped,
                };
            }
            return Trimmed {
                text: text.to_string(),
                tokens: tokens.len(),
                outcome: TrimOutcome::Unchanged,
            };
        }

        if req.snap != SnapPolicy::Never
            && let Some((end, count)) = self.last_fitting_boundary(text, allowed)
        {
            tracing::debug!(
                total = tokens.len(),
                allowed,
                kept = count,
                "Trimmed at sentence boundary"
            );
            return Trimmed {
                text: text[..end].to_string(),
                tokens: count,
                outcome: TrimOutcome::SentenceBoundary,
            };
        }

        self.token_slice(&tokens, allowed)
    }

    /// Latest sentence end whose prefix fits. Prefix token counts grow with
    /// the prefix, so the fitting ends form a leading run of the boundary list
    /// and a binary search finds its last element in O(log n) encodes.
    fn last_fitting_boundary(&self, text: &str, allowed: usize) -> Option<(usize, usize)> {
        let ends: Vec<usize> = sentences::boundaries(text).collect();
        let fitting = ends.partition_point(|&end| self.tokenizer.count(&text[..end]) <= allowed);
        // BPE merges can make counts locally non-monotone; step back until one fits
        ends[..fitting].iter().rev().find_map(|&end| {
            let count = self.tokenizer.count(&text[..end]);
            (count <= allowed).then_some((end, count))
        })
    }

    fn token_slice(&self, tokens: &[u32], allowed: usize) -> Trimmed {
        let mut take = allowed.min(tokens.len());
        loop {
            let text = self.tokenizer.decode(&tokens[..take]).trim_end().to_string();
            let count = self.tokenizer.count(&text);
            if count <= allowed || take == 0 {
                tracing::debug!(total = tokens.len(), allowed, kept = count, "Trimmed at token slice");
                return Trimmed {
                    text,
                    tokens: count,
                    outcome: TrimOutcome::TokenSlice,
                };
            }
            // Re-encoding grew past the budget; give up one more token
            take -= 1;
        }
    }
}

impl std::fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudget")
            .field("safety_margin", &self.safety_margin)
            .field("snap", &self.snap)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tokenizer::{BpeTokenizer, Encoding};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// One token per word (with its leading whitespace) and one per
    /// punctuation mark.
    #[derive(Default)]
    pub(crate) struct WordTokenizer {
        vocab: Mutex<(Vec<String>, HashMap<String, u32>)>,
    }

    impl WordTokenizer {
        fn pieces(text: &str) -> Vec<String> {
            let mut pieces = Vec::new();
            let mut current = String::new();
            let mut in_word = false;
            for c in text.chars() {
                if c.is_whitespace() {
                    if in_word {
                        pieces.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                    current.push(c);
                } else if c.is_alphanumeric() {
                    current.push(c);
                    in_word = true;
                } else {
                    if in_word {
                        pieces.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                    current.push(c);
                    pieces.push(std::mem::take(&mut current));
                }
            }
            if !current.is_empty() {
                pieces.push(current);
            }
            pieces
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            let mut vocab = self.vocab.lock().unwrap();
            Self::pieces(text)
                .into_iter()
                .map(|piece| {
                    if let Some(id) = vocab.1.get(&piece) {
                        return *id;
                    }
                    let id = vocab.0.len() as u32;
                    vocab.0.push(piece.clone());
                    vocab.1.insert(piece, id);
                    id
                })
                .collect()
        }

        fn decode(&self, tokens: &[u32]) -> String {
            let vocab = self.vocab.lock().unwrap();
            tokens
                .iter()
                .filter_map(|id| vocab.0.get(*id as usize))
                .map(String::as_str)
                .collect()
        }
    }

    fn words() -> TokenBudget {
        TokenBudget::new(Arc::new(WordTokenizer::default()))
    }

    fn bpe() -> TokenBudget {
        TokenBudget::new(Arc::new(BpeTokenizer::new(Encoding::Cl100kBase).unwrap()))
    }

    const PROSE: &str = "Rust is a systems programming language. It guarantees memory safety \
        without a garbage collector! Ownership rules are checked at compile time. Is that \
        hard to learn? Many people think so at first. The borrow checker becomes a helpful \
        companion over time.";

    #[test]
    fn test_allowed_tokens() {
        assert_eq!(allowed_tokens(100, 0.0), 100);
        assert_eq!(allowed_tokens(100, 0.1), 90);
        assert_eq!(allowed_tokens(10, 0.9), 1);
        assert_eq!(allowed_tokens(4096, 0.25), 3072);
        assert_eq!(allowed_tokens(7, 0.5), 3);
        assert_eq!(allowed_tokens(100, -1.0), 100);
        assert_eq!(allowed_tokens(100, 1.0), 0);
        assert_eq!(allowed_tokens(100, f64::NAN), 100);
    }

    #[test]
    fn test_hello_world_keeps_first_sentence() {
        let budget = words();
        let out = budget.trim("Hello. World.", 3);
        assert_eq!(out.text, "Hello.");
        assert_eq!(out.tokens, 2);
        assert_eq!(out.outcome, TrimOutcome::SentenceBoundary);
    }

    #[test]
    fn test_under_budget_is_unchanged() {
        let budget = words();
        let text: Vec<String> = (0..50).map(|i| format!("w{i}")).collect();
        let text = text.join(" ");
        assert_eq!(budget.count(&text), 50);
        let out = budget.trim(&text, 100);
        assert_eq!(out.text, text);
        assert_eq!(out.outcome, TrimOutcome::Unchanged);
        assert!(!out.was_cut());
    }

    #[test]
    fn test_under_budget_keeps_unfinished_tail_by_default() {
        let budget = words();
        let out = budget.trim("First sentence. And a tail", 100);
        assert_eq!(out.text, "First sentence. And a tail");
        assert_eq!(out.outcome, TrimOutcome::Unchanged);
    }

    #[test]
    fn test_snap_always_drops_unfinished_tail() {
        let budget = words().with_snap(SnapPolicy::Always);
        let out = budget.trim("First sentence. And a tail", 100);
        assert_eq!(out.text, "First sentence.");
        assert_eq!(out.outcome, TrimOutcome::Snapped);

        // Already ends on a sentence: nothing to snap
        let out = budget.trim("Complete thought.", 100);
        assert_eq!(out.outcome, TrimOutcome::Unchanged);
    }

    #[test]
    fn test_empty_input_and_zero_budget() {
        let budget = words();
        assert_eq!(budget.trim("", 10).outcome, TrimOutcome::Empty);
        assert_eq!(budget.trim("   \n ", 10).text, "");
        let out = budget.trim("Some text.", 0);
        assert_eq!(out.text, "");
        assert_eq!(out.outcome, TrimOutcome::Empty);
    }

    #[test]
    fn test_no_terminators_uses_token_slice() {
        let budget = words();
        let out = budget.trim("alpha beta gamma delta", 2);
        assert_eq!(out.text, "alpha beta");
        assert_eq!(out.tokens, 2);
        assert_eq!(out.outcome, TrimOutcome::TokenSlice);
    }

    #[test]
    fn test_first_sentence_too_long_uses_token_slice() {
        let budget = words();
        let out = budget.trim("one two three four five. six.", 3);
        assert_eq!(out.text, "one two three");
        assert_eq!(out.outcome, TrimOutcome::TokenSlice);
    }

    #[test]
    fn test_snap_never_ignores_boundaries() {
        let budget = words().with_snap(SnapPolicy::Never);
        let out = budget.trim("Hello. World.", 3);
        assert_eq!(out.text, "Hello. World");
        assert_eq!(out.outcome, TrimOutcome::TokenSlice);
    }

    #[test]
    fn test_safety_margin_applies() {
        let budget = words().with_safety_margin(0.5);
        // 6 tokens allowed out of 12: "A b. C d. E f." is 9 tokens
        let out = budget.trim("A b. C d. E f.", 12);
        assert_eq!(out.text, "A b. C d.");
        assert_eq!(out.tokens, 6);
    }

    #[test]
    fn test_trim_request_overrides_defaults() {
        let budget = words();
        let out = budget.trim_request(&TrimRequest {
            text: "A b. C d. E f.",
            budget: 10,
            safety_margin: 0.4,
            snap: SnapPolicy::WhenOverBudget,
        });
        assert_eq!(out.text, "A b. C d.");
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let budget = words();
        let out = budget.trim("  \n Hello there.  \n", 10);
        assert_eq!(out.text, "Hello there.");
    }

    #[test]
    fn test_trim_for_model_uses_table() {
        let budget = words();
        let limits = ModelLimits::builtin();
        let out = budget.trim_for_model("Short text.", "gpt-4", &limits);
        assert_eq!(out.outcome, TrimOutcome::Unchanged);
    }

    #[test]
    fn test_bpe_budget_invariant_and_prefix() {
        let budget = bpe().with_safety_margin(0.1);
        let total = budget.count(PROSE);
        for limit in 0..=total + 5 {
            let out = budget.trim(PROSE, limit);
            let allowed = allowed_tokens(limit, 0.1);
            assert!(
                budget.count(&out.text) <= allowed,
                "budget {limit}: {} tokens > {allowed}",
                budget.count(&out.text)
            );
            assert!(PROSE.starts_with(&out.text), "budget {limit}: not a prefix");
            assert_eq!(out.tokens, budget.count(&out.text));
        }
    }

    #[test]
    fn test_bpe_prefers_latest_fitting_sentence() {
        let budget = bpe();
        let ends: Vec<usize> = sentences::boundaries(PROSE).collect();
        let second = budget.count(&PROSE[..ends[1]]);
        let third = budget.count(&PROSE[..ends[2]]);
        // Anywhere between the second and third sentence ends snaps to the second
        for limit in second..third {
            let out = budget.trim(PROSE, limit);
            assert_eq!(out.text, &PROSE[..ends[1]]);
            assert_eq!(out.outcome, TrimOutcome::SentenceBoundary);
        }
    }

    #[test]
    fn test_many_sentences_picks_last_fitting() {
        let budget = words();
        // Each "sN." sentence is 2 tokens ("sN" and ".")
        let text: Vec<String> = (0..500).map(|i| format!("s{i}.")).collect();
        let text = text.join(" ");
        for limit in [2, 3, 77, 500, 999] {
            let out = budget.trim(&text, limit);
            let kept = limit / 2;
            assert_eq!(out.tokens, kept * 2, "budget {limit}");
            assert!(out.text.ends_with(&format!("s{}.", kept - 1)), "budget {limit}");
            assert_eq!(out.outcome, TrimOutcome::SentenceBoundary);
        }
    }

    #[test]
    fn test_bpe_fallback_decodes_first_tokens() {
        let budget = bpe();
        let text = "an endless run on sentence with no terminator whatsoever and more words";
        let tokens = budget.tokenizer().encode(text);
        let out = budget.trim(text, 5);
        assert_eq!(out.text, budget.tokenizer().decode(&tokens[..5]).trim_end());
        assert_eq!(out.outcome, TrimOutcome::TokenSlice);
    }

    #[test]
    fn test_deterministic() {
        let budget = bpe();
        assert_eq!(budget.trim(PROSE, 20), budget.trim(PROSE, 20));
    }
}
