//! Summarization pipeline: fit the input into the model's window, wrap it in
//! a prompt, and run it through the retrying completer.

use tokio_util::sync::CancellationToken;

use crate::budget::{ModelLimits, TokenBudget, Trimmed};
use crate::completion::{
    CompletionError, CompletionProvider, CompletionRequest, CompletionResponse, RetryingCompleter,
};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that writes concise, accurate summaries.";
const USER_PROMPT_PREFIX: &str = "Summarize the following text:\n\n";

/// Tokens kept free for chat framing (role markers, message separators).
const MESSAGE_OVERHEAD_TOKENS: usize = 16;

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: String,
    pub stop: Option<Vec<String>>,
}

impl SummarizeOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_output_tokens: 512,
            temperature: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stop: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub content: String,
    pub trimmed: Trimmed,
    pub response: CompletionResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("nothing to summarize: input is empty")]
    EmptyInput,
    #[error(
        "model '{model}' has a {limit}-token window, leaving no room for input after reserving {reserved} tokens"
    )]
    NoRoom {
        model: String,
        limit: usize,
        reserved: usize,
    },
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

pub struct Summarizer<P> {
    budget: TokenBudget,
    limits: ModelLimits,
    completer: RetryingCompleter<P>,
}

impl<P: CompletionProvider> Summarizer<P> {
    pub fn new(budget: TokenBudget, limits: ModelLimits, completer: RetryingCompleter<P>) -> Self {
        Self {
            budget,
            limits,
            completer,
        }
    }

    pub fn completer(&self) -> &RetryingCompleter<P> {
        &self.completer
    }

    /// Tokens left for the input text once the output and the prompt
    /// scaffolding are reserved.
    pub fn input_budget(&self, opts: &SummarizeOptions) -> (usize, usize) {
        let limit = self.limits.max_tokens(&opts.model);
        let reserved = opts.max_output_tokens as usize
            + self.budget.count(&opts.system_prompt)
            + self.budget.count(USER_PROMPT_PREFIX)
            + MESSAGE_OVERHEAD_TOKENS;
        (limit.saturating_sub(reserved), reserved)
    }

    /// Trims `text` and builds the request without sending it.
    pub fn prepare(
        &self,
        text: &str,
        opts: &SummarizeOptions,
    ) -> Result<(CompletionRequest, Trimmed), SummarizeError> {
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyInput);
        }
        let (available, reserved) = self.input_budget(opts);
        let trimmed = self.budget.trim(text, available);
        if trimmed.text.is_empty() {
            return Err(SummarizeError::NoRoom {
                model: opts.model.clone(),
                limit: self.limits.max_tokens(&opts.model),
                reserved,
            });
        }
        if trimmed.was_cut() {
            tracing::info!(
                model = %opts.model,
                available,
                kept = trimmed.tokens,
                outcome = ?trimmed.outcome,
                "Input trimmed to fit the model window"
            );
        }

        let mut request = CompletionRequest::new(
            opts.model.clone(),
            opts.system_prompt.clone(),
            format!("{USER_PROMPT_PREFIX}{}", trimmed.text),
        )
        .with_max_tokens(opts.max_output_tokens);
        request.temperature = opts.temperature;
        request.stop = opts.stop.clone();
        Ok((request, trimmed))
    }

    pub async fn summarize(
        &self,
        text: &str,
        opts: &SummarizeOptions,
        cancel: &CancellationToken,
    ) -> Result<Summary, SummarizeError> {
        let (request, trimmed) = self.prepare(text, opts)?;
        let response = self.completer.complete_with_cancel(request, cancel).await?;
        Ok(Summary {
            content: response.content().trim().to_string(),
            trimmed,
            response,
        })
    }
}
