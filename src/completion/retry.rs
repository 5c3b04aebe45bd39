//! Bounded retry around a single completion call.
//!
//! Each attempt fully finishes before the next starts. After a failure the
//! error is classified:
//! - fatal errors end the call immediately;
//! - context overflows halve the user prompt and retry at once, as long as the
//!   prompt is longer than `min_prompt_chars`;
//! - everything else retryable waits out the backoff for that attempt.
//!
//! The call ends with the first success, the first fatal error, or the last
//! error once `max_attempts` have been spent.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::classify::{ErrorClass, ErrorClassifier};
use super::{CompletionProvider, CompletionRequest, CompletionResponse, ProviderError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_PROMPT_CHARS: usize = 20;
pub const DEFAULT_BACKOFF_SECS: [u64; 3] = [5, 10, 15];

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Flat schedule indexed by attempt; the last entry repeats.
    Fixed(Vec<Duration>),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`, with ±`jitter`
    /// proportional noise.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(
            DEFAULT_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }
}

impl Backoff {
    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1);
        match self {
            Backoff::Fixed(schedule) => schedule
                .get(index as usize)
                .or_else(|| schedule.last())
                .copied()
                .unwrap_or(Duration::ZERO),
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let factor = multiplier.max(1.0).powi(index.min(30) as i32);
                let base = initial.as_secs_f64() * factor;
                let capped = base.min(max.as_secs_f64());
                apply_jitter(Duration::from_secs_f64(capped), *jitter)
            }
        }
    }
}

fn apply_jitter(duration: Duration, jitter: f64) -> Duration {
    let jitter = jitter.clamp(0.0, 1.0);
    if jitter == 0.0 {
        return duration;
    }
    let offset = rand::rng().random_range(-jitter..=jitter);
    Duration::from_secs_f64((duration.as_secs_f64() * (1.0 + offset)).max(0.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Prompts at or below this many characters are never halved.
    pub min_prompt_chars: usize,
    /// Wall-clock limit for the whole call, attempts and waits included.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            min_prompt_chars: DEFAULT_MIN_PROMPT_CHARS,
            deadline: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion failed after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("completion cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("completion exceeded its {deadline:?} deadline after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        deadline: Duration,
        last: Option<ProviderError>,
    },
}

impl CompletionError {
    pub fn attempts(&self) -> u32 {
        match self {
            CompletionError::Provider { attempts, .. }
            | CompletionError::Cancelled { attempts }
            | CompletionError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The last error the provider reported, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CompletionError::Provider { source, .. } => Some(source),
            CompletionError::DeadlineExceeded { last, .. } => last.as_ref(),
            CompletionError::Cancelled { .. } => None,
        }
    }
}

/// Keeps the first half of `prompt`, counted in characters.
pub fn shrink_prompt(prompt: &str) -> String {
    let half = prompt.chars().count() / 2;
    match prompt.char_indices().nth(half) {
        Some((idx, _)) => prompt[..idx].to_string(),
        None => prompt.to_string(),
    }
}

/// Wraps a [`CompletionProvider`] with classification-driven retries.
pub struct RetryingCompleter<P> {
    provider: P,
    classifier: ErrorClassifier,
    policy: RetryPolicy,
}

impl<P: CompletionProvider> RetryingCompleter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            classifier: ErrorClassifier::default(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.complete_with_cancel(request, &CancellationToken::new())
            .await
    }

    pub async fn complete_with_cancel(
        &self,
        mut request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, CompletionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let deadline = self.policy.deadline.map(|d| (Instant::now() + d, d));
        let mut last: Option<ProviderError> = None;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(CompletionError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            tracing::debug!(
                provider = self.provider.name(),
                model = %request.model,
                attempt,
                prompt_chars = request.user_prompt.chars().count(),
                "Requesting completion"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(CompletionError::Cancelled { attempts: attempt });
                }
                _ = wait_for_deadline(deadline) => {
                    return Err(deadline_exceeded(deadline, attempt, last));
                }
                result = self.provider.complete(&request) => result,
            };

            let err = match result {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Completion succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let class = self.classifier.classify(&err);
            if class == ErrorClass::Fatal {
                tracing::error!(attempt, error = %err, "Completion failed with non-retryable error");
                return Err(CompletionError::Provider {
                    attempts: attempt,
                    source: err,
                });
            }
            if attempt >= max_attempts {
                tracing::error!(attempt, error = %err, "Completion retries exhausted");
                return Err(CompletionError::Provider {
                    attempts: attempt,
                    source: err,
                });
            }

            let prompt_chars = request.user_prompt.chars().count();
            if class == ErrorClass::ContextOverflow && prompt_chars > self.policy.min_prompt_chars {
                request.user_prompt = shrink_prompt(&request.user_prompt);
                tracing::warn!(
                    attempt,
                    from = prompt_chars,
                    to = request.user_prompt.chars().count(),
                    error = %err,
                    "Context length exceeded, halving prompt"
                );
                last = Some(err);
                continue;
            }

            let delay = self.policy.backoff.delay(attempt);
            tracing::warn!(
                attempt,
                class = ?class,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retryable completion error, backing off"
            );
            last = Some(err);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(CompletionError::Cancelled { attempts: attempt });
                }
                _ = wait_for_deadline(deadline) => {
                    return Err(deadline_exceeded(deadline, attempt, last));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

async fn wait_for_deadline(deadline: Option<(Instant, Duration)>) {
    match deadline {
        Some((at, _)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn deadline_exceeded(
    deadline: Option<(Instant, Duration)>,
    attempts: u32,
    last: Option<ProviderError>,
) -> CompletionError {
    CompletionError::DeadlineExceeded {
        attempts,
        deadline: deadline.map(|(_, d)| d).unwrap_or_default(),
        last,
    }
}
