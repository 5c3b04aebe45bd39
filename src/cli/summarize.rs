use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use super::{InputArgs, build_budget, style};
use tokentrim::completion::{CompletionError, OpenAiProvider, RetryingCompleter};
use tokentrim::summarize::{SummarizeError, SummarizeOptions, Summarizer};

#[derive(Args)]
pub struct SummarizeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Model to call (defaults to models.default_model)
    #[arg(long, short)]
    pub model: Option<String>,
    /// Completion token limit, overriding summarize.max_output_tokens
    #[arg(long)]
    pub max_output: Option<u32>,
    /// Sampling temperature, overriding summarize.temperature
    #[arg(long)]
    pub temperature: Option<f32>,
    /// API base URL, overriding completion.base_url
    #[arg(long)]
    pub base_url: Option<String>,
    /// Print trimming and token usage details to stderr
    #[arg(long)]
    pub stats: bool,
}

pub async fn run(args: SummarizeArgs) -> Result<()> {
    let mut config = args.input.config()?;
    if let Some(base_url) = args.base_url {
        config.completion.base_url = base_url;
    }
    let text = args.input.read()?;

    let api_key = config.api_key().unwrap_or_else(|| {
        tracing::warn!(
            env = %config.completion.api_key_env,
            "No API key set, sending unauthenticated requests"
        );
        String::new()
    });
    let provider = OpenAiProvider::new(
        config.completion.base_url.clone(),
        api_key,
        config.request_timeout(),
    );
    let completer = RetryingCompleter::new(provider)
        .with_classifier(config.classifier())
        .with_policy(config.retry_policy());
    let summarizer = Summarizer::new(build_budget(&config)?, config.model_limits(), completer);

    let opts = SummarizeOptions {
        model: args
            .model
            .unwrap_or_else(|| config.models.default_model.clone()),
        max_output_tokens: args
            .max_output
            .unwrap_or(config.summarize.max_output_tokens),
        temperature: args.temperature.or(config.summarize.temperature),
        system_prompt: config.summarize.system_prompt.clone(),
        stop: None,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                cancel.cancel();
            }
        })
    };

    let result = summarizer.summarize(&text, &opts, &cancel).await;
    ctrl_c.abort();

    match result {
        Ok(summary) => {
            println!("{}", summary.content);
            if args.stats {
                eprintln!(
                    "{}",
                    style::note(&format!(
                        "input: {} tokens ({:?})",
                        summary.trimmed.tokens, summary.trimmed.outcome
                    ))
                );
                if let Some(usage) = summary.response.usage {
                    eprintln!(
                        "{}",
                        style::note(&format!(
                            "usage: {} prompt + {} completion = {} tokens",
                            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                        ))
                    );
                }
            }
            Ok(())
        }
        Err(SummarizeError::Completion(CompletionError::Cancelled { attempts })) => {
            eprintln!(
                "{}",
                style::note_warn(&format!("Cancelled after {attempts} attempt(s)"))
            );
            Err(anyhow::anyhow!("summarize cancelled"))
        }
        Err(e) => Err(e.into()),
    }
}
