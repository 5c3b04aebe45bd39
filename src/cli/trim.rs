use anyhow::{Result, bail};
use clap::Args;

use super::{InputArgs, build_budget, style};
use tokentrim::budget::{SnapPolicy, TrimOutcome};

#[derive(Args)]
pub struct TrimArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Token budget; defaults to the model's context window
    #[arg(long, short, conflicts_with = "model")]
    pub budget: Option<usize>,
    /// Model whose context window is the budget (defaults to models.default_model)
    #[arg(long, short)]
    pub model: Option<String>,
    /// Fraction of the budget kept free, overriding trim.safety_margin
    #[arg(long)]
    pub margin: Option<f64>,
    /// Sentence snapping: never, when_over_budget or always
    #[arg(long)]
    pub snap: Option<SnapPolicy>,
}

pub fn run(args: TrimArgs) -> Result<()> {
    let mut config = args.input.config()?;
    if let Some(margin) = args.margin {
        if !(0.0..1.0).contains(&margin) {
            bail!("--margin must be in [0, 1), got {margin}");
        }
        config.trim.safety_margin = margin;
    }
    if let Some(snap) = args.snap {
        config.trim.snap = snap;
    }

    let text = args.input.read()?;
    let budget = build_budget(&config)?;
    let limit = match args.budget {
        Some(limit) => limit,
        None => {
            let model = args
                .model
                .unwrap_or_else(|| config.models.default_model.clone());
            config.model_limits().max_tokens(&model)
        }
    };

    let trimmed = budget.trim(&text, limit);
    println!("{}", trimmed.text);

    let total = budget.count(&text);
    let how = match trimmed.outcome {
        TrimOutcome::Unchanged => "unchanged",
        TrimOutcome::Snapped => "snapped to sentence end",
        TrimOutcome::SentenceBoundary => "cut at sentence boundary",
        TrimOutcome::TokenSlice => "cut mid-sentence",
        TrimOutcome::Empty => "empty",
    };
    eprintln!(
        "{}",
        style::note(&format!(
            "kept {} of {total} tokens (budget {limit}, {how})",
            trimmed.tokens
        ))
    );
    Ok(())
}
