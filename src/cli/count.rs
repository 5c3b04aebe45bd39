use anyhow::Result;
use clap::Args;

use super::{InputArgs, build_budget, style};

#[derive(Args)]
pub struct CountArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Also compare the count against this model's context window
    #[arg(long, short)]
    pub model: Option<String>,
}

pub fn run(args: CountArgs) -> Result<()> {
    let config = args.input.config()?;
    let text = args.input.read()?;
    let budget = build_budget(&config)?;
    let count = budget.count(&text);

    let Some(model) = args.model else {
        println!("{count}");
        return Ok(());
    };

    let limits = config.model_limits();
    let limit = limits.max_tokens(&model);
    let allowed = budget.allowed(limit);
    println!("{count}");
    let known = if limits.is_known(&model) {
        ""
    } else {
        " (default limit)"
    };
    if count <= allowed {
        eprintln!(
            "{}",
            style::note(&format!(
                "{model}: {count} / {allowed} usable tokens of {limit}{known}, fits"
            ))
        );
    } else {
        eprintln!(
            "{}",
            style::note_warn(&format!(
                "{model}: {count} / {allowed} usable tokens of {limit}{known}, over by {}",
                count - allowed
            ))
        );
    }
    Ok(())
}
