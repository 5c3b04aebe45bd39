pub mod config_cmd;
pub mod count;
pub mod models;
pub mod style;
pub mod summarize;
pub mod trim;
pub mod version;

use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tokentrim::budget::TokenBudget;
use tokentrim::config::Config;
use tokentrim::tokenizer::BpeTokenizer;

/// Input and config options shared by the text commands.
#[derive(Args)]
pub struct InputArgs {
    /// File to read; stdin when omitted or "-"
    pub file: Option<PathBuf>,
    /// Directory containing .tokentrim.json (defaults to current directory)
    #[arg(long)]
    pub config_dir: Option<String>,
    /// Tokenizer encoding, overriding the config (cl100k_base, o200k_base, p50k_base, r50k_base)
    #[arg(long)]
    pub encoding: Option<String>,
}

impl InputArgs {
    pub fn read(&self) -> Result<String> {
        match &self.file {
            Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display())),
            _ => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("Failed to read stdin")?;
                Ok(text)
            }
        }
    }

    pub fn config(&self) -> Result<Config> {
        let dir = self.config_dir.as_deref().unwrap_or(".");
        let mut config = Config::load(dir)?;
        if let Some(encoding) = &self.encoding {
            config.tokenizer.encoding = encoding.clone();
        }
        Ok(config)
    }
}

pub fn build_budget(config: &Config) -> Result<TokenBudget> {
    let tokenizer = BpeTokenizer::new(config.encoding()?)?;
    Ok(TokenBudget::new(Arc::new(tokenizer))
        .with_safety_margin(config.trim.safety_margin)
        .with_snap(config.trim.snap))
}
