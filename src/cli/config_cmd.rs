use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use super::style;
use tokentrim::config::{CONFIG_FILENAME, Config, ConfigError, global_config_path};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Create a config template (.tokentrim.json locally, or global with --global)
    Init {
        /// Create global config at ~/.config/tokentrim/config.json instead of local
        #[arg(long, short)]
        global: bool,
    },
    /// Validate a config file (.tokentrim.json locally, or global with --global)
    Validate {
        /// Directory containing .tokentrim.json (defaults to current directory)
        #[arg(long)]
        path: Option<String>,
        /// Validate the global config file instead of a local one
        #[arg(long, short)]
        global: bool,
    },
    /// Show resolved configuration (defaults merged with overrides)
    Show {
        /// Directory containing .tokentrim.json (defaults to current directory)
        #[arg(long)]
        path: Option<String>,
    },
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Init { global } => init(&config_file(global, None)?),
        ConfigCommand::Validate { path, global } => validate(&config_file(global, path)?),
        ConfigCommand::Show { path } => show(path.as_deref().unwrap_or(".")),
    }
}

/// The file a subcommand acts on: the global config, or `.tokentrim.json`
/// in `dir` (current directory by default).
fn config_file(global: bool, dir: Option<String>) -> Result<PathBuf> {
    if global {
        return global_config_path()
            .context("Could not determine config directory for this platform");
    }
    Ok(Path::new(dir.as_deref().unwrap_or(".")).join(CONFIG_FILENAME))
}

/// Writes the default config to `path`. Returns `false` if a file is already there.
fn write_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let template = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(path, format!("{template}\n"))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

fn init(path: &Path) -> Result<()> {
    if write_template(path)? {
        println!("{}", style::success(&format!("Created {}", path.display())));
    } else {
        println!(
            "{}",
            style::warn(&format!("{} already exists.", path.display()))
        );
    }
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    match Config::validate_file(path) {
        Ok(config) => {
            println!("{}\n", style::success("Valid"));
            print_config_summary(&config);
            Ok(())
        }
        Err(ConfigError::NotFound { .. }) => {
            println!("No config found at {}", path.display());
            Ok(())
        }
        Err(e) => {
            println!("{}", style::error(&format!("Error: {e}")));
            Err(anyhow::anyhow!("Config validation failed: {e}"))
        }
    }
}

fn show(dir: &str) -> Result<()> {
    let describe = |label: &str, path: &Path| {
        let state = if path.exists() { "" } else { " (not found)" };
        println!("{label} {}{state}", path.display());
    };
    match global_config_path() {
        Some(p) => describe("Global config:", &p),
        None => println!("Global config: not available on this platform"),
    }
    describe("Local config: ", &Path::new(dir).join(CONFIG_FILENAME));
    println!();

    let config = match Config::load(dir) {
        Ok(config) => config,
        Err(e) => {
            println!("{}\n", style::warn(&format!("Using defaults: {e}")));
            Config::default()
        }
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    let key_state = if config.api_key().is_some() {
        style::success("set")
    } else {
        style::warn("not set")
    };
    println!("API key (${}): {key_state}", config.completion.api_key_env);
    Ok(())
}

fn print_config_summary(config: &Config) {
    let c = &config.completion;
    let rows = [
        ("tokenizer.encoding", config.tokenizer.encoding.clone()),
        ("models.default_model", config.models.default_model.clone()),
        ("models.default_limit", config.models.default_limit.to_string()),
        (
            "models.limits",
            format!("{} override(s)", config.models.limits.len()),
        ),
        ("trim.safety_margin", config.trim.safety_margin.to_string()),
        ("trim.snap", format!("{:?}", config.trim.snap)),
        ("completion.base_url", c.base_url.clone()),
        ("completion.api_key_env", c.api_key_env.clone()),
        ("completion.max_attempts", c.max_attempts.to_string()),
        (
            "completion.backoff_secs",
            format!(
                "{:?}{}",
                c.backoff_secs,
                if c.exponential_backoff { " (exponential)" } else { "" }
            ),
        ),
        (
            "completion.deadline_secs",
            c.deadline_secs
                .map_or("null (unlimited)".to_string(), |v| v.to_string()),
        ),
        (
            "summarize.max_output_tokens",
            config.summarize.max_output_tokens.to_string(),
        ),
    ];
    println!("Resolved configuration:");
    for (key, value) in rows {
        println!("  {key:<28} = {value}");
    }
}
