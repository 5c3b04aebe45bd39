use anyhow::Result;

use super::style;
use tokentrim::config::Config;

pub fn run(path: Option<String>) -> Result<()> {
    let dir = path.unwrap_or_else(|| ".".to_string());
    let config = Config::load(&dir)?;
    let limits = config.model_limits();

    println!("{}\n", style::heading("Model context windows:"));
    let entries: Vec<(&str, usize)> = limits.iter().collect();
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, limit) in entries {
        let marker = if config.models.limits.contains_key(name) {
            style::info(" (config)")
        } else {
            String::new()
        };
        println!("  {name:<width$}  {limit:>9}{marker}");
    }
    println!(
        "\n{}",
        style::info(&format!(
            "Other models: {} tokens. Default model: {}",
            limits.default_limit(),
            config.models.default_model
        ))
    );
    Ok(())
}
