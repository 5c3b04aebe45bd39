use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::config_cmd::ConfigArgs;
use cli::count::CountArgs;
use cli::summarize::SummarizeArgs;
use cli::trim::TrimArgs;

#[derive(Parser)]
#[command(
    name = "tokentrim",
    about = "Fit text into LLM token budgets and summarize it with retries"
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Count tokens in a file or stdin
    Count(CountArgs),
    /// Trim text to a token budget, preferring sentence boundaries
    Trim(TrimArgs),
    /// Summarize text with an OpenAI-compatible chat completion API
    Summarize(SummarizeArgs),
    /// List known models and their context windows
    Models {
        /// Directory containing .tokentrim.json (defaults to current directory)
        #[arg(long)]
        path: Option<String>,
    },
    /// Manage configuration (.tokentrim.json)
    Config(ConfigArgs),
    /// Show version and build information
    Version,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "tokentrim=debug"
        } else {
            "tokentrim=warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Count(args)) => cli::count::run(args),
        Some(Commands::Trim(args)) => cli::trim::run(args),
        Some(Commands::Summarize(args)) => cli::summarize::run(args).await,
        Some(Commands::Models { path }) => cli::models::run(path),
        Some(Commands::Config(args)) => cli::config_cmd::run(args),
        Some(Commands::Version) => {
            cli::version::run();
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}
