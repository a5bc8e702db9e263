//! Cardsmith CLI — the main entry point.
//!
//! Commands:
//! - `ask`      — Answer one question with the bounded agent loop
//! - `config`   — Show, validate, or locate the configuration
//! - `onboard`  — Write a starter config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cardsmith",
    about = "Cardsmith — study assistant with bounded web search",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the assistant a question
    Ask {
        /// The question to answer
        question: String,

        /// Override agent.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Override agent.max_tool_calls
        #[arg(long)]
        max_tool_calls: Option<u32>,

        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Initialize configuration
    Onboard,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets omitted)
    Show,
    /// Load and check the configuration
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            max_iterations,
            max_tool_calls,
            timeout,
        } => {
            let overrides = commands::ask::Overrides {
                max_iterations,
                max_tool_calls,
                timeout_secs: timeout,
            };
            commands::ask::run(&question, overrides).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Onboard => commands::onboard::run()?,
    }

    Ok(())
}
