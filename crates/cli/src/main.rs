//! Halu CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive chat or single-message mode
//! - `tools`: List the built-in tools
//! - `pricing`: Show the model pricing table
//! - `config`: Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;
mod display;

#[derive(Parser)]
#[command(
    name = "halu",
    about = "Halu: a streaming coding agent for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print agent events as JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Disable coloured output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List the tools the agent can call
    Tools,

    /// Show model pricing (per 1M tokens)
    Pricing,

    /// Show the effective configuration (API key redacted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with the answer on stdout
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let output = display::OutputMode::new(cli.json, !cli.no_color);

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message, output).await?,
        Commands::Tools => commands::tools::run(output).await?,
        Commands::Pricing => commands::pricing::run(output).await?,
        Commands::Config => commands::config_cmd::show().await?,
    }

    Ok(())
}
