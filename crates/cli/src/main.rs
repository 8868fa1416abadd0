//! bdui CLI - Main Entry Point
//!
//! Runs Gherkin features against a browser, or scaffolds a new project.

use clap::{Parser, Subcommand};

mod commands;

use commands::{init, run};

/// bdui - behavior-driven UI testing
#[derive(Parser)]
#[command(name = "bdui")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured features
    ///
    /// Only the builtin steps are available. The binary links no user code,
    /// so projects with their own step definitions run them from a test
    /// binary that passes its bundle to `bdui::Runner::with_user_bundle`.
    /// `bdui run` refuses to start while files match the `steps` globs.
    Run(run::RunArgs),

    /// Scaffold a config file, an example feature and a steps directory
    Init(init::InitArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => run::execute(args).await?,
        Commands::Init(args) => init::execute(args)?,
    }

    Ok(())
}
