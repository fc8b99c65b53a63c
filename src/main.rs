// MIT License
// Copyright (c) 2024 Graham King

use clap::{Parser, Subcommand};
use std::path;
use std::process;

mod api;
mod interactions;
mod runner;

#[derive(Parser)]
struct Cli {
    /// Sets a custom database path
    #[arg(long, global = true, value_name = "PATH", env = "INTERACTIONS_DB", default_value = runner::DEFAULT_DB_PATH)]
    db_path: String,

    /// Address the interaction API listens on
    #[arg(long, global = true, value_name = "ADDR", env = "INTERACTIONS_ADDR", default_value = runner::DEFAULT_ADDR)]
    addr: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the likes and comments API in the foreground
    Serve,

    /// Serve the API alongside a host program, e.g. `run -- hugo server`.
    /// If the API fails the host keeps going. Exits with the host's status.
    Run {
        /// The host program and its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr so we don't get mixed into the host program's output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = runner::ServiceConfig {
        db_path: path::PathBuf::from(cli.db_path),
        addr: cli.addr,
    };
    match cli.command {
        Commands::Serve => runner::serve(&cfg).await,
        Commands::Run { command } => {
            let Some((program, args)) = command.split_first() else {
                eprintln!("Usage: run -- <program> [args...]");
                process::exit(2);
            };
            let code = runner::run_with_host(&cfg, program, args).await?;
            process::exit(code);
        }
    }
}
