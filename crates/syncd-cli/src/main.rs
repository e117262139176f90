mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run => commands::run(&cli.config).await,
        Command::Status => commands::status(&cli.config).await,
        Command::Prune => commands::prune(&cli.config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "syncd exited with an error");
        std::process::exit(1);
    }
}
