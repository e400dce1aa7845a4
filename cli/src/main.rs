mod aws;
mod commands;
mod config;
mod error;
mod logger;
mod lookup;
mod progress;
mod runner;
mod stack;
mod writer;
use crate::commands::Commands;
use crate::error::Error;
use crate::logger::Logger;
use crate::runner::{Runnable, Runner, Settings};
use crate::writer::Writer;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Shared network plus per-branch ECS service stacks on CloudFormation", long_about = None)]
struct Cli {
    /// Path to the infrastructure config
    #[arg(
        short,
        long,
        global = true,
        env = "BRANCHSTACK_CONFIG",
        default_value = "branchstack.toml"
    )]
    config: PathBuf,

    /// Print JSON instead of human readable text
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    structured: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Derive a runner from the command and run it
async fn run(command: impl Runnable, writer: &Writer, settings: &Settings) -> Result<(), Error> {
    command.runner(writer, settings).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    Logger::init();
    let cli = Cli::parse();
    let writer = Writer::new(cli.structured);

    let settings = Settings {
        config_path: cli.config,
    };

    // Match all commands here, in one place
    let result = match cli.command {
        Commands::Synth(cmd) => run(cmd, &writer, &settings).await,
        Commands::Deploy(cmd) => run(cmd, &writer, &settings).await,
        Commands::Outputs(cmd) => run(cmd, &writer, &settings).await,
        Commands::Destroy(cmd) => run(cmd, &writer, &settings).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            writer.failure(&error);
            ExitCode::FAILURE
        }
    }
}
