use anyhow::Result;
use clap::Parser;
use std::path::Path;

use riddle_lock::cli::{Args, Commands};
use riddle_lock::commands;
use riddle_lock::commands::utils::{config_path, init_logging, load_config};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config_path = config_path(args.config.as_deref())?;

    match args.command {
        Commands::Init { output, force } => {
            init_logging("info", args.verbose);
            commands::init::init(&output.unwrap_or(config_path), force)
        }
        command => run_quiz_command(command, &config_path, args.verbose),
    }
}

/// Run a command that needs the loaded configuration
fn run_quiz_command(command: Commands, config_path: &Path, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config.logging.level, verbose);
    tracing::debug!("Loaded configuration from {}", config_path.display());

    match command {
        Commands::Status { riddle } => commands::lock::status(&config, riddle),
        Commands::Clear { riddle } => commands::lock::clear(&config, riddle),
        Commands::Question => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::quiz::question(&config))
        }
        Commands::Submit { riddle, answer } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::quiz::submit(&config, riddle, &answer))
        }
        Commands::Play { riddle } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::quiz::play(&config, riddle))
        }
        Commands::Init { .. } => anyhow::bail!("init does not take a loaded configuration"),
    }
}
