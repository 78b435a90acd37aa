use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Riddle quiz client
///
/// Fetches riddles, submits answers and enforces the cooldown the quiz
/// service hands out for wrong answers.
#[derive(Parser, Debug)]
#[command(name = "riddle-lock")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    Init {
        /// Where to write the file (defaults to --config or the platform path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the current riddle
    Question,
    /// Submit a single answer
    Submit {
        /// Riddle to answer
        #[arg(short, long)]
        riddle: u32,

        /// The answer
        answer: String,
    },
    /// Answer a riddle interactively with a live countdown
    Play {
        /// Riddle to answer
        #[arg(short, long)]
        riddle: u32,
    },
    /// Show lock status for configured riddles
    Status {
        /// Only show this riddle
        #[arg(short, long)]
        riddle: Option<u32>,
    },
    /// Remove the lock on a riddle
    Clear {
        /// Riddle to unlock
        #[arg(short, long)]
        riddle: u32,
    },
}
