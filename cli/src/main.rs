//! Unipiece CLI - Command-line interface for the unigram trainer.
//!
//! This is the main entry point for the `unipiece` command-line tool.

mod commands;

use clap::{Parser, Subcommand};
use commands::{EncodeCommand, TrainCommand, TrainJointCommand};

#[derive(Parser)]
#[command(name = "unipiece")]
#[command(about = "A unigram sentence-piece trainer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a unigram vocabulary from text data
    Train(TrainCommand),
    /// Train source and target vocabularies in lockstep
    TrainJoint(TrainJointCommand),
    /// Segment text with a trained model
    Encode(EncodeCommand),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train(cmd) => commands::train::run(cmd)?,
        Commands::TrainJoint(cmd) => commands::train_joint::run(cmd)?,
        Commands::Encode(cmd) => commands::encode::run(cmd)?,
    }

    Ok(())
}
