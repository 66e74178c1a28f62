mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "minos-cli")]
#[command(about = "Minos CLI - Submit sources, fetch reports and watch live judging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a source file for judging
    Submit {
        /// Test data package name
        #[arg(short, long)]
        test_data: String,

        /// Language descriptor (e.g. cpp17, python)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        source: String,

        /// Time limit per case in milliseconds
        #[arg(long, default_value = "1000")]
        time_ms: u64,

        /// Memory limit per case in MiB
        #[arg(long, default_value = "256")]
        memory_mb: u64,

        /// Task priority (defaults to the daemon's configured priority)
        #[arg(short, long)]
        priority: Option<u32>,
    },

    /// Fetch the stored report of a submission
    Result {
        /// Submission id
        id: String,
    },

    /// Poll live progress until the final report lands
    Watch {
        /// Submission id
        id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            test_data,
            language,
            source,
            time_ms,
            memory_mb,
            priority,
        } => {
            commands::submit(&test_data, &language, &source, time_ms, memory_mb, priority).await?;
        }
        Commands::Result { id } => {
            commands::result(&id).await?;
        }
        Commands::Watch { id, interval_ms } => {
            commands::watch(&id, interval_ms).await?;
        }
    }

    Ok(())
}
