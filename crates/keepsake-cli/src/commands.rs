use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "keepsake")]
#[command(about = "Deduplicate and organize a photo and video library", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crawl, deduplicate and plan where every surviving file should go
    Plan {
        /// Source roots to use instead of the configured ones
        roots: Vec<String>,
        /// Library root to use instead of the configured one
        #[arg(long)]
        target: Option<String>,
        /// Write the plan records to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
        /// Hash in memory only; do not read or update the on-disk cache
        #[arg(long)]
        no_cache: bool,
        /// Print the receipt lines a real run would leave in each folder
        #[arg(long)]
        receipts: bool,
    },
    /// Display the number of entries in the hash cache
    CountHashCache,
    /// Remove every entry from the hash cache
    ClearHashCache,
    /// Print configuration values
    PrintConfig,
}
