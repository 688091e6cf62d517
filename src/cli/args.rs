//! CLI argument definitions using clap
//!
//! Commands:
//! - scanmerge plan --config <path> --query <path>
//! - scanmerge merge --config <path> --query <path> --input <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// scanmerge - merge per-partition scan results into one stream
#[derive(Parser, Debug)]
#[command(name = "scanmerge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merge strategy chosen for a query
    Plan {
        /// Path to configuration file (defaults apply if it does not exist)
        #[arg(long, default_value = "./scanmerge.json")]
        config: PathBuf,

        /// Path to the scan query JSON
        #[arg(long)]
        query: PathBuf,
    },

    /// Merge partition results for a query and print the output batches
    Merge {
        /// Path to configuration file (defaults apply if it does not exist)
        #[arg(long, default_value = "./scanmerge.json")]
        config: PathBuf,

        /// Path to the scan query JSON
        #[arg(long)]
        query: PathBuf,

        /// Path to a JSON array of partitions, each an array of batches
        #[arg(long)]
        input: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
