//! CLI module for scanmerge
//!
//! Provides command-line interface for:
//! - plan: Show the merge strategy chosen for a query
//! - merge: Merge in-memory partition results for a query

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{load_config, load_query, merge, plan, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json, read_json_value, write_json_line};
