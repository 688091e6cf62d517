//! CLI command implementations
//!
//! Both commands load configuration first, then read the query. Logs go to
//! stderr so stdout carries only command output.

use std::io::{self, Write};
use std::path::Path;

use crate::config::MergeConfig;
use crate::merge::{PartitionRunner, ScanMerger};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::query::ScanQuery;
use crate::result::Batch;
use crate::sequence::PullSequence;

use super::args::Command;
use super::errors::CliResult;
use super::io::{read_json, read_json_value, write_json_line};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let logger = Logger::stderr();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cmd {
        Command::Plan { config, query } => plan(&config, &query, &logger, &mut out),
        Command::Merge {
            config,
            query,
            input,
        } => merge(&config, &query, &input, &logger, &mut out),
    }
}

/// Load configuration, falling back to defaults when the file is absent
pub fn load_config(path: &Path, logger: &Logger) -> CliResult<MergeConfig> {
    let (config, source) = if path.exists() {
        (MergeConfig::load(path)?, path.display().to_string())
    } else {
        (MergeConfig::default(), "defaults".to_string())
    };

    let ceiling = config.max_rows_time_order_queued_in_memory.to_string();
    log_event_with_fields(
        logger,
        Event::ConfigLoaded,
        &[
            ("source", source.as_str()),
            ("max_rows_time_order_queued_in_memory", ceiling.as_str()),
        ],
    );
    Ok(config)
}

/// Read a query file. A query without `batchSize` takes the configured
/// default.
pub fn load_query(path: &Path, config: &MergeConfig) -> CliResult<ScanQuery> {
    let value = read_json_value(path)?;
    let has_batch_size = value
        .as_object()
        .map_or(false, |fields| fields.contains_key("batchSize"));

    let mut query: ScanQuery = serde_json::from_value(value)?;
    if !has_batch_size {
        query.batch_size = config.default_batch_size;
    }
    Ok(query)
}

/// Print the strategy chosen for a query
pub fn plan<W: Write>(
    config_path: &Path,
    query_path: &Path,
    logger: &Logger,
    out: &mut W,
) -> CliResult<()> {
    let config = load_config(config_path, logger)?;
    let query = load_query(query_path, &config)?;

    let merger = ScanMerger::new(config, logger.clone());
    let strategy = merger.plan(&query.normalize(merger.config()))?;
    write_json_line(out, &strategy)?;
    out.flush()?;
    Ok(())
}

/// Merge in-memory partitions for a query and print each output batch
pub fn merge<W: Write>(
    config_path: &Path,
    query_path: &Path,
    input_path: &Path,
    logger: &Logger,
    out: &mut W,
) -> CliResult<()> {
    let config = load_config(config_path, logger)?;
    let query = load_query(query_path, &config)?;
    let partitions: Vec<Vec<Batch>> = read_json(input_path)?;

    let merger = ScanMerger::new(config, logger.clone());
    let runner = PartitionRunner::new(partitions).with_logger(logger.clone());
    let output = merger.merge(&query, &runner)?;

    for batch in output.batches_with(logger.clone()) {
        write_json_line(out, &batch?)?;
    }
    out.flush()?;
    Ok(())
}
