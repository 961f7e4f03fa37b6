mod env;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use self::env::APP_CONFIG;
use crate::{
    batch::Batch,
    log,
    numeric::{self, NumericError},
    store::{TransactionStore, TransactionWriter},
    transaction::Transaction,
};

/// One candidate record per data row; everything arrives as strings and is
/// validated once, here, into either a canonical record or a `RowError`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    status: String,
    block_number: String,
    tx_index: String,
    from: String,
    to: String,
    value: String,
    gas_limit: String,
    gas_used: String,
    gas_price: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("unparseable timestamp '{0}'")]
    Timestamp(String),
    #[error("invalid integer in column {column}: '{value}'")]
    Integer {
        column: &'static str,
        value: String,
    },
    #[error("malformed address in column {column}")]
    Address { column: &'static str },
    #[error("invalid amount in column {column}: {source}")]
    Amount {
        column: &'static str,
        source: NumericError,
    },
}

fn parse_timestamp(raw: &str) -> Result<i64, RowError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.timestamp());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc().timestamp())
        .map_err(|_| RowError::Timestamp(raw.to_string()))
}

fn parse_integer<T: std::str::FromStr>(column: &'static str, raw: &str) -> Result<T, RowError> {
    raw.parse().map_err(|_| RowError::Integer {
        column,
        value: raw.to_string(),
    })
}

fn parse_amount(column: &'static str, raw: &str) -> Result<primitive_types::U256, RowError> {
    numeric::decode(raw).map_err(|source| RowError::Amount { column, source })
}

fn validate_row(row: &CsvRow) -> Result<Transaction, RowError> {
    Ok(Transaction {
        timestamp: parse_timestamp(&row.timestamp)?,
        // exports mark status as a truthy string: false iff empty
        status: !row.status.is_empty(),
        block_number: parse_integer("block_number", &row.block_number)?,
        tx_index: parse_integer("tx_index", &row.tx_index)?,
        from_address: row
            .from
            .parse()
            .map_err(|_| RowError::Address { column: "from" })?,
        to_address: row
            .to
            .parse()
            .map_err(|_| RowError::Address { column: "to" })?,
        value: parse_amount("value", &row.value)?,
        gas_limit: parse_amount("gas_limit", &row.gas_limit)?,
        gas_used: parse_amount("gas_used", &row.gas_used)?,
        gas_price: parse_amount("gas_price", &row.gas_price)?,
    })
}

/// Rows seen, inserted and failed never have to line up: a skipped row or a
/// dropped batch widens the gap, and that is a reportable outcome rather
/// than an error.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows_seen: u64,
    pub rows_inserted: u64,
    pub rows_failed: u64,
}

fn count_data_rows(path: &Path) -> Result<u64> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let lines = BufReader::new(file).lines().count() as u64;
    // minus the header row
    Ok(lines.saturating_sub(1))
}

async fn flush(writer: &impl TransactionWriter, batch: &mut Batch, summary: &mut ImportSummary) {
    let records = batch.take();
    let flushed = records.len() as u64;
    // the engine logs the failure itself; a dropped batch marks all of its
    // rows failed and the stream continues
    match writer.write_batch(records).await {
        Ok(()) => summary.rows_inserted += flushed,
        Err(_) => summary.rows_failed += flushed,
    }
}

pub async fn import_file(
    path: &Path,
    batch_size: usize,
    writer: &impl TransactionWriter,
) -> Result<ImportSummary> {
    let total_rows = count_data_rows(path)?;
    info!(total_rows, "found records to process");

    let progress = ProgressBar::new(total_rows);
    progress.set_style(ProgressStyle::with_template("[importing] {wide_bar} {pos}/{len}").unwrap());

    let mut reader = csv::Reader::from_path(path)?;
    let mut batch = Batch::new(batch_size);
    let mut summary = ImportSummary::default();

    for result in reader.deserialize::<CsvRow>() {
        summary.rows_seen += 1;

        match result {
            Ok(row) => match validate_row(&row) {
                Ok(record) => batch.push(record),
                Err(err) => {
                    warn!(row = summary.rows_seen, "skipping row: {}", err);
                    summary.rows_failed += 1;
                }
            },
            Err(err) => {
                warn!(row = summary.rows_seen, "skipping undecodable row: {}", err);
                summary.rows_failed += 1;
            }
        }

        if batch.is_full() {
            flush(writer, &mut batch, &mut summary).await;
        }
        progress.inc(1);
    }

    if !batch.is_empty() {
        flush(writer, &mut batch, &mut summary).await;
    }
    progress.finish();

    Ok(summary)
}

#[derive(Parser)]
#[command(name = "transaction-importer", about = "bulk imports a transaction csv export")]
struct Cli {
    /// Path to the input file
    #[arg(short, long)]
    file: PathBuf,
    /// Batch size for processing
    #[arg(short, long, default_value_t = 100)]
    batch: usize,
}

pub async fn run_import() -> Result<()> {
    log::init();
    let cli = Cli::parse();

    let store = match TransactionStore::connect(&APP_CONFIG.database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to database: {}", err);
            process::exit(1);
        }
    };
    store.run_migrations().await?;

    let begin = chrono::Utc::now();
    let summary = import_file(&cli.file, cli.batch, &store).await?;

    info!(
        rows_seen = summary.rows_seen,
        rows_inserted = summary.rows_inserted,
        rows_failed = summary.rows_failed,
        elapsed_seconds = (chrono::Utc::now() - begin).num_seconds(),
        "import finished"
    );

    store.close().await;
    Ok(())
}
