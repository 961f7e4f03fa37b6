use std::{str::FromStr, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use indoc::{formatdoc, indoc};
use itertools::Itertools;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    ConnectOptions, PgPool, Row,
};
use tracing::error;

use super::{TransactionReader, TransactionWriter};
use crate::{
    numeric::{self, NumericError},
    transaction::{Address, StoredTransaction, Transaction},
};

/// Service object owning the connection pool. Constructed once at process
/// start and passed around by clone; `close` releases the pool on shutdown.
#[derive(Clone)]
pub struct TransactionStore {
    pool: PgPool,
}

const BULK_INSERT: &str = indoc! {"
    INSERT INTO transactions (
        timestamp,
        status,
        block_number,
        tx_index,
        from_address,
        to_address,
        value,
        gas_limit,
        gas_used,
        gas_price
    )
    SELECT * FROM UNNEST(
        ARRAY(
            SELECT (timestamp 'epoch' + (unnest::bigint * interval '1 microsecond'))
            FROM unnest($1::bigint[])
        ),
        $2::boolean[],
        $3::bigint[],
        $4::integer[],
        $5::text[],
        $6::text[],
        $7::text[]::numeric[],
        $8::text[]::numeric[],
        $9::text[]::numeric[],
        $10::text[]::numeric[]
    )
"};

const PAGE_COLUMNS: &str = indoc! {"
    SELECT id, timestamp, status, block_number, tx_index,
           from_address, to_address,
           value::text AS value,
           gas_limit::text AS gas_limit,
           gas_used::text AS gas_used,
           gas_price::text AS gas_price
    FROM transactions
"};

const COUNT_BY_ADDRESS: &str = "
    SELECT COUNT(*) FROM transactions
    WHERE from_address = $1 OR to_address = $1
";

impl TransactionStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_opts = PgConnectOptions::from_str(database_url)?
            // logging the batch inserts makes the sql pretty printer crawl to a halt
            .disable_statement_logging()
            .to_owned();

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(connect_opts)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await.map_err(Into::into)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Column arrays for the UNNEST statement, in insert order. Timestamps are
/// expanded to microsecond epochs here; the 256-bit fields become decimal
/// strings and stay strings until the `::numeric[]` cast inside the store.
struct InsertArrays {
    timestamps: Vec<i64>,
    statuses: Vec<bool>,
    block_numbers: Vec<i64>,
    tx_indexes: Vec<i32>,
    from_addresses: Vec<String>,
    to_addresses: Vec<String>,
    values: Vec<String>,
    gas_limits: Vec<String>,
    gas_useds: Vec<String>,
    gas_prices: Vec<String>,
}

impl InsertArrays {
    fn from_records(records: &[Transaction]) -> Result<Self, NumericError> {
        Ok(Self {
            timestamps: records
                .iter()
                .map(|r| numeric::micros_from_seconds(r.timestamp))
                .try_collect()?,
            statuses: records.iter().map(|r| r.status).collect_vec(),
            block_numbers: records.iter().map(|r| r.block_number).collect_vec(),
            tx_indexes: records.iter().map(|r| r.tx_index).collect_vec(),
            from_addresses: records
                .iter()
                .map(|r| r.from_address.as_str().to_string())
                .collect_vec(),
            to_addresses: records
                .iter()
                .map(|r| r.to_address.as_str().to_string())
                .collect_vec(),
            values: records.iter().map(|r| numeric::encode(&r.value)).collect_vec(),
            gas_limits: records
                .iter()
                .map(|r| numeric::encode(&r.gas_limit))
                .collect_vec(),
            gas_useds: records
                .iter()
                .map(|r| numeric::encode(&r.gas_used))
                .collect_vec(),
            gas_prices: records
                .iter()
                .map(|r| numeric::encode(&r.gas_price))
                .collect_vec(),
        })
    }
}

#[async_trait]
impl TransactionWriter for TransactionStore {
    async fn write_batch(&self, batch: Vec<Transaction>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let batch_size = batch.len();
        let arrays = match InsertArrays::from_records(&batch) {
            Ok(arrays) => arrays,
            Err(err) => {
                error!(batch_size, "bulk insert failed, dropping batch: {}", err);
                return Err(err.into());
            }
        };

        let result = sqlx::query(BULK_INSERT)
            .bind(&arrays.timestamps)
            .bind(&arrays.statuses)
            .bind(&arrays.block_numbers)
            .bind(&arrays.tx_indexes)
            .bind(&arrays.from_addresses)
            .bind(&arrays.to_addresses)
            .bind(&arrays.values)
            .bind(&arrays.gas_limits)
            .bind(&arrays.gas_useds)
            .bind(&arrays.gas_prices)
            .execute(&self.pool)
            .await;

        if let Err(err) = &result {
            error!(batch_size, "bulk insert failed, dropping batch: {}", err);
        }

        result.map(|_| ()).map_err(Into::into)
    }
}

fn row_to_stored(row: &PgRow) -> Result<StoredTransaction, sqlx::Error> {
    Ok(StoredTransaction {
        id: row.try_get("id")?,
        timestamp: Utc.from_utc_datetime(&row.try_get::<NaiveDateTime, _>("timestamp")?),
        status: row.try_get("status")?,
        block_number: row.try_get("block_number")?,
        tx_index: row.try_get("tx_index")?,
        from_address: row.try_get("from_address")?,
        to_address: row.try_get("to_address")?,
        value: row.try_get("value")?,
        gas_limit: row.try_get("gas_limit")?,
        gas_used: row.try_get("gas_used")?,
        gas_price: row.try_get("gas_price")?,
    })
}

#[async_trait]
impl TransactionReader for TransactionStore {
    async fn page_by_address(
        &self,
        address: &Address,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<StoredTransaction>, i64)> {
        let page_query = formatdoc! {"
            {PAGE_COLUMNS}
            WHERE from_address = $1 OR to_address = $1
            ORDER BY block_number DESC, tx_index DESC
            LIMIT $2 OFFSET $3
        "};

        // the count is issued concurrently and independently; under
        // concurrent writes the pair may reflect different snapshots
        let (rows, total) = tokio::try_join!(
            sqlx::query(&page_query)
                .bind(address.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
            sqlx::query_scalar::<_, i64>(COUNT_BY_ADDRESS)
                .bind(address.as_str())
                .fetch_one(&self.pool),
        )?;

        let transactions = rows.iter().map(row_to_stored).try_collect()?;
        Ok((transactions, total))
    }

    async fn page_by_value(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<StoredTransaction>, i64)> {
        let page_query = formatdoc! {"
            {PAGE_COLUMNS}
            ORDER BY value DESC
            LIMIT $1 OFFSET $2
        "};

        let (rows, total) = tokio::try_join!(
            sqlx::query(&page_query)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool),
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions")
                .fetch_one(&self.pool),
        )?;

        let transactions = rows.iter().map(row_to_stored).try_collect()?;
        Ok((transactions, total))
    }

    async fn count_by_address(&self, address: &Address) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(COUNT_BY_ADDRESS)
            .bind(address.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }
}
