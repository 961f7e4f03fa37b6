mod env;

use std::{process, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Utc;
use itertools::Itertools;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use self::env::APP_CONFIG;
use crate::{
    chain::{CChainClient, SafeBlock, SafeBlockSource},
    log,
    store::{TransactionStore, TransactionWriter},
    transaction::Transaction,
};

/// Maps one safe block into canonical records. Contract creations carry no
/// recipient and are excluded here, before a record exists. Every record in
/// the block shares the block's number and timestamp. Receipts are not
/// fetched, so gas_used is reported as the gas limit.
fn collect_transactions(block: &SafeBlock) -> Result<Vec<Transaction>> {
    let block_number = i64::try_from(block.number)
        .map_err(|_| anyhow!("block number {} exceeds i64", block.number))?;
    if block.timestamp < 0 {
        return Err(anyhow!("block timestamp {} is negative", block.timestamp));
    }

    let records = block
        .transactions
        .iter()
        .filter_map(|tx| {
            let to_address = tx.to.clone()?;
            Some(Transaction {
                timestamp: block.timestamp,
                status: true,
                block_number,
                tx_index: tx.transaction_index,
                from_address: tx.from.clone(),
                to_address,
                value: tx.value,
                gas_limit: tx.gas,
                gas_used: tx.gas,
                gas_price: tx.gas_price.unwrap_or_default(),
            })
        })
        .collect_vec();

    Ok(records)
}

/// Handle on a running block watch. Dropping it also ends the watch.
pub struct BlockWatch {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl BlockWatch {
    /// Idempotent; safe to call again or with the watch already gone.
    pub fn unsubscribe(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub async fn stopped(self) {
        let _ = self.handle.await;
    }
}

/// Polls the safe-block feed and sends each new block's records into the
/// write queue. One delivery per block number; a block that fails conversion
/// is logged with its number and dropped, never redelivered. Fetch errors
/// keep the poll going. A full queue suspends the send, so flushes behind it
/// never reorder.
pub fn watch_blocks<S>(
    source: S,
    sink: mpsc::Sender<Vec<Transaction>>,
    poll_interval: Duration,
) -> BlockWatch
where
    S: SafeBlockSource + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut last_seen: Option<u64> = None;

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("unsubscribed, stopping block watch");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }

            let block = match source.latest_safe_block().await {
                Ok(block) => block,
                Err(err) => {
                    error!("failed to fetch safe block: {}", err);
                    continue;
                }
            };

            if last_seen.map_or(false, |seen| block.number <= seen) {
                continue;
            }
            last_seen = Some(block.number);

            let begin = Utc::now();
            let records = match collect_transactions(&block) {
                Ok(records) => records,
                Err(err) => {
                    error!(
                        block_number = block.number,
                        "failed to process block: {}", err
                    );
                    continue;
                }
            };

            let transaction_count = records.len();
            if sink.send(records).await.is_err() {
                warn!("write queue closed, stopping block watch");
                break;
            }

            info!(
                block_number = block.number,
                transaction_count,
                processing_time_ms = (Utc::now() - begin).num_milliseconds(),
                "block processed"
            );
        }
    });

    BlockWatch {
        stop: Some(stop_tx),
        handle,
    }
}

/// Single consumer of the write queue: batches flush strictly in arrival
/// order. The engine logs each failure; this task only counts them.
fn start_writer<W>(writer: W, mut queue: mpsc::Receiver<Vec<Transaction>>) -> JoinHandle<u64>
where
    W: TransactionWriter + 'static,
{
    tokio::spawn(async move {
        let mut failed_batches: u64 = 0;
        while let Some(batch) = queue.recv().await {
            if writer.write_batch(batch).await.is_err() {
                failed_batches += 1;
            }
        }
        failed_batches
    })
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

pub async fn start_monitor() -> Result<()> {
    log::init();

    let store = match TransactionStore::connect(&APP_CONFIG.database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to database: {}", err);
            process::exit(1);
        }
    };
    store.run_migrations().await?;
    info!(rpc_url = %APP_CONFIG.rpc_url, "connected to database, watching safe blocks");

    let (batch_tx, batch_rx) = mpsc::channel(APP_CONFIG.write_queue_depth);
    let writer = start_writer(store.clone(), batch_rx);

    let client = CChainClient::new(&APP_CONFIG.rpc_url);
    let mut watch = watch_blocks(
        client,
        batch_tx,
        Duration::from_secs(APP_CONFIG.poll_interval_secs),
    );

    wait_for_shutdown_signal().await?;
    info!("shutting down, unsubscribing from block feed");

    watch.unsubscribe();
    watch.stopped().await;

    // the watch task dropped its sender, so the writer drains whatever is
    // queued and then finishes
    let failed_batches = writer.await?;
    if failed_batches > 0 {
        warn!(failed_batches, "batches were dropped during this run");
    }

    store.close().await;
    Ok(())
}
