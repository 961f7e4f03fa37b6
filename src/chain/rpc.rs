use anyhow::{anyhow, Result};
use async_trait::async_trait;
use itertools::Itertools;
use primitive_types::U256;
use serde::Deserialize;
use serde_json::json;

use super::{BlockTx, SafeBlock, SafeBlockSource};
use crate::transaction::Address;

/// JSON-RPC client that polls `eth_getBlockByNumber ["safe", true]` against a
/// C-Chain style endpoint. Quantities arrive as 0x-prefixed hex strings.
pub struct CChainClient {
    client: reqwest::Client,
    rpc_url: String,
}

impl CChainClient {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<BlockResponse>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct BlockResponse {
    number: U256,
    timestamp: U256,
    transactions: Vec<TxResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxResponse {
    from: Address,
    to: Option<Address>,
    transaction_index: U256,
    gas: U256,
    gas_price: Option<U256>,
    value: U256,
}

fn quantity_to_u64(quantity: U256, field: &str) -> Result<u64> {
    if quantity > U256::from(u64::MAX) {
        return Err(anyhow!("{} out of range: {}", field, quantity));
    }
    Ok(quantity.low_u64())
}

fn into_safe_block(block: BlockResponse) -> Result<SafeBlock> {
    let number = quantity_to_u64(block.number, "block number")?;
    let timestamp = i64::try_from(quantity_to_u64(block.timestamp, "block timestamp")?)?;

    let transactions = block
        .transactions
        .into_iter()
        .map(|tx| -> Result<BlockTx> {
            let transaction_index =
                i32::try_from(quantity_to_u64(tx.transaction_index, "transaction index")?)?;
            Ok(BlockTx {
                from: tx.from,
                to: tx.to,
                transaction_index,
                gas: tx.gas,
                gas_price: tx.gas_price,
                value: tx.value,
            })
        })
        .try_collect()?;

    Ok(SafeBlock {
        number,
        timestamp,
        transactions,
    })
}

#[async_trait]
impl SafeBlockSource for CChainClient {
    async fn latest_safe_block(&self) -> Result<SafeBlock> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBlockByNumber",
            "params": ["safe", true],
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(anyhow!("rpc error {}: {}", err.code, err.message));
        }

        let block = response
            .result
            .ok_or_else(|| anyhow!("rpc response carried no safe block"))?;

        into_safe_block(block)
    }
}
