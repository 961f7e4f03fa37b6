mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use primitive_types::U256;

use crate::transaction::Address;

pub use rpc::CChainClient;

/// A block the chain has marked safe, with transaction bodies included.
/// Safe blocks will not be reverted, so everything in them can be stored
/// without worrying about rollbacks.
#[derive(Clone, Debug)]
pub struct SafeBlock {
    pub number: u64,
    pub timestamp: i64,
    pub transactions: Vec<BlockTx>,
}

/// `to` is absent for contract creations; those never become records.
/// `gas_price` is absent for some typed transactions and defaults to zero.
#[derive(Clone, Debug)]
pub struct BlockTx {
    pub from: Address,
    pub to: Option<Address>,
    pub transaction_index: i32,
    pub gas: U256,
    pub gas_price: Option<U256>,
    pub value: U256,
}

#[async_trait]
pub trait SafeBlockSource: Send + Sync {
    async fn latest_safe_block(&self) -> Result<SafeBlock>;
}
