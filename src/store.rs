mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::transaction::{Address, StoredTransaction, Transaction};

pub use postgres::TransactionStore;

/// Bulk write seam. One call persists one batch in one round trip; a failed
/// call means the whole batch is gone, and the caller counts the loss.
#[async_trait]
pub trait TransactionWriter: Send + Sync {
    async fn write_batch(&self, batch: Vec<Transaction>) -> Result<()>;
}

/// Read seam for the paginated API. Each paging call returns the window plus
/// the total matching count; the two come from separate queries and may see
/// slightly different snapshots under concurrent writes.
#[async_trait]
pub trait TransactionReader: Send + Sync {
    async fn page_by_address(
        &self,
        address: &Address,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<StoredTransaction>, i64)>;

    async fn page_by_value(&self, limit: i64, offset: i64)
        -> Result<(Vec<StoredTransaction>, i64)>;

    async fn count_by_address(&self, address: &Address) -> Result<i64>;
}
