use crate::transaction::Transaction;

/// Bounded buffer of records awaiting a single bulk write. The owning adapter
/// checks fullness after each append and drains with `take`; whatever is left
/// at end of source gets flushed regardless of size.
pub struct Batch {
    records: Vec<Transaction>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: Transaction) {
        self.records.push(record);
    }

    pub fn is_full(&self) -> bool {
        // capacity 0 degenerates to flushing after every row; an empty
        // buffer is never full, so skipped rows trigger no flush
        !self.records.is_empty() && self.records.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Drains the buffer for a flush, leaving it empty and reusable.
    pub fn take(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.records)
    }
}
