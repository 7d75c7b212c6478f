pub mod errors;
pub mod memory;
pub mod provider;

use std::collections::HashSet;

use async_trait::async_trait;

pub use errors::StoreError;
pub use memory::MemoryStore;
pub use provider::PgStore;

use crate::types::{OutPointKey, TransactionRecord, Utxo};

/// Persistence used by the indexer. The indexer is its only writer.
///
/// Every write is idempotent: upserts overwrite whole rows, and deleting a
/// key that is not present succeeds.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// The last fully processed height, [`NO_CHECKPOINT`](crate::types::NO_CHECKPOINT) if none.
    async fn last_processed_height(&self) -> Result<i64, StoreError>;

    async fn set_last_processed_height(&self, height: i64) -> Result<(), StoreError>;

    async fn upsert_utxos(&self, utxos: &[Utxo]) -> Result<(), StoreError>;

    async fn upsert_transactions(&self, transactions: &[TransactionRecord]) -> Result<(), StoreError>;

    /// Returns the stored rows among `keys`. Unknown keys are skipped.
    async fn find_utxos(&self, keys: &[OutPointKey]) -> Result<Vec<Utxo>, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_utxos(&self, keys: &[OutPointKey]) -> Result<u64, StoreError>;

    /// The subset of `addresses` already known.
    async fn existing_addresses(&self, addresses: &[String]) -> Result<HashSet<String>, StoreError>;

    async fn upsert_addresses(&self, addresses: &[String], last_seen: i64) -> Result<(), StoreError>;
}
