pub mod delta;
pub mod indexer;
pub mod settings;
pub mod sleeper;
pub mod store;
pub mod types;

pub use indexer::{Indexer, IndexerBuilder, IndexerError, IndexerState};
pub use store::{IndexStore, MemoryStore, PgStore, StoreError};
pub use types::{BlockSummary, OutPointKey, TransactionRecord, Utxo};
