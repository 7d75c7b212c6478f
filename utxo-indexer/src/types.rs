use node_rpc::{TxInput, TxOutput};
use serde::{Deserialize, Serialize};

/// Stored value of the checkpoint before any block has been processed.
pub const NO_CHECKPOINT: i64 = -1;

/// Primary key of an unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPointKey {
    pub txid: String,
    pub vout: u32,
}

impl OutPointKey {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

/// An unspent output with an address, as stored in the `utxos` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    /// Subunits. Persisted as a decimal string.
    pub amount: u64,
    /// Raw hex of the creating transaction.
    pub hex: String,
    pub block: u64,
    pub block_hash: String,
    pub block_timestamp: i64,
}

impl Utxo {
    pub fn key(&self) -> OutPointKey {
        OutPointKey::new(self.txid.clone(), self.vout)
    }
}

/// One row of the `transactions` table.
///
/// `vout` only holds the outputs that pay to an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: String,
    pub block_height: u64,
    pub hash: String,
    pub size: u64,
    pub vsize: u64,
    pub version: i32,
    pub locktime: u32,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub hex: String,
}

/// What processing a single height did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    pub transactions: usize,
    pub created: usize,
    pub consumed: usize,
    pub new_addresses: usize,
    pub dropped_transactions: usize,
}
