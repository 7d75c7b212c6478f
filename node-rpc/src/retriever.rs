use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    client::NodeClient,
    codec::tx_to_hex,
    error::FetchError,
    types::{Block, RawTransaction},
};

/// Anything that can produce the block at a given height.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch(&self, height: u64) -> Result<Block, FetchError>;
}

/// Assembles blocks from `getblockhash`, `getblock` and `getrawtransaction`.
#[derive(Debug, Clone)]
pub struct BlockRetriever {
    client: NodeClient,
}

impl BlockRetriever {
    pub fn new(client: NodeClient) -> Self {
        Self { client }
    }

    /// Resolves one entry of the block's transaction list.
    ///
    /// Returns `None` when the transaction has to be left out of the block.
    async fn resolve_entry(&self, height: u64, entry: &Value) -> Option<RawTransaction> {
        match entry {
            Value::Object(fields) if fields.contains_key("vout") => {
                match serde_json::from_value::<RawTransaction>(entry.clone()) {
                    Ok(tx) => Some(tx),
                    Err(e) => {
                        warn!(height, error = %e, "Dropping undecodable inline transaction");
                        None
                    }
                }
            }
            Value::String(txid) => match self.client.get_raw_transaction(txid).await {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(height, txid = %txid, error = %e, "Dropping transaction");
                    None
                }
            },
            other => {
                warn!(height, entry = %other, "Dropping unrecognised transaction entry");
                None
            }
        }
    }
}

#[async_trait]
impl BlockSource for BlockRetriever {
    async fn fetch(&self, height: u64) -> Result<Block, FetchError> {
        let hash = self.client.get_block_hash(height).await.map_err(|e| {
            if e.is_not_found() {
                FetchError::NotFound(height)
            } else {
                FetchError::Transient(e)
            }
        })?;
        let verbose = self.client.get_block(&hash).await?;

        let entries = verbose.entries();
        let mut tx = Vec::with_capacity(entries.len());
        let mut dropped_transactions = 0;
        for entry in entries {
            match self.resolve_entry(height, entry).await {
                Some(resolved) => tx.push(ensure_hex(resolved)?),
                None => dropped_transactions += 1,
            }
        }

        debug!(
            height,
            hash = %verbose.hash,
            transactions = tx.len(),
            dropped_transactions,
            "Fetched block"
        );

        Ok(Block {
            height,
            hash: verbose.hash,
            time: verbose.time,
            tx,
            dropped_transactions,
        })
    }
}

/// Keeps the node's serialization when present, otherwise encodes one.
fn ensure_hex(mut tx: RawTransaction) -> Result<RawTransaction, FetchError> {
    if tx.hex.as_deref().is_none_or(str::is_empty) {
        let encoded = tx_to_hex(&tx).map_err(|source| FetchError::Encoding {
            txid: tx.txid.clone(),
            source,
        })?;
        tx.hex = Some(encoded);
    }
    Ok(tx)
}
