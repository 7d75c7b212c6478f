//! Pure derivation of store changes from a fetched block.

use node_rpc::{Block, CodecError, RawTransaction, coins_to_subunits, tx_to_hex};

use crate::types::{OutPointKey, TransactionRecord, Utxo};

/// Everything a block adds to or removes from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockDelta {
    pub created: Vec<Utxo>,
    pub consumed: Vec<OutPointKey>,
    pub transactions: Vec<TransactionRecord>,
}

impl BlockDelta {
    /// Addresses paid by this block's outputs, first occurrence order, no duplicates.
    pub fn created_addresses(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.created
            .iter()
            .filter(|utxo| seen.insert(utxo.address.as_str()))
            .map(|utxo| utxo.address.clone())
            .collect()
    }
}

pub fn derive(block: &Block) -> Result<BlockDelta, CodecError> {
    let mut delta = BlockDelta::default();

    for tx in &block.tx {
        let hex = raw_hex(tx)?;

        for output in &tx.vout {
            let Some(address) = output.address() else {
                continue;
            };
            delta.created.push(Utxo {
                txid: tx.txid.clone(),
                vout: output.n,
                address: address.to_string(),
                amount: coins_to_subunits(output.value)?,
                hex: hex.clone(),
                block: block.height,
                block_hash: block.hash.clone(),
                block_timestamp: block.time,
            });
        }

        delta.consumed.extend(
            tx.vin
                .iter()
                .filter_map(|input| input.spent_outpoint())
                .map(|(txid, vout)| OutPointKey::new(txid, vout)),
        );

        delta.transactions.push(TransactionRecord {
            txid: tx.txid.clone(),
            block_height: block.height,
            hash: tx.hash.clone(),
            size: tx.size,
            vsize: tx.vsize,
            version: tx.version,
            locktime: tx.locktime,
            vin: tx.vin.clone(),
            vout: tx
                .vout
                .iter()
                .filter(|output| output.address().is_some())
                .cloned()
                .collect(),
            hex,
        });
    }

    Ok(delta)
}

fn raw_hex(tx: &RawTransaction) -> Result<String, CodecError> {
    match tx.hex.as_deref() {
        Some(hex) if !hex.is_empty() => Ok(hex.to_string()),
        _ => tx_to_hex(tx),
    }
}
