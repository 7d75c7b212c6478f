//! Canonical binary encoding of decoded transactions.
//!
//! The node reports transactions as JSON. The indexer stores the exact bytes
//! the node would produce for the same transaction, so this module rebuilds a
//! [`bitcoin::Transaction`] from the JSON record and serializes it with the
//! consensus encoder. Witness data is not encoded.

use std::str::FromStr;

use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    absolute::LockTime, consensus::encode, transaction::Version,
};
use thiserror::Error;
use tracing::debug;

use crate::types::{RawTransaction, TxInput, TxOutput};

pub const SUBUNITS_PER_COIN: f64 = 100_000_000.0;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid script hex in {location}: {source}")]
    InvalidScript {
        location: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("Invalid Txid: {0}")]
    InvalidTxid(String),
    #[error("Amount {0} cannot be expressed in subunits")]
    AmountOutOfRange(f64),
}

/// Converts a coin amount to subunits, rounding to the nearest subunit.
///
/// Amounts with more than 8 decimal places are rounded silently.
pub fn coins_to_subunits(value: f64) -> Result<u64, CodecError> {
    let subunits = (value * SUBUNITS_PER_COIN).round();
    if !subunits.is_finite() || subunits < 0.0 || subunits >= u64::MAX as f64 {
        return Err(CodecError::AmountOutOfRange(value));
    }
    Ok(subunits as u64)
}

/// Encodes a decoded transaction and returns its canonical hex.
pub fn tx_to_hex(tx: &RawTransaction) -> Result<String, CodecError> {
    let transaction = build_transaction(tx)?;
    let hex = encode::serialize_hex(&transaction);
    debug!(txid = %tx.txid, bytes = hex.len() / 2, "Encoded transaction");
    Ok(hex)
}

/// Rebuilds the consensus transaction, keeping inputs and outputs in the order given.
pub fn build_transaction(tx: &RawTransaction) -> Result<Transaction, CodecError> {
    let input = tx
        .vin
        .iter()
        .enumerate()
        .map(|(index, input)| build_input(&tx.txid, index, input))
        .collect::<Result<Vec<_>, _>>()?;

    let output = tx
        .vout
        .iter()
        .map(|output| build_output(&tx.txid, output))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Transaction {
        version: Version(tx.version),
        lock_time: LockTime::from_consensus(tx.locktime),
        input,
        output,
    })
}

fn build_input(txid: &str, index: usize, input: &TxInput) -> Result<TxIn, CodecError> {
    match input {
        TxInput::Coinbase { coinbase, sequence } => Ok(TxIn {
            // All-zero txid and an all-ones output index.
            previous_output: OutPoint::null(),
            script_sig: decode_script(coinbase, || format!("{txid} vin {index} coinbase"))?,
            sequence: Sequence(*sequence),
            witness: Witness::default(),
        }),
        TxInput::Spend {
            txid: prev_txid,
            vout,
            script_sig,
            sequence,
            ..
        } => {
            // Txid parses display order and serializes in internal byte order.
            let prev_txid = Txid::from_str(prev_txid)
                .map_err(|_| CodecError::InvalidTxid(prev_txid.clone()))?;
            Ok(TxIn {
                previous_output: OutPoint::new(prev_txid, *vout),
                script_sig: decode_script(&script_sig.hex, || {
                    format!("{txid} vin {index} scriptSig")
                })?,
                sequence: Sequence(*sequence),
                witness: Witness::default(),
            })
        }
    }
}

fn build_output(txid: &str, output: &TxOutput) -> Result<TxOut, CodecError> {
    Ok(TxOut {
        value: Amount::from_sat(coins_to_subunits(output.value)?),
        script_pubkey: decode_script(&output.script_pub_key.hex, || {
            format!("{txid} vout {} scriptPubKey", output.n)
        })?,
    })
}

fn decode_script(
    script_hex: &str,
    location: impl FnOnce() -> String,
) -> Result<ScriptBuf, CodecError> {
    hex::decode(script_hex)
        .map(ScriptBuf::from_bytes)
        .map_err(|source| CodecError::InvalidScript {
            location: location(),
            source,
        })
}
