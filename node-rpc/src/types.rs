use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number the node reports for inputs that opt out of relative locktime.
pub const FINAL_SEQUENCE: u32 = 0xffff_ffff;

fn final_sequence() -> u32 {
    FINAL_SEQUENCE
}

/// A block at a given height with every transaction resolved to its full form.
///
/// Blocks are never persisted as a whole; the indexer only stores what it
/// derives from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub time: i64,
    pub tx: Vec<RawTransaction>,
    /// Transactions listed by the node that could not be fetched and were left out.
    pub dropped_transactions: usize,
}

/// `getblock <hash> true` as it comes off the wire.
///
/// Depending on the node build, `tx` holds either transaction ids or full
/// decoded transactions. Some forks report the latter under `rawtx`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerboseBlock {
    pub hash: String,
    pub height: u64,
    pub time: i64,
    #[serde(default)]
    pub tx: Vec<Value>,
    #[serde(default)]
    pub rawtx: Vec<Value>,
}

impl VerboseBlock {
    /// The transaction list, preferring `tx` over `rawtx`.
    pub fn entries(&self) -> &[Value] {
        if self.tx.is_empty() {
            &self.rawtx
        } else {
            &self.tx
        }
    }
}

/// Decoded transaction as reported by `getrawtransaction <txid> 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub vsize: u64,
    pub version: i32,
    pub locktime: u32,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    /// Canonical serialization as hex. Filled in by the codec when the node omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxInput {
    Coinbase {
        coinbase: String,
        #[serde(default = "final_sequence")]
        sequence: u32,
    },
    Spend {
        txid: String,
        vout: u32,
        #[serde(rename = "scriptSig")]
        script_sig: ScriptSig,
        #[serde(default = "final_sequence")]
        sequence: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txinwitness: Option<Vec<String>>,
    },
}

impl TxInput {
    pub fn is_coinbase(&self) -> bool {
        matches!(self, TxInput::Coinbase { .. })
    }

    /// The output this input consumes, `None` for a coinbase input.
    pub fn spent_outpoint(&self) -> Option<(&str, u32)> {
        match self {
            TxInput::Coinbase { .. } => None,
            TxInput::Spend { txid, vout, .. } => Some((txid.as_str(), *vout)),
        }
    }

    pub fn sequence(&self) -> u32 {
        match self {
            TxInput::Coinbase { sequence, .. } | TxInput::Spend { sequence, .. } => *sequence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSig {
    #[serde(default)]
    pub asm: String,
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in whole coins, as the node prints it.
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl TxOutput {
    /// The address this output pays to, if the node could derive one.
    ///
    /// Older nodes report `addresses`, newer ones a single `address`.
    pub fn address(&self) -> Option<&str> {
        let script = &self.script_pub_key;
        script
            .addresses
            .as_ref()
            .and_then(|addresses| addresses.first())
            .map(String::as_str)
            .filter(|address| !address.trim().is_empty())
            .or_else(|| {
                script
                    .address
                    .as_deref()
                    .filter(|address| !address.trim().is_empty())
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub asm: String,
    pub hex: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
}
