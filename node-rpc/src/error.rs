use thiserror::Error;

use crate::codec::CodecError;

/// `getblockhash`: block height out of range.
pub const RPC_INVALID_PARAMETER: i64 = -8;
/// `getblock` / `getrawtransaction`: unknown block or transaction.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("RPC {method} failed with code {code}: {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },
    #[error("RPC {0} returned no result")]
    MissingResult(String),
    #[error("RPC {method} returned an undecodable payload: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RpcError {
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Node { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The node answered, but it does not know the requested height, block or transaction.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code(),
            Some(RPC_INVALID_PARAMETER | RPC_INVALID_ADDRESS_OR_KEY)
        )
    }
}

/// Why a block could not be retrieved.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Block {0} is beyond the chain tip")]
    NotFound(u64),
    #[error("Transient node failure: {0}")]
    Transient(#[from] RpcError),
    #[error("Transaction {txid} could not be encoded: {source}")]
    Encoding {
        txid: String,
        #[source]
        source: CodecError,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}
