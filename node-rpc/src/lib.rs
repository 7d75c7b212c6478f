pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod retriever;
pub mod shutdown;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, RpcCredential};
pub use client::NodeClient;
pub use codec::{CodecError, coins_to_subunits, tx_to_hex};
pub use config::NodeSettings;
pub use error::{FetchError, RpcError};
pub use retriever::{BlockRetriever, BlockSource};
pub use types::{Block, RawTransaction, ScriptPubKey, ScriptSig, TxInput, TxOutput};
