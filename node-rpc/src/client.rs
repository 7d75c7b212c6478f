use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    auth::RpcCredential,
    error::RpcError,
    types::{RawTransaction, VerboseBlock},
};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC client for a Bitcoin-compatible node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    url: String,
    credential: RpcCredential,
}

impl NodeClient {
    pub fn new(
        url: impl Into<String>,
        credential: RpcCredential,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            credential,
        })
    }

    /// Issues a single JSON-RPC call and decodes its `result`.
    ///
    /// Nodes answer failed calls with a non-2xx status and a regular envelope,
    /// so the body is decoded before the status is considered.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let request = json!({
            "jsonrpc": "1.0",
            "id": method,
            "method": method,
            "params": params,
        });
        debug!(method, "Calling node");

        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, self.credential.header_value())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: RpcResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(RpcError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(source) => {
                return Err(RpcError::Decode {
                    method: method.to_string(),
                    source,
                });
            }
        };

        if let Some(error) = envelope.error {
            return Err(RpcError::Node {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))?;
        serde_json::from_value(result).map_err(|source| RpcError::Decode {
            method: method.to_string(),
            source,
        })
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        self.call("getblockhash", json!([height])).await
    }

    pub async fn get_block(&self, hash: &str) -> Result<VerboseBlock, RpcError> {
        self.call("getblock", json!([hash, true])).await
    }

    pub async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, RpcError> {
        self.call("getrawtransaction", json!([txid, 1])).await
    }

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call("getblockcount", json!([])).await
    }

    pub async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, RpcError> {
        self.call("sendrawtransaction", json!([tx_hex])).await
    }
}
