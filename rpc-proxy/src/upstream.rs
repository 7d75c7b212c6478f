use std::time::Duration;

use axum::{body::Bytes, http::HeaderValue};
use node_rpc::RpcCredential;
use reqwest::{
    Url,
    header::{AUTHORIZATION, CONTENT_TYPE},
};

use crate::error::ProxyError;

/// The node every proxied request goes to, and the credential it expects.
///
/// Built once at startup and shared read-only by every connection.
#[derive(Debug, Clone)]
pub struct Upstream {
    base: Url,
    credential: RpcCredential,
    authorization: HeaderValue,
    client: reqwest::Client,
    timeout: Duration,
}

impl Upstream {
    pub fn new(url: &str, credential: RpcCredential, timeout: Duration) -> Result<Self, ProxyError> {
        let base = Url::parse(url).map_err(|e| ProxyError::InvalidUpstream {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if base.host_str().is_none() {
            return Err(ProxyError::InvalidUpstream {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        let authorization = HeaderValue::from_str(credential.header_value())
            .map_err(|_| ProxyError::InvalidCredential)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            base,
            credential,
            authorization,
            client,
            timeout,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn authorization(&self) -> &str {
        self.credential.header_value()
    }

    pub fn authorization_header(&self) -> HeaderValue {
        self.authorization.clone()
    }

    /// Absolute upstream URL for a request path such as `/wallet/x?verbose=1`.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    /// Host, port and path prefix for a raw connection. Only plain `http` upstreams qualify.
    pub fn socket_target(&self) -> Result<(String, u16, String), ProxyError> {
        let unsupported = |reason: &str| ProxyError::InvalidUpstream {
            url: self.base.to_string(),
            reason: reason.to_string(),
        };
        if self.base.scheme() != "http" {
            return Err(unsupported("only http:// upstreams can be tunnelled"));
        }
        let host = self.base.host_str().ok_or_else(|| unsupported("missing host"))?;
        let port = self
            .base
            .port_or_known_default()
            .ok_or_else(|| unsupported("missing port"))?;
        Ok((
            host.to_string(),
            port,
            self.base.path().trim_end_matches('/').to_string(),
        ))
    }

    /// POSTs one JSON-RPC body and returns the response body.
    ///
    /// Non-success statuses are errors.
    pub async fn post_rpc(&self, body: Vec<u8>) -> Result<Bytes, ProxyError> {
        let response = self
            .client
            .post(self.base.clone())
            .header(AUTHORIZATION, self.authorization_header())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}
