use std::time::Duration;

use thiserror::Error;

use crate::framing::FrameError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Invalid upstream URL {url}: {reason}")]
    InvalidUpstream { url: String, reason: String },
    #[error("Node credential is not a valid header value")]
    InvalidCredential,
    #[error("Upstream sent a malformed response: {0}")]
    MalformedResponse(String),
    #[error("Upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),
    #[error("Client stayed idle for {0:?}")]
    ClientTimeout(Duration),
    #[error("Client closed the connection before sending a complete message")]
    ClientClosed,
    #[error("Failed to read request body: {0}")]
    RequestBody(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
