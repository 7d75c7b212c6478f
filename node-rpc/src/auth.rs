use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to read RPC cookie file {path}: {source}")]
    CookieUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("RPC cookie file {0} is empty")]
    EmptyCookie(PathBuf),
    #[error("No RPC authentication method found. Set rpc_user and rpc_password or cookie_path")]
    Missing,
}

/// The Basic credential sent on every call to the node.
///
/// Resolved once at startup and shared read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RpcCredential {
    header: String,
}

impl RpcCredential {
    pub fn from_user_pass(user: &str, password: &str) -> Self {
        Self::from_secret(&format!("{user}:{password}"))
    }

    /// Reads a `user:password` cookie as written by the node on startup.
    pub fn from_cookie_file(path: &Path) -> Result<Self, AuthError> {
        let contents = fs::read_to_string(path).map_err(|source| AuthError::CookieUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let cookie = contents.trim();
        if cookie.is_empty() {
            return Err(AuthError::EmptyCookie(path.to_path_buf()));
        }
        Ok(Self::from_secret(cookie))
    }

    /// A configured user/password pair wins; otherwise the cookie file is used.
    pub fn resolve(
        user: Option<&str>,
        password: Option<&str>,
        cookie_path: Option<&Path>,
    ) -> Result<Self, AuthError> {
        if let (Some(user), Some(password)) = (user, password) {
            return Ok(Self::from_user_pass(user, password));
        }
        match cookie_path {
            Some(path) => Self::from_cookie_file(path),
            None => Err(AuthError::Missing),
        }
    }

    /// Value for the `Authorization` header, `Basic <base64>`.
    pub fn header_value(&self) -> &str {
        &self.header
    }

    fn from_secret(secret: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(secret.as_bytes());
        Self {
            header: format!("Basic {encoded}"),
        }
    }
}

impl fmt::Debug for RpcCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RpcCredential(Basic <redacted>)")
    }
}
