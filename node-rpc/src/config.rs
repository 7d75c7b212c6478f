use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, RpcCredential};

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the upstream node, shared by every service that talks to it.
#[derive(Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    #[serde(default)]
    pub cookie_path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl NodeSettings {
    /// Resolves the credential. Failure here is a startup error.
    pub fn credential(&self) -> Result<RpcCredential, AuthError> {
        RpcCredential::resolve(
            self.rpc_user.as_deref(),
            self.rpc_password.as_deref(),
            self.cookie_path.as_deref(),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for NodeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSettings")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_user", &self.rpc_user)
            .field("rpc_password", &self.rpc_password.as_ref().map(|_| "<redacted>"))
            .field("cookie_path", &self.cookie_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_redaction() {
        let settings: NodeSettings = serde_json::from_str(
            r#"{ "rpc_url": "http://127.0.0.1:20760", "rpc_user": "u", "rpc_password": "hunter2" }"#,
        )
        .unwrap();

        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert!(settings.credential().is_ok());
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_no_credential_source() {
        let settings: NodeSettings =
            serde_json::from_str(r#"{ "rpc_url": "http://127.0.0.1:20760" }"#).unwrap();
        assert!(matches!(settings.credential(), Err(AuthError::Missing)));
    }
}
