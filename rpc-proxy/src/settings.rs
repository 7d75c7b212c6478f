use std::{net::SocketAddr, time::Duration};

use config::{Config, ConfigError, Environment, File, FileFormat};
use node_rpc::NodeSettings;
use serde::{Deserialize, Serialize};

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9922))
}

fn default_tcp_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9923))
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ProxySettings {
    pub node: NodeSettings,
    #[serde(default)]
    pub proxy: Listeners,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Listeners {
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
    #[serde(default = "default_tcp_addr")]
    pub tcp_addr: SocketAddr,
    /// Bound on a single upstream round trip.
    #[serde(default = "default_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// How long a raw TCP client may stay silent before its connection is dropped.
    #[serde(default = "default_timeout_secs")]
    pub client_timeout_secs: u64,
}

impl Default for Listeners {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            tcp_addr: default_tcp_addr(),
            upstream_timeout_secs: default_timeout_secs(),
            client_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Listeners {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl ProxySettings {
    pub fn try_from_toml(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PROXY").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
