use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use node_rpc::NodeSettings;
use serde::{Deserialize, Serialize};

fn default_max_connections() -> u32 {
    5
}

fn default_wait_interval_ms() -> u64 {
    500
}

/// Configuration for the indexer service.
///
/// Read from a TOML file, then overridden by `INDEXER__<SECTION>__<KEY>`
/// environment variables.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct IndexerSettings {
    pub node: NodeSettings,
    pub indexer: Core,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Core {
    pub db_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Pause between checks for the next block while caught up, and before retrying a failed write.
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,
}

impl Core {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

impl IndexerSettings {
    pub fn try_from_toml(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("INDEXER").separator("__"))
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
