// Node configuration

use crate::consensus::Difficulty;
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Leading zero hex digits required of a proof digest
    pub difficulty: u32,
    /// Per-peer budget for one chain fetch
    pub peer_timeout_ms: u64,
    /// Address the chain server binds to
    pub listen: String,
    /// Directory holding the chain store
    pub data_dir: String,
    /// Peers registered at startup
    pub peers: Vec<String>,
    /// Require a valid secp256k1 credential on every transaction
    pub require_signatures: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            peer_timeout_ms: 3000,
            listen: "127.0.0.1:5000".to_string(),
            data_dir: "./data".to_string(),
            peers: Vec::new(),
            require_signatures: false,
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or defaults when `path` is None
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    LedgerError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&source)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Difficulty::new(self.difficulty)?;
        if self.peer_timeout_ms == 0 {
            return Err(LedgerError::Config("peer_timeout_ms must be positive".to_string()));
        }
        if self.data_dir.is_empty() {
            return Err(LedgerError::Config("data_dir must be set".to_string()));
        }
        Ok(())
    }

    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}
