use std::path::Path;

use probebin_core::{DEFAULT_BASIC_REALM, DEFAULT_REALM};
use probebin_net::Limits;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: ListenConfig,
    pub digest: DigestConfig,
    pub basic: BasicConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DigestConfig {
    pub realm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BasicConfig {
    pub realm: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    /// Upper bound for `/bytes` and `/stream-bytes`.
    pub max_bytes: usize,
    /// Upper bound for `/drip?numbytes=`.
    pub max_drip_bytes: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            realm: DEFAULT_BASIC_REALM.to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            max_bytes: 100 * 1024,
            max_drip_bytes: 10 * 1024 * 1024,
        }
    }
}

impl LimitsConfig {
    pub fn parser_limits(&self) -> Limits {
        Limits {
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl ServerConfig {
    /// Reads the TOML file at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| ServerError::Config(err.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), ServerError> {
        let contents =
            toml::to_string_pretty(self).map_err(|err| ServerError::Config(err.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}
