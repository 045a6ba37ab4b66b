//! Server configuration.
//!
//! Layered the way the reference server does: compiled-in defaults, then a
//! YAML file, then CLI flags (handled by `clap` in `main.rs`).

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sendspin_core::protocol_constants::DEFAULT_PORT;

/// Server configuration loaded from YAML with CLI overrides applied on top.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to.
    pub bind: IpAddr,

    /// Port to bind the WebSocket listener to.
    pub port: u16,

    /// Sample rate of the built-in audio source, in Hz.
    pub source_sample_rate: u32,

    /// Channel count of the built-in audio source.
    pub source_channels: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            source_sample_rate: 48_000,
            source_channels: 2,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from an optional YAML file, falling back to
    /// compiled-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_the_protocol_default_port() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.source_channels, 2);
    }
}
