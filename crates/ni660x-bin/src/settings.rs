//! Binary-only settings read from the acquisition config file.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 9000
//!
//! [logging]
//! level = "debug"
//!
//! [simulation]
//! default_rate_hz = 100000.0
//! sources = { "/Dev1/PFI39" = 1000.0 }
//! ```
//!
//! Every section is optional. Command line flags win over file values.

use std::path::Path;

use anyhow::{Context, Result};
use ni660x_driver_mock::SimulationConfig;
use ni660x_server::DEFAULT_PORT;
use serde::Deserialize;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_level() -> String {
    "info".to_string()
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive: a level (`info`) or a full `EnvFilter` string.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Settings used by `ni660x serve` beside the acquisition config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServeSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl ServeSettings {
    /// Read the optional sections of `path`.
    pub fn load(path: &Path) -> Result<Self> {
        ni660x_core::config::figment(path)
            .extract()
            .with_context(|| format!("Failed to read settings from {}", path.display()))
    }

    /// Apply command line overrides.
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        level: Option<String>,
    ) -> Self {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(level) = level {
            self.logging.level = level;
        }
        self
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
