//! Static configuration for the counting application.
//!
//! Configuration is loaded with Figment from:
//! 1. A TOML or YAML file (chosen by extension)
//! 2. Environment variables prefixed with `NI660X_` (nested keys split on `__`)
//!
//! # Example
//!
//! ```toml
//! [connections]
//! from = "/Dev1/Ctr7InternalOutput"
//! to = ["/Dev1/PFI38", "/Dev1/PFI34"]
//!
//! [timer]
//! channel = "Dev1/ctr7"
//!
//! [[counters]]
//! name = "ct1"
//! channel = "Dev1/ctr0"
//! gate = "/Dev1/PFI38"
//! source = "/Dev1/PFI39"
//! ```

use std::collections::HashSet;
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CountingError, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "NI660X_";

/// Top-level acquisition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Terminal routes established at startup.
    #[serde(default)]
    pub connections: ConnectionsConfig,
    /// Gate generator.
    pub timer: TimerConfig,
    /// Counting channels, in configuration order.
    pub counters: Vec<CounterConfig>,
}

/// One source terminal fanned out to several destinations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// Source terminal (typically the timer's internal output).
    #[serde(default)]
    pub from: String,
    /// Destination terminals.
    #[serde(default)]
    pub to: Vec<String>,
}

impl ConnectionsConfig {
    /// Iterate over `(from, to)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to.iter().map(move |to| (self.from.as_str(), to.as_str()))
    }
}

/// Gate generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Physical counter used as the timer (e.g. `Dev1/ctr7`).
    pub channel: String,
}

/// Counting channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Stable name used by every remote operation.
    pub name: String,
    /// Physical counter (e.g. `Dev1/ctr0`).
    pub channel: String,
    /// Gate terminal.
    pub gate: String,
    /// Source (edge input) terminal.
    pub source: String,
}

/// Build the Figment used to load `path`.
///
/// Exposed so binaries can extract their own settings from the same file.
pub fn figment(path: &Path) -> Figment {
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let figment = if is_yaml {
        Figment::new().merge(Yaml::file(path))
    } else {
        Figment::new().merge(Toml::file(path))
    };
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

impl AppConfig {
    /// Load and validate configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CountingError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!("Loading config from: {}", path.display());

        let config: AppConfig = figment(path).extract()?;
        config.validate()?;

        info!(
            counters = config.counters.len(),
            routes = config.connections.to.len(),
            "Loaded acquisition config"
        );
        Ok(config)
    }

    /// Check the configuration for semantic errors.
    pub fn validate(&self) -> Result<()> {
        if self.timer.channel.trim().is_empty() {
            return Err(CountingError::Configuration(
                "timer.channel must not be empty".to_string(),
            ));
        }

        if !self.connections.to.is_empty() && self.connections.from.trim().is_empty() {
            return Err(CountingError::Configuration(
                "connections.from is required when connections.to is set".to_string(),
            ));
        }
        if self.connections.to.iter().any(|t| t.trim().is_empty()) {
            return Err(CountingError::Configuration(
                "connections.to contains an empty terminal".to_string(),
            ));
        }

        if self.counters.is_empty() {
            return Err(CountingError::Configuration(
                "at least one counter must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut channels = HashSet::new();
        for counter in &self.counters {
            if counter.name.trim().is_empty() {
                return Err(CountingError::Configuration(
                    "counter name must not be empty".to_string(),
                ));
            }
            for (field, value) in [
                ("channel", &counter.channel),
                ("gate", &counter.gate),
                ("source", &counter.source),
            ] {
                if value.trim().is_empty() {
                    return Err(CountingError::Configuration(format!(
                        "counter '{}': {} must not be empty",
                        counter.name, field
                    )));
                }
            }
            if !names.insert(counter.name.as_str()) {
                return Err(CountingError::Configuration(format!(
                    "Duplicate counter name: {}",
                    counter.name
                )));
            }
            if !channels.insert(counter.channel.to_ascii_lowercase()) {
                return Err(CountingError::Configuration(format!(
                    "Counter '{}' reuses physical channel {}",
                    counter.name, counter.channel
                )));
            }
            if counter.channel.eq_ignore_ascii_case(&self.timer.channel) {
                return Err(CountingError::Configuration(format!(
                    "Counter '{}' uses the timer channel {}",
                    counter.name, counter.channel
                )));
            }
        }

        Ok(())
    }

    /// Counter names in configuration order.
    pub fn counter_names(&self) -> Vec<&str> {
        self.counters.iter().map(|c| c.name.as_str()).collect()
    }
}
