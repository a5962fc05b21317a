//! Bridge configuration.
//!
//! Loaded from a TOML file, then overridden from environment variables.
//!
//! ```toml
//! [bus]
//! delivery_timeout_ms = 2000
//! send_timeout_ms = 3000
//!
//! [server]
//! host = "0.0.0.0"
//! port = 9480
//!
//! [[topology.controllers]]
//! number = 2
//! name = "Living room"
//! zones = 4
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};
use crate::space::Topology;

/// Default values.
pub mod defaults {
    pub const DELIVERY_TIMEOUT_MS: u64 = 2_000;
    pub const SEND_TIMEOUT_MS: u64 = 3_000;
    pub const NOTIFICATION_CAPACITY: usize = 256;
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 9480;
    pub const CONFIG_FILE: &str = "busbridge.toml";
}

/// Environment variable names.
pub mod env_vars {
    pub const DELIVERY_TIMEOUT_MS: &str = "BUSBRIDGE_DELIVERY_TIMEOUT_MS";
    pub const SEND_TIMEOUT_MS: &str = "BUSBRIDGE_SEND_TIMEOUT_MS";
    pub const HOST: &str = "BUSBRIDGE_HOST";
    pub const PORT: &str = "BUSBRIDGE_PORT";
    pub const LOG_JSON: &str = "BUSBRIDGE_LOG_JSON";

    /// Parsed value of `name`, if set and well-formed.
    pub fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Budget for one subscriber callback before it counts as stalled.
    pub delivery_timeout_ms: u64,
    /// Upper bound for one transport send.
    pub send_timeout_ms: u64,
    /// Buffered system events per subscriber.
    pub notification_capacity: usize,
}

impl BusSettings {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: defaults::DELIVERY_TIMEOUT_MS,
            send_timeout_ms: defaults::SEND_TIMEOUT_MS,
            notification_capacity: defaults::NOTIFICATION_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bus: BusSettings,
    pub server: ServerSettings,
    pub topology: Topology,
}

impl BridgeConfig {
    /// Load from `path`. A missing file yields the defaults; a malformed one
    /// is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::info!(category = "config", path = %path.display(), "Loading configuration");
                Self::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(category = "config", path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(BusError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BusError::Config(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_vars::parsed(env_vars::DELIVERY_TIMEOUT_MS) {
            self.bus.delivery_timeout_ms = ms;
        }
        if let Some(ms) = env_vars::parsed(env_vars::SEND_TIMEOUT_MS) {
            self.bus.send_timeout_ms = ms;
        }
        if let Ok(host) = std::env::var(env_vars::HOST) {
            self.server.host = host;
        }
        if let Some(port) = env_vars::parsed(env_vars::PORT) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bus.delivery_timeout_ms == 0 {
            return Err(BusError::Config(
                "bus.delivery_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.bus.send_timeout_ms == 0 {
            return Err(BusError::Config(
                "bus.send_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for controller in &self.topology.controllers {
            if !seen.insert(controller.number) {
                return Err(BusError::Config(format!(
                    "controller {} configured twice",
                    controller.number
                )));
            }
            if controller.zones == u8::MAX {
                return Err(BusError::Config(format!(
                    "controller {} declares {} zones; at most {} are addressable",
                    controller.number,
                    controller.zones,
                    u8::MAX - 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ControllerSpec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.bus.delivery_timeout(), Duration::from_millis(2_000));
        assert_eq!(config.server.port, defaults::PORT);
        assert!(config.topology.controllers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [bus]
            delivery_timeout_ms = 500

            [[topology.controllers]]
            number = 2
            name = "Living room"
            zones = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.delivery_timeout_ms, 500);
        assert_eq!(config.bus.send_timeout_ms, defaults::SEND_TIMEOUT_MS);
        assert_eq!(
            config.topology.controllers,
            vec![ControllerSpec::new(2, 4).with_name("Living room")]
        );
    }

    #[test]
    fn test_validation_rejects_duplicates_and_zero_timeouts() {
        let mut config = BridgeConfig::default();
        config.topology.controllers = vec![ControllerSpec::new(1, 2), ControllerSpec::new(1, 3)];
        assert!(matches!(config.validate(), Err(BusError::Config(_))));

        let mut config = BridgeConfig::default();
        config.bus.send_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(BridgeConfig::load(&missing).unwrap(), BridgeConfig::default());

        let broken = dir.path().join("broken.toml");
        let mut file = std::fs::File::create(&broken).unwrap();
        writeln!(file, "[bus\ndelivery_timeout_ms = ").unwrap();
        assert!(matches!(BridgeConfig::load(&broken), Err(BusError::Config(_))));
    }
}
