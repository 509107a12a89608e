//! Controller Configuration
//!
//! YAML-backed configuration for a controller session: attribute range
//! limits, polling cadence, and the channel/pump topology tables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PumpLinkError, Result};
use crate::types::{ChannelBaudRate, ChannelProtocol};

fn default_max_nozzles() -> u8 {
    6
}

fn default_max_pump_address() -> u16 {
    99
}

fn default_max_pump_channels() -> u16 {
    16
}

fn default_polling_interval_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

/// Attribute range limits enforced by validated pump setters
///
/// Every pump owns exactly `max_nozzles_count` nozzle records for its whole
/// lifetime; the remaining bounds gate `physical_address` and `channel_id`
/// writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControllerLimits {
    #[serde(default = "default_max_nozzles")]
    pub max_nozzles_count: u8,
    #[serde(default = "default_max_pump_address")]
    pub max_pump_address: u16,
    #[serde(default = "default_max_pump_channels")]
    pub max_pump_channels_count: u16,
}

impl Default for ControllerLimits {
    fn default() -> Self {
        Self {
            max_nozzles_count: default_max_nozzles(),
            max_pump_address: default_max_pump_address(),
            max_pump_channels_count: default_max_pump_channels(),
        }
    }
}

/// One bus channel definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: u16,
    pub baud_rate: ChannelBaudRate,
    pub protocol: ChannelProtocol,
}

/// One pump definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub id: u16,
    pub physical_address: u16,
    /// Channel the pump is wired to (0 = unbound)
    #[serde(default)]
    pub channel_id: u16,
    /// Close finished transactions automatically
    #[serde(default = "default_true")]
    pub autoclose_transaction: bool,
    /// Ticked by the polling loop only while active
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Controller session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub limits: ControllerLimits,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    /// Select the extended wire-command set where the bus supports it
    #[serde(default)]
    pub use_extended_commands: bool,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub pumps: Vec<PumpConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            limits: ControllerLimits::default(),
            polling_interval_ms: default_polling_interval_ms(),
            use_extended_commands: false,
            channels: Vec::new(),
            pumps: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PumpLinkError::config(format!("read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: ControllerConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check topology tables against the configured limits
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_ms == 0 {
            return Err(PumpLinkError::config("polling_interval_ms must be > 0"));
        }

        let mut channel_ids = std::collections::HashSet::new();
        for channel in &self.channels {
            if channel.id == 0 || channel.id > self.limits.max_pump_channels_count {
                return Err(PumpLinkError::config(format!(
                    "channel id {} outside [1, {}]",
                    channel.id, self.limits.max_pump_channels_count
                )));
            }
            if !channel_ids.insert(channel.id) {
                return Err(PumpLinkError::config(format!(
                    "duplicate channel id {}",
                    channel.id
                )));
            }
        }

        let mut pump_ids = std::collections::HashSet::new();
        for pump in &self.pumps {
            if !pump_ids.insert(pump.id) {
                return Err(PumpLinkError::config(format!("duplicate pump id {}", pump.id)));
            }
            if pump.physical_address > self.limits.max_pump_address {
                return Err(PumpLinkError::config(format!(
                    "pump {} physical address {} outside [0, {}]",
                    pump.id, pump.physical_address, self.limits.max_pump_address
                )));
            }
            if pump.channel_id > self.limits.max_pump_channels_count {
                return Err(PumpLinkError::config(format!(
                    "pump {} channel id {} outside [0, {}]",
                    pump.id, pump.channel_id, self.limits.max_pump_channels_count
                )));
            }
        }

        Ok(())
    }

    /// Polling cadence as a `Duration`
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
polling_interval_ms: 200
use_extended_commands: true
channels:
  - id: 1
    baud_rate: "9600"
    protocol: unipump
pumps:
  - id: 1
    physical_address: 1
    channel_id: 1
  - id: 2
    physical_address: 2
    channel_id: 1
    autoclose_transaction: false
"#;

    #[test]
    fn test_parse_sample() {
        let config = ControllerConfig::from_yaml(SAMPLE).expect("sample config should parse");
        assert_eq!(config.polling_interval_ms, 200);
        assert!(config.use_extended_commands);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].baud_rate, ChannelBaudRate::Baud9600);
        assert_eq!(config.pumps.len(), 2);
        assert!(config.pumps[0].autoclose_transaction);
        assert!(!config.pumps[1].autoclose_transaction);
        assert_eq!(config.limits.max_nozzles_count, 6);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pumps.len(), 2);
    }

    #[test]
    fn test_rejects_duplicate_pump_ids() {
        let raw = r#"
pumps:
  - { id: 1, physical_address: 1 }
  - { id: 1, physical_address: 2 }
"#;
        let err = ControllerConfig::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate pump id"));
    }

    #[test]
    fn test_rejects_out_of_range_address() {
        let raw = r#"
pumps:
  - { id: 1, physical_address: 100 }
"#;
        let err = ControllerConfig::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("physical address"));
    }

    #[test]
    fn test_rejects_channel_id_beyond_limit() {
        let raw = r#"
channels:
  - { id: 17, baud_rate: "4800", protocol: dart }
"#;
        let err = ControllerConfig::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("channel id"));
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.polling_interval(), Duration::from_millis(250));
        assert!(!config.use_extended_commands);
        assert_eq!(config.limits.max_pump_address, 99);
    }
}
