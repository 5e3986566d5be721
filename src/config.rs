//! Bridge configuration
//!
//! Loaded from an optional TOML file; every field has a default, so an empty
//! file (or none at all) runs the bridge against the simulated vehicle.
//!
//! ```toml
//! listen_addr = "0.0.0.0:11411"
//! rotate_cw_yaw_rate = -20.0
//!
//! [device]
//! backend = "mavlink"
//!
//! [device.mavlink.connection]
//! kind = "serial"
//! port = "/dev/ttyACM0"
//! baud = 57600
//! ```

use crate::bridge::EngineSettings;
use crate::device::mav::MavlinkConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name the bridge identifies itself with in logs
    pub node_name: String,
    pub listen_addr: String,
    pub control_period_ms: u64,
    pub status_period_ms: u64,
    pub watchdog_period_ms: u64,
    /// Yaw rate for `rotate_cw`, deg/s
    pub rotate_cw_yaw_rate: f32,
    pub device: DeviceConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_name: "dji_ros_driver".into(),
            listen_addr: "0.0.0.0:11411".into(),
            control_period_ms: 100,
            status_period_ms: 1000,
            watchdog_period_ms: 2000,
            rotate_cw_yaw_rate: -20.0,
            device: DeviceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    #[default]
    Simulated,
    Mavlink,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: DeviceBackend,
    pub mavlink: MavlinkConfig,
}

impl BridgeConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.control_period_ms > 0, "control_period_ms must be positive");
        anyhow::ensure!(self.status_period_ms > 0, "status_period_ms must be positive");
        anyhow::ensure!(self.watchdog_period_ms > 0, "watchdog_period_ms must be positive");
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            control_period: Duration::from_millis(self.control_period_ms),
            status_period: Duration::from_millis(self.status_period_ms),
            rotate_cw_yaw_rate: self.rotate_cw_yaw_rate,
        }
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mav::LinkKind;

    #[test]
    fn test_empty_file_is_default() {
        let config = BridgeConfig::parse("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.engine_settings(), EngineSettings::default());
        assert_eq!(config.device.backend, DeviceBackend::Simulated);
    }

    #[test]
    fn test_mavlink_backend() {
        let config = BridgeConfig::parse(
            r#"
            listen_addr = "127.0.0.1:9000"
            status_period_ms = 500

            [device]
            backend = "mavlink"

            [device.mavlink]
            target_system = 3

            [device.mavlink.connection]
            kind = "tcp"
            address = "127.0.0.1:5760"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.engine_settings().status_period, Duration::from_millis(500));
        assert_eq!(config.engine_settings().control_period, Duration::from_millis(100));
        assert_eq!(config.device.backend, DeviceBackend::Mavlink);
        assert_eq!(config.device.mavlink.target_system, 3);
        assert_eq!(config.device.mavlink.system_id, 255);
        assert_eq!(
            config.device.mavlink.connection,
            LinkKind::Tcp {
                address: "127.0.0.1:5760".into()
            }
        );
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(BridgeConfig::parse("control_period_ms = 0").is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(BridgeConfig::parse("[device]\nbackend = \"dji\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(BridgeConfig::load(Some(Path::new("/nonexistent/bridge.toml"))).is_err());
        assert_eq!(BridgeConfig::load(None).unwrap(), BridgeConfig::default());
    }
}
