//! Settings for a dome session, read from a TOML file.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    error::{DomeError, DomeResult},
    protocol::ProtocolVariant,
    response_reader::MAX_TIMEOUT,
    transport::{LinkSettings, TransportKind, DEFAULT_BAUD_RATE},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DomeConfig {
    /// Serial device, or `host:port` for a TCP link.
    pub port: String,
    pub transport: TransportKind,
    pub baud_rate: u32,
    pub protocol: ProtocolVariant,
    pub read_timeout_ms: u64,
    /// Pushed to the controller on connect when set.
    pub home_azimuth: Option<f64>,
    /// Pushed to the controller on connect when set.
    pub park_azimuth: Option<f64>,
    pub shutter_control: bool,
    pub assume_parked_on_connect: bool,
}

impl Default for DomeConfig {
    fn default() -> DomeConfig {
        DomeConfig {
            port: String::new(),
            transport: TransportKind::default(),
            baud_rate: DEFAULT_BAUD_RATE,
            protocol: ProtocolVariant::default(),
            read_timeout_ms: MAX_TIMEOUT.as_millis() as u64,
            home_azimuth: None,
            park_azimuth: None,
            shutter_control: true,
            assume_parked_on_connect: false,
        }
    }
}

impl DomeConfig {
    pub fn from_toml(text: &str) -> DomeResult<DomeConfig> {
        let config: DomeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DomeResult<DomeConfig> {
        let text = fs::read_to_string(path)
            .map_err(|error| DomeError::Config(format!("{}: {error}", path.display())))?;
        DomeConfig::from_toml(&text)
    }

    pub fn validate(&self) -> DomeResult<()> {
        if self.read_timeout_ms == 0 {
            return Err(DomeError::Config(
                "read_timeout_ms must be positive.".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(DomeError::Config("baud_rate must be positive.".to_string()));
        }
        for (name, azimuth) in [
            ("home_azimuth", self.home_azimuth),
            ("park_azimuth", self.park_azimuth),
        ] {
            if let Some(azimuth) = azimuth {
                if !(0.0..360.0).contains(&azimuth) {
                    return Err(DomeError::Config(format!(
                        "{name} {azimuth} is outside [0, 360)."
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            dtr: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DomeConfig::from_toml("port = \"/dev/ttyUSB0\"").unwrap();

        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.transport, TransportKind::Serial);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.protocol, ProtocolVariant::Classic);
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert!(config.shutter_control);
        assert_eq!(config.home_azimuth, None);
    }

    #[test]
    fn test_full_config() {
        let config = DomeConfig::from_toml(
            r#"
port = "127.0.0.1:8887"
transport = "tcp"
protocol = "extended"
read_timeout_ms = 500
home_azimuth = 10.0
park_azimuth = 270.5
shutter_control = false
assume_parked_on_connect = true
"#,
        )
        .unwrap();

        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.protocol, ProtocolVariant::Extended);
        assert_eq!(config.park_azimuth, Some(270.5));
        assert!(!config.shutter_control);
        assert!(config.assume_parked_on_connect);
    }

    #[test]
    fn test_serial_path_with_colons_stays_serial() {
        let config = DomeConfig::from_toml(
            "port = \"/dev/serial/by-path/pci-0000:00:14.0-usb-0:2:1.0-port0\"",
        )
        .unwrap();

        assert_eq!(config.transport, TransportKind::Serial);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            DomeConfig::from_toml("park_azimuth = 360.0"),
            Err(DomeError::Config(_))
        ));
        assert!(matches!(
            DomeConfig::from_toml("read_timeout_ms = 0"),
            Err(DomeError::Config(_))
        ));
        assert!(matches!(
            DomeConfig::from_toml("protocol = \"binary\""),
            Err(DomeError::Config(_))
        ));
    }
}
