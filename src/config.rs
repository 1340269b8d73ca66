//! Configuration loading using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file (optional)
//! 3. Environment variables prefixed with `FIELDFOX_`
//!
//! # Example
//! ```toml
//! name = "bench_fieldfox"
//! address = "192.168.1.120"
//! measurement_class = "SA"
//! channel = 3
//! reset = false
//! ```
//!
//! `FIELDFOX_CHANNEL=2` would override the channel above.

use crate::driver::InstrumentIdentity;
use crate::error::{DriverError, DriverResult};
use crate::scpi::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FIELDFOX_";

/// Connection and identity settings for one FieldFox driver instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFoxConfig {
    /// Instance name used in logs
    #[serde(default = "default_name")]
    pub name: String,
    /// Hostname or IP address of the analyzer
    #[serde(default)]
    pub address: String,
    /// SCPI socket port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Reply timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Measurement class: CAT, VNA or SA
    #[serde(default = "default_measurement_class")]
    pub measurement_class: String,
    /// FieldFox channel controlled by this instance
    #[serde(default = "default_channel")]
    pub channel: i64,
    /// Reset the instrument to defaults during construction
    #[serde(default)]
    pub reset: bool,
    /// Use the in-memory instrument instead of a TCP connection
    #[serde(default)]
    pub mock: bool,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_name() -> String {
    "fieldfox".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_measurement_class() -> String {
    "VNA".to_string()
}

fn default_channel() -> i64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FieldFoxConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: String::new(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            measurement_class: default_measurement_class(),
            channel: default_channel(),
            reset: false,
            mock: false,
            log_level: default_log_level(),
        }
    }
}

impl FieldFoxConfig {
    /// Defaults overridden by `FIELDFOX_*` environment variables.
    pub fn load() -> DriverResult<Self> {
        Self::figment(None).extract().map_err(DriverError::from)
    }

    /// Defaults, then the TOML file at `path`, then the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        Self::figment(Some(path.as_ref()))
            .extract()
            .map_err(DriverError::from)
    }

    /// Figment with every provider layered, for callers that add their own.
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(FieldFoxConfig::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        };
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> DriverResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(DriverError::InvalidConfiguration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.address.trim().is_empty() && !self.mock {
            return Err(DriverError::InvalidConfiguration(
                "address is required unless mock = true".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(DriverError::InvalidConfiguration(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Identity handed to the driver constructor.
    pub fn identity(&self) -> InstrumentIdentity {
        InstrumentIdentity {
            name: self.name.clone(),
            address: self.address.clone(),
            channel: self.channel,
            measurement_class: self.measurement_class.clone(),
            reset: self.reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_defaults_match_driver_defaults() {
        let config = FieldFoxConfig::load().unwrap();
        assert_eq!(config.measurement_class, "VNA");
        assert_eq!(config.channel, 1);
        assert_eq!(config.port, 5025);
        assert!(!config.reset);
        assert!(!config.mock);
    }

    #[test]
    #[serial]
    fn test_load_from_toml() {
        let file = write_config(
            r#"
            name = "bench"
            address = "192.168.1.120"
            measurement_class = "SA"
            channel = 3
            reset = true
            "#,
        );

        let config = FieldFoxConfig::load_from(file.path()).unwrap();
        assert_eq!(config.name, "bench");
        assert_eq!(config.address, "192.168.1.120");
        assert_eq!(config.measurement_class, "SA");
        assert_eq!(config.channel, 3);
        assert!(config.reset);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config("address = \"10.0.0.2\"\nchannel = 3\n");

        std::env::set_var("FIELDFOX_CHANNEL", "2");
        std::env::set_var("FIELDFOX_MEASUREMENT_CLASS", "CAT");
        let config = FieldFoxConfig::load_from(file.path());
        std::env::remove_var("FIELDFOX_CHANNEL");
        std::env::remove_var("FIELDFOX_MEASUREMENT_CLASS");

        let config = config.unwrap();
        assert_eq!(config.channel, 2);
        assert_eq!(config.measurement_class, "CAT");
        assert_eq!(config.address, "10.0.0.2");
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_config_error() {
        let file = write_config("channel = \"three\"\n");
        let result = FieldFoxConfig::load_from(file.path());
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let config = FieldFoxConfig {
            address: "192.168.1.120".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let missing_address = FieldFoxConfig::default();
        assert!(missing_address.validate().is_err());

        let mock = FieldFoxConfig {
            mock: true,
            ..Default::default()
        };
        assert!(mock.validate().is_ok());

        let bad_level = FieldFoxConfig {
            mock: true,
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn test_identity_carries_settings() {
        let config = FieldFoxConfig {
            name: "n9917a".to_string(),
            address: "192.168.1.120".to_string(),
            channel: 0,
            reset: true,
            ..Default::default()
        };
        let identity = config.identity();
        assert_eq!(identity.name, "n9917a");
        assert_eq!(identity.channel, 0);
        assert_eq!(identity.measurement_class, "VNA");
        assert!(identity.reset);
    }
}
