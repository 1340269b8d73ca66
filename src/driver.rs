//! Keysight N9917A FieldFox driver.
//!
//! The driver is a declaration table: every supported instrument setting is a
//! row naming its SCPI command template, wire format, type, unit, access and
//! optional token/label map. Constructing a [`KeysightN9917a`] resolves each
//! template against the instance channel and registers the rows. Rows for the
//! spectrum analyzer exist only when the instance runs in `SA` class.
//!
//! # Parameters
//!
//! Always present:
//!
//! - `chan`, `meas_class` (read-only) - echo the instance identity
//! - `start_freq`, `stop_freq`, `center_freq`, `span`, `cw_freq` - frequency sweep (Hz)
//! - `start_pow`, `stop_pow`, `center_pow`, `power` - source power (dBm)
//! - `power_on` - RF output state
//! - `if_bandwidth`, `average_factor`, `averaging_state`, `averaging_mode`
//! - `points`, `sweep_time`, `segment_sweep_time` (times read-only)
//! - `meas_select`, `meas_select_trace`, `meas_class_curr` (read-only)
//! - `error`, `active_chan`, `active_measurement` (read-only)
//!
//! `SA` class only: `spec_rbw_shape`, `spec_detector_func`,
//! `spec_vbw_aver_type`, `spec_rbw`, `spec_vbw`.
//!
//! # Example
//!
//! ```rust
//! use fieldfox::driver::{InstrumentIdentity, KeysightN9917a};
//! use fieldfox::scpi::MockScpiClient;
//! use std::sync::Arc;
//!
//! let identity = InstrumentIdentity::new("fieldfox", "192.168.1.120")
//!     .with_measurement_class("SA")
//!     .with_channel(3);
//! let driver = KeysightN9917a::new(identity, Arc::new(MockScpiClient::new())).unwrap();
//!
//! let rbw = driver.parameter("spec_rbw").unwrap();
//! assert_eq!(rbw.command(), Some("SENS3:SA:BAND"));
//! ```

use crate::command;
use crate::config::FieldFoxConfig;
use crate::error::{DriverError, DriverResult};
use crate::format;
use crate::parameter::{Access, ParamValue, ParameterSpec, Source, Unit, ValueMap, ValueType};
use crate::registry::ParameterRegistry;
use crate::scpi::{MockScpiClient, ScpiClient, ScpiTransport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Identity
// =============================================================================

/// Operating mode of the analyzer served by one driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementClass {
    /// Cable and antenna tester
    #[serde(rename = "CAT")]
    Cat,
    /// Vector network analyzer
    #[serde(rename = "VNA")]
    Vna,
    /// Spectrum analyzer
    #[serde(rename = "SA")]
    Sa,
}

impl MeasurementClass {
    /// Every supported class.
    pub const ALL: [MeasurementClass; 3] =
        [MeasurementClass::Cat, MeasurementClass::Vna, MeasurementClass::Sa];

    /// Instrument spelling (`CAT`, `VNA`, `SA`).
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementClass::Cat => "CAT",
            MeasurementClass::Vna => "VNA",
            MeasurementClass::Sa => "SA",
        }
    }
}

impl FromStr for MeasurementClass {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| {
                DriverError::InvalidConfiguration(format!(
                    "Keysight N9917A does not support measurement class '{s}' (expected CAT, VNA or SA)"
                ))
            })
    }
}

impl fmt::Display for MeasurementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes fixed when a driver instance is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentIdentity {
    /// Instance name used in logs
    pub name: String,
    /// Hostname or IP address of the analyzer
    pub address: String,
    /// FieldFox channel this instance controls. Not range checked.
    pub channel: i64,
    /// Checked against CAT/VNA/SA during construction.
    pub measurement_class: String,
    /// Run `reset_to_defaults` before registering parameters.
    pub reset: bool,
}

impl InstrumentIdentity {
    /// Identity with the default class (`VNA`), channel 1 and no reset.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            channel: 1,
            measurement_class: MeasurementClass::Vna.as_str().to_string(),
            reset: false,
        }
    }

    /// Set the channel.
    pub fn with_channel(mut self, channel: i64) -> Self {
        self.channel = channel;
        self
    }

    /// Set the measurement class (checked when the driver is built).
    pub fn with_measurement_class(mut self, class: impl Into<String>) -> Self {
        self.measurement_class = class.into();
        self
    }

    /// Request the reset hook during construction.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

// =============================================================================
// Declaration tables
// =============================================================================

/// One row of a declaration table, before channel resolution.
#[derive(Debug, Clone, Copy)]
struct Decl {
    name: &'static str,
    template: &'static str,
    format: &'static str,
    value_type: ValueType,
    unit: Option<Unit>,
    access: Access,
    group: Option<&'static str>,
    value_map: &'static [(&'static str, &'static str)],
}

impl Decl {
    const fn new(
        name: &'static str,
        template: &'static str,
        format: &'static str,
        value_type: ValueType,
    ) -> Self {
        Self {
            name,
            template,
            format,
            value_type,
            unit: None,
            access: Access::GetSet,
            group: None,
            value_map: &[],
        }
    }

    const fn unit(self, unit: Unit) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    const fn get_only(self) -> Self {
        Self {
            access: Access::Get,
            ..self
        }
    }

    const fn group(self, group: &'static str) -> Self {
        Self {
            group: Some(group),
            ..self
        }
    }

    const fn map(self, value_map: &'static [(&'static str, &'static str)]) -> Self {
        Self { value_map, ..self }
    }

    fn resolve(&self, channel: i64) -> DriverResult<ParameterSpec> {
        let command = command::resolve(self.template, channel)?;
        let mut spec = ParameterSpec::scpi(self.name, command, self.format, self.value_type)?
            .with_access(self.access);
        if let Some(unit) = self.unit {
            spec = spec.with_unit(unit);
        }
        if let Some(group) = self.group {
            spec = spec.with_group(group);
        }
        if !self.value_map.is_empty() {
            spec = spec.with_value_map(ValueMap::new(self.value_map)?);
        }
        Ok(spec)
    }
}

use ValueType::{Bool, Float, Int, Str};

const CORE_PARAMETERS: &[Decl] = &[
    // Embedded whitespace matches the shipped command table.
    Decl::new("start_freq", "S    ENS{ch}:FREQ:STAR", "%d", Float).unit(Unit::Hz).group("sweep"),
    Decl::new("stop_freq", "SENS{ch}:FREQ:STOP", "%d", Float).unit(Unit::Hz).group("sweep"),
    Decl::new("start_pow", "SOUR{ch}:POW:STAR", "%d", Float).unit(Unit::Dbm).group("sweep"),
    Decl::new("stop_pow", "SOUR{ch}:POW:STOP", "%d", Float).unit(Unit::Dbm).group("sweep"),
    Decl::new("center_pow", "SOUR{ch}:POW:CENT", "%d", Float).unit(Unit::Dbm).group("sweep"),
    Decl::new("cw_freq", "SENS{ch}:FREQ:CW", "%d", Float).unit(Unit::Hz),
    Decl::new("center_freq", "SENS{ch}:FREQ:CENT", "%d", Float).unit(Unit::Hz).group("sweep"),
    Decl::new("span", "SENS{ch}:FREQ:SPAN", "%d", Float).unit(Unit::Hz).group("sweep"),
    Decl::new("if_bandwidth", "SENS{ch}:BAND", "%d", Float).unit(Unit::Hz).group("averaging"),
    Decl::new("power", "SOUR{ch}:POW", "%.2f", Float).unit(Unit::Dbm),
    Decl::new("power_on", "OUTP", "%i", Bool),
    Decl::new("points", "SENS{ch}:SWE:POIN", "%d", Int).group("sweep"),
    Decl::new("average_factor", "SENS{ch}:AVER:COUN", "%d", Int).group("averaging"),
    Decl::new("averaging_state", "SENS{ch}:AVER", "%i", Bool).group("averaging"),
    Decl::new("averaging_mode", "SENS{ch}:AVER:MODE", "%s", Str)
        .group("averaging")
        .map(&[("POIN", "point"), ("SWE", "sweep")]),
    // measurement selection
    Decl::new("meas_select", "CALC{ch}:PAR:SEL", "%s", Str),
    Decl::new("meas_select_trace", "CALC{ch}:PAR:MNUM", "%d", Int),
    Decl::new("meas_class_curr", "SENS{ch}:CLAS:NAME", "%s", Str).get_only(),
    // system
    Decl::new("error", "SYST:ERR", "%s", Str).get_only(),
    Decl::new("active_chan", "SYST:ACT:CHAN", "%s", Str).get_only(),
    Decl::new("active_measurement", "SYST:ACT:MEAS", "%s", Str).get_only(),
    Decl::new("sweep_time", "SENS{ch}:SWE:TIME", "%.8f", Float)
        .unit(Unit::Seconds)
        .get_only()
        .group("sweep"),
    Decl::new("segment_sweep_time", "SENS{ch}:SEGM:SWE:TIME", "%.8f", Float)
        .unit(Unit::Seconds)
        .get_only()
        .group("sweep"),
];

const SPECTRUM_ANALYZER_PARAMETERS: &[Decl] = &[
    Decl::new("spec_rbw_shape", "SENS{ch}:SA:BAND:SHAP", "%s", Str)
        .group("spec")
        .map(&[
            ("GAUS", "Gaussian"),
            ("FLAT", "flat top"),
            ("KAIS", "Kaiser"),
            ("BLAC", "Blackman"),
            ("NONE", "none"),
        ]),
    Decl::new("spec_detector_func", "SENS{ch}:SA:DET:FUNC", "%s", Str)
        .group("spec")
        .map(&[
            ("PEAK", "peak"),
            ("AVER", "average"),
            ("SAMP", "sample"),
            ("NORM", "normal"),
            ("PSAM", "peak sample"),
            ("PAV", "peak average"),
        ]),
    Decl::new("spec_vbw_aver_type", "SENS{ch}:SA:BAND:VID:AVER:TYPE", "%s", Str)
        .group("spec")
        .map(&[
            ("VOLT", "voltage"),
            ("POW", "power"),
            ("LOG", "log"),
            ("VMAX", "voltage max"),
            ("VMIN", "voltage min"),
        ]),
    Decl::new("spec_rbw", "SENS{ch}:SA:BAND", "%d", Float).unit(Unit::Hz).group("spec"),
    Decl::new("spec_vbw", "SENS{ch}:SA:BAND:VID", "%d", Float).unit(Unit::Hz).group("spec"),
];

/// Number of parameters registered for CAT and VNA instances.
pub const CORE_PARAMETER_COUNT: usize = 2 + CORE_PARAMETERS.len();

/// Number of additional parameters registered for SA instances.
pub const SPECTRUM_ANALYZER_PARAMETER_COUNT: usize = SPECTRUM_ANALYZER_PARAMETERS.len();

// =============================================================================
// KeysightN9917a
// =============================================================================

/// Driver for one channel / measurement class of a Keysight N9917A.
///
/// # Example
///
/// ```rust,ignore
/// let config = FieldFoxConfig::load_from("fieldfox.toml")?;
/// let driver = KeysightN9917a::connect(&config).await?;
///
/// driver.set("span", 10.0e6).await?;
/// driver.set("averaging_mode", "sweep").await?;
/// let points = driver.get("points").await?;
/// ```
pub struct KeysightN9917a {
    identity: InstrumentIdentity,
    measurement_class: MeasurementClass,
    registry: ParameterRegistry,
    transport: Arc<dyn ScpiTransport>,
}

impl KeysightN9917a {
    /// Build the driver and its parameter registry.
    ///
    /// Fails with `InvalidConfiguration` for an unsupported measurement class
    /// before anything is registered. No instrument I/O happens here.
    pub fn new(identity: InstrumentIdentity, transport: Arc<dyn ScpiTransport>) -> DriverResult<Self> {
        let measurement_class: MeasurementClass = identity.measurement_class.parse()?;

        let mut driver = Self {
            identity,
            measurement_class,
            registry: ParameterRegistry::new(),
            transport,
        };

        if driver.identity.reset {
            driver.reset_to_defaults();
        }

        driver.registry = Self::build_registry(driver.identity.channel, measurement_class)?;

        tracing::info!(
            instrument = %driver.identity.name,
            address = %driver.identity.address,
            channel = driver.identity.channel,
            class = %measurement_class,
            parameters = driver.registry.len(),
            "Keysight N9917A driver initialized"
        );

        Ok(driver)
    }

    /// Build the driver from configuration, connecting over TCP unless `mock` is set.
    ///
    /// The measurement class is checked before any connection attempt.
    pub async fn connect(config: &FieldFoxConfig) -> DriverResult<Self> {
        config.validate()?;
        config.measurement_class.parse::<MeasurementClass>()?;

        let transport: Arc<dyn ScpiTransport> = if config.mock {
            tracing::info!("Creating mock FieldFox transport");
            Arc::new(MockScpiClient::new())
        } else {
            tracing::info!("Connecting to FieldFox at {}:{}", config.address, config.port);
            Arc::new(
                ScpiClient::connect(&config.address, config.port)
                    .await?
                    .with_timeout(Duration::from_millis(config.timeout_ms)),
            )
        };

        Self::new(config.identity(), transport)
    }

    fn build_registry(channel: i64, class: MeasurementClass) -> DriverResult<ParameterRegistry> {
        let mut registry = ParameterRegistry::new();

        registry.register(ParameterSpec::fixed("chan", ParamValue::Int(channel)))?;
        registry.register(ParameterSpec::fixed(
            "meas_class",
            ParamValue::Str(class.as_str().to_string()),
        ))?;

        for decl in CORE_PARAMETERS {
            registry.register(decl.resolve(channel)?)?;
        }

        if class == MeasurementClass::Sa {
            for decl in SPECTRUM_ANALYZER_PARAMETERS {
                registry.register(decl.resolve(channel)?)?;
            }
        }

        Ok(registry)
    }

    /// Reset hook. No reset sequence is defined for this instrument yet, so
    /// this performs no instrument action and cannot fail.
    pub fn reset_to_defaults(&self) {
        tracing::debug!(
            instrument = %self.identity.name,
            "reset_to_defaults: no reset sequence defined, nothing sent"
        );
    }

    /// Identity the driver was built with.
    pub fn identity(&self) -> &InstrumentIdentity {
        &self.identity
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Channel substituted into every channel-scoped command.
    pub fn channel(&self) -> i64 {
        self.identity.channel
    }

    /// Validated measurement class.
    pub fn measurement_class(&self) -> MeasurementClass {
        self.measurement_class
    }

    /// Parameters registered on this instance.
    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    /// Look up one parameter by name.
    pub fn parameter(&self, name: &str) -> DriverResult<&ParameterSpec> {
        self.registry.get(name)
    }

    /// Read a parameter.
    ///
    /// Identity parameters answer without I/O. Instrument parameters send the
    /// query form of their command and parse the reply; mapped parameters
    /// return the label for the reply token.
    pub async fn get(&self, name: &str) -> DriverResult<ParamValue> {
        let spec = self.registry.get(name)?;
        let command = match spec.source() {
            Source::Fixed(value) => return Ok(value.clone()),
            Source::Command(command) => command,
        };

        let reply = self.transport.query(&command::query_of(command)).await?;
        let value = if spec.value_map().is_some() {
            let label = spec.decode_token(format::unquote(reply.trim()))?;
            ParamValue::Str(label.to_string())
        } else {
            format::parse_reply(name, spec.value_type(), &reply)?
        };

        tracing::debug!(parameter = name, %value, "get");
        Ok(value)
    }

    /// Write a parameter.
    pub async fn set(&self, name: &str, value: impl Into<ParamValue>) -> DriverResult<()> {
        let spec = self.registry.get(name)?;
        let command = match spec.source() {
            Source::Command(command) if spec.access().can_set() => command,
            _ => return Err(DriverError::ReadOnly(name.to_string())),
        };

        let argument = spec.encode_value(value.into())?;
        tracing::debug!(parameter = name, %argument, "set");
        self.transport
            .write(&format!("{} {}", command, argument))
            .await?;
        Ok(())
    }

    /// Instrument identification string (`*IDN?`).
    pub async fn identify(&self) -> DriverResult<String> {
        Ok(self.transport.query("*IDN?").await?)
    }
}

impl fmt::Debug for KeysightN9917a {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeysightN9917a")
            .field("identity", &self.identity)
            .field("measurement_class", &self.measurement_class)
            .field("parameters", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn driver(identity: InstrumentIdentity) -> DriverResult<KeysightN9917a> {
        KeysightN9917a::new(identity, Arc::new(MockScpiClient::new()))
    }

    #[test]
    fn measurement_class_parsing_is_exact() {
        assert_eq!("SA".parse::<MeasurementClass>().unwrap(), MeasurementClass::Sa);
        assert_eq!("CAT".parse::<MeasurementClass>().unwrap(), MeasurementClass::Cat);
        assert!("sa".parse::<MeasurementClass>().is_err());
        assert!("NA".parse::<MeasurementClass>().is_err());
        assert!("".parse::<MeasurementClass>().is_err());
    }

    #[test]
    fn every_declaration_resolves() {
        for decl in CORE_PARAMETERS.iter().chain(SPECTRUM_ANALYZER_PARAMETERS) {
            decl.resolve(1)
                .unwrap_or_else(|e| panic!("{} failed to resolve: {}", decl.name, e));
        }
    }

    #[test]
    fn declared_counts() {
        assert_eq!(CORE_PARAMETER_COUNT, 25);
        assert_eq!(SPECTRUM_ANALYZER_PARAMETER_COUNT, 5);
    }

    #[test]
    fn start_freq_keeps_declared_command_text() {
        let driver = driver(InstrumentIdentity::new("ff", "localhost")).unwrap();
        assert_eq!(
            driver.parameter("start_freq").unwrap().command(),
            Some("S    ENS1:FREQ:STAR")
        );
    }

    #[test]
    #[traced_test]
    fn reset_runs_when_requested() {
        driver(InstrumentIdentity::new("ff", "localhost").with_reset(true)).unwrap();
        assert!(logs_contain("reset_to_defaults"));
    }

    #[test]
    #[traced_test]
    fn reset_is_skipped_by_default() {
        driver(
            InstrumentIdentity::new("ff", "localhost")
                .with_channel(0)
                .with_measurement_class("VNA"),
        )
        .unwrap();
        assert!(!logs_contain("reset_to_defaults"));
    }

    #[test]
    #[traced_test]
    fn invalid_class_fails_before_reset() {
        let result = driver(
            InstrumentIdentity::new("ff", "localhost")
                .with_measurement_class("NA")
                .with_reset(true),
        );
        assert!(matches!(result, Err(DriverError::InvalidConfiguration(_))));
        assert!(!logs_contain("reset_to_defaults"));
    }

    #[test]
    fn reset_is_idempotent() {
        let driver = driver(InstrumentIdentity::new("ff", "localhost")).unwrap();
        driver.reset_to_defaults();
        driver.reset_to_defaults();
        assert_eq!(driver.registry().len(), CORE_PARAMETER_COUNT);
    }

    #[tokio::test]
    async fn connect_rejects_class_before_connecting() {
        // Nothing listens on this port; a connection attempt would fail differently.
        let config = FieldFoxConfig {
            address: "127.0.0.1".to_string(),
            port: 1,
            measurement_class: "XYZ".to_string(),
            ..Default::default()
        };
        let result = KeysightN9917a::connect(&config).await;
        assert!(matches!(result, Err(DriverError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn connect_in_mock_mode() {
        let config = FieldFoxConfig {
            mock: true,
            measurement_class: "SA".to_string(),
            channel: 2,
            ..Default::default()
        };
        let driver = KeysightN9917a::connect(&config).await.unwrap();
        assert_eq!(driver.measurement_class(), MeasurementClass::Sa);
        assert_eq!(driver.get("chan").await.unwrap(), ParamValue::Int(2));
        assert!(driver.identify().await.unwrap().contains("N9917A"));
    }
}
