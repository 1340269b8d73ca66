//! # FieldFox Driver Library
//!
//! Driver for the Keysight N9917A FieldFox handheld network/spectrum analyzer.
//! The instrument's SCPI command set is exposed as named, typed parameters
//! that can be listed, read and written by name.
//!
//! ## Crate Structure
//!
//! - **`driver`**: `KeysightN9917a`, the declaration tables of supported
//!   settings, and the measurement-class gating of spectrum analyzer settings.
//! - **`parameter`**: `ParameterSpec` and its metadata types (value type,
//!   access, unit, token/label maps).
//! - **`registry`**: `ParameterRegistry`, the per-instance name table.
//! - **`command`**: channel placeholder resolution for command templates.
//! - **`format`**: printf-style write formatting and reply parsing.
//! - **`scpi`**: the `ScpiTransport` trait with TCP and in-memory implementations.
//! - **`config`**: Figment-based configuration (TOML file + `FIELDFOX_*` env).
//! - **`logging`**: `tracing-subscriber` initialisation for binaries.
//! - **`error`**: `DriverError` for the whole crate.
//!
//! ## Example
//!
//! ```rust
//! use fieldfox::{InstrumentIdentity, KeysightN9917a, MockScpiClient};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let identity = InstrumentIdentity::new("fieldfox", "192.168.1.120");
//! let driver = KeysightN9917a::new(identity, Arc::new(MockScpiClient::new())).unwrap();
//!
//! driver.set("averaging_mode", "sweep").await.unwrap();
//! assert_eq!(driver.get("averaging_mode").await.unwrap().as_str(), Some("sweep"));
//! # })
//! ```

pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod logging;
pub mod parameter;
pub mod registry;
pub mod scpi;

pub use config::FieldFoxConfig;
pub use driver::{InstrumentIdentity, KeysightN9917a, MeasurementClass};
pub use error::{DriverError, DriverResult};
pub use parameter::{Access, ParamValue, ParameterSpec, Unit, ValueMap, ValueType};
pub use registry::ParameterRegistry;
pub use scpi::{MockScpiClient, ScpiClient, ScpiTransport};
