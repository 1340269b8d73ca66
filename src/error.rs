//! Error types for the FieldFox driver.
//!
//! This module defines `DriverError`, the single error type returned by the
//! library. Using the `thiserror` crate, it separates the failures that are
//! decided by the driver itself (bad configuration, unknown parameters, access
//! violations, value mapping) from failures that come from the SCPI transport.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidConfiguration`**: Raised synchronously while building a driver,
//!   before any parameter is registered and before the transport is touched.
//!   Unsupported measurement classes, malformed command templates and format
//!   strings, and duplicate parameter names all end up here.
//! - **`NoSuchParameter`**: The name is not in this instance's registry. SA-only
//!   parameters on a CAT/VNA instance fail this way.
//! - **`ReadOnly`**: A write to a parameter declared read-only.
//! - **`NoMapping`**: A value-mapped parameter saw a token or label outside its map.
//! - **`TypeMismatch`** / **`Parse`**: Value conversion failures on set and get.
//! - **`Transport`**: Anything the SCPI transport reports. Never retried here.
//! - **`Config`**: Wraps errors from `figment` while loading configuration.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Every failure the driver reports.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Bad construction input or declaration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Name not registered on this instance.
    #[error("No such parameter: '{0}'")]
    NoSuchParameter(String),

    /// Write to a read-only parameter.
    #[error("Parameter '{0}' is read-only")]
    ReadOnly(String),

    /// Token or label outside a parameter's value map.
    #[error("Parameter '{parameter}' has no mapping for '{token}'")]
    NoMapping {
        /// Parameter name
        parameter: String,
        /// Offending token or label
        token: String,
    },

    /// Value cannot be represented as the parameter's type.
    #[error("Parameter '{parameter}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name
        parameter: String,
        /// Declared type name
        expected: &'static str,
        /// Debug form of the rejected value
        found: String,
    },

    /// Instrument reply not parseable as the declared type.
    #[error("Failed to parse reply '{reply}' for parameter '{parameter}'")]
    Parse {
        /// Parameter name
        parameter: String,
        /// Trimmed reply text
        reply: String,
    },

    /// SCPI link failure.
    #[error("SCPI transport error: {0:#}")]
    Transport(#[from] anyhow::Error),

    /// Configuration loading failure.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for DriverError {
    fn from(err: figment::Error) -> Self {
        DriverError::Config(Box::new(err))
    }
}

impl DriverError {
    /// Whether the condition is decided by this driver rather than the instrument link.
    ///
    /// Transport failures may go away on their own; everything else will fail
    /// the same way again until the caller changes its input.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, DriverError::Transport(_))
    }
}
