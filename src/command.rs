//! SCPI command templates.
//!
//! Channel-scoped FieldFox commands are declared as templates carrying a
//! `{ch}` placeholder, e.g. `SENS{ch}:FREQ:STAR`. Templates for instrument-wide
//! commands (`OUTP`, `SYST:ERR`) carry none and resolve to themselves.

use crate::error::{DriverError, DriverResult};

/// Placeholder substituted with the instance channel number.
pub const CHANNEL_PLACEHOLDER: &str = "{ch}";

/// Resolve a command template against a channel number.
///
/// A template may contain the placeholder at most once. The returned command
/// never contains a placeholder.
pub fn resolve(template: &str, channel: i64) -> DriverResult<String> {
    match template.matches(CHANNEL_PLACEHOLDER).count() {
        0 => {
            if template.contains('{') || template.contains('}') {
                return Err(DriverError::InvalidConfiguration(format!(
                    "command template '{template}' has an unknown placeholder"
                )));
            }
            Ok(template.to_string())
        }
        1 => {
            let resolved = template.replacen(CHANNEL_PLACEHOLDER, &channel.to_string(), 1);
            if resolved.contains('{') || resolved.contains('}') {
                return Err(DriverError::InvalidConfiguration(format!(
                    "command template '{template}' has an unknown placeholder"
                )));
            }
            Ok(resolved)
        }
        n => Err(DriverError::InvalidConfiguration(format!(
            "command template '{template}' has {n} channel placeholders, expected at most one"
        ))),
    }
}

/// Query form of a resolved command (`SENS1:FREQ:STAR` -> `SENS1:FREQ:STAR?`).
pub fn query_of(command: &str) -> String {
    format!("{command}?")
}
