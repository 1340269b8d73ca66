//! Parameter registry owned by a driver instance.
//!
//! The registry is filled once while the driver is constructed and is never
//! modified afterwards: registration is crate-private and the driver only
//! hands out shared references. Iteration follows registration order.

use crate::error::{DriverError, DriverResult};
use crate::parameter::ParameterSpec;
use std::collections::HashMap;

/// Name-indexed parameter table.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    specs: Vec<ParameterSpec>,
    index: HashMap<String, usize>,
}

impl ParameterRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Names must be unique.
    pub(crate) fn register(&mut self, spec: ParameterSpec) -> DriverResult<()> {
        if self.index.contains_key(spec.name()) {
            return Err(DriverError::InvalidConfiguration(format!(
                "parameter '{}' registered twice",
                spec.name()
            )));
        }
        tracing::trace!(parameter = spec.name(), command = ?spec.command(), "registered parameter");
        self.index.insert(spec.name().to_string(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Look up a parameter, failing with `NoSuchParameter` when absent.
    pub fn get(&self, name: &str) -> DriverResult<&ParameterSpec> {
        self.index
            .get(name)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| DriverError::NoSuchParameter(name.to_string()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name())
    }

    /// Specs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.iter()
    }

    /// Parameters carrying the given group tag.
    pub fn group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ParameterSpec> + 'a {
        self.specs.iter().filter(move |s| s.group() == Some(group))
    }
}

impl<'a> IntoIterator for &'a ParameterRegistry {
    type Item = &'a ParameterSpec;
    type IntoIter = std::slice::Iter<'a, ParameterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{ParamValue, ValueType};

    fn spec(name: &str, group: Option<&str>) -> ParameterSpec {
        let spec = ParameterSpec::scpi(name, "SENS1:BAND", "%d", ValueType::Float).unwrap();
        match group {
            Some(g) => spec.with_group(g),
            None => spec,
        }
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = ParameterRegistry::new();
        registry.register(spec("b", None)).unwrap();
        registry.register(spec("a", None)).unwrap();
        registry
            .register(ParameterSpec::fixed("c", ParamValue::Int(1)))
            .unwrap();

        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = ParameterRegistry::new();
        registry.register(spec("span", None)).unwrap();
        let err = registry.register(spec("span", None)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidConfiguration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_names_are_errors() {
        let registry = ParameterRegistry::new();
        assert!(registry.is_empty());
        match registry.get("spec_rbw") {
            Err(DriverError::NoSuchParameter(name)) => assert_eq!(name, "spec_rbw"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn filters_by_group() {
        let mut registry = ParameterRegistry::new();
        registry.register(spec("span", Some("sweep"))).unwrap();
        registry.register(spec("if_bandwidth", Some("averaging"))).unwrap();
        registry.register(spec("points", Some("sweep"))).unwrap();

        let sweep: Vec<_> = registry.group("sweep").map(|s| s.name()).collect();
        assert_eq!(sweep, vec!["span", "points"]);
    }
}
