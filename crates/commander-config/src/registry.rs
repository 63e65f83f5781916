//! The configured extension registry.
//!
//! Keeps the configured entries in file order and derives the enabled and
//! disabled partitions from their `disabled` flags. Every flag change goes
//! through [`ExtensionRegistry::enable`] or [`ExtensionRegistry::disable`],
//! which rebuild both partitions before returning.

use crate::error::ExtensionConfigError;
use crate::extension::ConfiguredExtension;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

/// Registry of configured extensions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    entries: Vec<ConfiguredExtension>,
    index: HashMap<String, usize>,
    enabled: Vec<usize>,
    disabled: Vec<usize>,
}

impl ExtensionRegistry {
    /// Builds a registry from configuration entries, rejecting duplicate names.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ConfiguredExtension>,
    ) -> Result<Self, ExtensionConfigError> {
        let mut registry = Self::default();
        for entry in entries {
            if registry.index.contains_key(&entry.name) {
                return Err(ExtensionConfigError::Duplicate(entry.name));
            }
            registry
                .index
                .insert(entry.name.clone(), registry.entries.len());
            registry.entries.push(entry);
        }
        registry.rebuild_partitions();

        if registry.entries.is_empty() {
            info!("No extensions configured");
        } else {
            info!(
                total = registry.entries.len(),
                enabled = registry.enabled.len(),
                disabled = registry.disabled.len(),
                "Processed extension configuration"
            );
        }
        Ok(registry)
    }

    /// Number of configured extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no extensions are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in configuration order.
    pub fn entries(&self) -> impl Iterator<Item = &ConfiguredExtension> {
        self.entries.iter()
    }

    /// Names of all entries in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|ext| ext.name.as_str())
    }

    /// Enabled entries in configuration order.
    pub fn enabled(&self) -> impl Iterator<Item = &ConfiguredExtension> {
        self.enabled.iter().map(|&i| &self.entries[i])
    }

    /// Disabled entries in configuration order.
    pub fn disabled(&self) -> impl Iterator<Item = &ConfiguredExtension> {
        self.disabled.iter().map(|&i| &self.entries[i])
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Result<&ConfiguredExtension, ExtensionConfigError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ExtensionConfigError::NotConfigured(name.to_string()))
    }

    /// Options document of the named entry, if it carries one.
    pub fn get_options(&self, name: &str) -> Result<Option<&Value>, ExtensionConfigError> {
        Ok(self.get(name)?.options.as_ref())
    }

    /// Marks an entry as enabled. Returns whether anything changed.
    pub fn enable(&mut self, name: &str) -> Result<bool, ExtensionConfigError> {
        self.set_disabled(name, false)
    }

    /// Marks an entry as disabled. Returns whether anything changed.
    pub fn disable(&mut self, name: &str) -> Result<bool, ExtensionConfigError> {
        self.set_disabled(name, true)
    }

    /// Like [`disable`](Self::disable), but refuses required entries.
    pub fn disable_optional(&mut self, name: &str) -> Result<bool, ExtensionConfigError> {
        if self.get(name)?.required {
            return Err(ExtensionConfigError::IsRequired(name.to_string()));
        }
        self.disable(name)
    }

    fn set_disabled(&mut self, name: &str, disabled: bool) -> Result<bool, ExtensionConfigError> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| ExtensionConfigError::NotConfigured(name.to_string()))?;

        if self.entries[i].disabled == disabled {
            return Ok(false);
        }

        self.entries[i].disabled = disabled;
        self.rebuild_partitions();
        debug!(extension = name, disabled, "Extension state changed");
        Ok(true)
    }

    fn rebuild_partitions(&mut self) {
        let (disabled, enabled): (Vec<usize>, Vec<usize>) =
            (0..self.entries.len()).partition(|&i| self.entries[i].disabled);
        self.enabled = enabled;
        self.disabled = disabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::from_entries([
            ConfiguredExtension::new("a").disabled(true),
            ConfiguredExtension::new("b"),
        ])
        .unwrap()
    }

    fn names<'a>(it: impl Iterator<Item = &'a ConfiguredExtension>) -> Vec<&'a str> {
        it.map(|ext| ext.name.as_str()).collect()
    }

    fn assert_partitioned(registry: &ExtensionRegistry) {
        let enabled = names(registry.enabled());
        let disabled = names(registry.disabled());
        for ext in registry.entries() {
            let in_enabled = enabled.contains(&ext.name.as_str());
            let in_disabled = disabled.contains(&ext.name.as_str());
            assert!(in_enabled ^ in_disabled, "{} must be in exactly one list", ext.name);
            assert_eq!(in_disabled, ext.disabled);
        }
        assert_eq!(enabled.len() + disabled.len(), registry.len());
    }

    #[test]
    fn test_initial_partitions() {
        let registry = registry();
        assert_eq!(names(registry.enabled()), vec!["b"]);
        assert_eq!(names(registry.disabled()), vec!["a"]);
    }

    #[test]
    fn test_enable_moves_entry() {
        let mut registry = registry();
        assert!(registry.enable("a").unwrap());
        assert_eq!(names(registry.enabled()), vec!["a", "b"]);
        assert!(registry.disabled().next().is_none());
    }

    #[test]
    fn test_enable_is_noop_when_already_enabled() {
        let mut registry = registry();
        assert!(!registry.enable("b").unwrap());
        assert_partitioned(&registry);
    }

    #[test]
    fn test_unknown_extension() {
        let mut registry = registry();
        assert_eq!(
            registry.disable("nope"),
            Err(ExtensionConfigError::NotConfigured("nope".to_string()))
        );
        assert!(registry.get_options("nope").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ExtensionRegistry::from_entries([
            ConfiguredExtension::new("a"),
            ConfiguredExtension::new("a").disabled(true),
        ]);
        assert_eq!(
            result.unwrap_err(),
            ExtensionConfigError::Duplicate("a".to_string())
        );
    }

    #[test]
    fn test_disable_optional_refuses_required() {
        let mut registry =
            ExtensionRegistry::from_entries([ConfiguredExtension::new("core").required(true)])
                .unwrap();
        assert_eq!(
            registry.disable_optional("core"),
            Err(ExtensionConfigError::IsRequired("core".to_string()))
        );
        assert!(registry.get("core").unwrap().is_enabled());
    }

    #[test]
    fn test_get_options() {
        let registry = ExtensionRegistry::from_entries([
            ConfiguredExtension::new("with").with_options(serde_json::json!({ "x": 1 })),
            ConfiguredExtension::new("without"),
        ])
        .unwrap();
        assert_eq!(registry.get_options("with").unwrap().unwrap()["x"], 1);
        assert!(registry.get_options("without").unwrap().is_none());
    }

    proptest! {
        #[test]
        fn test_partition_invariant_holds(ops in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..32)) {
            let mut registry = registry();
            for (enable, pick_a) in ops {
                let name = if pick_a { "a" } else { "b" };
                if enable {
                    registry.enable(name).unwrap();
                } else {
                    registry.disable(name).unwrap();
                }
                assert_partitioned(&registry);
            }
        }
    }
}
