use super::{BuiltinChannelType, ChannelTypeDefinition, RegistryError};
use crate::config::TransportConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Maps channel type names to their definitions.
///
/// Registration is expected at startup only. Reads take a shared lock and
/// clone the `Arc`, so lookups never hold the lock across an await.
#[derive(Debug, Default)]
pub struct ChannelTypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn ChannelTypeDefinition>>>,
}

impl ChannelTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in channel types.
    ///
    /// # Errors
    /// Returns `RegistryError` if a built-in definition cannot be built.
    pub fn with_builtins(config: &TransportConfig) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.register_builtins(config)?;
        Ok(registry)
    }

    /// # Errors
    /// `InvalidArgument` for an empty name, `AlreadyRegistered` for a duplicate.
    pub fn register(&self, definition: Arc<dyn ChannelTypeDefinition>) -> Result<(), RegistryError> {
        let name = definition.name().trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::InvalidArgument("channel type name must not be empty".into()));
        }

        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        tracing::debug!(channel_type = %name, "channel type registered");
        types.insert(name, definition);
        Ok(())
    }

    /// Registers every built-in type not already present. Safe to call more than once.
    ///
    /// Returns how many types were added.
    ///
    /// # Errors
    /// Returns `RegistryError` if a built-in definition cannot be built.
    pub fn register_builtins(&self, config: &TransportConfig) -> Result<usize, RegistryError> {
        let mut added = 0;
        for builtin in BuiltinChannelType::all() {
            if self.is_valid(builtin.as_str()) {
                continue;
            }
            match self.register(builtin.definition(config)?) {
                Ok(()) => added += 1,
                Err(RegistryError::AlreadyRegistered(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// # Errors
    /// Returns `RegistryError::NotFound` for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ChannelTypeDefinition>, RegistryError> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.types.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// Snapshot of all definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<Arc<dyn ChannelTypeDefinition>> {
        let mut defs: Vec<_> = self.types.read().unwrap_or_else(PoisonError::into_inner).values().cloned().collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_types::ConfigSchema;
    use crate::domain::ChannelConfig;
    use crate::transport::{ConfigError, Transport, TransportError};
    use std::time::Duration;

    #[derive(Debug)]
    struct Named(&'static str);

    impl ChannelTypeDefinition for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn display_name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            ""
        }
        fn validate_config(&self, _config: &ChannelConfig) -> Result<(), ConfigError> {
            Ok(())
        }
        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::default()
        }
        fn create_transport(&self, _timeout: Duration) -> Result<Box<dyn Transport>, TransportError> {
            Err(TransportError::permanent("unsupported", "test definition"))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ChannelTypeRegistry::new();
        registry.register(Arc::new(Named("pager"))).unwrap();

        assert!(registry.is_valid("pager"));
        assert_eq!(registry.get("pager").unwrap().name(), "pager");
        assert_eq!(registry.get("fax").unwrap_err(), RegistryError::NotFound("fax".into()));
    }

    #[test]
    fn test_register_rejects_duplicates_and_empty_names() {
        let registry = ChannelTypeRegistry::new();
        registry.register(Arc::new(Named("pager"))).unwrap();

        assert_eq!(
            registry.register(Arc::new(Named("pager"))).unwrap_err(),
            RegistryError::AlreadyRegistered("pager".into())
        );
        assert!(matches!(registry.register(Arc::new(Named(" "))), Err(RegistryError::InvalidArgument(_))));
    }

    #[test]
    fn test_register_builtins_is_idempotent() {
        let registry = ChannelTypeRegistry::new();
        let config = TransportConfig::default();

        assert_eq!(registry.register_builtins(&config).unwrap(), 3);
        assert_eq!(registry.register_builtins(&config).unwrap(), 0);
        assert_eq!(registry.list_names(), vec!["email", "slack", "sms"]);
    }

    #[test]
    fn test_builtins_do_not_replace_substitutes() {
        let registry = ChannelTypeRegistry::new();
        registry.register(Arc::new(Named("email"))).unwrap();

        assert_eq!(registry.register_builtins(&TransportConfig::default()).unwrap(), 2);
        assert_eq!(registry.get("email").unwrap().display_name(), "email");
    }

    #[test]
    fn test_definitions_sorted_by_name() {
        let registry = ChannelTypeRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(Named(name))).unwrap();
        }
        let names: Vec<String> = registry.definitions().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
