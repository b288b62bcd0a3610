//! Entity registry: path segment -> bound entity context.
//!
//! Built once at application startup and read-only afterwards; handlers
//! resolve the entity from the request path on every call.

use crate::config::{self, EntityConfig};
use crate::error::ConfigError;
use crate::hooks::{Hooks, IdentityHooks};
use std::collections::HashMap;
use std::sync::Arc;

/// One bound entity: its validated config plus its hooks.
pub struct EntityContext {
    pub config: EntityConfig,
    pub hooks: Arc<dyn Hooks>,
}

#[derive(Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Arc<EntityContext>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an entity under a path segment. Config validation is fatal here
    /// so misconfiguration never surfaces per-request.
    pub fn bind(
        &mut self,
        path: &str,
        config: EntityConfig,
        hooks: Arc<dyn Hooks>,
    ) -> Result<(), ConfigError> {
        config::validate(&config)?;
        if self.entities.contains_key(path) {
            return Err(ConfigError::DuplicateEntity(path.to_string()));
        }
        self.entities
            .insert(path.to_string(), Arc::new(EntityContext { config, hooks }));
        Ok(())
    }

    /// Bind with identity hooks.
    pub fn bind_default(&mut self, path: &str, config: EntityConfig) -> Result<(), ConfigError> {
        self.bind(path, config, Arc::new(IdentityHooks))
    }

    pub fn get(&self, path: &str) -> Option<&Arc<EntityContext>> {
        self.entities.get(path)
    }
}
