//! Feature handler registry
//!
//! Built once at startup, then shared read-only behind an `Arc`.

use crate::domain::ports::FeatureHandlerRef;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Maps feature names to their handlers
#[derive(Default, Clone)]
pub struct FeatureRegistry {
    handlers: BTreeMap<String, FeatureHandlerRef>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: FeatureHandlerRef,
    ) -> Option<FeatureHandlerRef> {
        let name = name.into();
        debug!(feature = %name, "registering feature handler");
        self.handlers.insert(name, handler)
    }

    /// Builder form of [`FeatureRegistry::register`]
    pub fn with_handler(mut self, name: impl Into<String>, handler: FeatureHandlerRef) -> Self {
        self.register(name, handler);
        self
    }

    pub fn handler(&self, name: &str) -> Result<FeatureHandlerRef> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownFeature {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.names())
            .finish()
    }
}
