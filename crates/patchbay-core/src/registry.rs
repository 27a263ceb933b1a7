//! Type tag to manager factory registry.
//!
//! Backends register their factories explicitly at startup; the daemon owns the
//! single registry and hands it to everything that builds graphs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::device::AudioBackend;
use crate::error::{Error, Result};
use crate::manager::{NodeManager, NodeManagerFactory};
use crate::pipeline::{Node, NodeRole};
use crate::schema::NodeSchema;

/// Authoritative map from node type tag to factory.
#[derive(Default, Clone)]
pub struct ManagerRegistry {
    factories: HashMap<String, Arc<dyn NodeManagerFactory>>,
}

impl ManagerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a type tag.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateNodeType`] if the tag is taken.
    pub fn register(&mut self, type_tag: &str, factory: Arc<dyn NodeManagerFactory>) -> Result<()> {
        if self.factories.contains_key(type_tag) {
            return Err(Error::DuplicateNodeType(type_tag.to_string()));
        }
        debug!(type_tag, "Registered node type");
        self.factories.insert(type_tag.to_string(), factory);
        Ok(())
    }

    /// Look up the factory for a tag.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNodeType`] if nothing is registered for it.
    pub fn resolve(&self, type_tag: &str) -> Result<&Arc<dyn NodeManagerFactory>> {
        self.factories.get(type_tag).ok_or_else(|| Error::UnknownNodeType(type_tag.to_string()))
    }

    /// Build the manager for a stored node.
    ///
    /// # Errors
    /// Returns an error if the tag is unknown or the factory rejects the node.
    pub fn manager_for(&self, node: &Node) -> Result<(NodeRole, Box<dyn NodeManager>)> {
        let factory = self.resolve(&node.type_tag)?;
        Ok((factory.role(), factory.create(node)?))
    }

    /// Schemas of every registered type, ordered by tag.
    #[must_use]
    pub fn schemas(&self) -> Vec<NodeSchema> {
        let mut schemas: Vec<_> = self.factories.values().map(|f| f.schema()).collect();
        schemas.sort_by(|a, b| a.type_tag.cmp(&b.type_tag));
        schemas
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// A backend: device discovery plus a family of node types.
pub trait BackendPlugin {
    /// Plugin name, used in logs.
    fn name(&self) -> &str;

    /// Device enumeration, if the backend has devices.
    fn backend(&self) -> Option<Arc<dyn AudioBackend>>;

    /// Add this plugin's node types to the registry.
    ///
    /// # Errors
    /// Returns an error if one of its tags is already registered.
    fn register(&self, registry: &mut ManagerRegistry) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeIndex;
    use crate::manager::ApplyContext;
    use crate::pipeline_graph::PipelineGraph;
    use crate::slot::SlotSchematic;
    use assert_matches::assert_matches;

    struct Noop;

    impl NodeManager for Noop {
        fn slot_schematics(&self) -> Vec<SlotSchematic> {
            Vec::new()
        }

        fn apply(&self, _: NodeIndex, _: &PipelineGraph, _: ApplyContext<'_>) -> Result<()> {
            Ok(())
        }

        fn unapply(&self, _: NodeIndex, _: &PipelineGraph, _: ApplyContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct NoopFactory(&'static str);

    impl NodeManagerFactory for NoopFactory {
        fn role(&self) -> NodeRole {
            NodeRole::Processing
        }

        fn schema(&self) -> NodeSchema {
            NodeSchema { type_tag: self.0.into(), label: self.0.into(), role: self.role(), fields: vec![] }
        }

        fn create(&self, _node: &Node) -> Result<Box<dyn NodeManager>> {
            Ok(Box::new(Noop))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ManagerRegistry::new();
        registry.register("test.noop", Arc::new(NoopFactory("test.noop"))).unwrap();

        assert!(registry.resolve("test.noop").is_ok());
        assert_matches!(registry.resolve("test.other"), Err(Error::UnknownNodeType(tag)) if tag == "test.other");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ManagerRegistry::new();
        registry.register("test.noop", Arc::new(NoopFactory("test.noop"))).unwrap();
        let err = registry.register("test.noop", Arc::new(NoopFactory("test.noop"))).unwrap_err();
        assert_matches!(err, Error::DuplicateNodeType(_));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_schemas_sorted_by_tag() {
        let mut registry = ManagerRegistry::new();
        registry.register("b.pipe", Arc::new(NoopFactory("b.pipe"))).unwrap();
        registry.register("a.device", Arc::new(NoopFactory("a.device"))).unwrap();

        let tags: Vec<_> = registry.schemas().into_iter().map(|s| s.type_tag).collect();
        assert_eq!(tags, vec!["a.device", "b.pipe"]);
    }
}
