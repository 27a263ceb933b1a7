//! Node manager contract.
//!
//! Every node type tag resolves to a [`NodeManagerFactory`], which builds a
//! [`NodeManager`] bound to one stored node. Managers compute the node's slots,
//! validate its configuration and realize or tear down its part of the live
//! audio route.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::graph::NodeIndex;
use crate::pipeline::{Node, NodeId, NodeRole};
use crate::pipeline_graph::PipelineGraph;
use crate::schema::NodeSchema;
use crate::slot::SlotSchematic;
use crate::validation::NodeValidation;

/// A concrete device bound to a slot at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Backend that owns the device
    pub backend: String,
    /// Backend-specific device name
    pub name: String,
}

/// Runtime resource exposed through a slot to adjacent nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotData {
    Device(DeviceHandle),
}

impl SlotData {
    /// The device handle, if this slot is bound to a device.
    #[must_use]
    pub fn as_device(&self) -> Option<&DeviceHandle> {
        match self {
            Self::Device(handle) => Some(handle),
        }
    }
}

/// Per-node runtime state that survives between apply and unapply.
///
/// Managers record what they created here (for example a backend module index)
/// so that unapply knows what to release.
pub trait NodeStateStore {
    /// Load the state recorded for a node.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn load(&self, node: NodeId) -> Result<Option<Value>>;

    /// Record state for a node, replacing anything stored before.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn save(&self, node: NodeId, state: &Value) -> Result<()>;

    /// Forget the state of a node. Clearing absent state is not an error.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn clear(&self, node: NodeId) -> Result<()>;
}

/// Collaborators handed to a manager while applying or unapplying.
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    pub state: &'a dyn NodeStateStore,
}

impl<'a> ApplyContext<'a> {
    #[must_use]
    pub fn new(state: &'a dyn NodeStateStore) -> Self {
        Self { state }
    }
}

/// Behavior bound to one node.
pub trait NodeManager: Send + Sync {
    /// Slots of the node, computed from its configuration.
    ///
    /// Must be idempotent: the same configuration always yields the same
    /// names, kinds and directions.
    fn slot_schematics(&self) -> Vec<SlotSchematic>;

    /// Check the node's configuration in the context of its graph.
    ///
    /// `None` means the node is valid.
    fn validate(&self, _at: NodeIndex, _graph: &PipelineGraph) -> Option<NodeValidation> {
        None
    }

    /// Realize this node's part of the live route.
    ///
    /// # Errors
    /// Returns an error if the backend refuses the change.
    fn apply(&self, at: NodeIndex, graph: &PipelineGraph, ctx: ApplyContext<'_>) -> Result<()>;

    /// Reverse [`NodeManager::apply`].
    ///
    /// Must succeed when nothing was applied and when called repeatedly.
    ///
    /// # Errors
    /// Returns an error if the backend refuses the change.
    fn unapply(&self, at: NodeIndex, graph: &PipelineGraph, ctx: ApplyContext<'_>) -> Result<()>;

    /// Runtime resource bound to one of this node's slots.
    fn slot_data(&self, _slot_name: &str) -> Option<SlotData> {
        None
    }

    /// Catalog device the node's configuration refers to. The store keeps
    /// such a device from being removed while the node exists.
    fn bound_device(&self) -> Option<DeviceHandle> {
        None
    }
}

/// Builds managers for one node type tag.
pub trait NodeManagerFactory: Send + Sync {
    /// Ordering bucket of nodes of this type.
    fn role(&self) -> NodeRole;

    /// Editable fields of nodes of this type.
    fn schema(&self) -> NodeSchema;

    /// Build a manager bound to `node`.
    ///
    /// # Errors
    /// Returns an error if the node's configuration cannot be interpreted.
    fn create(&self, node: &Node) -> Result<Box<dyn NodeManager>>;
}

impl std::fmt::Debug for dyn NodeManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeManagerFactory").field("role", &self.role()).finish_non_exhaustive()
    }
}
