//! Pipeline validation.
//!
//! Validation never fails: every problem is reported as data in a
//! [`ValidationResult`]. Three layers are checked:
//!
//! - node: each node's manager inspects its own configuration
//! - graph: exactly one root and no cycles
//! - edge: slot kinds on both ends must be compatible
//!
//! Edge checks match the edge's stored slots by name against the slots the
//! managers compute right now, so stale slot rows cannot hide a problem.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::{EdgeId, NodeId};
use crate::pipeline_graph::PipelineGraph;
use crate::slot::{SlotKind, SlotSchematic};

pub const MSG_ONE_ROOT: &str = "Pipeline must have exactly one root node";
pub const MSG_ORPHANED: &str = "This node is orphaned";
pub const MSG_CYCLE: &str = "Pipeline contains a cycle";
pub const MSG_OUTPUT_AS_SOURCE: &str = "An output device cannot be a data source";
pub const MSG_INPUT_AS_SINK: &str = "An input device cannot be a data sink";
pub const MSG_INPUT_NEEDS_CONSUMER: &str = "An input device must feed an audio consumer";
pub const MSG_PRODUCER_NEEDS_OUTPUT: &str = "A producer must feed an output device";

/// Problems found on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValidation {
    pub node_id: NodeId,
    /// Errors about the node as a whole
    pub errors: Vec<String>,
    /// Field name to message
    pub fields: BTreeMap<String, String>,
    /// Slot name to message
    pub slots: BTreeMap<String, String>,
}

impl NodeValidation {
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self { node_id, errors: Vec::new(), fields: BTreeMap::new(), slots: BTreeMap::new() }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn slot_error(&mut self, slot: impl Into<String>, message: impl Into<String>) {
        self.slots.insert(slot.into(), message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.fields.is_empty() && self.slots.is_empty()
    }

    /// Flatten into one line per problem.
    fn messages(&self) -> impl Iterator<Item = String> + '_ {
        let id = self.node_id;
        self.errors
            .iter()
            .map(move |m| format!("Node {id}: {m}"))
            .chain(self.fields.iter().map(move |(f, m)| format!("Node {id}, field '{f}': {m}")))
            .chain(self.slots.iter().map(move |(s, m)| format!("Node {id}, slot '{s}': {m}")))
    }
}

/// Problems found on one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeValidation {
    pub edge_id: EdgeId,
    pub errors: Vec<String>,
}

/// Everything wrong with a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub nodes: Vec<NodeValidation>,
    pub edges: Vec<EdgeValidation>,
    pub graph_errors: Vec<String>,
}

impl ValidationResult {
    /// Whether no problem was found.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.graph_errors.is_empty()
            && self.edges.iter().all(|e| e.errors.is_empty())
            && self.nodes.iter().all(NodeValidation::is_empty)
    }

    /// Per-node and per-edge problems as flat messages.
    #[must_use]
    pub fn node_messages(&self) -> Vec<String> {
        self.nodes
            .iter()
            .flat_map(NodeValidation::messages)
            .chain(self.edges.iter().flat_map(|e| {
                e.errors.iter().map(move |m| format!("Edge {}: {m}", e.edge_id))
            }))
            .collect()
    }

    fn node_entry(&mut self, node_id: NodeId) -> &mut NodeValidation {
        if let Some(pos) = self.nodes.iter().position(|n| n.node_id == node_id) {
            &mut self.nodes[pos]
        } else {
            self.nodes.push(NodeValidation::new(node_id));
            let last = self.nodes.len() - 1;
            &mut self.nodes[last]
        }
    }
}

/// Run every check.
#[must_use]
pub fn validate(graph: &PipelineGraph) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (index, data) in graph.nodes() {
        if let Some(mut validation) = data.manager.validate(index, graph) {
            if !validation.is_empty() {
                validation.node_id = data.node.id;
                result.nodes.push(validation);
            }
        }
    }

    check_structure(graph, &mut result);
    check_edges(graph, &mut result);
    result
}

/// Run only the root and cycle checks.
///
/// Used before tearing a pipeline down, where a node whose configuration no
/// longer validates must not block its own removal.
#[must_use]
pub fn validate_structure(graph: &PipelineGraph) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_structure(graph, &mut result);
    result
}

fn check_structure(graph: &PipelineGraph, result: &mut ValidationResult) {
    if graph.is_empty() {
        return;
    }

    let roots = graph.roots();
    if roots.len() != 1 {
        result.graph_errors.push(MSG_ONE_ROOT.to_string());
    }
    if roots.len() > 1 {
        for root in roots {
            let message = if graph.is_isolated(root) { MSG_ORPHANED } else { MSG_ONE_ROOT };
            result.node_entry(graph.node(root).node.id).error(message);
        }
    }

    if graph.has_cycle() {
        result.graph_errors.push(MSG_CYCLE.to_string());
    }
}

fn check_edges(graph: &PipelineGraph, result: &mut ValidationResult) {
    let schematics: Vec<Vec<SlotSchematic>> =
        graph.nodes().map(|(_, data)| data.manager.slot_schematics()).collect();
    let find = |index: crate::graph::NodeIndex, name: &str| {
        schematics[index.index()].iter().find(|s| s.name == name).map(|s| s.kind)
    };

    for (_, edge) in graph.edges() {
        let mut errors: Vec<String> = Vec::new();
        let source = find(edge.from, &edge.data.from.name);
        let target = find(edge.to, &edge.data.to.name);

        match (source, target) {
            (Some(source), Some(target)) => errors.extend(kind_errors(source, target).into_iter().map(String::from)),
            (source, target) => {
                if source.is_none() {
                    errors.push(format!("Slot '{}' no longer exists", edge.data.from.name));
                }
                if target.is_none() {
                    errors.push(format!("Slot '{}' no longer exists", edge.data.to.name));
                }
            }
        }

        if !errors.is_empty() {
            result.edges.push(EdgeValidation { edge_id: edge.data.edge_id, errors });
        }
    }
}

/// Slot compatibility matrix for an edge from `source` to `target`.
#[must_use]
pub fn kind_errors(source: SlotKind, target: SlotKind) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if source == SlotKind::DeviceAudioOutput {
        errors.push(MSG_OUTPUT_AS_SOURCE);
    }
    if target == SlotKind::DeviceAudioInput {
        errors.push(MSG_INPUT_AS_SINK);
    }
    if source == SlotKind::DeviceAudioInput && target != SlotKind::AudioConsumer {
        errors.push(MSG_INPUT_NEEDS_CONSUMER);
    }
    if source == SlotKind::AudioProducer && target != SlotKind::DeviceAudioOutput {
        errors.push(MSG_PRODUCER_NEEDS_OUTPUT);
    }
    errors
}
