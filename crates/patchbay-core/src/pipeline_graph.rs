//! Assembling a stored pipeline into a graph of managed nodes.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeIndex};
use crate::manager::{NodeManager, SlotData};
use crate::pipeline::{EdgeId, Node, NodeId, NodeRole, PipelineSnapshot};
use crate::registry::ManagerRegistry;
use crate::slot::{Slot, orient};

/// Node payload: the stored node together with its resolved manager.
pub struct GraphNode {
    pub node: Node,
    pub role: NodeRole,
    /// Stored slots of this node
    pub slots: Vec<Slot>,
    pub manager: Box<dyn NodeManager>,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("node", &self.node)
            .field("role", &self.role)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Edge payload: the stored edge with its slots in source, target order.
#[derive(Debug, Clone)]
pub struct EdgeSlots {
    pub edge_id: EdgeId,
    pub from: Slot,
    pub to: Slot,
}

pub type PipelineGraph = Graph<GraphNode, EdgeSlots>;

/// Build the graph for a pipeline.
///
/// Nodes are added in id order. Each edge is oriented from its slots'
/// directions.
///
/// # Errors
/// Returns [`Error::UnknownNodeType`] for an unregistered type tag and
/// [`Error::DanglingSlot`] for an edge whose slot is not part of the snapshot.
pub fn build_graph(snapshot: PipelineSnapshot, registry: &ManagerRegistry) -> Result<PipelineGraph> {
    let PipelineSnapshot { mut nodes, slots, mut edges } = snapshot;
    nodes.sort_by_key(|n| n.id);
    edges.sort_by_key(|e| e.id);

    let mut slots_by_node: HashMap<NodeId, Vec<Slot>> = HashMap::new();
    for slot in slots {
        slots_by_node.entry(slot.node_id).or_default().push(slot);
    }

    let mut graph = PipelineGraph::new();
    let mut index_of = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let (role, manager) = registry.manager_for(&node)?;
        let mut node_slots = slots_by_node.remove(&node.id).unwrap_or_default();
        node_slots.sort_by_key(|s| s.id);
        let id = node.id;
        let index = graph.add_node(GraphNode { node, role, slots: node_slots, manager });
        index_of.insert(id, index);
    }

    let slot_lookup: HashMap<i64, (&Slot, NodeIndex)> = graph
        .nodes()
        .flat_map(|(index, data)| data.slots.iter().map(move |s| (s.id, (s, index))))
        .collect();

    let mut resolved = Vec::with_capacity(edges.len());
    for edge in edges {
        let lookup = |slot: i64| {
            slot_lookup.get(&slot).copied().ok_or(Error::DanglingSlot { edge: edge.id, slot })
        };
        let (a, a_index) = lookup(edge.slot_a)?;
        let (b, b_index) = lookup(edge.slot_b)?;
        let (from, to) = orient(a, b);
        let (from_index, to_index) = if from.id == a.id { (a_index, b_index) } else { (b_index, a_index) };
        resolved.push((from_index, to_index, EdgeSlots { edge_id: edge.id, from: from.clone(), to: to.clone() }));
    }

    for (from, to, data) in resolved {
        graph.add_edge(from, to, data);
    }

    Ok(graph)
}

impl Graph<GraphNode, EdgeSlots> {
    /// Index of a stored node.
    #[must_use]
    pub fn find_node(&self, node_id: NodeId) -> Option<NodeIndex> {
        self.nodes().find(|(_, data)| data.node.id == node_id).map(|(index, _)| index)
    }

    /// Whether any edge touches the named slot of a node.
    #[must_use]
    pub fn is_slot_connected(&self, at: NodeIndex, slot_name: &str) -> bool {
        self.incoming(at).any(|e| e.data.to.name == slot_name)
            || self.outgoing(at).any(|e| e.data.from.name == slot_name)
    }

    /// Runtime resource feeding the named input slot, as exposed by the
    /// upstream node.
    #[must_use]
    pub fn upstream_slot_data(&self, at: NodeIndex, slot_name: &str) -> Option<SlotData> {
        self.incoming(at)
            .filter(|e| e.data.to.name == slot_name)
            .find_map(|e| self.node(e.from).manager.slot_data(&e.data.from.name))
    }

    /// Runtime resource fed by the named output slot, as exposed by the
    /// downstream node.
    #[must_use]
    pub fn downstream_slot_data(&self, at: NodeIndex, slot_name: &str) -> Option<SlotData> {
        self.outgoing(at)
            .filter(|e| e.data.from.name == slot_name)
            .find_map(|e| self.node(e.to).manager.slot_data(&e.data.to.name))
    }
}
