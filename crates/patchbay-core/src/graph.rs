//! Generic directed graph.
//!
//! Nodes and edges carry opaque payloads. The pipeline layer builds one of these
//! from stored nodes and edges; everything here is independent of audio.

use std::collections::VecDeque;

/// Position of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Raw position in insertion order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Position of an edge inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIndex(usize);

/// A directed edge with its payload.
#[derive(Debug, Clone)]
pub struct GraphEdge<E> {
    /// Source node
    pub from: NodeIndex,
    /// Target node
    pub to: NodeIndex,
    /// Edge payload
    pub data: E,
}

#[derive(Debug, Clone)]
struct NodeEntry<N> {
    data: N,
    incoming: Vec<EdgeIndex>,
    outgoing: Vec<EdgeIndex>,
}

/// A directed graph over node payloads `N` and edge payloads `E`.
#[derive(Debug, Clone)]
pub struct Graph<N, E> {
    nodes: Vec<NodeEntry<N>>,
    edges: Vec<GraphEdge<E>>,
}

impl<N, E> Graph<N, E> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new(), edges: Vec::new() }
    }

    /// Add a node and return its index.
    pub fn add_node(&mut self, data: N) -> NodeIndex {
        self.nodes.push(NodeEntry { data, incoming: Vec::new(), outgoing: Vec::new() });
        NodeIndex(self.nodes.len() - 1)
    }

    /// Add an edge between two existing nodes.
    ///
    /// # Panics
    /// Panics if either index does not belong to this graph.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, data: E) -> EdgeIndex {
        assert!(from.0 < self.nodes.len() && to.0 < self.nodes.len(), "edge endpoint out of range");
        let index = EdgeIndex(self.edges.len());
        self.edges.push(GraphEdge { from, to, data });
        self.nodes[from.0].outgoing.push(index);
        self.nodes[to.0].incoming.push(index);
        index
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Payload of a node.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &N {
        &self.nodes[index.0].data
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &N)> {
        self.nodes.iter().enumerate().map(|(i, entry)| (NodeIndex(i), &entry.data))
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &GraphEdge<E>)> {
        self.edges.iter().enumerate().map(|(i, edge)| (EdgeIndex(i), edge))
    }

    /// Edges ending at `index`.
    pub fn incoming(&self, index: NodeIndex) -> impl Iterator<Item = &GraphEdge<E>> {
        self.nodes[index.0].incoming.iter().map(|e| &self.edges[e.0])
    }

    /// Edges starting at `index`.
    pub fn outgoing(&self, index: NodeIndex) -> impl Iterator<Item = &GraphEdge<E>> {
        self.nodes[index.0].outgoing.iter().map(|e| &self.edges[e.0])
    }

    /// Whether a node has neither incoming nor outgoing edges.
    #[must_use]
    pub fn is_isolated(&self, index: NodeIndex) -> bool {
        let entry = &self.nodes[index.0];
        entry.incoming.is_empty() && entry.outgoing.is_empty()
    }

    /// Nodes with no incoming edges, in insertion order.
    ///
    /// An empty graph has no roots.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.incoming.is_empty())
            .map(|(i, _)| NodeIndex(i))
            .collect()
    }

    /// Whether any directed cycle exists.
    ///
    /// Depth-first search seeded from every node not yet visited, so cycles in
    /// components unreachable from the first node are found too. Reaching an
    /// already finished node through a second path (a diamond) is not a cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for seed in 0..self.nodes.len() {
            if marks[seed] != Mark::Unvisited {
                continue;
            }
            marks[seed] = Mark::OnStack;
            // (node, position of the next outgoing edge to follow)
            let mut stack = vec![(seed, 0_usize)];

            while let Some((node, cursor)) = stack.last_mut() {
                let node = *node;
                if let Some(edge) = self.nodes[node].outgoing.get(*cursor) {
                    *cursor += 1;
                    let next = self.edges[edge.0].to.0;
                    match marks[next] {
                        Mark::OnStack => return true,
                        Mark::Unvisited => {
                            marks[next] = Mark::OnStack;
                            stack.push((next, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }

        false
    }

    /// Breadth-first traversal along outgoing edges.
    ///
    /// Each reachable node appears exactly once, even on graphs with cycles or
    /// several paths to the same node.
    #[must_use]
    pub fn breadth_first(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen[start.0] = true;

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for edge in self.outgoing(current) {
                if !seen[edge.to.0] {
                    seen[edge.to.0] = true;
                    queue.push_back(edge.to);
                }
            }
        }

        order
    }
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}
