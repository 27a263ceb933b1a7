//! Fake node types shared by the unit tests.
//!
//! `test.capture` and `test.playback` are device nodes with one slot each,
//! `test.pipe` is a processing node with `Input` and `Output`. Setting
//! `"fail": true` in a node's config makes its apply fail; `"invalid": true`
//! makes validation report a field error.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::graph::NodeIndex;
use crate::manager::{ApplyContext, DeviceHandle, NodeManager, NodeManagerFactory, SlotData};
use crate::pipeline::{Edge, Node, NodeId, NodeRole, PipelineSnapshot};
use crate::pipeline_graph::{PipelineGraph, build_graph};
use crate::registry::ManagerRegistry;
use crate::schema::NodeSchema;
use crate::slot::{Slot, SlotDirection, SlotKind, SlotSchematic};
use crate::validation::NodeValidation;

/// Shared record of manager calls, e.g. `apply:2`.
pub type Calls = Arc<Mutex<Vec<String>>>;

struct FakeManager {
    node_id: NodeId,
    tag: String,
    fail: bool,
    invalid: bool,
    calls: Calls,
}

impl NodeManager for FakeManager {
    fn slot_schematics(&self) -> Vec<SlotSchematic> {
        match self.tag.as_str() {
            "test.capture" => {
                vec![SlotSchematic::new("mic", SlotKind::DeviceAudioInput, SlotDirection::Output)]
            }
            "test.playback" => {
                vec![SlotSchematic::new("speakers", SlotKind::DeviceAudioOutput, SlotDirection::Input)]
            }
            _ => vec![
                SlotSchematic::new("Input", SlotKind::AudioConsumer, SlotDirection::Input),
                SlotSchematic::new("Output", SlotKind::AudioProducer, SlotDirection::Output),
            ],
        }
    }

    fn validate(&self, _at: NodeIndex, _graph: &PipelineGraph) -> Option<NodeValidation> {
        self.invalid.then(|| {
            let mut validation = NodeValidation::new(self.node_id);
            validation.field_error("device", "This field is required");
            validation
        })
    }

    fn apply(&self, _at: NodeIndex, _graph: &PipelineGraph, ctx: ApplyContext<'_>) -> Result<()> {
        self.calls.lock().push(format!("apply:{}", self.node_id));
        if self.fail {
            return Err(Error::Backend(format!("node {} refused", self.node_id)));
        }
        ctx.state.save(self.node_id, &json!({ "applied": true }))
    }

    fn unapply(&self, _at: NodeIndex, _graph: &PipelineGraph, ctx: ApplyContext<'_>) -> Result<()> {
        self.calls.lock().push(format!("unapply:{}", self.node_id));
        if ctx.state.load(self.node_id)?.is_some() {
            ctx.state.clear(self.node_id)?;
        }
        Ok(())
    }

    fn slot_data(&self, slot_name: &str) -> Option<SlotData> {
        (self.tag != "test.pipe").then(|| {
            SlotData::Device(DeviceHandle { backend: "test".into(), name: slot_name.to_string() })
        })
    }
}

struct FakeFactory {
    tag: &'static str,
    role: NodeRole,
    calls: Calls,
}

impl NodeManagerFactory for FakeFactory {
    fn role(&self) -> NodeRole {
        self.role
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema { type_tag: self.tag.into(), label: self.tag.into(), role: self.role, fields: vec![] }
    }

    fn create(&self, node: &Node) -> Result<Box<dyn NodeManager>> {
        let flag = |name: &str| node.config.get(name).and_then(Value::as_bool).unwrap_or(false);
        Ok(Box::new(FakeManager {
            node_id: node.id,
            tag: node.type_tag.clone(),
            fail: flag("fail"),
            invalid: flag("invalid"),
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub fn registry(calls: &Calls) -> ManagerRegistry {
    let mut registry = ManagerRegistry::new();
    for (tag, role) in [
        ("test.capture", NodeRole::Device),
        ("test.playback", NodeRole::Device),
        ("test.pipe", NodeRole::Processing),
    ] {
        registry
            .register(tag, Arc::new(FakeFactory { tag, role, calls: Arc::clone(calls) }))
            .unwrap();
    }
    registry
}

pub fn node(id: NodeId, tag: &str, config: Value) -> Node {
    let config = match config {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Node {
        id,
        pipeline_id: 1,
        type_tag: tag.into(),
        config,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

pub fn slot(id: i64, node_id: NodeId, name: &str, kind: SlotKind, direction: SlotDirection) -> Slot {
    Slot { id, node_id, name: name.into(), nice_name: None, kind, direction }
}

/// D1 (capture, id 1) -> P1 (pipe, id 2) -> D2 (playback, id 3).
///
/// Slot ids are `node id * 10` plus the slot position; edges are 100 and 101.
pub fn three_node_snapshot(pipe_config: Value) -> PipelineSnapshot {
    PipelineSnapshot {
        nodes: vec![
            node(1, "test.capture", json!({})),
            node(2, "test.pipe", pipe_config),
            node(3, "test.playback", json!({})),
        ],
        slots: vec![
            slot(10, 1, "mic", SlotKind::DeviceAudioInput, SlotDirection::Output),
            slot(20, 2, "Input", SlotKind::AudioConsumer, SlotDirection::Input),
            slot(21, 2, "Output", SlotKind::AudioProducer, SlotDirection::Output),
            slot(30, 3, "speakers", SlotKind::DeviceAudioOutput, SlotDirection::Input),
        ],
        edges: vec![Edge { id: 100, slot_a: 10, slot_b: 20 }, Edge { id: 101, slot_a: 21, slot_b: 30 }],
    }
}

pub fn graph(snapshot: PipelineSnapshot, calls: &Calls) -> PipelineGraph {
    build_graph(snapshot, &registry(calls)).unwrap()
}
