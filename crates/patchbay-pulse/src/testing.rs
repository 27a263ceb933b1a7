//! Fixtures for the node manager tests.

use std::sync::Arc;

use serde_json::Value;

use patchbay_core::{
    BackendPlugin, Edge, ManagerRegistry, Node, PipelineGraph, PipelineSnapshot, Slot, SlotDirection, SlotKind,
    build_graph,
};

use crate::device_node::DEVICE_NODE_TYPE;
use crate::pactl::{MockModuleHost, PactlEntry, SampleSpec};
use crate::pipe_node::PIPE_NODE_TYPE;
use crate::plugin::PulsePlugin;

pub fn node(id: i64, type_tag: &str, config: Value) -> Node {
    let Value::Object(config) = config else {
        panic!("Node config must be an object");
    };
    Node {
        id,
        pipeline_id: 1,
        type_tag: type_tag.into(),
        config,
        created_at: String::new(),
        updated_at: String::new(),
    }
}

pub fn entry(index: u32, name: &str) -> PactlEntry {
    PactlEntry {
        index,
        name: name.into(),
        driver: "module-alsa-card.c".into(),
        sample_spec: SampleSpec { format: "s16le".into(), channels: 2, rate: 44100 },
        state: "IDLE".into(),
    }
}

fn slot(id: i64, node_id: i64, name: &str, kind: SlotKind, direction: SlotDirection) -> Slot {
    Slot { id, node_id, name: name.into(), nice_name: None, kind, direction }
}

pub fn lone_node(node: Node) -> PipelineSnapshot {
    PipelineSnapshot { nodes: vec![node], ..PipelineSnapshot::default() }
}

/// Capture device `mic` (node 1) into a pipe (node 2) into playback device
/// `speakers` (node 3).
pub fn loopback_snapshot(pipe_config: Value) -> PipelineSnapshot {
    PipelineSnapshot {
        nodes: vec![
            node(1, DEVICE_NODE_TYPE, serde_json::json!({ "device": "mic", "direction": "capture" })),
            node(2, PIPE_NODE_TYPE, pipe_config),
            node(3, DEVICE_NODE_TYPE, serde_json::json!({ "device": "speakers", "direction": "playback" })),
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

pub fn graph(snapshot: PipelineSnapshot, host: MockModuleHost) -> PipelineGraph {
    let mut registry = ManagerRegistry::new();
    PulsePlugin::new(Arc::new(host)).register(&mut registry).expect("Failed to register plugin");
    build_graph(snapshot, &registry).expect("Failed to build graph")
}
