//! `pulseaudio.pipe`: loops audio from the upstream source into the downstream sink.

use std::sync::Arc;

use patchbay_core::pipeline::NodeId;
use patchbay_core::{
    ApplyContext, DeviceHandle, Error, FieldDescriptor, Node, NodeIndex, NodeManager, NodeManagerFactory, NodeRole,
    NodeSchema, NodeValidation, PipelineGraph, SlotDirection, SlotKind, SlotSchematic,
};

use crate::BACKEND_NAME;
use crate::pactl::ModuleHost;
use crate::state;

pub const PIPE_NODE_TYPE: &str = "pulseaudio.pipe";

const INPUT: &str = "Input";
const OUTPUT: &str = "Output";

/// Builds [`PipeNodeManager`]s.
pub struct PipeNodeFactory {
    host: Arc<dyn ModuleHost>,
}

impl PipeNodeFactory {
    #[must_use]
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }
}

impl NodeManagerFactory for PipeNodeFactory {
    fn role(&self) -> NodeRole {
        NodeRole::Processing
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema {
            type_tag: PIPE_NODE_TYPE.to_string(),
            label: "PulseAudio pipe".to_string(),
            role: self.role(),
            fields: vec![FieldDescriptor::integer("latency_msec").nullable().help("Loopback latency in milliseconds")],
        }
    }

    fn create(&self, node: &Node) -> patchbay_core::Result<Box<dyn NodeManager>> {
        Ok(Box::new(PipeNodeManager {
            node_id: node.id,
            latency_msec: node.config_i64("latency_msec"),
            host: Arc::clone(&self.host),
        }))
    }
}

/// Manager that loads one `module-loopback` per node.
pub struct PipeNodeManager {
    node_id: NodeId,
    latency_msec: Option<i64>,
    host: Arc<dyn ModuleHost>,
}

fn pulse_device(handle: Option<&DeviceHandle>, slot: &str) -> patchbay_core::Result<String> {
    let handle = handle.ok_or_else(|| Error::Backend(format!("Nothing is bound to the {slot} slot")))?;
    if handle.backend != BACKEND_NAME {
        return Err(Error::Backend(format!(
            "Device '{}' belongs to backend '{}', not {BACKEND_NAME}",
            handle.name, handle.backend
        )));
    }
    Ok(handle.name.clone())
}

impl NodeManager for PipeNodeManager {
    fn slot_schematics(&self) -> Vec<SlotSchematic> {
        vec![
            SlotSchematic::new(INPUT, SlotKind::AudioConsumer, SlotDirection::Input),
            SlotSchematic::new(OUTPUT, SlotKind::AudioProducer, SlotDirection::Output),
        ]
    }

    fn validate(&self, at: NodeIndex, graph: &PipelineGraph) -> Option<NodeValidation> {
        let mut result = NodeValidation::new(self.node_id);
        if self.latency_msec.is_some_and(|ms| ms <= 0) {
            result.field_error("latency_msec", "Latency must be positive");
        }
        for slot in [INPUT, OUTPUT] {
            if !graph.is_slot_connected(at, slot) {
                result.slot_error(slot, "This slot must be connected");
            }
        }
        (!result.is_empty()).then_some(result)
    }

    fn apply(&self, at: NodeIndex, graph: &PipelineGraph, ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        let upstream = graph.upstream_slot_data(at, INPUT);
        let downstream = graph.downstream_slot_data(at, OUTPUT);
        let source = pulse_device(upstream.as_ref().and_then(|d| d.as_device()), INPUT)?;
        let sink = pulse_device(downstream.as_ref().and_then(|d| d.as_device()), OUTPUT)?;

        let mut args = vec![format!("source={source}"), format!("sink={sink}")];
        if let Some(ms) = self.latency_msec.filter(|ms| *ms > 0) {
            args.push(format!("latency_msec={ms}"));
        }
        state::load_module(self.host.as_ref(), ctx, self.node_id, "module-loopback", &args)?;
        Ok(())
    }

    fn unapply(&self, _at: NodeIndex, _graph: &PipelineGraph, ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        state::release_module(self.host.as_ref(), ctx, self.node_id)
    }
}
