//! `pulseaudio.device`: binds a slot to an existing source or sink.

use std::sync::Arc;

use patchbay_core::pipeline::NodeId;
use patchbay_core::{
    ApplyContext, DeviceHandle, DeviceType, FieldDescriptor, Node, NodeIndex, NodeManager, NodeManagerFactory,
    NodeRole, NodeSchema, NodeValidation, PipelineGraph, SlotData, SlotDirection, SlotKind, SlotSchematic,
};

use crate::BACKEND_NAME;
use crate::pactl::ModuleHost;

pub const DEVICE_NODE_TYPE: &str = "pulseaudio.device";

/// Builds [`DeviceNodeManager`]s.
pub struct DeviceNodeFactory {
    host: Arc<dyn ModuleHost>,
}

impl DeviceNodeFactory {
    #[must_use]
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }
}

impl NodeManagerFactory for DeviceNodeFactory {
    fn role(&self) -> NodeRole {
        NodeRole::Device
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema {
            type_tag: DEVICE_NODE_TYPE.to_string(),
            label: "PulseAudio device".to_string(),
            role: self.role(),
            fields: vec![
                FieldDescriptor::string("device").help("Name of the source or sink"),
                FieldDescriptor::choice("direction", &["capture", "playback"])
                    .help("capture for a source, playback for a sink"),
            ],
        }
    }

    fn create(&self, node: &Node) -> patchbay_core::Result<Box<dyn NodeManager>> {
        Ok(Box::new(DeviceNodeManager {
            node_id: node.id,
            device: node.config_str("device").map(ToString::to_string),
            direction: node.config_str("direction").and_then(DeviceType::parse),
            host: Arc::clone(&self.host),
        }))
    }
}

/// Manager for a node bound to one PulseAudio source or sink.
pub struct DeviceNodeManager {
    node_id: NodeId,
    device: Option<String>,
    direction: Option<DeviceType>,
    host: Arc<dyn ModuleHost>,
}

impl DeviceNodeManager {
    fn is_listed(&self, name: &str, direction: DeviceType) -> Result<bool, String> {
        let listing = match direction {
            DeviceType::Capture => self.host.list_sources(),
            DeviceType::Playback => self.host.list_sinks(),
        };
        listing.map(|entries| entries.iter().any(|e| e.name == name)).map_err(|e| e.to_string())
    }
}

impl NodeManager for DeviceNodeManager {
    fn slot_schematics(&self) -> Vec<SlotSchematic> {
        let (Some(device), Some(direction)) = (&self.device, self.direction) else {
            return Vec::new();
        };
        let schematic = match direction {
            DeviceType::Capture => SlotSchematic::new(device, SlotKind::DeviceAudioInput, SlotDirection::Output),
            DeviceType::Playback => SlotSchematic::new(device, SlotKind::DeviceAudioOutput, SlotDirection::Input),
        };
        vec![schematic]
    }

    fn validate(&self, _at: NodeIndex, _graph: &PipelineGraph) -> Option<NodeValidation> {
        let mut result = NodeValidation::new(self.node_id);
        if self.device.is_none() {
            result.field_error("device", "Device must be specified");
        }
        if self.direction.is_none() {
            result.field_error("direction", "Direction must be specified");
        }

        if let (Some(device), Some(direction)) = (&self.device, self.direction) {
            match self.is_listed(device, direction) {
                Ok(true) => {}
                Ok(false) => {
                    result.field_error("device", format!("No {} device named '{device}'", direction.as_str()));
                }
                Err(e) => result.error(format!("Could not list devices: {e}")),
            }
        }

        (!result.is_empty()).then_some(result)
    }

    fn apply(&self, _at: NodeIndex, _graph: &PipelineGraph, _ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        Ok(())
    }

    fn unapply(&self, _at: NodeIndex, _graph: &PipelineGraph, _ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        Ok(())
    }

    fn slot_data(&self, slot_name: &str) -> Option<SlotData> {
        let device = self.device.as_deref().filter(|d| *d == slot_name)?;
        Some(SlotData::Device(DeviceHandle { backend: BACKEND_NAME.to_string(), name: device.to_string() }))
    }

    fn bound_device(&self) -> Option<DeviceHandle> {
        let device = self.device.as_ref()?;
        Some(DeviceHandle { backend: BACKEND_NAME.to_string(), name: device.clone() })
    }
}
