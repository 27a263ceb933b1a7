//! `pulseaudio.tunnel`: a local source or sink backed by a remote server.

use std::sync::Arc;

use patchbay_core::pipeline::NodeId;
use patchbay_core::{
    ApplyContext, DeviceHandle, FieldDescriptor, Node, NodeIndex, NodeManager, NodeManagerFactory, NodeRole,
    NodeSchema, NodeValidation, PipelineGraph, SlotData, SlotDirection, SlotKind, SlotSchematic,
};

use crate::BACKEND_NAME;
use crate::pactl::ModuleHost;
use crate::state;

pub const TUNNEL_NODE_TYPE: &str = "pulseaudio.tunnel";

/// Which end of the remote server the tunnel exposes locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelMode {
    Source,
    Sink,
}

impl TunnelMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Sink => "sink",
        }
    }

    /// Parse a mode, accepting either case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "source" => Some(Self::Source),
            "sink" => Some(Self::Sink),
            _ => None,
        }
    }
}

/// Builds [`TunnelNodeManager`]s.
pub struct TunnelNodeFactory {
    host: Arc<dyn ModuleHost>,
}

impl TunnelNodeFactory {
    #[must_use]
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }
}

impl NodeManagerFactory for TunnelNodeFactory {
    fn role(&self) -> NodeRole {
        NodeRole::Device
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema {
            type_tag: TUNNEL_NODE_TYPE.to_string(),
            label: "PulseAudio tunnel".to_string(),
            role: self.role(),
            fields: vec![
                FieldDescriptor::string("server").help("The server to connect to"),
                FieldDescriptor::choice("mode", &["source", "sink"]).help("The mode of the tunnel. Either source or sink"),
                FieldDescriptor::string("source")
                    .nullable()
                    .help("The source on the remote server. Only available in source mode"),
                FieldDescriptor::string("sink")
                    .nullable()
                    .help("The sink on the remote server. Only available in sink mode"),
                FieldDescriptor::string("cookie").nullable().help("Authentication cookie for the remote server"),
            ],
        }
    }

    fn create(&self, node: &Node) -> patchbay_core::Result<Box<dyn NodeManager>> {
        let text = |field: &str| node.config_str(field).map(ToString::to_string);
        Ok(Box::new(TunnelNodeManager {
            node_id: node.id,
            server: text("server"),
            mode: node.config_str("mode").and_then(TunnelMode::parse),
            source: text("source"),
            sink: text("sink"),
            cookie: text("cookie"),
            host: Arc::clone(&self.host),
        }))
    }
}

/// Manager that loads `module-tunnel-source` or `module-tunnel-sink`.
pub struct TunnelNodeManager {
    node_id: NodeId,
    server: Option<String>,
    mode: Option<TunnelMode>,
    source: Option<String>,
    sink: Option<String>,
    cookie: Option<String>,
    host: Arc<dyn ModuleHost>,
}

impl TunnelNodeManager {
    /// Name of the source or sink the module creates on the local server.
    #[must_use]
    pub fn local_name(&self) -> String {
        format!("patchbay_tunnel_{}", self.node_id)
    }

    fn slot_name(&self) -> Option<&str> {
        match self.mode? {
            TunnelMode::Source => Some(self.source.as_deref().unwrap_or("Source Name")),
            TunnelMode::Sink => Some(self.sink.as_deref().unwrap_or("Sink Name")),
        }
    }

    fn module_args(&self, mode: TunnelMode) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(server) = &self.server {
            args.push(format!("server={server}"));
        }
        let remote = match mode {
            TunnelMode::Source => self.source.as_ref().map(|source| format!("source={source}")),
            TunnelMode::Sink => self.sink.as_ref().map(|sink| format!("sink={sink}")),
        };
        args.extend(remote);
        if let Some(cookie) = &self.cookie {
            args.push(format!("cookie={cookie}"));
        }
        args.push(format!("{}_name={}", mode.as_str(), self.local_name()));
        args
    }
}

impl NodeManager for TunnelNodeManager {
    fn slot_schematics(&self) -> Vec<SlotSchematic> {
        let (Some(mode), Some(name)) = (self.mode, self.slot_name()) else {
            return Vec::new();
        };
        let schematic = match mode {
            TunnelMode::Source => SlotSchematic::new(name, SlotKind::DeviceAudioInput, SlotDirection::Output),
            TunnelMode::Sink => SlotSchematic::new(name, SlotKind::DeviceAudioOutput, SlotDirection::Input),
        };
        vec![schematic]
    }

    fn validate(&self, _at: NodeIndex, _graph: &PipelineGraph) -> Option<NodeValidation> {
        let mut result = NodeValidation::new(self.node_id);
        if self.server.is_none() {
            result.field_error("server", "Server must be specified");
        }
        match self.mode {
            None => result.field_error("mode", "Mode must be specified"),
            Some(TunnelMode::Source) if self.source.is_none() => {
                result.field_error("source", "Source must be specified when mode is source");
            }
            Some(TunnelMode::Sink) if self.sink.is_none() => {
                result.field_error("sink", "Sink must be specified when mode is sink");
            }
            Some(_) => {}
        }
        (!result.is_empty()).then_some(result)
    }

    fn apply(&self, _at: NodeIndex, _graph: &PipelineGraph, ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        let mode = self.mode.ok_or_else(|| patchbay_core::Error::invalid_config("mode", "Mode must be specified"))?;
        let module = format!("module-tunnel-{}", mode.as_str());
        state::load_module(self.host.as_ref(), ctx, self.node_id, &module, &self.module_args(mode))?;
        Ok(())
    }

    fn unapply(&self, _at: NodeIndex, _graph: &PipelineGraph, ctx: ApplyContext<'_>) -> patchbay_core::Result<()> {
        state::release_module(self.host.as_ref(), ctx, self.node_id)
    }

    fn slot_data(&self, slot_name: &str) -> Option<SlotData> {
        if self.slot_name()? != slot_name {
            return None;
        }
        Some(SlotData::Device(DeviceHandle { backend: BACKEND_NAME.to_string(), name: self.local_name() }))
    }
}
