//! Plugin entry point.

use std::sync::Arc;

use tracing::info;

use patchbay_core::{AudioBackend, BackendPlugin, ManagerRegistry};

use crate::BACKEND_NAME;
use crate::backend::PulseBackend;
use crate::device_node::{DEVICE_NODE_TYPE, DeviceNodeFactory};
use crate::error::PulseResult;
use crate::pactl::{ModuleHost, PactlHost};
use crate::pipe_node::{PIPE_NODE_TYPE, PipeNodeFactory};
use crate::tunnel_node::{TUNNEL_NODE_TYPE, TunnelNodeFactory};

/// PulseAudio backend plugin.
pub struct PulsePlugin {
    host: Arc<dyn ModuleHost>,
}

impl PulsePlugin {
    #[must_use]
    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }

    /// Create a plugin that talks to the server through `pactl`.
    ///
    /// # Errors
    /// Returns an error if the `pactl` output parser cannot be built.
    pub fn with_pactl() -> PulseResult<Self> {
        Ok(Self::new(Arc::new(PactlHost::new()?)))
    }
}

impl BackendPlugin for PulsePlugin {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn backend(&self) -> Option<Arc<dyn AudioBackend>> {
        Some(Arc::new(PulseBackend::new(Arc::clone(&self.host))))
    }

    fn register(&self, registry: &mut ManagerRegistry) -> patchbay_core::Result<()> {
        registry.register(DEVICE_NODE_TYPE, Arc::new(DeviceNodeFactory::new(Arc::clone(&self.host))))?;
        registry.register(TUNNEL_NODE_TYPE, Arc::new(TunnelNodeFactory::new(Arc::clone(&self.host))))?;
        registry.register(PIPE_NODE_TYPE, Arc::new(PipeNodeFactory::new(Arc::clone(&self.host))))?;
        info!(plugin = BACKEND_NAME, "Registered node types");
        Ok(())
    }
}
