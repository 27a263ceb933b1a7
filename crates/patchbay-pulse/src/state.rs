//! Module bookkeeping shared by the node managers that load modules.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use patchbay_core::ApplyContext;
use patchbay_core::pipeline::NodeId;

use crate::error::PulseError;
use crate::pactl::ModuleHost;

#[derive(Debug, Serialize, Deserialize)]
struct ModuleState {
    module: u32,
}

/// Load `module` with `args` and record its index for the node.
///
/// Any module recorded by an earlier, unfinished run is released first.
pub(crate) fn load_module(
    host: &dyn ModuleHost,
    ctx: ApplyContext<'_>,
    node: NodeId,
    module: &str,
    args: &[String],
) -> patchbay_core::Result<u32> {
    release_module(host, ctx, node)?;

    let index = host.load_module(module, args)?;
    ctx.state.save(node, &serde_json::to_value(ModuleState { module: index })?)?;
    info!(node_id = node, module, index, "Module loaded");
    Ok(index)
}

/// Unload the module recorded for the node, if any, and forget it.
///
/// A module the server no longer knows about counts as released.
pub(crate) fn release_module(host: &dyn ModuleHost, ctx: ApplyContext<'_>, node: NodeId) -> patchbay_core::Result<()> {
    let Some(state) = ctx.state.load(node)? else {
        return Ok(());
    };
    let state: ModuleState = serde_json::from_value(state)
        .map_err(|e| PulseError::InvalidState(format!("node {node}: {e}")))?;

    match host.unload_module(state.module) {
        Ok(()) => info!(node_id = node, index = state.module, "Module unloaded"),
        Err(PulseError::NoSuchModule(index)) => {
            warn!(node_id = node, index, "Module already gone");
        }
        Err(e) => return Err(e.into()),
    }
    ctx.state.clear(node)
}
