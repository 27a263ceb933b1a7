//! Pipeline, node and edge records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::slot::Slot;

pub type PipelineId = i64;
pub type NodeId = i64;
pub type EdgeId = i64;

/// A named, user-managed audio routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Unique identifier
    pub id: PipelineId,
    /// Unique pipeline name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// User intent: whether the pipeline should be running
    pub enabled: bool,
    /// Whether the pipeline is currently realized on the audio server
    pub active: bool,
    /// Whether the last apply/unapply left the live state unknown
    pub stale: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Pipeline {
    /// Reject structural edits while the pipeline is active or stale.
    ///
    /// Stale is reported first: it is the state the user has to resolve.
    ///
    /// # Errors
    /// Returns [`Error::PipelineStale`] or [`Error::PipelineActive`].
    pub fn ensure_writable(&self) -> Result<()> {
        if self.stale {
            return Err(Error::PipelineStale(self.name.clone()));
        }
        if self.active {
            return Err(Error::PipelineActive(self.name.clone()));
        }
        Ok(())
    }

    /// Current status flags.
    #[must_use]
    pub fn flags(&self) -> PipelineFlags {
        PipelineFlags { active: self.active, stale: self.stale }
    }

    /// Overwrite the status flags.
    pub fn set_flags(&mut self, flags: PipelineFlags) {
        self.active = flags.active;
        self.stale = flags.stale;
    }
}

/// The orchestrator-owned part of a pipeline's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineFlags {
    pub active: bool,
    pub stale: bool,
}

/// Which ordering bucket a node belongs to when a pipeline is applied.
///
/// Device nodes bind or create the endpoints that processing nodes connect, so
/// they always run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Binds to (or creates) an audio device
    Device,
    /// Routes audio between devices
    Processing,
}

/// A typed unit of the pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Owning pipeline
    pub pipeline_id: PipelineId,
    /// Selects the node manager implementation
    pub type_tag: String,
    /// Type-specific configuration fields
    pub config: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Node {
    /// A string field of the configuration, treating JSON null and empty strings as absent.
    #[must_use]
    pub fn config_str(&self, field: &str) -> Option<&str> {
        self.config.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// An integer field of the configuration.
    #[must_use]
    pub fn config_i64(&self, field: &str) -> Option<i64> {
        self.config.get(field).and_then(Value::as_i64)
    }
}

/// A connection between two slots.
///
/// Stored undirected; the direction is derived from the slots when the graph is
/// assembled (see [`crate::slot::orient`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub slot_a: i64,
    pub slot_b: i64,
}

/// Everything stored for one pipeline, as loaded before building a graph.
#[derive(Debug, Clone, Default)]
pub struct PipelineSnapshot {
    pub nodes: Vec<Node>,
    pub slots: Vec<Slot>,
    pub edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn pipeline(active: bool, stale: bool) -> Pipeline {
        Pipeline {
            id: 1,
            name: "living-room".into(),
            description: String::new(),
            enabled: true,
            active,
            stale,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_idle_pipeline_is_writable() {
        assert!(pipeline(false, false).ensure_writable().is_ok());
    }

    #[test]
    fn test_active_pipeline_is_read_only() {
        let err = pipeline(true, false).ensure_writable().unwrap_err();
        assert_matches!(err, Error::PipelineActive(name) if name == "living-room");
    }

    #[test]
    fn test_stale_wins_over_active() {
        let err = pipeline(true, true).ensure_writable().unwrap_err();
        assert_eq!(err.to_string(), "Pipeline living-room is stale");
    }

    #[test]
    fn test_config_str_ignores_null_and_empty() {
        let mut config = Map::new();
        config.insert("server".into(), Value::String("10.0.0.2".into()));
        config.insert("cookie".into(), Value::Null);
        config.insert("sink".into(), Value::String(String::new()));
        let node = Node {
            id: 3,
            pipeline_id: 1,
            type_tag: "pulseaudio.tunnel".into(),
            config,
            created_at: String::new(),
            updated_at: String::new(),
        };

        assert_eq!(node.config_str("server"), Some("10.0.0.2"));
        assert_eq!(node.config_str("cookie"), None);
        assert_eq!(node.config_str("sink"), None);
        assert_eq!(node.config_str("missing"), None);
    }
}
