//! Node runtime state.

use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use patchbay_core::NodeStateStore;
use patchbay_core::pipeline::NodeId;

use crate::{Database, DbResult, json_column};

impl Database {
    /// Load the runtime state recorded for a node.
    pub fn load_node_state(&self, node: NodeId) -> DbResult<Option<Value>> {
        let state = self
            .conn
            .query_row("SELECT state FROM node_state WHERE node_id = ?", [node], |row| {
                let text: String = row.get(0)?;
                json_column(0, &text)
            })
            .optional()?;
        Ok(state)
    }

    /// Record runtime state for a node, replacing what was there.
    pub fn save_node_state(&self, node: NodeId, state: &Value) -> DbResult<()> {
        let text = serde_json::to_string(state)?;
        self.conn.execute(
            r"INSERT INTO node_state (node_id, state) VALUES (?, ?)
              ON CONFLICT(node_id) DO UPDATE SET
                state = excluded.state,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![node, text],
        )?;
        Ok(())
    }

    /// Forget a node's runtime state.
    pub fn clear_node_state(&self, node: NodeId) -> DbResult<()> {
        self.conn.execute("DELETE FROM node_state WHERE node_id = ?", [node])?;
        Ok(())
    }
}

impl NodeStateStore for Database {
    fn load(&self, node: NodeId) -> patchbay_core::Result<Option<Value>> {
        Ok(self.load_node_state(node)?)
    }

    fn save(&self, node: NodeId, state: &Value) -> patchbay_core::Result<()> {
        Ok(self.save_node_state(node, state)?)
    }

    fn clear(&self, node: NodeId) -> patchbay_core::Result<()> {
        Ok(self.clear_node_state(node)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn test_state_save_load_clear() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let p = db.create_pipeline("studio", "", true).unwrap();
        let node = db.create_node(p.id, "pulseaudio.pipe", &Map::new()).unwrap();

        assert_eq!(db.load_node_state(node.id).unwrap(), None);

        db.save_node_state(node.id, &json!({ "module": 17 })).unwrap();
        db.save_node_state(node.id, &json!({ "module": 18 })).unwrap();
        assert_eq!(db.load_node_state(node.id).unwrap(), Some(json!({ "module": 18 })));

        db.clear_node_state(node.id).unwrap();
        db.clear_node_state(node.id).unwrap();
        assert_eq!(db.load_node_state(node.id).unwrap(), None);
    }
}
