//! Pipeline, node, slot and edge queries.

use rusqlite::{OptionalExtension, Row, params};
use serde_json::{Map, Value};
use tracing::debug;

use patchbay_core::pipeline::{EdgeId, NodeId, PipelineId};
use patchbay_core::slot::SlotId;
use patchbay_core::{
    Edge, Node, Pipeline, PipelineFlags, PipelineSnapshot, Slot, SlotDirection, SlotKind, SlotSchematic,
    plan_reconciliation,
};

use crate::{Database, DbError, DbResult, json_column, parse_column};

/// Fields of a pipeline the user may change; `None` keeps the stored value.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PipelineUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

const PIPELINE_COLUMNS: &str = "id, name, description, enabled, active, stale, created_at, updated_at";
const NODE_COLUMNS: &str = "id, pipeline_id, type_tag, config, created_at, updated_at";
const SLOT_COLUMNS: &str = "s.id, s.node_id, s.name, s.nice_name, s.kind, s.direction";

fn pipeline_from_row(row: &Row<'_>) -> rusqlite::Result<Pipeline> {
    Ok(Pipeline {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        enabled: row.get(3)?,
        active: row.get(4)?,
        stale: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    let config: String = row.get(3)?;
    Ok(Node {
        id: row.get(0)?,
        pipeline_id: row.get(1)?,
        type_tag: row.get(2)?,
        config: json_column(3, &config)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<Slot> {
    let kind: String = row.get(4)?;
    let direction: String = row.get(5)?;
    Ok(Slot {
        id: row.get(0)?,
        node_id: row.get(1)?,
        name: row.get(2)?,
        nice_name: row.get(3)?,
        kind: parse_column(4, &kind, SlotKind::parse)?,
        direction: parse_column(5, &direction, SlotDirection::parse)?,
    })
}

impl Database {
    /// List all pipelines by name.
    pub fn list_pipelines(&self) -> DbResult<Vec<Pipeline>> {
        let mut stmt = self.conn.prepare(&format!("SELECT {PIPELINE_COLUMNS} FROM pipelines ORDER BY name"))?;
        let pipelines = stmt.query_map([], pipeline_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(pipelines)
    }

    /// Load a pipeline.
    pub fn get_pipeline(&self, id: PipelineId) -> DbResult<Pipeline> {
        self.conn
            .query_row(&format!("SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = ?"), [id], pipeline_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("pipeline {id}")))
    }

    /// Create a pipeline. New pipelines are inactive and not stale.
    pub fn create_pipeline(&self, name: &str, description: &str, enabled: bool) -> DbResult<Pipeline> {
        self.conn
            .execute(
                "INSERT INTO pipelines (name, description, enabled) VALUES (?, ?, ?)",
                params![name, description, enabled],
            )
            .map_err(|e| DbError::conflict_on_constraint(e, || format!("pipeline '{name}' already exists")))?;
        let id = self.conn.last_insert_rowid();
        debug!(pipeline_id = id, name, "Created pipeline");
        self.get_pipeline(id)
    }

    /// Update the user-editable fields of a pipeline.
    pub fn update_pipeline(&self, id: PipelineId, update: &PipelineUpdate) -> DbResult<Pipeline> {
        let changed = self
            .conn
            .execute(
                r"UPDATE pipelines SET
                    name = COALESCE(?, name),
                    description = COALESCE(?, description),
                    enabled = COALESCE(?, enabled),
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                  WHERE id = ?",
                params![update.name, update.description, update.enabled, id],
            )
            .map_err(|e| DbError::conflict_on_constraint(e, || "pipeline name already in use".to_string()))?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("pipeline {id}")));
        }
        self.get_pipeline(id)
    }

    /// Delete a pipeline with everything it owns.
    ///
    /// Returns whether a row was deleted.
    pub fn delete_pipeline(&self, id: PipelineId) -> DbResult<bool> {
        let deleted = self.conn.execute("DELETE FROM pipelines WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Persist the orchestrator-owned flags of a pipeline.
    pub fn set_pipeline_flags(&self, id: PipelineId, flags: PipelineFlags) -> DbResult<()> {
        let changed = self.conn.execute(
            r"UPDATE pipelines SET active = ?, stale = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
              WHERE id = ?",
            params![flags.active, flags.stale, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("pipeline {id}")));
        }
        Ok(())
    }

    /// List the nodes of a pipeline in id order.
    pub fn list_nodes(&self, pipeline: PipelineId) -> DbResult<Vec<Node>> {
        let mut stmt =
            self.conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE pipeline_id = ? ORDER BY id"))?;
        let nodes = stmt.query_map([pipeline], node_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// Load a node.
    pub fn get_node(&self, id: NodeId) -> DbResult<Node> {
        self.conn
            .query_row(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?"), [id], node_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("node {id}")))
    }

    /// Create a node. Its slots are added by [`Database::reconcile_slots`].
    pub fn create_node(&self, pipeline: PipelineId, type_tag: &str, config: &Map<String, Value>) -> DbResult<Node> {
        let config = serde_json::to_string(config)?;
        self.conn.execute(
            "INSERT INTO nodes (pipeline_id, type_tag, config) VALUES (?, ?, ?)",
            params![pipeline, type_tag, config],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(node_id = id, pipeline_id = pipeline, type_tag, "Created node");
        self.get_node(id)
    }

    /// Replace a node's configuration.
    pub fn update_node_config(&self, id: NodeId, config: &Map<String, Value>) -> DbResult<Node> {
        let config = serde_json::to_string(config)?;
        let changed = self.conn.execute(
            "UPDATE nodes SET config = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
            params![config, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("node {id}")));
        }
        self.get_node(id)
    }

    /// Delete a node with its slots, edges and runtime state.
    pub fn delete_node(&self, id: NodeId) -> DbResult<bool> {
        let deleted = self.conn.execute("DELETE FROM nodes WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// List a node's slots in id order.
    pub fn list_slots(&self, node: NodeId) -> DbResult<Vec<Slot>> {
        let mut stmt =
            self.conn.prepare(&format!("SELECT {SLOT_COLUMNS} FROM slots s WHERE s.node_id = ? ORDER BY s.id"))?;
        let slots = stmt.query_map([node], slot_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    /// List every slot of a pipeline.
    pub fn list_pipeline_slots(&self, pipeline: PipelineId) -> DbResult<Vec<Slot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots s JOIN nodes n ON s.node_id = n.id
             WHERE n.pipeline_id = ? ORDER BY s.id"
        ))?;
        let slots = stmt.query_map([pipeline], slot_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    /// Load a slot.
    pub fn get_slot(&self, id: SlotId) -> DbResult<Slot> {
        self.conn
            .query_row(&format!("SELECT {SLOT_COLUMNS} FROM slots s WHERE s.id = ?"), [id], slot_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("slot {id}")))
    }

    /// Bring a node's stored slots in line with a freshly computed schema.
    ///
    /// Slots are matched by name: missing ones are created, ones that left the
    /// schema are deleted (with their edges), and the rest keep their ids. Runs
    /// in a single transaction and returns the resulting slots.
    pub fn reconcile_slots(&self, node: NodeId, schema: &[SlotSchematic]) -> DbResult<Vec<Slot>> {
        let tx = self.conn.unchecked_transaction()?;
        let stored = self.list_slots(node)?;
        let plan = plan_reconciliation(schema, &stored)?;

        if !plan.is_empty() {
            debug!(node_id = node, created = plan.create.len(), deleted = plan.delete.len(), "Reconciling slots");
        }
        for id in &plan.delete {
            tx.execute("DELETE FROM slots WHERE id = ?", [id])?;
        }
        for slot in &plan.create {
            tx.execute(
                "INSERT INTO slots (node_id, name, nice_name, kind, direction) VALUES (?, ?, ?, ?, ?)",
                params![node, slot.name, slot.nice_name, slot.kind.as_str(), slot.direction.as_str()],
            )?;
        }

        tx.commit()?;
        self.list_slots(node)
    }

    /// List the edges of a pipeline in id order.
    pub fn list_edges(&self, pipeline: PipelineId) -> DbResult<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            r"SELECT DISTINCT e.id, e.slot_a, e.slot_b FROM edges e
              JOIN slots s ON s.id = e.slot_a
              JOIN nodes n ON n.id = s.node_id
              WHERE n.pipeline_id = ?
              ORDER BY e.id",
        )?;
        let edges = stmt
            .query_map([pipeline], |row| Ok(Edge { id: row.get(0)?, slot_a: row.get(1)?, slot_b: row.get(2)? }))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Load an edge together with the pipeline it belongs to.
    pub fn get_edge(&self, id: EdgeId) -> DbResult<(Edge, PipelineId)> {
        self.conn
            .query_row(
                r"SELECT e.id, e.slot_a, e.slot_b, n.pipeline_id FROM edges e
                  JOIN slots s ON s.id = e.slot_a
                  JOIN nodes n ON n.id = s.node_id
                  WHERE e.id = ?",
                [id],
                |row| Ok((Edge { id: row.get(0)?, slot_a: row.get(1)?, slot_b: row.get(2)? }, row.get(3)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("edge {id}")))
    }

    /// Connect two slots of the same pipeline.
    ///
    /// # Errors
    /// Returns [`DbError::InvalidReference`] if a slot does not exist or lies
    /// outside the pipeline, and [`DbError::Conflict`] if the slots are already
    /// connected in either order.
    pub fn create_edge(&self, pipeline: PipelineId, slot_a: SlotId, slot_b: SlotId) -> DbResult<Edge> {
        if slot_a == slot_b {
            return Err(DbError::InvalidReference("an edge needs two different slots".to_string()));
        }
        for slot in [slot_a, slot_b] {
            let owner: Option<PipelineId> = self
                .conn
                .query_row(
                    "SELECT n.pipeline_id FROM slots s JOIN nodes n ON n.id = s.node_id WHERE s.id = ?",
                    [slot],
                    |row| row.get(0),
                )
                .optional()?;
            if owner != Some(pipeline) {
                return Err(DbError::InvalidReference(format!("slot {slot} is not part of pipeline {pipeline}")));
            }
        }

        self.conn
            .execute("INSERT INTO edges (slot_a, slot_b) VALUES (?, ?)", params![slot_a, slot_b])
            .map_err(|e| {
                DbError::conflict_on_constraint(e, || format!("slots {slot_a} and {slot_b} are already connected"))
            })?;
        Ok(Edge { id: self.conn.last_insert_rowid(), slot_a, slot_b })
    }

    /// Find the edge joining two slots of a pipeline, in either orientation.
    ///
    /// # Errors
    /// Returns [`DbError::NotFound`] if the slots are not connected inside the
    /// pipeline.
    pub fn find_edge_between(&self, pipeline: PipelineId, slot_a: SlotId, slot_b: SlotId) -> DbResult<Edge> {
        self.conn
            .query_row(
                r"SELECT e.id, e.slot_a, e.slot_b FROM edges e
                  JOIN slots s ON s.id = e.slot_a
                  JOIN nodes n ON n.id = s.node_id
                  WHERE n.pipeline_id = ?1
                    AND ((e.slot_a = ?2 AND e.slot_b = ?3) OR (e.slot_a = ?3 AND e.slot_b = ?2))",
                params![pipeline, slot_a, slot_b],
                |row| Ok(Edge { id: row.get(0)?, slot_a: row.get(1)?, slot_b: row.get(2)? }),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("edge between slots {slot_a} and {slot_b}")))
    }

    /// Delete an edge.
    pub fn delete_edge(&self, id: EdgeId) -> DbResult<bool> {
        let deleted = self.conn.execute("DELETE FROM edges WHERE id = ?", [id])?;
        Ok(deleted > 0)
    }

    /// Load everything needed to build a pipeline's graph.
    pub fn load_snapshot(&self, pipeline: PipelineId) -> DbResult<PipelineSnapshot> {
        Ok(PipelineSnapshot {
            nodes: self.list_nodes(pipeline)?,
            slots: self.list_pipeline_slots(pipeline)?,
            edges: self.list_edges(pipeline)?,
        })
    }
}
