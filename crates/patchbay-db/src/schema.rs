//! Database schema definition.

/// Initial schema (version 1).
///
/// Timestamps are ISO-8601 UTC with milliseconds so that they sort as text.
pub const SCHEMA_V1: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Pipelines
CREATE TABLE IF NOT EXISTS pipelines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    active BOOLEAN NOT NULL DEFAULT FALSE,
    stale BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Pipeline nodes; config is a JSON object interpreted by the node type
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline_id INTEGER NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    type_tag TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_nodes_pipeline ON nodes(pipeline_id);

-- Node slots, reconciled from the node type's slot schema
CREATE TABLE IF NOT EXISTS slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    nice_name TEXT,
    kind TEXT NOT NULL,
    direction TEXT NOT NULL,
    UNIQUE(node_id, name)
);

-- Edges between two slots, stored undirected
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slot_a INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
    slot_b INTEGER NOT NULL REFERENCES slots(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(slot_a, slot_b),
    CHECK(slot_a <> slot_b)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_pair ON edges(min(slot_a, slot_b), max(slot_a, slot_b));

-- Apply/unapply attempts
CREATE TABLE IF NOT EXISTS apply_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline_id INTEGER NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
    direction TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'STARTED',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_jobs_pipeline ON apply_jobs(pipeline_id, created_at);

-- Append-only job audit trail
CREATE TABLE IF NOT EXISTS apply_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES apply_jobs(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    node_id INTEGER REFERENCES nodes(id) ON DELETE SET NULL,
    data TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_events_job ON apply_events(job_id, created_at);

-- Runtime state recorded by node managers between apply and unapply
CREATE TABLE IF NOT EXISTS node_state (
    node_id INTEGER PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Devices seen by backend discovery
CREATE TABLE IF NOT EXISTS known_devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    backend TEXT NOT NULL,
    name TEXT NOT NULL,
    nice_name TEXT NOT NULL,
    device_type TEXT NOT NULL,
    format TEXT NOT NULL,
    sample_rate INTEGER NOT NULL,
    channels INTEGER NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE(backend, name)
);
";


/// Backend preferences and node device references (version 2).
pub const SCHEMA_V2: &str = r"
-- Per-backend switch honoured by device discovery; a missing row means enabled
CREATE TABLE IF NOT EXISTS backend_preferences (
    name TEXT PRIMARY KEY,
    enabled BOOLEAN NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Catalog device a node is bound to; such a device cannot be removed
ALTER TABLE nodes ADD COLUMN device_id INTEGER REFERENCES known_devices(id) ON DELETE RESTRICT;

CREATE INDEX IF NOT EXISTS idx_nodes_device ON nodes(device_id);
";
