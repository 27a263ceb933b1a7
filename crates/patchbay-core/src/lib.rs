//! Patchbay Core - Pipeline graph, validation and the apply orchestrator.
//!
//! This crate contains the domain model shared by the daemon, the store and the
//! backend plugins: pipelines as directed graphs of typed nodes, the node
//! manager contract backends implement, and the job state machine that applies
//! a pipeline to the live audio system.

pub mod apply;
pub mod device;
pub mod error;
pub mod graph;
pub mod job;
pub mod manager;
pub mod memory;
pub mod pipeline;
pub mod pipeline_graph;
pub mod registry;
pub mod schema;
pub mod slot;
pub mod validation;

#[cfg(test)]
mod testing;

pub use apply::{ApplyLedger, Orchestrator, OrchestratorOptions, apply_order};
pub use device::{AudioBackend, AudioDevice, DeviceType, KnownDevice};
pub use error::{Error, Result};
pub use graph::{Graph, NodeIndex};
pub use job::{ApplyDirection, ApplyEvent, ApplyJob, EventData, EventType, JobStatus, NewEvent};
pub use manager::{ApplyContext, DeviceHandle, NodeManager, NodeManagerFactory, NodeStateStore, SlotData};
pub use pipeline::{Edge, Node, NodeRole, Pipeline, PipelineFlags, PipelineSnapshot};
pub use pipeline_graph::{PipelineGraph, build_graph};
pub use registry::{BackendPlugin, ManagerRegistry};
pub use schema::{FieldDescriptor, FieldType, NodeSchema};
pub use slot::{Slot, SlotDirection, SlotKind, SlotPlan, SlotSchematic, plan_reconciliation};
pub use validation::{NodeValidation, ValidationResult, validate, validate_structure};
