//! Fixtures shared by the daemon tests.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use patchbay_core::pipeline::PipelineId;
use patchbay_core::{BackendPlugin, ManagerRegistry};
use patchbay_db::Database;
use patchbay_pulse::device_node::DEVICE_NODE_TYPE;
use patchbay_pulse::pipe_node::PIPE_NODE_TYPE;
use patchbay_pulse::{ModuleHost, PactlEntry, PulsePlugin, PulseResult, SampleSpec};

/// In-process stand-in for a PulseAudio server.
#[derive(Default)]
pub struct FakeHost {
    sources: Vec<String>,
    sinks: Vec<String>,
    loaded: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn with_devices(sources: &[&str], sinks: &[&str]) -> Self {
        Self {
            sources: sources.iter().map(ToString::to_string).collect(),
            sinks: sinks.iter().map(ToString::to_string).collect(),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Names of the modules loaded so far.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

fn entries(names: &[String]) -> Vec<PactlEntry> {
    names
        .iter()
        .zip(0..)
        .map(|(name, index)| PactlEntry {
            index,
            name: name.clone(),
            driver: "module-null-sink.c".into(),
            sample_spec: SampleSpec { format: "s16le".into(), channels: 2, rate: 48000 },
            state: "IDLE".into(),
        })
        .collect()
}

impl ModuleHost for FakeHost {
    fn list_sources(&self) -> PulseResult<Vec<PactlEntry>> {
        Ok(entries(&self.sources))
    }

    fn list_sinks(&self) -> PulseResult<Vec<PactlEntry>> {
        Ok(entries(&self.sinks))
    }

    fn load_module(&self, name: &str, _args: &[String]) -> PulseResult<u32> {
        let mut loaded = self.loaded.lock();
        loaded.push(name.to_string());
        Ok(u32::try_from(loaded.len()).unwrap())
    }

    fn unload_module(&self, _index: u32) -> PulseResult<()> {
        Ok(())
    }
}

pub fn registry(host: &Arc<FakeHost>) -> ManagerRegistry {
    let mut registry = ManagerRegistry::new();
    PulsePlugin::new(Arc::clone(host) as Arc<dyn ModuleHost>)
        .register(&mut registry)
        .expect("Failed to register plugin");
    registry
}

fn config(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("Node config must be an object"),
    }
}

/// Store `mic -> pipe -> speakers` and return the pipeline id.
pub fn loopback_pipeline(db: &Database, registry: &ManagerRegistry) -> PipelineId {
    let pipeline = db.create_pipeline("studio", "", true).expect("Failed to create pipeline");
    let mut slots = Vec::new();
    for (tag, cfg) in [
        (DEVICE_NODE_TYPE, json!({ "device": "mic", "direction": "capture" })),
        (PIPE_NODE_TYPE, json!({})),
        (DEVICE_NODE_TYPE, json!({ "device": "speakers", "direction": "playback" })),
    ] {
        let node = db.create_node(pipeline.id, tag, &config(cfg)).expect("Failed to create node");
        let (_, manager) = registry.manager_for(&node).expect("Failed to build manager");
        slots.extend(db.reconcile_slots(node.id, &manager.slot_schematics()).expect("Failed to reconcile slots"));
    }

    let id = |name: &str| slots.iter().find(|s| s.name == name).map(|s| s.id).expect("Slot missing");
    db.create_edge(pipeline.id, id("mic"), id("Input")).expect("Failed to create edge");
    db.create_edge(pipeline.id, id("Output"), id("speakers")).expect("Failed to create edge");
    pipeline.id
}
