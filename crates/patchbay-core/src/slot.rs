//! Slots: named, typed attachment points on a node.
//!
//! Slots are not edited directly. A node manager computes the slot schema from
//! the node's configuration and the stored rows are reconciled against it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::NodeId;

pub type SlotId = i64;

/// What flows through a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotKind {
    /// A playback device: audio can only go into it
    DeviceAudioOutput,
    /// A capture device: audio can only come out of it
    DeviceAudioInput,
    /// A processing input
    AudioConsumer,
    /// A processing output
    AudioProducer,
}

impl SlotKind {
    /// Stable storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceAudioOutput => "DEVICE_AUDIO_OUTPUT",
            Self::DeviceAudioInput => "DEVICE_AUDIO_INPUT",
            Self::AudioConsumer => "AUDIO_CONSUMER",
            Self::AudioProducer => "AUDIO_PRODUCER",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DEVICE_AUDIO_OUTPUT" => Some(Self::DeviceAudioOutput),
            "DEVICE_AUDIO_INPUT" => Some(Self::DeviceAudioInput),
            "AUDIO_CONSUMER" => Some(Self::AudioConsumer),
            "AUDIO_PRODUCER" => Some(Self::AudioProducer),
            _ => None,
        }
    }
}

/// Which way audio may cross a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotDirection {
    Input,
    Output,
    All,
}

impl SlotDirection {
    /// Stable storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::All => "ALL",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INPUT" => Some(Self::Input),
            "OUTPUT" => Some(Self::Output),
            "ALL" => Some(Self::All),
            _ => None,
        }
    }

    fn can_emit(self) -> bool {
        self != Self::Input
    }

    fn can_receive(self) -> bool {
        self != Self::Output
    }
}

/// A slot as computed by a node manager, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSchematic {
    /// Unique within the node
    pub name: String,
    /// Display name
    pub nice_name: Option<String>,
    pub kind: SlotKind,
    pub direction: SlotDirection,
}

impl SlotSchematic {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SlotKind, direction: SlotDirection) -> Self {
        Self { name: name.into(), nice_name: None, kind, direction }
    }
}

/// A stored slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub node_id: NodeId,
    pub name: String,
    pub nice_name: Option<String>,
    pub kind: SlotKind,
    pub direction: SlotDirection,
}

/// Changes needed to bring a node's stored slots in line with its schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPlan {
    /// Schema entries with no stored slot of the same name
    pub create: Vec<SlotSchematic>,
    /// Stored slots whose name left the schema
    pub delete: Vec<SlotId>,
}

impl SlotPlan {
    /// Whether the stored slots already match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Diff a freshly computed slot schema against the stored slots, keyed by name.
///
/// Slots present on both sides are kept as they are so that edges referencing
/// them by id stay valid.
///
/// # Errors
/// Returns [`Error::DuplicateSlotName`] if the schema names a slot twice.
pub fn plan_reconciliation(schema: &[SlotSchematic], stored: &[Slot]) -> Result<SlotPlan> {
    let mut wanted = HashSet::with_capacity(schema.len());
    for slot in schema {
        if !wanted.insert(slot.name.as_str()) {
            return Err(Error::DuplicateSlotName(slot.name.clone()));
        }
    }

    let existing: HashMap<&str, SlotId> = stored.iter().map(|s| (s.name.as_str(), s.id)).collect();

    Ok(SlotPlan {
        create: schema.iter().filter(|s| !existing.contains_key(s.name.as_str())).cloned().collect(),
        delete: stored.iter().filter(|s| !wanted.contains(s.name.as_str())).map(|s| s.id).collect(),
    })
}

/// Decide which of an edge's two slots is the source.
///
/// Keeps `a -> b` unless `a` cannot emit or `b` cannot receive while the
/// reversed orientation is legal. Edges that are illegal both ways keep their
/// stored orientation and are reported by validation.
#[must_use]
pub fn orient<'a>(a: &'a Slot, b: &'a Slot) -> (&'a Slot, &'a Slot) {
    let forward = a.direction.can_emit() && b.direction.can_receive();
    let backward = b.direction.can_emit() && a.direction.can_receive();
    if !forward && backward { (b, a) } else { (a, b) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn stored(id: SlotId, name: &str, kind: SlotKind, direction: SlotDirection) -> Slot {
        Slot { id, node_id: 1, name: name.into(), nice_name: None, kind, direction }
    }

    #[test]
    fn test_plan_creates_and_deletes_by_name() {
        let schema = vec![
            SlotSchematic::new("Input", SlotKind::AudioConsumer, SlotDirection::Input),
            SlotSchematic::new("Output", SlotKind::AudioProducer, SlotDirection::Output),
        ];
        let existing = vec![
            stored(10, "Input", SlotKind::AudioConsumer, SlotDirection::Input),
            stored(11, "old-sink", SlotKind::DeviceAudioOutput, SlotDirection::Input),
        ];

        let plan = plan_reconciliation(&schema, &existing).unwrap();
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].name, "Output");
        assert_eq!(plan.delete, vec![11]);
    }

    #[test]
    fn test_plan_is_empty_when_names_match() {
        let schema = vec![SlotSchematic::new("mic", SlotKind::DeviceAudioInput, SlotDirection::Output)];
        let existing = vec![stored(4, "mic", SlotKind::DeviceAudioInput, SlotDirection::Output)];

        assert!(plan_reconciliation(&schema, &existing).unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_duplicate_names() {
        let schema = vec![
            SlotSchematic::new("x", SlotKind::AudioConsumer, SlotDirection::Input),
            SlotSchematic::new("x", SlotKind::AudioProducer, SlotDirection::Output),
        ];
        assert_matches!(plan_reconciliation(&schema, &[]), Err(Error::DuplicateSlotName(name)) if name == "x");
    }

    #[test]
    fn test_orient_keeps_legal_orientation() {
        let out = stored(1, "Output", SlotKind::AudioProducer, SlotDirection::Output);
        let sink = stored(2, "speakers", SlotKind::DeviceAudioOutput, SlotDirection::Input);
        let (from, to) = orient(&out, &sink);
        assert_eq!((from.id, to.id), (1, 2));
    }

    #[test]
    fn test_orient_swaps_reversed_edge() {
        let sink = stored(2, "speakers", SlotKind::DeviceAudioOutput, SlotDirection::Input);
        let out = stored(1, "Output", SlotKind::AudioProducer, SlotDirection::Output);
        let (from, to) = orient(&sink, &out);
        assert_eq!((from.id, to.id), (1, 2));
    }

    #[test]
    fn test_orient_leaves_illegal_edge_alone() {
        let a = stored(1, "a", SlotKind::DeviceAudioOutput, SlotDirection::Input);
        let b = stored(2, "b", SlotKind::AudioConsumer, SlotDirection::Input);
        let (from, to) = orient(&a, &b);
        assert_eq!((from.id, to.id), (1, 2));
    }

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in [
            SlotKind::DeviceAudioOutput,
            SlotKind::DeviceAudioInput,
            SlotKind::AudioConsumer,
            SlotKind::AudioProducer,
        ] {
            assert_eq!(SlotKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SlotKind::parse("bogus"), None);
    }
}
