// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire (synapse) definitions for the graph.

use crate::node::NodeId;
use crate::slot::Slot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireId(pub Uuid);

impl WireId {
    /// Create a new random wire ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WireId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A directed, weighted connection between two node slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    /// Unique wire ID
    pub id: WireId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    /// Multiplier applied to the source value where the target uses weights
    pub weight: f64,
    /// Where the wire leaves the source
    pub source_slot: Slot,
    /// Where the wire enters the target
    pub target_slot: Slot,
}

impl Wire {
    /// Create a plain-to-plain wire with weight 1
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: WireId::new(),
            source,
            target,
            weight: 1.0,
            source_slot: Slot::Plain,
            target_slot: Slot::Plain,
        }
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the source slot
    pub fn from_slot(mut self, slot: Slot) -> Self {
        self.source_slot = slot;
        self
    }

    /// Set the target slot
    pub fn to_slot(mut self, slot: Slot) -> Self {
        self.target_slot = slot;
        self
    }

    /// Flat element read from the source, if addressed
    pub fn source_index(&self) -> Option<usize> {
        self.source_slot.index()
    }

    /// Flat element written on the target, if addressed
    pub fn target_index(&self) -> Option<usize> {
        self.target_slot.index()
    }

    /// Check if this wire involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Same endpoints and slots, ignoring id and weight
    pub fn same_route(&self, other: &Wire) -> bool {
        self.route() == other.route()
    }

    /// Endpoint tuple used for equivalence checks
    pub fn route(&self) -> WireRoute {
        WireRoute {
            source: self.source,
            source_slot: self.source_slot,
            target: self.target,
            target_slot: self.target_slot,
        }
    }
}

/// Endpoints and slots of a wire, without identity or weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireRoute {
    /// Source node
    pub source: NodeId,
    /// Source slot
    pub source_slot: Slot,
    /// Target node
    pub target: NodeId,
    /// Target slot
    pub target_slot: Slot,
}

impl WireRoute {
    /// Materialise the route as a new wire
    pub fn to_wire(self, weight: f64) -> Wire {
        Wire::new(self.source, self.target)
            .from_slot(self.source_slot)
            .to_slot(self.target_slot)
            .with_weight(weight)
    }
}
