// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and wires.
//!
//! All mutation goes through [`Graph`] so that cascade deletion, connection
//! legality and the version counter are enforced in one place.

use crate::executor::ExecutionReport;
use crate::node::{shape_len, Activation, Node, NodeId, NodeKind};
use crate::ops::TensorOperation;
use crate::slot::Slot;
use crate::wire::{Wire, WireId, WireRoute};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A neuron graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Nodes in the graph, including groups
    nodes: IndexMap<NodeId, Node>,
    /// Wires between nodes
    wires: IndexMap<WireId, Wire>,
    /// Bumped on every edit
    version: u64,
}

/// What was removed along with a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRemoval {
    /// The removed node
    pub node: Node,
    /// Position of the node in insertion order
    pub index: usize,
    /// Wires that referenced it, with their positions in connection order
    pub wires: Vec<(usize, Wire)>,
    /// Members detached from it, when it was a group
    pub detached: Vec<NodeId>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            wires: IndexMap::new(),
            version: 0,
        }
    }

    /// Monotonic edit counter
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node to the graph
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if let Some(parent) = node.parent {
            self.require_group(parent)?;
            if node.kind.is_group() {
                return Err(GraphError::NestedGroup(node.id));
            }
        }

        let id = node.id;
        tracing::debug!("Adding {} node {}", node.kind.type_name(), id);
        self.nodes.insert(id, node);
        self.touch();
        Ok(id)
    }

    /// Remove a node and every wire that references it
    ///
    /// Removing a group detaches its members instead of deleting them.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<NodeRemoval> {
        let (index, _, node) = self.nodes.shift_remove_full(&node_id)?;

        let positions: Vec<usize> = self
            .wires
            .values()
            .enumerate()
            .filter(|(_, w)| w.involves_node(node_id))
            .map(|(i, _)| i)
            .collect();
        let mut wires = Vec::with_capacity(positions.len());
        for &position in positions.iter().rev() {
            if let Some((_, wire)) = self.wires.shift_remove_index(position) {
                wires.push((position, wire));
            }
        }
        wires.reverse();

        let mut detached = Vec::new();
        if node.kind.is_group() {
            for member in self.nodes.values_mut() {
                if member.parent == Some(node_id) {
                    member.parent = None;
                    detached.push(member.id);
                }
            }
        }

        tracing::debug!(
            "Removed node {} ({} wires, {} members detached)",
            node_id,
            wires.len(),
            detached.len()
        );
        self.touch();
        Some(NodeRemoval {
            node,
            index,
            wires,
            detached,
        })
    }

    /// Put back a node removed by [`Graph::remove_node`] at its old position
    pub(crate) fn restore_node(&mut self, removal: NodeRemoval) {
        let group_id = removal.node.id;
        let index = removal.index.min(self.nodes.len());
        self.nodes.shift_insert(index, group_id, removal.node);
        for member in removal.detached {
            if let Some(node) = self.nodes.get_mut(&member) {
                node.parent = Some(group_id);
            }
        }
        // Ascending positions, so each insert lands where it was.
        for (position, wire) in removal.wires {
            let position = position.min(self.wires.len());
            self.wires.shift_insert(position, wire.id, wire);
        }
        self.touch();
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    fn require_group(&self, group: NodeId) -> Result<(), GraphError> {
        match self.nodes.get(&group) {
            Some(node) if node.kind.is_group() => Ok(()),
            Some(_) => Err(GraphError::NotAGroup(group)),
            None => Err(GraphError::NodeNotFound(group)),
        }
    }

    /// All group containers, in insertion order
    pub fn groups(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.kind.is_group())
    }

    /// Members of a group ordered top to bottom
    ///
    /// Ties keep insertion order.
    pub fn members(&self, group: NodeId) -> Vec<&Node> {
        let mut members: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.parent == Some(group))
            .collect();
        members.sort_by(|a, b| a.position[1].total_cmp(&b.position[1]));
        members
    }

    /// Move a node into a group, or out of any group with `None`
    ///
    /// Returns the previous group.
    pub fn set_parent(
        &mut self,
        node_id: NodeId,
        group: Option<NodeId>,
    ) -> Result<Option<NodeId>, GraphError> {
        if let Some(group) = group {
            self.require_group(group)?;
        }
        let node = self.node_mut(node_id)?;
        if node.kind.is_group() && group.is_some() {
            return Err(GraphError::NestedGroup(node_id));
        }
        let previous = std::mem::replace(&mut node.parent, group);
        self.touch();
        Ok(previous)
    }

    // ------------------------------------------------------------------
    // Node updates
    // ------------------------------------------------------------------

    /// Rename a node
    pub fn rename(&mut self, node_id: NodeId, label: impl Into<String>) -> Result<(), GraphError> {
        self.node_mut(node_id)?.label = label.into();
        self.touch();
        Ok(())
    }

    /// Move a node on the editing surface
    pub fn move_node(&mut self, node_id: NodeId, x: f32, y: f32) -> Result<(), GraphError> {
        self.node_mut(node_id)?.position = [x, y];
        self.touch();
        Ok(())
    }

    /// Set the external value of an input node
    pub fn set_input_value(&mut self, node_id: NodeId, value: f64) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        if !matches!(node.kind, NodeKind::Input) {
            return Err(GraphError::wrong_kind(node, "input"));
        }
        node.output = vec![value];
        self.touch();
        Ok(())
    }

    /// Set the stored threshold of a threshold unit
    pub fn set_threshold(&mut self, node_id: NodeId, threshold: f64) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::ThresholdUnit(unit) = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "threshold unit"));
        };
        unit.bias = threshold;
        self.touch();
        Ok(())
    }

    /// Set the activation of a threshold unit
    pub fn set_activation(&mut self, node_id: NodeId, activation: Activation) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::ThresholdUnit(unit) = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "threshold unit"));
        };
        unit.activation = activation;
        self.touch();
        Ok(())
    }

    /// Resize a pixel grid; all cells are cleared
    ///
    /// Wires addressing cells beyond the new size are removed and returned.
    pub fn resize_pixel_grid(
        &mut self,
        node_id: NodeId,
        width: usize,
        height: usize,
    ) -> Result<Vec<Wire>, GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::PixelGrid { width: w, height: h } = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "pixel-grid"));
        };
        *w = width;
        *h = height;
        node.output = vec![0.0; width * height];

        let len = width * height;
        let mut dropped = Vec::new();
        self.wires.retain(|_, wire| {
            let stale = matches!(wire.target_slot, Slot::Cell(i) if wire.target == node_id && i >= len)
                || matches!(wire.source_slot, Slot::Cell(i) if wire.source == node_id && i >= len);
            if stale {
                dropped.push(wire.clone());
            }
            !stale
        });
        self.touch();
        Ok(dropped)
    }

    /// Set one pixel cell
    pub fn set_pixel(&mut self, node_id: NodeId, cell: usize, on: bool) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        if !matches!(node.kind, NodeKind::PixelGrid { .. }) {
            return Err(GraphError::wrong_kind(node, "pixel-grid"));
        }
        let len = node.output.len();
        let slot = node
            .output
            .get_mut(cell)
            .ok_or(GraphError::IndexOutOfRange { index: cell, len })?;
        *slot = if on { 1.0 } else { 0.0 };
        self.touch();
        Ok(())
    }

    /// Replace a tensor's shape, keeping values up to the new size
    ///
    /// Wires addressing elements beyond the new size are removed and returned.
    pub fn set_tensor_shape(&mut self, node_id: NodeId, shape: Vec<usize>) -> Result<Vec<Wire>, GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::Tensor { shape: current } = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "tensor"));
        };
        if shape.contains(&0) {
            return Err(GraphError::InvalidShape(shape));
        }
        let len = shape_len(&shape);
        *current = shape;
        node.output.resize(len, 0.0);

        let dropped = self.drop_stale_elements(node_id, len);
        self.touch();
        Ok(dropped)
    }

    /// Change a tensor's rank, padding new axes with 1 or dropping trailing axes
    ///
    /// Wires addressing elements beyond the new size are removed and returned.
    pub fn set_tensor_order(&mut self, node_id: NodeId, order: usize) -> Result<Vec<Wire>, GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::Tensor { shape } = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "tensor"));
        };
        shape.resize(order, 1);
        let len = shape_len(shape);
        node.output.resize(len, 0.0);

        let dropped = self.drop_stale_elements(node_id, len);
        self.touch();
        Ok(dropped)
    }

    fn drop_stale_elements(&mut self, node_id: NodeId, len: usize) -> Vec<Wire> {
        let mut dropped = Vec::new();
        self.wires.retain(|_, wire| {
            let stale = matches!(wire.target_slot, Slot::Element(i) if wire.target == node_id && i >= len)
                || matches!(wire.source_slot, Slot::Element(i) if wire.source == node_id && i >= len);
            if stale {
                dropped.push(wire.clone());
            }
            !stale
        });
        if !dropped.is_empty() {
            tracing::debug!("Dropped {} wires past element {} of {}", dropped.len(), len, node_id);
        }
        dropped
    }

    /// Overwrite all tensor values
    pub fn set_tensor_values(&mut self, node_id: NodeId, values: Vec<f64>) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::Tensor { shape } = &node.kind else {
            return Err(GraphError::wrong_kind(node, "tensor"));
        };
        let len = shape_len(shape);
        if values.len() != len {
            return Err(GraphError::ValueCountMismatch {
                expected: len,
                found: values.len(),
            });
        }
        node.output = values;
        self.touch();
        Ok(())
    }

    /// Select the operation of a tensor-op node
    pub fn set_operation(&mut self, node_id: NodeId, operation: TensorOperation) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::TensorOp(op) = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "tensor-op"));
        };
        op.operation = operation;
        self.touch();
        Ok(())
    }

    /// Set the axis and reshape target of a tensor-op node
    pub fn set_op_parameters(
        &mut self,
        node_id: NodeId,
        axis: Option<usize>,
        target_shape: Option<Vec<usize>>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        let NodeKind::TensorOp(op) = &mut node.kind else {
            return Err(GraphError::wrong_kind(node, "tensor-op"));
        };
        op.axis = axis;
        op.target_shape = target_shape;
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wires
    // ------------------------------------------------------------------

    /// Check a wire against the connection rules without adding it
    pub fn check_wire(&self, wire: &Wire) -> Result<(), ConnectionError> {
        self.check_endpoints(wire)?;

        let output_taken = self.nodes.get(&wire.target).is_some_and(|n| matches!(n.kind, NodeKind::Output))
            && self.wires.values().any(|w| w.target == wire.target);
        if output_taken {
            return Err(ConnectionError::OutputAlreadyConnected(wire.target));
        }

        if self.find_route(&wire.route()).is_some() {
            return Err(ConnectionError::DuplicateWire);
        }
        Ok(())
    }

    /// Check the kind and slot rules for a wire, ignoring existing wires
    pub fn check_endpoints(&self, wire: &Wire) -> Result<(), ConnectionError> {
        let source = self
            .nodes
            .get(&wire.source)
            .ok_or(ConnectionError::NodeNotFound(wire.source))?;
        let target = self
            .nodes
            .get(&wire.target)
            .ok_or(ConnectionError::NodeNotFound(wire.target))?;

        if wire.source == wire.target {
            return Err(ConnectionError::SelfLoop);
        }

        let group_endpoint = source.kind.is_group() || target.kind.is_group();
        let group_slot = wire.source_slot.is_group_slot() || wire.target_slot.is_group_slot();
        if group_endpoint || group_slot {
            let legal = source.kind.is_group()
                && target.kind.is_group()
                && wire.source_slot == Slot::GroupOut
                && wire.target_slot == Slot::GroupIn;
            if !legal {
                return Err(ConnectionError::GroupEndpoint);
            }
            return Ok(());
        }

        match wire.source_slot {
            Slot::Bias => return Err(ConnectionError::InvalidSourceSlot(wire.source_slot)),
            Slot::Cell(_) if !matches!(source.kind, NodeKind::PixelGrid { .. }) => {
                return Err(ConnectionError::InvalidSourceSlot(wire.source_slot));
            }
            _ => {}
        }

        if wire.target_slot == Slot::Bias {
            if !matches!(source.kind, NodeKind::Bias) {
                return Err(ConnectionError::BiasSlotRequiresBiasSource);
            }
            if !matches!(target.kind, NodeKind::ThresholdUnit(_)) {
                return Err(ConnectionError::NoBiasSlot(target.id));
            }
        }

        if matches!(source.kind, NodeKind::Bias) && wire.target_slot == Slot::Plain {
            return Err(ConnectionError::BiasSourceToPlainInput);
        }

        match &target.kind {
            NodeKind::Input | NodeKind::Bias => {
                return Err(ConnectionError::NotATarget(target.kind.type_name()));
            }
            NodeKind::PixelGrid { width, height } => {
                let Slot::Cell(cell) = wire.target_slot else {
                    return Err(ConnectionError::PixelTargetRequiresCell);
                };
                let len = width * height;
                if cell >= len {
                    return Err(ConnectionError::IndexOutOfRange { index: cell, len });
                }
            }
            NodeKind::Tensor { shape } => {
                if let Slot::Element(index) = wire.target_slot {
                    let len = shape_len(shape);
                    if index >= len {
                        return Err(ConnectionError::IndexOutOfRange { index, len });
                    }
                }
            }
            NodeKind::Output | NodeKind::ThresholdUnit(_) | NodeKind::TensorOp(_) | NodeKind::Group => {}
        }

        match wire.target_slot {
            Slot::Cell(_) if !matches!(target.kind, NodeKind::PixelGrid { .. }) => {
                return Err(ConnectionError::UnaddressableTarget(target.kind.type_name()));
            }
            Slot::Element(_) if !target.kind.is_tensor_like() => {
                return Err(ConnectionError::UnaddressableTarget(target.kind.type_name()));
            }
            _ => {}
        }

        Ok(())
    }

    /// Add a wire after validating it
    pub fn connect(&mut self, wire: Wire) -> Result<WireId, ConnectionError> {
        self.check_wire(&wire)?;
        let id = wire.id;
        tracing::debug!(
            "Connecting {}:{} -> {}:{}",
            wire.source,
            wire.source_slot,
            wire.target,
            wire.target_slot
        );
        self.wires.insert(id, wire);
        self.touch();
        Ok(id)
    }

    /// Put back a wire that was previously validated
    pub(crate) fn restore_wire(&mut self, wire: Wire) {
        self.wires.insert(wire.id, wire);
        self.touch();
    }

    /// Remove a wire
    pub fn disconnect(&mut self, wire_id: WireId) -> Option<Wire> {
        let wire = self.wires.shift_remove(&wire_id)?;
        self.touch();
        Some(wire)
    }

    /// Change a wire's weight, returning the previous one
    pub fn set_wire_weight(&mut self, wire_id: WireId, weight: f64) -> Result<f64, GraphError> {
        let wire = self
            .wires
            .get_mut(&wire_id)
            .ok_or(GraphError::WireNotFound(wire_id))?;
        let previous = std::mem::replace(&mut wire.weight, weight);
        self.touch();
        Ok(previous)
    }

    /// Get a wire by ID
    pub fn wire(&self, wire_id: WireId) -> Option<&Wire> {
        self.wires.get(&wire_id)
    }

    /// Get all wires
    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    /// Wires entering a node, in connection order
    pub fn wires_into(&self, node_id: NodeId) -> impl Iterator<Item = &Wire> {
        self.wires.values().filter(move |w| w.target == node_id)
    }

    /// Wires leaving a node, in connection order
    pub fn wires_from(&self, node_id: NodeId) -> impl Iterator<Item = &Wire> {
        self.wires.values().filter(move |w| w.source == node_id)
    }

    /// Wire with the given endpoints and slots
    pub fn find_route(&self, route: &WireRoute) -> Option<&Wire> {
        self.wires.values().find(|w| w.route() == *route)
    }

    /// Get the number of wires
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    // ------------------------------------------------------------------
    // Execution results
    // ------------------------------------------------------------------

    /// Merge an execution report into the live nodes
    ///
    /// Nodes that no longer exist, or whose declared size changed since the
    /// snapshot was taken, are skipped. Stored thresholds are configuration
    /// and are never overwritten. Merging does not bump the version, since
    /// it never changes wiring or configuration.
    pub fn apply_report(&mut self, report: &ExecutionReport) -> usize {
        let mut updated = 0;
        for (id, output) in &report.outputs {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            if let Some(len) = node.kind.declared_len() {
                if output.len() != len {
                    tracing::debug!(
                        "Skipping stale output for {}: {} values, {} declared",
                        id,
                        output.len(),
                        len
                    );
                    continue;
                }
            }
            node.output.clone_from(output);

            if let Some(shape) = report.shapes.get(id) {
                if let NodeKind::TensorOp(op) = &mut node.kind {
                    op.shape.clone_from(shape);
                }
            }

            if let NodeKind::ThresholdUnit(unit) = &mut node.kind {
                if let Some(net) = report.net_inputs.get(id) {
                    unit.net_input = *net;
                }
            }
            updated += 1;
        }
        updated
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when creating a wire
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Groups connect only group-out to group-in, and only to other groups
    #[error("Groups can only be wired group-out to group-in")]
    GroupEndpoint,

    /// Slot cannot be used on the source side
    #[error("Invalid source slot: {0}")]
    InvalidSourceSlot(Slot),

    /// Only bias nodes may feed a bias slot
    #[error("Bias slot only accepts bias sources")]
    BiasSlotRequiresBiasSource,

    /// Target has no bias slot
    #[error("Node has no bias slot: {0}")]
    NoBiasSlot(NodeId),

    /// Bias sources must use the bias slot
    #[error("Bias sources cannot feed a plain input")]
    BiasSourceToPlainInput,

    /// Node kind never receives wires
    #[error("Node of type {0} cannot be a wire target")]
    NotATarget(&'static str),

    /// Pixel grids are only addressable by cell
    #[error("Pixel grid targets require a cell slot")]
    PixelTargetRequiresCell,

    /// Slot addresses an element the target does not expose
    #[error("Node of type {0} is not addressable by index")]
    UnaddressableTarget(&'static str),

    /// Address beyond the node's elements
    #[error("Index {index} out of range for {len} elements")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Element count
        len: usize,
    },

    /// Output node already has its single wire
    #[error("Output already connected: {0}")]
    OutputAlreadyConnected(NodeId),

    /// Identical wire already exists
    #[error("Wire already exists")]
    DuplicateWire,
}

/// Error from a graph edit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Wire not found
    #[error("Wire not found: {0}")]
    WireNotFound(WireId),

    /// Node ID already in use
    #[error("Duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// Node is not a group
    #[error("Not a group: {0}")]
    NotAGroup(NodeId),

    /// Groups cannot be members of groups
    #[error("Groups cannot be nested: {0}")]
    NestedGroup(NodeId),

    /// Operation does not apply to this node kind
    #[error("Node {node} is {found}, expected {expected}")]
    WrongKind {
        /// Node being edited
        node: NodeId,
        /// Kind the operation needs
        expected: &'static str,
        /// Kind the node has
        found: &'static str,
    },

    /// Shape has a zero dimension
    #[error("Invalid shape: {0:?}")]
    InvalidShape(Vec<usize>),

    /// Value count does not match the declared element count
    #[error("Expected {expected} values, got {found}")]
    ValueCountMismatch {
        /// Declared element count
        expected: usize,
        /// Supplied value count
        found: usize,
    },

    /// Address beyond the node's elements
    #[error("Index {index} out of range for {len} elements")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Element count
        len: usize,
    },

    /// Wire rejected
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl GraphError {
    fn wrong_kind(node: &Node, expected: &'static str) -> Self {
        Self::WrongKind {
            node: node.id,
            expected,
            found: node.kind.type_name(),
        }
    }
}
