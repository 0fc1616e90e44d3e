// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON messages exchanged with an executor process.
//!
//! Requests carry node and edge records keyed by caller-chosen string ids.
//! [`IdMap`] ties those strings to [`NodeId`]s for the duration of one request
//! so results can be reported back under the caller's ids.

use crate::executor::{ExecutionReport, Snapshot};
use crate::node::{Activation, Node, NodeId, NodeKind, TensorOp, ThresholdUnit, ThresholdVariant};
use crate::ops::{OpFamily, TensorOperation};
use crate::slot::Slot;
use crate::wire::{Wire, WireId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request sent to an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerRequest {
    /// Run one forward pass
    #[serde(rename = "EXECUTE")]
    Execute {
        /// Node records
        nodes: Vec<NodeData>,
        /// Edge records
        edges: Vec<EdgeData>,
    },
}

/// Reply from an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    /// Results of a forward pass
    #[serde(rename = "EXECUTE_RESULT", rename_all = "camelCase")]
    ExecuteResult {
        /// Output values by node id
        outputs: IndexMap<String, Vec<f64>>,
        /// Shapes of tensor nodes by node id
        shapes: IndexMap<String, Vec<usize>>,
        /// Raw weighted sums of threshold units
        #[serde(default)]
        net_inputs: IndexMap<String, f64>,
        /// Thresholds in effect for threshold units
        #[serde(default)]
        thresholds: IndexMap<String, f64>,
        /// Nodes skipped because of cycles
        #[serde(default)]
        unevaluated: Vec<String>,
    },
    /// The request could not be executed
    #[serde(rename = "EXECUTE_FAILED")]
    ExecuteFailed {
        /// Human-readable cause
        reason: String,
    },
}

/// Node record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Caller id
    pub id: String,
    /// Node type name
    #[serde(rename = "type")]
    pub node_type: String,
    /// Current flat output
    #[serde(default)]
    pub output: Vec<f64>,
    /// Tensor shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,
    /// Tensor rank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
    /// Pixel grid width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    /// Pixel grid height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,
    /// Operator name for tensor-op nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    /// Stored threshold for threshold units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<f64>,
    /// Perceptron activation name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_fn: Option<String>,
    /// Axis for structural operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<usize>,
    /// Reshape target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_shape: Option<Vec<usize>>,
}

/// Edge record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    /// Caller id
    pub id: String,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Weight
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Flat element read from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<usize>,
    /// Flat element written on a tensor target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<usize>,
    /// Named target slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Error converting between protocol records and engine types
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Node type not recognised
    #[error("Unknown node type '{node_type}' for node {id}")]
    UnknownNodeType {
        /// Node id
        id: String,
        /// Offending type
        node_type: String,
    },

    /// Operator name not valid for the node's family
    #[error("Unknown operation '{name}' for node {id}")]
    UnknownOperation {
        /// Node id
        id: String,
        /// Offending name
        name: String,
    },

    /// Activation name not recognised
    #[error("Unknown activation '{name}' for node {id}")]
    UnknownActivation {
        /// Node id
        id: String,
        /// Offending name
        name: String,
    },

    /// Required field missing
    #[error("Node {id} is missing '{field}'")]
    MissingField {
        /// Node id
        id: String,
        /// Field name
        field: &'static str,
    },

    /// Same id used for two nodes
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// Edge endpoint not among the nodes
    #[error("Edge {edge} references unknown node {node}")]
    UnknownNode {
        /// Edge id
        edge: String,
        /// Missing node id
        node: String,
    },

    /// Target handle not recognised
    #[error("Edge {edge} has invalid target handle '{handle}'")]
    InvalidHandle {
        /// Edge id
        edge: String,
        /// Offending handle
        handle: String,
    },
}

/// Mapping between caller ids and node ids for one request
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    ids: IndexMap<String, NodeId>,
    names: IndexMap<NodeId, String>,
}

impl IdMap {
    fn insert(&mut self, name: &str) -> Result<NodeId, ProtocolError> {
        if self.ids.contains_key(name) {
            return Err(ProtocolError::DuplicateNode(name.to_string()));
        }
        let id = Uuid::parse_str(name).map(NodeId).unwrap_or_default();
        self.ids.insert(name.to_string(), id);
        self.names.insert(id, name.to_string());
        Ok(id)
    }

    /// Node id for a caller id
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    /// Caller id for a node id
    pub fn name(&self, id: NodeId) -> String {
        self.names.get(&id).cloned().unwrap_or_else(|| id.to_string())
    }
}

impl WorkerRequest {
    /// Parse one JSON message
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to one JSON line
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build a request from a snapshot, keyed by node UUIDs
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::Execute {
            nodes: snapshot.nodes.iter().map(NodeData::from).collect(),
            edges: snapshot.wires.iter().map(EdgeData::from).collect(),
        }
    }

    /// Convert into an executable snapshot
    pub fn into_snapshot(self) -> Result<(Snapshot, IdMap), ProtocolError> {
        let Self::Execute { nodes, edges } = self;

        let mut ids = IdMap::default();
        let mut snapshot = Snapshot::default();
        for data in nodes {
            let id = ids.insert(&data.id)?;
            let mut node = data.into_node()?;
            node.id = id;
            snapshot.nodes.push(node);
        }

        for edge in edges {
            let wire = edge.into_wire(&ids, &snapshot.nodes)?;
            snapshot.wires.push(wire);
        }
        Ok((snapshot, ids))
    }
}

impl WorkerResponse {
    /// Serialize to one JSON line
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSON message
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Report results under the caller's ids
    pub fn from_report(report: &ExecutionReport, ids: &IdMap) -> Self {
        Self::ExecuteResult {
            outputs: report
                .outputs
                .iter()
                .map(|(id, v)| (ids.name(*id), v.clone()))
                .collect(),
            shapes: report
                .shapes
                .iter()
                .map(|(id, s)| (ids.name(*id), s.clone()))
                .collect(),
            net_inputs: report
                .net_inputs
                .iter()
                .map(|(id, n)| (ids.name(*id), *n))
                .collect(),
            thresholds: report
                .thresholds
                .iter()
                .map(|(id, t)| (ids.name(*id), *t))
                .collect(),
            unevaluated: report.unevaluated.iter().map(|id| ids.name(*id)).collect(),
        }
    }

    /// Failure reply for a request that could not be converted
    pub fn failed(error: &ProtocolError) -> Self {
        Self::ExecuteFailed {
            reason: error.to_string(),
        }
    }
}

impl NodeData {
    fn into_node(self) -> Result<Node, ProtocolError> {
        let threshold_unit = |variant| -> Result<NodeKind, ProtocolError> {
            let mut unit = ThresholdUnit::new(variant, self.bias.unwrap_or(0.0));
            if let Some(name) = &self.activation_fn {
                unit.activation =
                    Activation::from_name(name).ok_or_else(|| ProtocolError::UnknownActivation {
                        id: self.id.clone(),
                        name: name.clone(),
                    })?;
            }
            Ok(NodeKind::ThresholdUnit(unit))
        };

        let kind = match self.node_type.as_str() {
            "input" => NodeKind::Input,
            "bias" => NodeKind::Bias,
            "perceptron" => threshold_unit(ThresholdVariant::Perceptron)?,
            "mcculloch-pitts" => threshold_unit(ThresholdVariant::McCullochPitts)?,
            "output" => NodeKind::Output,
            "pixel-matrix" => NodeKind::PixelGrid {
                width: self.width.ok_or_else(|| self.missing("width"))?,
                height: self.height.ok_or_else(|| self.missing("height"))?,
            },
            "tensor" => NodeKind::Tensor {
                shape: match (&self.shape, self.order) {
                    (Some(shape), _) => shape.clone(),
                    (None, Some(order)) => vec![1; order],
                    (None, None) => vec![self.output.len()],
                },
            },
            other => {
                let Some(family) = OpFamily::from_type_name(other) else {
                    return Err(ProtocolError::UnknownNodeType {
                        id: self.id.clone(),
                        node_type: other.to_string(),
                    });
                };
                let operation = match &self.operation_type {
                    Some(name) => TensorOperation::parse(family, name).ok_or_else(|| {
                        ProtocolError::UnknownOperation {
                            id: self.id.clone(),
                            name: name.clone(),
                        }
                    })?,
                    None => family.default_operation(),
                };
                let mut op = TensorOp::new(operation);
                op.shape = self.shape.clone().unwrap_or_default();
                op.axis = self.axis;
                op.target_shape = self.target_shape.clone();
                NodeKind::TensorOp(op)
            }
        };

        let mut node = Node::new(kind);
        match node.kind.declared_len() {
            Some(len) if !matches!(node.kind, NodeKind::Bias) => {
                let mut output = self.output;
                output.resize(len, 0.0);
                node.output = output;
            }
            Some(_) => {}
            None => node.output = self.output,
        }
        Ok(node)
    }

    fn missing(&self, field: &'static str) -> ProtocolError {
        ProtocolError::MissingField {
            id: self.id.clone(),
            field,
        }
    }
}

impl From<&Node> for NodeData {
    fn from(node: &Node) -> Self {
        let mut data = NodeData {
            id: node.id.to_string(),
            node_type: node.kind.type_name().to_string(),
            output: node.output.clone(),
            ..Default::default()
        };

        match &node.kind {
            NodeKind::ThresholdUnit(unit) => {
                data.bias = Some(unit.bias);
                data.activation_fn = Some(unit.activation.name().to_string());
            }
            NodeKind::PixelGrid { width, height } => {
                data.width = Some(*width);
                data.height = Some(*height);
            }
            NodeKind::Tensor { shape } => {
                data.shape = Some(shape.clone());
                data.order = Some(shape.len());
            }
            NodeKind::TensorOp(op) => {
                data.shape = Some(op.shape.clone());
                data.operation_type = Some(op.operation.name().to_string());
                data.axis = op.axis;
                data.target_shape = op.target_shape.clone();
            }
            NodeKind::Input | NodeKind::Bias | NodeKind::Output | NodeKind::Group => {}
        }
        data
    }
}

impl EdgeData {
    fn into_wire(self, ids: &IdMap, nodes: &[Node]) -> Result<Wire, ProtocolError> {
        let lookup = |name: &str| {
            ids.node_id(name).ok_or_else(|| ProtocolError::UnknownNode {
                edge: self.id.clone(),
                node: name.to_string(),
            })
        };
        let source = lookup(&self.source)?;
        let target = lookup(&self.target)?;
        let is_grid = |id: NodeId| {
            nodes
                .iter()
                .any(|n| n.id == id && matches!(n.kind, NodeKind::PixelGrid { .. }))
        };

        let source_slot = match self.source_index {
            Some(i) if is_grid(source) => Slot::Cell(i),
            Some(i) => Slot::Element(i),
            None => Slot::Plain,
        };

        let handle = self.target_handle.as_deref().unwrap_or("");
        let mut target_slot: Slot = handle.parse().map_err(|_| ProtocolError::InvalidHandle {
            edge: self.id.clone(),
            handle: handle.to_string(),
        })?;
        if let (Slot::Plain, Some(i)) = (target_slot, self.target_index) {
            target_slot = if is_grid(target) { Slot::Cell(i) } else { Slot::Element(i) };
        }

        let mut wire = Wire::new(source, target)
            .with_weight(self.weight)
            .from_slot(source_slot)
            .to_slot(target_slot);
        if let Ok(uuid) = Uuid::parse_str(&self.id) {
            wire.id = WireId(uuid);
        }
        Ok(wire)
    }
}

impl From<&Wire> for EdgeData {
    fn from(wire: &Wire) -> Self {
        let (target_index, target_handle) = match wire.target_slot {
            Slot::Element(i) => (Some(i), None),
            other => (None, Some(other.to_string())),
        };
        EdgeData {
            id: wire.id.to_string(),
            source: wire.source.to_string(),
            target: wire.target.to_string(),
            weight: wire.weight,
            source_index: wire.source_index(),
            target_index,
            target_handle,
        }
    }
}
