// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the neuron graph.

use crate::ops::TensorOperation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Flavour of threshold unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdVariant {
    /// Perceptron; may use a non-step activation
    #[default]
    Perceptron,
    /// McCulloch-Pitts unit; always a step function
    McCullochPitts,
}

/// Activation applied by a perceptron
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// 1 if the net input reaches the threshold, else 0
    #[default]
    Step,
    /// Identity on `net - threshold`
    Linear,
    /// `max(0, net - threshold)`
    Relu,
    /// Logistic function of `net - threshold`
    Sigmoid,
    /// Hyperbolic tangent of `net - threshold`
    Tanh,
}

impl Activation {
    /// Protocol name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
        }
    }

    /// Parse a protocol name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "step" => Some(Self::Step),
            "linear" => Some(Self::Linear),
            "relu" => Some(Self::Relu),
            "sigmoid" => Some(Self::Sigmoid),
            "tanh" => Some(Self::Tanh),
            _ => None,
        }
    }
}

/// State carried by a threshold unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUnit {
    /// Perceptron or McCulloch-Pitts
    pub variant: ThresholdVariant,
    /// Stored threshold, used when no bias wire is connected
    pub bias: f64,
    /// Raw weighted sum from the last evaluation
    pub net_input: f64,
    /// Output function (McCulloch-Pitts units ignore this)
    pub activation: Activation,
}

impl ThresholdUnit {
    /// Create a unit with the given threshold
    pub fn new(variant: ThresholdVariant, threshold: f64) -> Self {
        Self {
            variant,
            bias: threshold,
            net_input: 0.0,
            activation: Activation::Step,
        }
    }

    /// Activation actually applied on evaluation
    pub fn effective_activation(&self) -> Activation {
        match self.variant {
            ThresholdVariant::McCullochPitts => Activation::Step,
            ThresholdVariant::Perceptron => self.activation,
        }
    }
}

/// Configuration of a tensor operator node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorOp {
    /// Operation applied to incoming values
    pub operation: TensorOperation,
    /// Shape of the last produced output
    pub shape: Vec<usize>,
    /// Axis for squeeze/unsqueeze/concat/stack
    pub axis: Option<usize>,
    /// Target shape for reshape
    pub target_shape: Option<Vec<usize>>,
}

impl TensorOp {
    /// Create an operator node configuration
    pub fn new(operation: TensorOperation) -> Self {
        Self {
            operation,
            shape: Vec::new(),
            axis: None,
            target_shape: None,
        }
    }
}

/// The kind of a node and its kind-specific state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Scalar set externally
    Input,
    /// Scalar fixed at 1
    Bias,
    /// Perceptron or McCulloch-Pitts unit
    ThresholdUnit(ThresholdUnit),
    /// Read-only terminal with at most one incoming wire
    Output,
    /// `width x height` grid of 0/1 cells
    PixelGrid {
        /// Cells per row
        width: usize,
        /// Rows
        height: usize,
    },
    /// Arbitrary-rank tensor; the order is the shape length
    Tensor {
        /// Dimensions
        shape: Vec<usize>,
    },
    /// Tensor operator
    TensorOp(TensorOp),
    /// Label-only container scoping macro wiring
    Group,
}

impl NodeKind {
    /// Protocol type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Bias => "bias",
            Self::ThresholdUnit(unit) => match unit.variant {
                ThresholdVariant::Perceptron => "perceptron",
                ThresholdVariant::McCullochPitts => "mcculloch-pitts",
            },
            Self::Output => "output",
            Self::PixelGrid { .. } => "pixel-matrix",
            Self::Tensor { .. } => "tensor",
            Self::TensorOp(op) => op.operation.family().type_name(),
            Self::Group => "group",
        }
    }

    /// Number of values the node outputs, when fixed by its declaration
    ///
    /// Tensor operators size themselves on evaluation and return `None`.
    pub fn declared_len(&self) -> Option<usize> {
        match self {
            Self::Input | Self::Bias | Self::ThresholdUnit(_) | Self::Output => Some(1),
            Self::PixelGrid { width, height } => Some(width * height),
            Self::Tensor { shape } => Some(shape_len(shape)),
            Self::TensorOp(_) => None,
            Self::Group => Some(0),
        }
    }

    /// Whether the kind reports a shape back from execution
    pub fn is_tensor_like(&self) -> bool {
        matches!(self, Self::Tensor { .. } | Self::TensorOp(_))
    }

    /// Whether this node is a group container
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }
}

/// Number of elements in a shape; rank 0 holds one element
pub fn shape_len(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Display label
    pub label: String,
    /// Position on the editing surface
    pub position: [f32; 2],
    /// Group this node belongs to
    pub parent: Option<NodeId>,
    /// Kind-specific state
    pub kind: NodeKind,
    /// Flat output values
    pub output: Vec<f64>,
}

impl Node {
    /// Create a node of the given kind with a zeroed output
    pub fn new(kind: NodeKind) -> Self {
        let len = kind.declared_len().unwrap_or(0);
        let mut output = vec![0.0; len];
        if matches!(kind, NodeKind::Bias) {
            output[0] = 1.0;
        }

        Self {
            id: NodeId::new(),
            label: default_label(&kind).to_string(),
            position: [0.0, 0.0],
            parent: None,
            kind,
            output,
        }
    }

    /// Input node holding `value`
    pub fn input(value: f64) -> Self {
        let mut node = Self::new(NodeKind::Input);
        node.output[0] = value;
        node
    }

    /// Bias source
    pub fn bias() -> Self {
        Self::new(NodeKind::Bias)
    }

    /// Perceptron with a stored threshold
    pub fn perceptron(threshold: f64) -> Self {
        Self::new(NodeKind::ThresholdUnit(ThresholdUnit::new(
            ThresholdVariant::Perceptron,
            threshold,
        )))
    }

    /// McCulloch-Pitts unit with a stored threshold
    pub fn mcculloch_pitts(threshold: f64) -> Self {
        Self::new(NodeKind::ThresholdUnit(ThresholdUnit::new(
            ThresholdVariant::McCullochPitts,
            threshold,
        )))
    }

    /// Output terminal
    pub fn output() -> Self {
        Self::new(NodeKind::Output)
    }

    /// Blank pixel grid
    pub fn pixel_grid(width: usize, height: usize) -> Self {
        Self::new(NodeKind::PixelGrid { width, height })
    }

    /// Zeroed tensor of the given shape
    pub fn tensor(shape: Vec<usize>) -> Self {
        Self::new(NodeKind::Tensor { shape })
    }

    /// Tensor operator
    pub fn tensor_op(operation: TensorOperation) -> Self {
        Self::new(NodeKind::TensorOp(TensorOp::new(operation)))
    }

    /// Group container
    pub fn group(label: impl Into<String>) -> Self {
        Self::new(NodeKind::Group).with_label(label)
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Place the node in a group
    pub fn in_group(mut self, group: NodeId) -> Self {
        self.parent = Some(group);
        self
    }

    /// Current shape of the node's output
    ///
    /// Pixel grids report `[height, width]`; scalars report `[1]`.
    pub fn shape(&self) -> Vec<usize> {
        match &self.kind {
            NodeKind::Tensor { shape } => shape.clone(),
            NodeKind::TensorOp(op) if !op.shape.is_empty() || self.output.len() == 1 => {
                op.shape.clone()
            }
            NodeKind::PixelGrid { width, height } => vec![*height, *width],
            _ => vec![self.output.len()],
        }
    }

    /// Value at a flat index; out of range reads as 0
    pub fn value_at(&self, index: usize) -> f64 {
        self.output.get(index).copied().unwrap_or(0.0)
    }
}

fn default_label(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Input => "Input",
        NodeKind::Bias => "Bias",
        NodeKind::ThresholdUnit(unit) => match unit.variant {
            ThresholdVariant::Perceptron => "Perceptron",
            ThresholdVariant::McCullochPitts => "MCP",
        },
        NodeKind::Output => "Output Neuron",
        NodeKind::PixelGrid { .. } => "Pixel Matrix",
        NodeKind::Tensor { .. } => "Tensor",
        NodeKind::TensorOp(_) => "Tensor Op",
        NodeKind::Group => "Layer",
    }
}
