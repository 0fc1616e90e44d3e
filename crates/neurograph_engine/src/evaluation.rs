// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-kind evaluation rules.
//!
//! Each rule reads the current outputs of a node's sources through an
//! [`EvaluationContext`] and produces the node's next output. Rules never
//! mutate the context; the executor applies the result.

use crate::node::{shape_len, Activation, Node, NodeId, NodeKind, TensorOp, ThresholdUnit};
use crate::ops::{ElementWiseOp, ReductionOp, TensorOperation};
use crate::slot::Slot;
use crate::tensor::{self, StructuralParams, TensorError};
use crate::wire::Wire;
use indexmap::IndexMap;
use ndarray::ArrayD;

/// Result of evaluating a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Flat output values
    pub values: Vec<f64>,
    /// New shape, for tensor kinds
    pub shape: Option<Vec<usize>>,
    /// Raw weighted sum, for threshold units
    pub net_input: Option<f64>,
    /// Threshold in effect, for threshold units
    pub threshold: Option<f64>,
}

impl NodeOutput {
    /// Output with values only
    pub fn values(values: Vec<f64>) -> Self {
        Self {
            values,
            shape: None,
            net_input: None,
            threshold: None,
        }
    }

    fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = Some(shape);
        self
    }
}

/// Read access to the node values at evaluation time
pub struct EvaluationContext<'a> {
    nodes: &'a IndexMap<NodeId, Node>,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context over the executor's working node set
    pub fn new(nodes: &'a IndexMap<NodeId, Node>) -> Self {
        Self { nodes }
    }

    /// Full output of a wire's source; unknown sources read as empty
    pub fn source_values(&self, wire: &Wire) -> &'a [f64] {
        self.nodes
            .get(&wire.source)
            .map(|n| n.output.as_slice())
            .unwrap_or(&[])
    }

    /// Value a wire carries, read at its source address (element 0 if none)
    pub fn source_value(&self, wire: &Wire) -> f64 {
        let index = wire.source_index().unwrap_or(0);
        self.source_values(wire).get(index).copied().unwrap_or(0.0)
    }

    /// Source output viewed as a tensor with its current shape
    pub fn source_tensor(&self, wire: &Wire) -> Option<Result<ArrayD<f64>, TensorError>> {
        let node = self.nodes.get(&wire.source)?;
        let mut shape = node.shape();
        if shape_len(&shape) != node.output.len() {
            shape = vec![node.output.len()];
        }
        Some(tensor::from_flat(node.output.clone(), &shape))
    }
}

/// Evaluate a node from its incoming wires, in connection order
pub fn evaluate(
    node: &Node,
    incoming: &[&Wire],
    ctx: &EvaluationContext<'_>,
) -> Result<NodeOutput, TensorError> {
    match &node.kind {
        NodeKind::Input | NodeKind::Bias | NodeKind::Group => Ok(NodeOutput::values(node.output.clone())),
        NodeKind::ThresholdUnit(unit) => Ok(threshold_unit(unit, incoming, ctx)),
        NodeKind::Output => {
            let value = incoming.first().map(|w| ctx.source_value(w)).unwrap_or(0.0);
            Ok(NodeOutput::values(vec![value]))
        }
        NodeKind::PixelGrid { .. } => Ok(NodeOutput::values(pixel_grid(node, incoming, ctx))),
        NodeKind::Tensor { shape } => {
            let mut values = node.output.clone();
            for wire in incoming {
                if let Slot::Element(index) = wire.target_slot {
                    if let Some(slot) = values.get_mut(index) {
                        *slot = ctx.source_value(wire);
                    }
                }
            }
            Ok(NodeOutput::values(values).with_shape(shape.clone()))
        }
        NodeKind::TensorOp(op) => tensor_op(node, op, incoming, ctx),
    }
}

fn threshold_unit(unit: &ThresholdUnit, incoming: &[&Wire], ctx: &EvaluationContext<'_>) -> NodeOutput {
    let mut threshold = unit.bias;
    let mut sum = 0.0;

    for wire in incoming {
        if wire.target_slot == Slot::Bias {
            threshold = ctx.source_value(wire);
        } else {
            sum += ctx.source_value(wire) * wire.weight;
        }
    }

    let activation = unit.effective_activation();
    let value = match activation {
        Activation::Step => {
            if sum >= threshold {
                1.0
            } else {
                0.0
            }
        }
        Activation::Linear => sum - threshold,
        Activation::Relu => (sum - threshold).max(0.0),
        Activation::Sigmoid => 1.0 / (1.0 + (threshold - sum).exp()),
        Activation::Tanh => (sum - threshold).tanh(),
    };

    NodeOutput {
        values: vec![value],
        shape: None,
        net_input: Some(sum),
        threshold: Some(threshold),
    }
}

fn pixel_grid(node: &Node, incoming: &[&Wire], ctx: &EvaluationContext<'_>) -> Vec<f64> {
    // Painted cells survive until something is wired in.
    if incoming.is_empty() {
        return node.output.clone();
    }

    let mut cells = vec![0.0; node.output.len()];
    for wire in incoming {
        let Slot::Cell(index) = wire.target_slot else {
            continue;
        };
        if let Some(cell) = cells.get_mut(index) {
            if ctx.source_value(wire) > 0.0 {
                *cell = 1.0;
            }
        }
    }
    cells
}

fn tensor_op(
    node: &Node,
    op: &TensorOp,
    incoming: &[&Wire],
    ctx: &EvaluationContext<'_>,
) -> Result<NodeOutput, TensorError> {
    if incoming.is_empty() {
        return Ok(NodeOutput::values(node.output.clone()).with_shape(node.shape()));
    }

    match op.operation {
        TensorOperation::ElementWise(elem) => Ok(element_wise(elem, incoming, ctx)),
        TensorOperation::Reduction(reduction) => Ok(reduce(reduction, incoming, ctx)),
        TensorOperation::Matrix(matrix) => {
            let inputs = gather_tensors(incoming, ctx)?;
            let (values, shape) = tensor::into_flat(tensor::matrix(matrix, &inputs)?);
            Ok(NodeOutput::values(values).with_shape(shape))
        }
        TensorOperation::Structural(structural) => {
            let inputs = gather_tensors(incoming, ctx)?;
            let params = StructuralParams {
                axis: op.axis,
                target_shape: op.target_shape.as_deref(),
            };
            let (values, shape) = tensor::into_flat(tensor::structural(structural, &inputs, params)?);
            Ok(NodeOutput::values(values).with_shape(shape))
        }
    }
}

fn gather_tensors(incoming: &[&Wire], ctx: &EvaluationContext<'_>) -> Result<Vec<ArrayD<f64>>, TensorError> {
    incoming
        .iter()
        .filter_map(|wire| ctx.source_tensor(wire))
        .collect()
}

fn element_wise(op: ElementWiseOp, incoming: &[&Wire], ctx: &EvaluationContext<'_>) -> NodeOutput {
    let indexed = incoming
        .iter()
        .any(|w| matches!(w.target_slot, Slot::Element(_)));

    // Without addressed inputs everything sums into one scalar first.
    if !indexed {
        let sum: f64 = incoming
            .iter()
            .map(|wire| ctx.source_value(wire) * wire.weight)
            .sum();
        return NodeOutput::values(vec![op.combine(&[sum])]).with_shape(vec![1]);
    }

    let mut by_index: Vec<Vec<f64>> = Vec::new();
    for wire in incoming {
        let Slot::Element(index) = wire.target_slot else {
            continue;
        };
        if by_index.len() <= index {
            by_index.resize_with(index + 1, Vec::new);
        }
        by_index[index].push(ctx.source_value(wire) * wire.weight);
    }

    let values: Vec<f64> = by_index
        .iter()
        .map(|contributions| {
            if contributions.is_empty() {
                0.0
            } else {
                op.combine(contributions)
            }
        })
        .collect();
    let len = values.len();
    NodeOutput::values(values).with_shape(vec![len])
}

fn reduce(op: ReductionOp, incoming: &[&Wire], ctx: &EvaluationContext<'_>) -> NodeOutput {
    let mut flat = Vec::new();
    for wire in incoming {
        let source = ctx.source_values(wire);
        // Addressed reads past the end count as 0.
        if wire.source_index().is_some() || source.len() == 1 {
            flat.push(ctx.source_value(wire) * wire.weight);
        } else {
            flat.extend_from_slice(source);
        }
    }

    match op.reduce(&flat) {
        Some(value) => NodeOutput::values(vec![value]).with_shape(vec![1]),
        None => NodeOutput::values(Vec::new()).with_shape(vec![0]),
    }
}
