// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tensor operator catalogue.
//!
//! Element-wise and reduction operators are evaluated node-locally from the
//! individual values routed into them. Matrix and structural operators work on
//! whole tensors and are implemented in [`crate::tensor`].

use serde::{Deserialize, Serialize};

/// Operator family, one per tensor-op node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpFamily {
    /// Index-by-index combination
    ElementWise,
    /// Full reduction to a scalar
    Reduction,
    /// Matrix products
    Matrix,
    /// Reshaping and joining
    Structural,
}

impl OpFamily {
    /// Protocol node type for this family
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ElementWise => "tensor-elem-op",
            Self::Reduction => "tensor-reduce-op",
            Self::Matrix => "tensor-matrix-op",
            Self::Structural => "tensor-reshape-op",
        }
    }

    /// Family for a protocol node type
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "tensor-elem-op" => Some(Self::ElementWise),
            "tensor-reduce-op" => Some(Self::Reduction),
            "tensor-matrix-op" => Some(Self::Matrix),
            "tensor-reshape-op" => Some(Self::Structural),
            _ => None,
        }
    }

    /// Operation used when none is configured
    pub fn default_operation(&self) -> TensorOperation {
        match self {
            Self::ElementWise => TensorOperation::ElementWise(ElementWiseOp::Add),
            Self::Reduction => TensorOperation::Reduction(ReductionOp::Sum),
            Self::Matrix => TensorOperation::Matrix(MatrixOp::Matmul),
            Self::Structural => TensorOperation::Structural(StructuralOp::Reshape),
        }
    }
}

/// Element-wise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementWiseOp {
    /// Sum
    Add,
    /// Left-to-right difference
    Sub,
    /// Product
    Mul,
    /// Left-to-right quotient; zero divisors count as 1
    Div,
    /// Rectified sum
    Relu,
    /// Logistic of the sum
    Sigmoid,
}

/// Reduction operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReductionOp {
    /// Sum of all values
    Sum,
    /// Arithmetic mean
    Mean,
    /// Largest value
    Max,
    /// Smallest value
    Min,
    /// Position of the first largest value
    Argmax,
}

/// Matrix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixOp {
    /// Rank-2 matrix product
    Matmul,
    /// Dot product for rank 1/2 operands
    Dot,
    /// Outer product of the flattened operands
    Outer,
}

/// Structural operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructuralOp {
    /// Reinterpret with a target shape
    Reshape,
    /// Reverse all axes
    Transpose,
    /// Drop length-1 axes
    Squeeze,
    /// Insert a length-1 axis
    Unsqueeze,
    /// Join along an existing axis
    Concat,
    /// Join along a new axis
    Stack,
}

/// Operation selected on a tensor-op node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorOperation {
    /// Element-wise family
    ElementWise(ElementWiseOp),
    /// Reduction family
    Reduction(ReductionOp),
    /// Matrix family
    Matrix(MatrixOp),
    /// Structural family
    Structural(StructuralOp),
}

impl TensorOperation {
    /// Family of this operation
    pub fn family(&self) -> OpFamily {
        match self {
            Self::ElementWise(_) => OpFamily::ElementWise,
            Self::Reduction(_) => OpFamily::Reduction,
            Self::Matrix(_) => OpFamily::Matrix,
            Self::Structural(_) => OpFamily::Structural,
        }
    }

    /// Protocol `operationType` name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ElementWise(op) => match op {
                ElementWiseOp::Add => "add",
                ElementWiseOp::Sub => "sub",
                ElementWiseOp::Mul => "mul",
                ElementWiseOp::Div => "div",
                ElementWiseOp::Relu => "relu",
                ElementWiseOp::Sigmoid => "sigmoid",
            },
            Self::Reduction(op) => match op {
                ReductionOp::Sum => "sum",
                ReductionOp::Mean => "mean",
                ReductionOp::Max => "max",
                ReductionOp::Min => "min",
                ReductionOp::Argmax => "argmax",
            },
            Self::Matrix(op) => match op {
                MatrixOp::Matmul => "matmul",
                MatrixOp::Dot => "dot",
                MatrixOp::Outer => "outer",
            },
            Self::Structural(op) => match op {
                StructuralOp::Reshape => "reshape",
                StructuralOp::Transpose => "transpose",
                StructuralOp::Squeeze => "squeeze",
                StructuralOp::Unsqueeze => "unsqueeze",
                StructuralOp::Concat => "concat",
                StructuralOp::Stack => "stack",
            },
        }
    }

    /// Parse an `operationType` name within a family
    pub fn parse(family: OpFamily, name: &str) -> Option<Self> {
        let op = match (family, name) {
            (OpFamily::ElementWise, "add") => Self::ElementWise(ElementWiseOp::Add),
            (OpFamily::ElementWise, "sub") => Self::ElementWise(ElementWiseOp::Sub),
            (OpFamily::ElementWise, "mul") => Self::ElementWise(ElementWiseOp::Mul),
            (OpFamily::ElementWise, "div") => Self::ElementWise(ElementWiseOp::Div),
            (OpFamily::ElementWise, "relu") => Self::ElementWise(ElementWiseOp::Relu),
            (OpFamily::ElementWise, "sigmoid") => Self::ElementWise(ElementWiseOp::Sigmoid),
            (OpFamily::Reduction, "sum") => Self::Reduction(ReductionOp::Sum),
            (OpFamily::Reduction, "mean") => Self::Reduction(ReductionOp::Mean),
            (OpFamily::Reduction, "max") => Self::Reduction(ReductionOp::Max),
            (OpFamily::Reduction, "min") => Self::Reduction(ReductionOp::Min),
            (OpFamily::Reduction, "argmax") => Self::Reduction(ReductionOp::Argmax),
            (OpFamily::Matrix, "matmul") => Self::Matrix(MatrixOp::Matmul),
            (OpFamily::Matrix, "dot") => Self::Matrix(MatrixOp::Dot),
            (OpFamily::Matrix, "outer") => Self::Matrix(MatrixOp::Outer),
            (OpFamily::Structural, "reshape") => Self::Structural(StructuralOp::Reshape),
            (OpFamily::Structural, "transpose") => Self::Structural(StructuralOp::Transpose),
            (OpFamily::Structural, "squeeze") => Self::Structural(StructuralOp::Squeeze),
            (OpFamily::Structural, "unsqueeze") => Self::Structural(StructuralOp::Unsqueeze),
            (OpFamily::Structural, "concat") => Self::Structural(StructuralOp::Concat),
            (OpFamily::Structural, "stack") => Self::Structural(StructuralOp::Stack),
            _ => return None,
        };
        Some(op)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ElementWiseOp {
    /// Combine the values routed to one index, in connection order
    pub fn combine(&self, values: &[f64]) -> f64 {
        let Some((&first, rest)) = values.split_first() else {
            return 0.0;
        };

        match self {
            Self::Add => values.iter().sum(),
            Self::Sub => rest.iter().fold(first, |acc, v| acc - v),
            Self::Mul => values.iter().product(),
            Self::Div => rest
                .iter()
                .fold(first, |acc, &v| acc / if v == 0.0 { 1.0 } else { v }),
            Self::Relu => values.iter().sum::<f64>().max(0.0),
            Self::Sigmoid => sigmoid(values.iter().sum()),
        }
    }
}

impl ReductionOp {
    /// Reduce a flat list to one value; `None` when the list is empty
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        let result = match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Argmax => {
                let mut best = 0;
                for (i, v) in values.iter().enumerate().skip(1) {
                    if *v > values[best] {
                        best = i;
                    }
                }
                best as f64
            }
        };
        Some(result)
    }
}
