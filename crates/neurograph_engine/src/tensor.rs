// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-tensor operations for matrix and structural operator nodes.

use crate::ops::{MatrixOp, StructuralOp};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2, IxDyn};

/// Error from a tensor operation
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// Value count does not match the declared shape
    #[error("Cannot view {values} values as shape {shape:?}")]
    ShapeMismatch {
        /// Number of values supplied
        values: usize,
        /// Requested shape
        shape: Vec<usize>,
    },

    /// Operand has the wrong rank
    #[error("{op} expects rank {expected}, got rank {found}")]
    RankMismatch {
        /// Operation name
        op: &'static str,
        /// Accepted rank(s)
        expected: &'static str,
        /// Actual rank
        found: usize,
    },

    /// Contracted dimensions differ
    #[error("Inner dimensions differ: {left} vs {right}")]
    InnerDimMismatch {
        /// Left operand's contracted length
        left: usize,
        /// Right operand's contracted length
        right: usize,
    },

    /// Axis beyond the tensor's rank
    #[error("Axis {axis} out of range for rank {rank}")]
    AxisOutOfRange {
        /// Requested axis
        axis: usize,
        /// Tensor rank
        rank: usize,
    },

    /// Squeezed axis is not of length 1
    #[error("Cannot squeeze axis {axis} of length {len}")]
    NotSqueezable {
        /// Requested axis
        axis: usize,
        /// Its length
        len: usize,
    },

    /// No operands
    #[error("No input tensors")]
    NoInputs,

    /// Incompatible shapes for joining
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Build a tensor from flat row-major values
pub fn from_flat(values: Vec<f64>, shape: &[usize]) -> Result<ArrayD<f64>, TensorError> {
    let len = values.len();
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| TensorError::ShapeMismatch {
        values: len,
        shape: shape.to_vec(),
    })
}

/// Flatten a tensor back into row-major values and its shape
pub fn into_flat(tensor: ArrayD<f64>) -> (Vec<f64>, Vec<usize>) {
    let shape = tensor.shape().to_vec();
    let values = tensor.iter().copied().collect();
    (values, shape)
}

fn reshape(tensor: &ArrayD<f64>, shape: &[usize]) -> Result<ArrayD<f64>, TensorError> {
    from_flat(tensor.iter().copied().collect(), shape)
}

fn as_matrix<'a>(op: &'static str, tensor: &'a ArrayD<f64>) -> Result<ArrayView2<'a, f64>, TensorError> {
    tensor
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| TensorError::RankMismatch {
            op,
            expected: "2",
            found: tensor.ndim(),
        })
}

fn as_vector(tensor: &ArrayD<f64>) -> Option<ArrayView1<'_, f64>> {
    tensor.view().into_dimensionality::<Ix1>().ok()
}

/// Apply a matrix operator; a single operand passes through
pub fn matrix(op: MatrixOp, inputs: &[ArrayD<f64>]) -> Result<ArrayD<f64>, TensorError> {
    let (a, b) = match inputs {
        [] => return Err(TensorError::NoInputs),
        [only] => return Ok(only.clone()),
        [a, b, ..] => (a, b),
    };

    match op {
        MatrixOp::Matmul => matmul(a, b),
        MatrixOp::Dot => dot(a, b),
        MatrixOp::Outer => {
            let left: Vec<f64> = a.iter().copied().collect();
            let right: Vec<f64> = b.iter().copied().collect();
            let product = Array2::from_shape_fn((left.len(), right.len()), |(i, j)| left[i] * right[j]);
            Ok(product.into_dyn())
        }
    }
}

fn matmul(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, TensorError> {
    let left = as_matrix("matmul", a)?;
    let right = as_matrix("matmul", b)?;
    if left.ncols() != right.nrows() {
        return Err(TensorError::InnerDimMismatch {
            left: left.ncols(),
            right: right.nrows(),
        });
    }
    Ok(left.dot(&right).into_dyn())
}

fn dot(a: &ArrayD<f64>, b: &ArrayD<f64>) -> Result<ArrayD<f64>, TensorError> {
    match (a.ndim(), b.ndim()) {
        (1, 1) => {
            let (Some(left), Some(right)) = (as_vector(a), as_vector(b)) else {
                return Err(TensorError::RankMismatch { op: "dot", expected: "1", found: a.ndim() });
            };
            if left.len() != right.len() {
                return Err(TensorError::InnerDimMismatch {
                    left: left.len(),
                    right: right.len(),
                });
            }
            Ok(ArrayD::from_elem(IxDyn(&[]), left.dot(&right)))
        }
        (2, 1) => {
            let left = as_matrix("dot", a)?;
            let right = as_vector(b).ok_or(TensorError::RankMismatch { op: "dot", expected: "1", found: b.ndim() })?;
            if left.ncols() != right.len() {
                return Err(TensorError::InnerDimMismatch {
                    left: left.ncols(),
                    right: right.len(),
                });
            }
            let product: Array1<f64> = left.dot(&right);
            Ok(product.into_dyn())
        }
        (1, 2) => {
            let left = as_vector(a).ok_or(TensorError::RankMismatch { op: "dot", expected: "1", found: a.ndim() })?;
            let right = as_matrix("dot", b)?;
            if left.len() != right.nrows() {
                return Err(TensorError::InnerDimMismatch {
                    left: left.len(),
                    right: right.nrows(),
                });
            }
            let product: Array1<f64> = left.dot(&right);
            Ok(product.into_dyn())
        }
        (2, 2) => matmul(a, b),
        (left, right) => Err(TensorError::RankMismatch {
            op: "dot",
            expected: "1 or 2",
            found: if left > 2 { left } else { right },
        }),
    }
}

/// Parameters for a structural operator
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralParams<'a> {
    /// Axis for squeeze/unsqueeze/concat/stack
    pub axis: Option<usize>,
    /// Target shape for reshape
    pub target_shape: Option<&'a [usize]>,
}

/// Apply a structural operator to the first operand (or all, for joins)
pub fn structural(
    op: StructuralOp,
    inputs: &[ArrayD<f64>],
    params: StructuralParams<'_>,
) -> Result<ArrayD<f64>, TensorError> {
    let first = inputs.first().ok_or(TensorError::NoInputs)?;
    let rank = first.ndim();

    match op {
        StructuralOp::Reshape => match params.target_shape {
            Some(shape) => reshape(first, shape),
            None => Ok(first.clone()),
        },
        StructuralOp::Transpose => Ok(first.clone().reversed_axes()),
        StructuralOp::Squeeze => match params.axis {
            Some(axis) => {
                if axis >= rank {
                    return Err(TensorError::AxisOutOfRange { axis, rank });
                }
                let len = first.len_of(Axis(axis));
                if len != 1 {
                    return Err(TensorError::NotSqueezable { axis, len });
                }
                Ok(first.clone().remove_axis(Axis(axis)))
            }
            None => {
                let shape: Vec<usize> = first.shape().iter().copied().filter(|&d| d != 1).collect();
                reshape(first, &shape)
            }
        },
        StructuralOp::Unsqueeze => {
            let axis = params.axis.unwrap_or(0);
            if axis > rank {
                return Err(TensorError::AxisOutOfRange { axis, rank });
            }
            Ok(first.clone().insert_axis(Axis(axis)))
        }
        StructuralOp::Concat | StructuralOp::Stack if inputs.len() == 1 => Ok(first.clone()),
        StructuralOp::Concat => {
            let axis = params.axis.unwrap_or(0);
            if axis >= rank {
                return Err(TensorError::AxisOutOfRange { axis, rank });
            }
            let views: Vec<_> = inputs.iter().map(|t| t.view()).collect();
            Ok(ndarray::concatenate(Axis(axis), &views)?)
        }
        StructuralOp::Stack => {
            let axis = params.axis.unwrap_or(0);
            if axis > rank {
                return Err(TensorError::AxisOutOfRange { axis, rank });
            }
            let views: Vec<_> = inputs.iter().map(|t| t.view()).collect();
            Ok(ndarray::stack(Axis(axis), &views)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(values: &[f64], shape: &[usize]) -> ArrayD<f64> {
        from_flat(values.to_vec(), shape).unwrap()
    }

    #[test]
    fn test_matmul() {
        let a = t(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = t(&[5.0, 6.0, 7.0, 8.0], &[2, 2]);
        let (values, shape) = into_flat(matrix(MatrixOp::Matmul, &[a, b]).unwrap());
        assert_eq!(values, vec![19.0, 22.0, 43.0, 50.0]);
        assert_eq!(shape, vec![2, 2]);
    }

    #[test]
    fn test_matmul_rejects_vectors() {
        let a = t(&[1.0, 2.0], &[2]);
        let b = t(&[1.0, 2.0], &[2]);
        assert!(matches!(
            matrix(MatrixOp::Matmul, &[a, b]),
            Err(TensorError::RankMismatch { op: "matmul", .. })
        ));
    }

    #[test]
    fn test_dot_vectors_gives_scalar() {
        let a = t(&[1.0, 2.0, 3.0], &[3]);
        let b = t(&[4.0, 5.0, 6.0], &[3]);
        let (values, shape) = into_flat(matrix(MatrixOp::Dot, &[a, b]).unwrap());
        assert_eq!(values, vec![32.0]);
        assert!(shape.is_empty());
    }

    #[test]
    fn test_dot_matrix_vector() {
        let a = t(&[1.0, 0.0, 0.0, 2.0], &[2, 2]);
        let b = t(&[3.0, 4.0], &[2]);
        let (values, shape) = into_flat(matrix(MatrixOp::Dot, &[a, b]).unwrap());
        assert_eq!(values, vec![3.0, 8.0]);
        assert_eq!(shape, vec![2]);
    }

    #[test]
    fn test_outer_flattens() {
        let a = t(&[1.0, 2.0], &[2]);
        let b = t(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let (values, shape) = into_flat(matrix(MatrixOp::Outer, &[a, b]).unwrap());
        assert_eq!(shape, vec![2, 4]);
        assert_eq!(values[4..], [2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_single_matrix_operand_passes_through() {
        let a = t(&[1.0, 2.0], &[2]);
        let result = matrix(MatrixOp::Matmul, std::slice::from_ref(&a)).unwrap();
        assert_eq!(result, a);
    }

    #[test]
    fn test_reshape_and_transpose() {
        let a = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let params = StructuralParams {
            target_shape: Some(&[3, 2]),
            ..Default::default()
        };
        let reshaped = structural(StructuralOp::Reshape, std::slice::from_ref(&a), params).unwrap();
        assert_eq!(reshaped.shape(), &[3, 2]);

        let (values, shape) =
            into_flat(structural(StructuralOp::Transpose, &[a], StructuralParams::default()).unwrap());
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(values, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_reshape_count_mismatch() {
        let a = t(&[1.0, 2.0, 3.0], &[3]);
        let params = StructuralParams {
            target_shape: Some(&[2, 2]),
            ..Default::default()
        };
        assert!(matches!(
            structural(StructuralOp::Reshape, &[a], params),
            Err(TensorError::ShapeMismatch { values: 3, .. })
        ));
    }

    #[test]
    fn test_squeeze_and_unsqueeze() {
        let a = t(&[1.0, 2.0], &[1, 2, 1]);
        let all = structural(StructuralOp::Squeeze, std::slice::from_ref(&a), StructuralParams::default()).unwrap();
        assert_eq!(all.shape(), &[2]);

        let params = StructuralParams { axis: Some(1), ..Default::default() };
        assert!(matches!(
            structural(StructuralOp::Squeeze, std::slice::from_ref(&a), params),
            Err(TensorError::NotSqueezable { axis: 1, len: 2 })
        ));

        let params = StructuralParams { axis: Some(2), ..Default::default() };
        let expanded = structural(StructuralOp::Unsqueeze, &[all], params);
        assert!(matches!(expanded, Err(TensorError::AxisOutOfRange { axis: 2, rank: 1 })));
    }

    #[test]
    fn test_concat_and_stack() {
        let a = t(&[1.0, 2.0], &[2]);
        let b = t(&[3.0, 4.0], &[2]);
        let inputs = [a, b];

        let joined = structural(StructuralOp::Concat, &inputs, StructuralParams::default()).unwrap();
        assert_eq!(into_flat(joined), (vec![1.0, 2.0, 3.0, 4.0], vec![4]));

        let params = StructuralParams { axis: Some(1), ..Default::default() };
        let stacked = structural(StructuralOp::Stack, &inputs, params).unwrap();
        assert_eq!(into_flat(stacked), (vec![1.0, 3.0, 2.0, 4.0], vec![2, 2]));
    }

    #[test]
    fn test_concat_mismatched_shapes() {
        let a = t(&[1.0, 2.0], &[1, 2]);
        let b = t(&[3.0, 4.0, 5.0], &[1, 3]);
        assert!(matches!(
            structural(StructuralOp::Concat, &[a, b], StructuralParams::default()),
            Err(TensorError::Shape(_))
        ));
    }
}
