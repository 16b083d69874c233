//! Module defining the abstract interface (trait) for execution backends.
//!
//! A backend owns the numeric kernels a layer dispatches to. Layers deal
//! with blobs, shapes and gradient flags; backends only ever see
//! row-major `(instances, channels)` matrix views.

use crate::analysis::shape_inference::BagShape;
use crate::config::TieGradient;
use ndarray::{ArrayD, ArrayView2, ArrayViewMut2};
use thiserror::Error;

/// Errors raised while running a kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Tensor shape error: {0}. Reshape the layer after the input shape changes.")]
    ShapeError(String),

    #[error("Memory layout error: {0}")]
    LayoutError(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Trait defining the kernels a bag pooling layer needs from its backend.
pub trait Backend {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Writes the per-bag, per-channel maximum of `input` into `output`.
    ///
    /// * `input` - `(N, C)` instance scores, `N >= shape.pooled_instances()`.
    /// * `output` - `(B, C)` bag scores.
    fn bag_max(
        &self,
        input: ArrayView2<f32>,
        shape: &BagShape,
        output: ArrayViewMut2<f32>,
    ) -> RuntimeResult<()>;

    /// Routes `output_grad` back to the instances whose score equals the bag maximum.
    ///
    /// Every element of `input_grad` is overwritten; instances outside any
    /// bag receive zero.
    fn bag_max_grad(
        &self,
        input: ArrayView2<f32>,
        output: ArrayView2<f32>,
        output_grad: ArrayView2<f32>,
        shape: &BagShape,
        tie_gradient: TieGradient,
        input_grad: ArrayViewMut2<f32>,
    ) -> RuntimeResult<()>;
}

fn check_len(shape: &[usize], rows: usize, cols: usize) -> RuntimeResult<()> {
    let len: usize = shape.iter().product();
    if len != rows * cols {
        return Err(RuntimeError::ShapeError(format!(
            "array of shape {:?} cannot be viewed as {}x{}",
            shape, rows, cols
        )));
    }
    Ok(())
}

/// Views a contiguous array as a `rows x cols` row-major matrix.
pub fn as_matrix(array: &ArrayD<f32>, rows: usize, cols: usize) -> RuntimeResult<ArrayView2<'_, f32>> {
    check_len(array.shape(), rows, cols)?;
    let slice = array.as_slice().ok_or_else(|| {
        RuntimeError::LayoutError(format!("array of shape {:?} is not contiguous", array.shape()))
    })?;
    ArrayView2::from_shape((rows, cols), slice).map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

/// Mutable counterpart of [`as_matrix`].
pub fn as_matrix_mut(
    array: &mut ArrayD<f32>,
    rows: usize,
    cols: usize,
) -> RuntimeResult<ArrayViewMut2<'_, f32>> {
    check_len(array.shape(), rows, cols)?;
    let shape = array.shape().to_vec();
    let slice = array.as_slice_mut().ok_or_else(|| {
        RuntimeError::LayoutError(format!("array of shape {:?} is not contiguous", shape))
    })?;
    ArrayViewMut2::from_shape((rows, cols), slice).map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, IxDyn};

    #[test]
    fn test_as_matrix_flattens_trailing_axes() {
        let array = ArrayD::from_shape_vec(IxDyn(&[3, 2, 1, 1]), vec![1., 2., 3., 4., 5., 6.]).unwrap();
        let view = as_matrix(&array, 3, 2).unwrap();
        assert_eq!(view[[2, 0]], 5.0);
        assert_eq!(view[[1, 1]], 4.0);
    }

    #[test]
    fn test_as_matrix_rejects_wrong_count() {
        let array = ArrayD::<f32>::zeros(IxDyn(&[3, 2]));
        assert!(matches!(as_matrix(&array, 2, 2), Err(RuntimeError::ShapeError(_))));
    }

    #[test]
    fn test_as_matrix_rejects_fortran_layout() {
        let array = Array2::<f32>::zeros((2, 3)).reversed_axes().into_dyn();
        assert!(matches!(as_matrix(&array, 3, 2), Err(RuntimeError::LayoutError(_))));
    }

    #[test]
    fn test_as_matrix_mut_writes_through() {
        let mut array = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 1, 1]));
        as_matrix_mut(&mut array, 2, 2).unwrap()[[1, 0]] = 3.0;
        assert_eq!(array[[1, 0, 0, 0]], 3.0);
    }
}
