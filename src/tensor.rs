//! Module defining `Blob`, the buffer abstraction layers read from and write to.
//!
//! A `Blob` pairs two arrays of identical shape: `data` holds the values
//! computed on the forward pass and `diff` holds the gradients written on
//! the backward pass. Shapes follow the legacy `(N, C, H, W)` convention,
//! where missing trailing axes count as extent 1.
//!
//! Both arrays are always in standard (row-major, contiguous) layout, so
//! layers can reinterpret them as flat or lower-rank views.

use crate::analysis::shape_inference::{Shape, ShapeInferenceError, LEGACY_RANK};
use ndarray::{ArrayD, IxDyn};

/// Data/gradient buffer pair with a shared shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    data: ArrayD<f32>,
    diff: ArrayD<f32>,
}

impl Blob {
    /// Creates a zero-filled blob of the given shape.
    pub fn new(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
            diff: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Wraps existing values; the gradient buffer starts at zero.
    pub fn from_data(data: ArrayD<f32>) -> Self {
        // Owned arrays built by callers may be in Fortran order.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        let diff = ArrayD::zeros(data.raw_dim());
        Self { data, diff }
    }

    /// Builds a blob from a flat row-major vector.
    pub fn from_vec(shape: &[usize], values: Vec<f32>) -> Result<Self, ndarray::ShapeError> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::from_data(data))
    }

    /// Changes the shape of both buffers.
    ///
    /// Values survive when the element count is unchanged; otherwise both
    /// buffers are reallocated and zero-filled.
    pub fn reshape(&mut self, shape: &[usize]) {
        if self.data.shape() == shape {
            return;
        }
        let keep = self.count() == shape.iter().product::<usize>()
            && self.data.is_standard_layout()
            && self.diff.is_standard_layout();
        if keep {
            let data = std::mem::take(&mut self.data);
            let diff = std::mem::take(&mut self.diff);
            if let (Ok(data), Ok(diff)) = (
                data.into_shape(IxDyn(shape)),
                diff.into_shape(IxDyn(shape)),
            ) {
                self.data = data;
                self.diff = diff;
                return;
            }
        }
        self.data = ArrayD::zeros(IxDyn(shape));
        self.diff = ArrayD::zeros(IxDyn(shape));
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Total number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Extent of `axis` under the legacy 4D convention.
    pub fn legacy_extent(&self, axis: usize) -> usize {
        self.shape().get(axis).copied().unwrap_or(1)
    }

    /// Shape padded to `(N, C, H, W)`. Fails for blobs of rank above four.
    pub fn legacy_shape(&self) -> Result<[usize; LEGACY_RANK], ShapeInferenceError> {
        let rank = self.shape().len();
        if rank > LEGACY_RANK {
            return Err(ShapeInferenceError::InvalidRank {
                expected: LEGACY_RANK,
                actual: rank,
            });
        }
        Ok([
            self.legacy_extent(0),
            self.legacy_extent(1),
            self.legacy_extent(2),
            self.legacy_extent(3),
        ])
    }

    pub fn num(&self) -> usize {
        self.legacy_extent(0)
    }

    pub fn channels(&self) -> usize {
        self.legacy_extent(1)
    }

    pub fn height(&self) -> usize {
        self.legacy_extent(2)
    }

    pub fn width(&self) -> usize {
        self.legacy_extent(3)
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn diff(&self) -> &ArrayD<f32> {
        &self.diff
    }

    pub fn diff_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.diff
    }

    /// Borrows values and gradients together, the shape a backward pass needs.
    pub fn data_and_diff_mut(&mut self) -> (&ArrayD<f32>, &mut ArrayD<f32>) {
        (&self.data, &mut self.diff)
    }

    /// Shape as an owned vector.
    pub fn shape_vec(&self) -> Shape {
        self.shape().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let blob = Blob::new(&[4, 3, 1, 1]);
        assert_eq!(blob.count(), 12);
        assert!(blob.data().iter().all(|&v| v == 0.0));
        assert!(blob.diff().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_legacy_accessors_pad_missing_axes() {
        let blob = Blob::new(&[6, 2]);
        assert_eq!(blob.num(), 6);
        assert_eq!(blob.channels(), 2);
        assert_eq!(blob.height(), 1);
        assert_eq!(blob.width(), 1);
        assert_eq!(blob.legacy_shape().unwrap(), [6, 2, 1, 1]);
    }

    #[test]
    fn test_legacy_shape_rejects_rank_five() {
        let blob = Blob::new(&[1, 1, 1, 1, 1]);
        assert!(matches!(
            blob.legacy_shape(),
            Err(ShapeInferenceError::InvalidRank { expected: 4, actual: 5 })
        ));
    }

    #[test]
    fn test_reshape_same_count_keeps_values() {
        let mut blob = Blob::from_vec(&[4, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        blob.reshape(&[2, 2, 1, 1]);
        assert_eq!(blob.shape(), &[2, 2, 1, 1]);
        assert_eq!(blob.data().iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_reshape_new_count_reallocates() {
        let mut blob = Blob::from_vec(&[2, 1], vec![7.0, 8.0]).unwrap();
        blob.reshape(&[3, 1, 1, 1]);
        assert_eq!(blob.count(), 3);
        assert!(blob.data().iter().all(|&v| v == 0.0));
        assert_eq!(blob.diff().shape(), &[3, 1, 1, 1]);
    }

    #[test]
    fn test_from_data_normalizes_layout() {
        let data = ndarray::Array2::from_shape_vec((2, 3), vec![1., 2., 3., 4., 5., 6.])
            .unwrap()
            .reversed_axes()
            .into_dyn();
        let blob = Blob::from_data(data);
        assert!(blob.data().is_standard_layout());
        assert_eq!(blob.shape(), &[3, 2]);
        assert_eq!(blob.data()[[0, 1]], 4.0);
    }
}
