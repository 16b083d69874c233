//! Module implementing bag pooling for multiple-instance learning.

use crate::analysis::shape_inference::{BagShape, Shape, ShapeInferenceError, LEGACY_RANK};
use crate::config::MilConfig;
use crate::nn::layer::{Layer, LayerError, LayerResult};
use crate::runtime::backend::{as_matrix, as_matrix_mut, Backend, RuntimeError};
use crate::runtime::cpu_backend::CpuBackend;
use crate::tensor::Blob;
use log::debug;

/// Bag max pooling layer.
///
/// Takes instance scores of shape `[N, C, 1, 1]`, where consecutive runs of
/// `instances_per_bag` instances form a bag, and outputs `[N / instances_per_bag, C, 1, 1]`
/// holding the maximum score of each bag in each channel.
///
/// On the backward pass an instance receives the bag's gradient when its
/// score equals the bag maximum exactly. Tied instances all receive it
/// (see [`TieGradient`](crate::config::TieGradient)).
///
/// # Example
///
/// ```
/// use bagpool::config::MilConfig;
/// use bagpool::nn::{BagMaxPool, Layer};
/// use bagpool::tensor::Blob;
///
/// let mut layer = BagMaxPool::new(MilConfig::new(2));
/// let bottom = Blob::from_vec(&[4, 1, 1, 1], vec![3.0, 5.0, 1.0, 1.0]).unwrap();
/// let mut top = Blob::new(&[1]);
///
/// layer.setup(&[&bottom], &mut [&mut top]).unwrap();
/// layer.forward(&[&bottom], &mut [&mut top]).unwrap();
/// assert_eq!(top.data().as_slice().unwrap(), &[5.0, 1.0]);
/// ```
#[derive(Debug, Clone)]
pub struct BagMaxPool<B: Backend = CpuBackend> {
    config: MilConfig,
    backend: B,
    shape: Option<BagShape>,
}

impl BagMaxPool<CpuBackend> {
    /// Creates a layer running on the single-threaded CPU backend.
    pub fn new(config: MilConfig) -> Self {
        Self::with_backend(config, CpuBackend::new())
    }
}

impl<B: Backend> BagMaxPool<B> {
    pub fn with_backend(config: MilConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            shape: None,
        }
    }

    pub fn config(&self) -> &MilConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bag partition cached by the last reshape.
    pub fn bag_shape(&self) -> Option<&BagShape> {
        self.shape.as_ref()
    }

    /// Caches the bag partition for an input of legacy shape `(N, C, H, W)`
    /// and returns the output shape.
    pub fn configure(&mut self, input_shape: [usize; LEGACY_RANK]) -> LayerResult<Shape> {
        let shape = BagShape::infer(
            input_shape,
            self.config.instances_per_bag,
            self.config.allow_partial_bags,
        )?;
        if self.shape != Some(shape) {
            debug!(
                "{} reshaped: {} instances -> {} bags of {} x {} channels ({} backend)",
                self.layer_type(),
                input_shape[0],
                shape.num_bags,
                shape.instances_per_bag,
                shape.channels,
                self.backend.name()
            );
        }
        self.shape = Some(shape);
        Ok(shape.output_shape())
    }

    /// Returns the cached shape after checking `bottom` still matches it.
    fn checked_shape(&self, bottom: &Blob) -> LayerResult<BagShape> {
        let cached = self.shape.ok_or(LayerError::NotSetUp(self.layer_type()))?;
        let current = BagShape::infer(
            bottom.legacy_shape()?,
            self.config.instances_per_bag,
            self.config.allow_partial_bags,
        )?;
        if current != cached {
            return Err(RuntimeError::ShapeError(format!(
                "bottom shape {:?} changed since the last reshape",
                bottom.shape()
            ))
            .into());
        }
        Ok(cached)
    }
}

impl<B: Backend> Layer for BagMaxPool<B> {
    fn layer_type(&self) -> &'static str {
        "MIL"
    }

    fn exact_num_bottom_blobs(&self) -> Option<usize> {
        Some(1)
    }

    fn exact_num_top_blobs(&self) -> Option<usize> {
        Some(1)
    }

    fn layer_setup(&mut self, _bottom: &[&Blob], _top: &mut [&mut Blob]) -> LayerResult<()> {
        if self.config.instances_per_bag == 0 {
            return Err(ShapeInferenceError::ZeroInstancesPerBag.into());
        }
        Ok(())
    }

    fn reshape(&mut self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()> {
        self.check_blob_counts(bottom.len(), top.len())?;
        let output_shape = self.configure(bottom[0].legacy_shape()?)?;
        top[0].reshape(&output_shape);
        Ok(())
    }

    fn layer_forward(&self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()> {
        let bottom = bottom[0];
        let shape = self.checked_shape(bottom)?;

        let input = as_matrix(bottom.data(), bottom.num(), shape.channels)?;
        let output = as_matrix_mut(top[0].data_mut(), shape.num_bags, shape.channels)?;
        self.backend.bag_max(input, &shape, output)?;
        Ok(())
    }

    fn layer_backward(
        &self,
        top: &[&Blob],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob],
    ) -> LayerResult<()> {
        if !propagate_down[0] {
            return Ok(());
        }
        let bottom = &mut *bottom[0];
        let shape = self.checked_shape(bottom)?;
        let top = top[0];
        let output = as_matrix(top.data(), shape.num_bags, shape.channels)?;
        let output_grad = as_matrix(top.diff(), shape.num_bags, shape.channels)?;

        let instances = bottom.num();
        let (data, diff) = bottom.data_and_diff_mut();
        let input = as_matrix(data, instances, shape.channels)?;
        let input_grad = as_matrix_mut(diff, instances, shape.channels)?;

        self.backend.bag_max_grad(
            input,
            output,
            output_grad,
            &shape,
            self.config.tie_gradient,
            input_grad,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TieGradient;

    fn blob(shape: &[usize], values: &[f32]) -> Blob {
        Blob::from_vec(shape, values.to_vec()).unwrap()
    }

    fn values(array: &ndarray::ArrayD<f32>) -> Vec<f32> {
        array.iter().copied().collect()
    }

    #[test]
    fn test_configure_shape() {
        let mut layer = BagMaxPool::new(MilConfig::new(3));
        assert_eq!(layer.configure([12, 5, 1, 1]).unwrap(), vec![4, 5, 1, 1]);
        assert_eq!(layer.bag_shape().unwrap().num_bags, 4);
        // Idempotent for the same input.
        assert_eq!(layer.configure([12, 5, 1, 1]).unwrap(), vec![4, 5, 1, 1]);
    }

    #[test]
    fn test_forward_backward_scenario() {
        let mut layer = BagMaxPool::new(MilConfig::new(2));
        let mut bottom = blob(&[4, 1, 1, 1], &[3.0, 5.0, 1.0, 1.0]);
        let mut top = Blob::new(&[0]);

        layer.setup(&[&bottom], &mut [&mut top]).unwrap();
        assert_eq!(top.shape(), &[2, 1, 1, 1]);

        layer.forward(&[&bottom], &mut [&mut top]).unwrap();
        assert_eq!(values(top.data()), vec![5.0, 1.0]);

        top.diff_mut().fill(1.0);
        layer.backward(&[&top], &[true], &mut [&mut bottom]).unwrap();
        assert_eq!(values(bottom.diff()), vec![0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_split_ties() {
        let config = MilConfig::new(2).with_tie_gradient(TieGradient::Split);
        let mut layer = BagMaxPool::new(config);
        let mut bottom = blob(&[4, 1], &[3.0, 5.0, 1.0, 1.0]);
        let mut top = Blob::new(&[0]);

        layer.setup(&[&bottom], &mut [&mut top]).unwrap();
        layer.forward(&[&bottom], &mut [&mut top]).unwrap();
        top.diff_mut().fill(1.0);
        layer.backward(&[&top], &[true], &mut [&mut bottom]).unwrap();
        assert_eq!(values(bottom.diff()), vec![0.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_forward_before_setup() {
        let layer = BagMaxPool::new(MilConfig::new(2));
        let bottom = Blob::new(&[4, 1, 1, 1]);
        let mut top = Blob::new(&[2, 1, 1, 1]);
        let err = layer.forward(&[&bottom], &mut [&mut top]).unwrap_err();
        assert!(matches!(err, LayerError::NotSetUp("MIL")));
    }

    #[test]
    fn test_forward_after_input_change_without_reshape() {
        let mut layer = BagMaxPool::new(MilConfig::new(2));
        let bottom = Blob::new(&[4, 1, 1, 1]);
        let mut top = Blob::new(&[0]);
        layer.setup(&[&bottom], &mut [&mut top]).unwrap();

        let grown = Blob::new(&[6, 1, 1, 1]);
        let err = layer.forward(&[&grown], &mut [&mut top]).unwrap_err();
        assert!(matches!(err, LayerError::Runtime(RuntimeError::ShapeError(_))));
    }

    #[test]
    fn test_zero_instances_per_bag_fails_setup() {
        let mut layer = BagMaxPool::new(MilConfig::new(0));
        let bottom = Blob::new(&[4, 1, 1, 1]);
        let mut top = Blob::new(&[0]);
        let err = layer.setup(&[&bottom], &mut [&mut top]).unwrap_err();
        assert!(matches!(
            err,
            LayerError::Shape(ShapeInferenceError::ZeroInstancesPerBag)
        ));
    }
}
