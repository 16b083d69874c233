//! Module implementing the CPU backend.
//!
//! Both kernels work lane by lane: a lane is the `instances_per_bag`
//! scores one bag holds for one channel. Lanes never share output slots,
//! so large workloads are split across the rayon pool through
//! `ndarray`'s parallel `Zip`.

use super::backend::{Backend, RuntimeError, RuntimeResult};
use crate::analysis::shape_inference::BagShape;
use crate::config::TieGradient;
use log::trace;
use ndarray::{s, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, ArrayViewMut3, Axis, Zip};

/// Lane count from which the parallel path pays for its scheduling.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBackend {
    parallel: bool,
    parallel_threshold: usize,
}

impl CpuBackend {
    /// Single-threaded backend.
    pub fn new() -> Self {
        Self {
            parallel: false,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    /// Backend that uses the rayon pool for workloads of at least
    /// [`DEFAULT_PARALLEL_THRESHOLD`] lanes.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::new()
        }
    }

    /// Sets the lane count from which the parallel path is taken.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    fn use_parallel(&self, shape: &BagShape) -> bool {
        self.parallel && shape.lanes() >= self.parallel_threshold
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn bag_max(
        &self,
        input: ArrayView2<f32>,
        shape: &BagShape,
        mut output: ArrayViewMut2<f32>,
    ) -> RuntimeResult<()> {
        let bags = bag_view(input, shape)?;
        check_bag_matrix("output", output.dim(), shape)?;

        let parallel = self.use_parallel(shape);
        trace!(
            "bag_max: {} bags x {} channels, {} instances per bag (parallel: {})",
            shape.num_bags, shape.channels, shape.instances_per_bag, parallel
        );

        let zip = Zip::from(&mut output).and(bags.lanes(Axis(1)));
        if parallel {
            zip.par_for_each(max_lane);
        } else {
            zip.for_each(max_lane);
        }
        Ok(())
    }

    fn bag_max_grad(
        &self,
        input: ArrayView2<f32>,
        output: ArrayView2<f32>,
        output_grad: ArrayView2<f32>,
        shape: &BagShape,
        tie_gradient: TieGradient,
        mut input_grad: ArrayViewMut2<f32>,
    ) -> RuntimeResult<()> {
        let bags = bag_view(input, shape)?;
        check_bag_matrix("output", output.dim(), shape)?;
        check_bag_matrix("output gradient", output_grad.dim(), shape)?;
        if input_grad.dim() != input.dim() {
            return Err(RuntimeError::ShapeError(format!(
                "input gradient {:?} does not match input {:?}",
                input_grad.dim(),
                input.dim()
            )));
        }

        let parallel = self.use_parallel(shape);
        trace!(
            "bag_max_grad: {} bags x {} channels, ties {:?} (parallel: {})",
            shape.num_bags, shape.channels, tie_gradient, parallel
        );

        let pooled = shape.pooled_instances();
        input_grad.slice_mut(s![pooled.., ..]).fill(0.0);
        let mut grad_bags = bag_view_mut(input_grad, shape)?;

        let route = |grad: ArrayViewMut1<f32>, lane: ArrayView1<f32>, &top: &f32, &top_grad: &f32| {
            route_lane(tie_gradient, grad, lane, top, top_grad)
        };
        let zip = Zip::from(grad_bags.lanes_mut(Axis(1)))
            .and(bags.lanes(Axis(1)))
            .and(&output)
            .and(&output_grad);
        if parallel {
            zip.par_for_each(route);
        } else {
            zip.for_each(route);
        }
        Ok(())
    }
}

fn max_lane(top: &mut f32, lane: ArrayView1<f32>) {
    *top = lane.fold(f32::NEG_INFINITY, |max, &v| max.max(v));
}

/// Writes one lane of the input gradient. Only scores exactly equal to the
/// bag maximum receive gradient.
fn route_lane(
    tie_gradient: TieGradient,
    mut grad: ArrayViewMut1<f32>,
    lane: ArrayView1<f32>,
    top: f32,
    top_grad: f32,
) {
    let share = match tie_gradient {
        TieGradient::Duplicate => top_grad,
        TieGradient::Split => {
            let ties = lane.iter().filter(|&&v| v == top).count();
            if ties > 0 {
                top_grad / ties as f32
            } else {
                0.0
            }
        }
    };
    Zip::from(&mut grad)
        .and(&lane)
        .for_each(|g, &v| *g = if v == top { share } else { 0.0 });
}

fn check_bag_matrix(what: &str, dim: (usize, usize), shape: &BagShape) -> RuntimeResult<()> {
    if dim != (shape.num_bags, shape.channels) {
        return Err(RuntimeError::ShapeError(format!(
            "{} is {}x{}, expected {} bags x {} channels",
            what, dim.0, dim.1, shape.num_bags, shape.channels
        )));
    }
    Ok(())
}

fn check_instance_matrix(dim: (usize, usize), shape: &BagShape) -> RuntimeResult<()> {
    if dim.0 < shape.pooled_instances() || dim.1 != shape.channels {
        return Err(RuntimeError::ShapeError(format!(
            "input is {}x{}, expected at least {} instances x {} channels",
            dim.0,
            dim.1,
            shape.pooled_instances(),
            shape.channels
        )));
    }
    Ok(())
}

fn check_row_major(standard: bool) -> RuntimeResult<()> {
    if !standard {
        return Err(RuntimeError::LayoutError(
            "instance matrix must be row-major".to_string(),
        ));
    }
    Ok(())
}

/// `(N, C)` instance matrix as `(B, instances_per_bag, C)`, dropping unpooled rows.
fn bag_view<'a>(input: ArrayView2<'a, f32>, shape: &BagShape) -> RuntimeResult<ArrayView3<'a, f32>> {
    check_instance_matrix(input.dim(), shape)?;
    let pooled = input.slice_move(s![..shape.pooled_instances(), ..]);
    check_row_major(pooled.is_standard_layout())?;
    pooled
        .into_shape((shape.num_bags, shape.instances_per_bag, shape.channels))
        .map_err(|e| RuntimeError::LayoutError(e.to_string()))
}

fn bag_view_mut<'a>(
    input: ArrayViewMut2<'a, f32>,
    shape: &BagShape,
) -> RuntimeResult<ArrayViewMut3<'a, f32>> {
    check_instance_matrix(input.dim(), shape)?;
    let pooled = input.slice_move(s![..shape.pooled_instances(), ..]);
    check_row_major(pooled.is_standard_layout())?;
    pooled
        .into_shape((shape.num_bags, shape.instances_per_bag, shape.channels))
        .map_err(|e| RuntimeError::LayoutError(e.to_string()))
}
