//! Module for bag shape inference.
//!
//! Determines how an instance blob of legacy shape `(N, C, H, W)` is
//! partitioned into bags, and what shape the pooled output takes.

use thiserror::Error;

/// Tensor shape.
pub type Shape = Vec<usize>;

/// Rank of the legacy `(N, C, H, W)` layout.
pub const LEGACY_RANK: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeInferenceError {
    #[error("instances_per_bag must be at least 1.")]
    ZeroInstancesPerBag,

    #[error("{instances} instances cannot be split into bags of {instances_per_bag}. \
             Make the instance count a multiple of instances_per_bag or enable allow_partial_bags.")]
    IndivisibleInstances {
        instances: usize,
        instances_per_bag: usize,
    },

    #[error("Spatial extent {height}x{width} is not supported: bag pooling expects (N, C, 1, 1) inputs.")]
    NonSingletonSpatial { height: usize, width: usize },

    #[error("Invalid tensor rank: expected at most {expected}D, got {actual}D.")]
    InvalidRank { expected: usize, actual: usize },
}

type Result<T> = std::result::Result<T, ShapeInferenceError>;

/// Cached partition of an instance blob into bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BagShape {
    pub num_bags: usize,
    pub instances_per_bag: usize,
    pub channels: usize,
}

impl BagShape {
    /// Infers the bag partition for an input of legacy shape `(N, C, H, W)`.
    ///
    /// With `allow_partial_bags` the trailing `N mod instances_per_bag`
    /// instances are left out of every bag instead of raising an error.
    pub fn infer(
        input: [usize; LEGACY_RANK],
        instances_per_bag: usize,
        allow_partial_bags: bool,
    ) -> Result<Self> {
        let [instances, channels, height, width] = input;

        if instances_per_bag == 0 {
            return Err(ShapeInferenceError::ZeroInstancesPerBag);
        }
        if height * width != 1 {
            return Err(ShapeInferenceError::NonSingletonSpatial { height, width });
        }
        if !allow_partial_bags && instances % instances_per_bag != 0 {
            return Err(ShapeInferenceError::IndivisibleInstances {
                instances,
                instances_per_bag,
            });
        }

        Ok(Self {
            num_bags: instances / instances_per_bag,
            instances_per_bag,
            channels,
        })
    }

    /// Number of instances that belong to some bag.
    pub fn pooled_instances(&self) -> usize {
        self.num_bags * self.instances_per_bag
    }

    /// Shape of the pooled output, always `(B, C, 1, 1)`.
    pub fn output_shape(&self) -> Shape {
        vec![self.num_bags, self.channels, 1, 1]
    }

    /// Number of independent `(bag, channel)` lanes.
    pub fn lanes(&self) -> usize {
        self.num_bags * self.channels
    }
}
