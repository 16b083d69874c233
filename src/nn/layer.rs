//! Module defining the core `Layer` trait and the errors layers report.

use crate::analysis::shape_inference::ShapeInferenceError;
use crate::config::ConfigError;
use crate::runtime::backend::RuntimeError;
use crate::tensor::Blob;
use std::fmt;
use thiserror::Error;

/// Which side of a layer a blob list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobSide {
    Bottom,
    Top,
}

impl fmt::Display for BlobSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobSide::Bottom => write!(f, "bottom"),
            BlobSide::Top => write!(f, "top"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LayerError {
    #[error("{layer} layer takes exactly {expected} {side} blob(s), got {actual}.")]
    WrongBlobCount {
        layer: &'static str,
        side: BlobSide,
        expected: usize,
        actual: usize,
    },

    #[error("Got {actual} propagate_down flags for {expected} bottom blob(s).")]
    PropagateDownMismatch { expected: usize, actual: usize },

    #[error("{0} layer was used before setup. Call setup() or reshape() first.")]
    NotSetUp(&'static str),

    #[error("Unknown layer type '{0}'.")]
    UnknownLayerType(String),

    #[error("Layer '{name}' of type {layer_type} has no {param}.")]
    MissingParam {
        name: String,
        layer_type: String,
        param: &'static str,
    },

    #[error("Shape: {0}")]
    Shape(#[from] ShapeInferenceError),

    #[error("Runtime: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Config: {0}")]
    Config(#[from] ConfigError),
}

pub type LayerResult<T> = Result<T, LayerError>;

/// Trait defining the common interface of all layers.
///
/// A layer reads its `bottom` blobs and writes its `top` blobs on the
/// forward pass; on the backward pass it reads the tops' `diff` and
/// writes the bottoms' `diff`. Implementors provide the `layer_*` hooks
/// and the blob arity; `setup`, `forward` and `backward` check the arity
/// before calling them.
pub trait Layer {
    /// Registered type name.
    fn layer_type(&self) -> &'static str;

    fn exact_num_bottom_blobs(&self) -> Option<usize> {
        None
    }

    fn exact_num_top_blobs(&self) -> Option<usize> {
        None
    }

    /// One-time setup, run before the first reshape.
    fn layer_setup(&mut self, _bottom: &[&Blob], _top: &mut [&mut Blob]) -> LayerResult<()> {
        Ok(())
    }

    /// Recomputes cached shapes from the bottoms and reshapes the tops.
    fn reshape(&mut self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()>;

    fn layer_forward(&self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()>;

    fn layer_backward(
        &self,
        top: &[&Blob],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob],
    ) -> LayerResult<()>;

    fn check_blob_counts(&self, bottom: usize, top: usize) -> LayerResult<()> {
        let counts = [
            (BlobSide::Bottom, self.exact_num_bottom_blobs(), bottom),
            (BlobSide::Top, self.exact_num_top_blobs(), top),
        ];
        for (side, expected, actual) in counts {
            if let Some(expected) = expected {
                if expected != actual {
                    return Err(LayerError::WrongBlobCount {
                        layer: self.layer_type(),
                        side,
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks blob counts, runs `layer_setup`, then `reshape`.
    fn setup(&mut self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()> {
        self.check_blob_counts(bottom.len(), top.len())?;
        self.layer_setup(bottom, top)?;
        self.reshape(bottom, top)
    }

    fn forward(&self, bottom: &[&Blob], top: &mut [&mut Blob]) -> LayerResult<()> {
        self.check_blob_counts(bottom.len(), top.len())?;
        self.layer_forward(bottom, top)
    }

    /// Runs the backward pass. `propagate_down[i]` says whether the
    /// gradient of `bottom[i]` is wanted at all.
    fn backward(
        &self,
        top: &[&Blob],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob],
    ) -> LayerResult<()> {
        self.check_blob_counts(bottom.len(), top.len())?;
        if propagate_down.len() != bottom.len() {
            return Err(LayerError::PropagateDownMismatch {
                expected: bottom.len(),
                actual: propagate_down.len(),
            });
        }
        self.layer_backward(top, propagate_down, bottom)
    }
}
