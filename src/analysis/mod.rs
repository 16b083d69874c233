//! # Shape Analysis Module
//!
//! Computes layer output shapes ahead of execution, so a bad
//! configuration is caught when a layer is set up rather than while
//! its kernels run.
//!
//! ```text
//! bottom (N, C, 1, 1) -> BagShape::infer -> top (N / instances_per_bag, C, 1, 1)
//! ```
//!
//! ## Example
//!
//! ```
//! use bagpool::analysis::shape_inference::BagShape;
//!
//! let shape = BagShape::infer([12, 5, 1, 1], 4, false).unwrap();
//! assert_eq!(shape.output_shape(), vec![3, 5, 1, 1]);
//! ```

pub mod shape_inference;
