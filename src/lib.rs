//! # bagpool: multiple-instance bag pooling
//!
//! **bagpool** implements the bag max pooling layer used in
//! multiple-instance learning. Instance scores are grouped into
//! fixed-size bags of consecutive instances; the layer outputs each bag's
//! maximum score per channel, and on the backward pass routes each bag's
//! gradient to the instances that produced the maximum.
//!
//! ## Usage Example
//!
//! ```
//! use bagpool::config::MilConfig;
//! use bagpool::nn::{BagMaxPool, Layer};
//! use bagpool::tensor::Blob;
//!
//! // Two bags of two instances, one channel.
//! let mut layer = BagMaxPool::new(MilConfig::new(2));
//! let mut scores = Blob::from_vec(&[4, 1, 1, 1], vec![3.0, 5.0, 1.0, 1.0]).unwrap();
//! let mut bags = Blob::new(&[0]);
//!
//! layer.setup(&[&scores], &mut [&mut bags]).unwrap();
//! layer.forward(&[&scores], &mut [&mut bags]).unwrap();
//! assert_eq!(bags.data().as_slice().unwrap(), &[5.0, 1.0]);
//!
//! bags.diff_mut().fill(1.0);
//! layer.backward(&[&bags], &[true], &mut [&mut scores]).unwrap();
//! // Both instances of the second bag tie for the maximum.
//! assert_eq!(scores.diff().as_slice().unwrap(), &[0.0, 1.0, 1.0, 1.0]);
//! ```

pub mod analysis;
pub mod config;
pub mod nn;
pub mod runtime;
pub mod tensor;
