//! # Layers Module
//!
//! Layers follow a setup / reshape / forward / backward life cycle over
//! [`Blob`](crate::tensor::Blob)s, see [`Layer`].
//!
//! ## Available Layers
//!
//! - [`BagMaxPool`] (type `"MIL"`): multiple-instance bag max pooling
//!
//! ## Example
//!
//! ```
//! use bagpool::config::LayerConfig;
//! use bagpool::nn::create_layer;
//! use bagpool::tensor::Blob;
//!
//! let config = LayerConfig::from_json(
//!     r#"{ "name": "mil", "type": "MIL", "mil_param": { "instances_per_bag": 3 } }"#,
//! ).unwrap();
//! let mut layer = create_layer(&config).unwrap();
//!
//! let bottom = Blob::new(&[6, 4, 1, 1]);
//! let mut top = Blob::new(&[0]);
//! layer.setup(&[&bottom], &mut [&mut top]).unwrap();
//! assert_eq!(top.shape(), &[2, 4, 1, 1]);
//! ```

pub mod layer;
pub mod pooling;

pub use layer::{BlobSide, Layer, LayerError, LayerResult};
pub use pooling::BagMaxPool;

use crate::config::LayerConfig;

/// Type names `create_layer` accepts for [`BagMaxPool`].
pub const BAG_MAX_POOL_TYPES: [&str; 2] = ["MIL", "BagMaxPool"];

/// Builds a layer from its description.
pub fn create_layer(config: &LayerConfig) -> LayerResult<Box<dyn Layer>> {
    match config.layer_type.as_str() {
        t if BAG_MAX_POOL_TYPES.iter().any(|&name| name == t) => {
            let mil = config.mil_param.clone().ok_or_else(|| LayerError::MissingParam {
                name: config.name.clone(),
                layer_type: config.layer_type.clone(),
                param: "mil_param",
            })?;
            Ok(Box::new(BagMaxPool::new(mil)))
        }
        other => Err(LayerError::UnknownLayerType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MilConfig;

    #[test]
    fn test_create_by_either_name() {
        for name in BAG_MAX_POOL_TYPES {
            let config = LayerConfig::new("mil", name).with_mil_param(MilConfig::new(2));
            let layer = create_layer(&config).unwrap();
            assert_eq!(layer.layer_type(), "MIL");
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = create_layer(&LayerConfig::new("pool", "Pooling")).err().unwrap();
        assert!(matches!(err, LayerError::UnknownLayerType(ref t) if t == "Pooling"));
    }

    #[test]
    fn test_missing_param() {
        let err = create_layer(&LayerConfig::new("mil", "MIL")).err().unwrap();
        assert!(matches!(err, LayerError::MissingParam { param: "mil_param", .. }));
    }
}
