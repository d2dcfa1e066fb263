pub mod affine;
pub mod flip;
pub mod normalize;
pub mod pipeline;
pub mod resize;

pub use affine::{AffineParams, AugmentationConfig};
pub use pipeline::Transform;
