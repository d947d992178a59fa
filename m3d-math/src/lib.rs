//! m3d math - 4x4 homogeneous transforms for the 3-D scene graph
//!
//! Row-vector convention: points transform as `p * M`, translation lives in
//! the fourth row, and `a * b` applies `a` first.
//!
//! Key pieces:
//! - Distinguished-identity tag so composition with identity is free
//! - Affine fast paths for determinant, inverse and point transforms
//! - Camera projection and viewport unprojection for hit testing
//! - Ray/box slab test and ray/triangle intersection

pub mod convert;
pub mod error;
pub mod intersect;
pub mod matrix;
pub mod projection;
pub mod transform;
pub mod types;

pub use error::*;
pub use intersect::*;
pub use matrix::*;
pub use projection::*;
pub use transform::*;
pub use types::*;

pub use glam::{DQuat, DVec2, DVec3, DVec4};

pub fn version() -> &'static str {
    "0.1.0"
}
