//! m3d scene - retained-mode 3-D scene graph
//!
//! Objects live in one arena owned by [`Scene`] and refer to each other by
//! [`ObjectId`]. Every object carries a version header (freeze, clone,
//! change observers) and a per-channel resource table; the scene keeps any
//! number of render channels in sync by reference counting what each channel
//! can reach and sending only what changed.
//!
//! Key pieces:
//! - Typed collections with versioned cursors
//! - Visual tree with guarded child walks
//! - Lazily cached bounds, invalidated up the holder chain
//! - Ray and viewport-point hit testing

pub mod animation;
pub mod bounds;
pub mod collection;
pub mod config;
pub mod error;
pub mod geometry;
pub mod object;
pub mod resource;
pub mod scene;
pub mod sync;
pub mod tree;
pub mod value;

pub use animation::*;
pub use collection::*;
pub use config::*;
pub use error::*;
pub use geometry::*;
pub use hit_test::*;
pub use object::*;
pub use resource::*;
pub use scene::*;
pub use sync::*;
pub use value::*;

pub fn version() -> &'static str {
    "0.1.0"
}
