//! Core value types shared by the scene graph and the channel protocol
//!
//! Points, vectors and quaternions are glam's f64 types. This module adds the
//! composite values glam does not have: sizes, boxes with an empty sentinel,
//! 2-D viewport rectangles and colors.

use crate::error::{MathError, Result};
use crate::matrix::Matrix3D;
use bytemuck::{Pod, Zeroable};
use glam::DVec3;

pub type Point3D = DVec3;
pub type Vector3D = DVec3;

/// Extent of a 3-D box
///
/// A negative dimension is reserved for [`Size3D::EMPTY`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Size3D {
    pub const EMPTY: Size3D = Size3D {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
        z: f64::NEG_INFINITY,
    };

    /// Create a size, rejecting negative dimensions
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self> {
        if x < 0.0 || y < 0.0 || z < 0.0 {
            return Err(MathError::NegativeSize(x, y, z));
        }
        Ok(Self { x, y, z })
    }

    pub fn is_empty(&self) -> bool {
        self.x < 0.0
    }

    pub fn as_vec(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

/// Axis-aligned 3-D box
///
/// [`Rect3D::EMPTY`] is a distinguished value (negative size) that unions as a
/// no-op and intersects to itself, so callers never need `Option<Rect3D>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect3D {
    pub location: DVec3,
    pub size: Size3D,
}

impl Default for Rect3D {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Rect3D {
    pub const EMPTY: Rect3D = Rect3D {
        location: DVec3::INFINITY,
        size: Size3D::EMPTY,
    };

    /// Box covering all of space; what a projective transform yields when
    /// the box crosses its `w = 0` plane
    pub const UNBOUNDED: Rect3D = Rect3D {
        location: DVec3::new(-f64::MAX, -f64::MAX, -f64::MAX),
        size: Size3D {
            x: f64::INFINITY,
            y: f64::INFINITY,
            z: f64::INFINITY,
        },
    };

    pub fn new(location: DVec3, size: Size3D) -> Self {
        if size.is_empty() {
            return Self::EMPTY;
        }
        Self { location, size }
    }

    /// Smallest box containing both corners
    pub fn from_corners(a: DVec3, b: DVec3) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        let extent = max - min;
        Self {
            location: min,
            size: Size3D {
                x: extent.x,
                y: extent.y,
                z: extent.z,
            },
        }
    }

    /// Bounding box of a point set; empty when there are no points
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = DVec3>,
    {
        let mut iter = points.into_iter();
        let first = match iter.next() {
            Some(p) => p,
            None => return Self::EMPTY,
        };

        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self::from_corners(min, max)
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn is_unbounded(&self) -> bool {
        !self.is_empty() && !self.size.as_vec().is_finite()
    }

    pub fn min(&self) -> DVec3 {
        self.location
    }

    pub fn max(&self) -> DVec3 {
        self.location + self.size.as_vec()
    }

    pub fn center(&self) -> DVec3 {
        self.location + self.size.as_vec() * 0.5
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        if self.is_empty() {
            return false;
        }
        let min = self.min();
        let max = self.max();
        point.cmpge(min).all() && point.cmple(max).all()
    }

    /// Whether `other` lies completely inside this box (within `tolerance`)
    pub fn contains_rect(&self, other: &Rect3D, tolerance: f64) -> bool {
        if other.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        let slack = DVec3::splat(tolerance);
        (other.min() + slack).cmpge(self.min()).all() && (other.max() - slack).cmple(self.max()).all()
    }

    pub fn union(&self, other: &Rect3D) -> Rect3D {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_corners(self.min().min(other.min()), self.max().max(other.max()))
    }

    pub fn union_point(&self, point: DVec3) -> Rect3D {
        self.union(&Self::from_corners(point, point))
    }

    pub fn intersects(&self, other: &Rect3D) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min().cmple(other.max()).all() && other.min().cmple(self.max()).all()
    }

    pub fn intersect(&self, other: &Rect3D) -> Rect3D {
        if !self.intersects(other) {
            return Self::EMPTY;
        }
        Self::from_corners(self.min().max(other.min()), self.max().min(other.max()))
    }

    pub fn corners(&self) -> [DVec3; 8] {
        let min = self.min();
        let max = self.max();
        [
            DVec3::new(min.x, min.y, min.z),
            DVec3::new(max.x, min.y, min.z),
            DVec3::new(min.x, max.y, min.z),
            DVec3::new(max.x, max.y, min.z),
            DVec3::new(min.x, min.y, max.z),
            DVec3::new(max.x, min.y, max.z),
            DVec3::new(min.x, max.y, max.z),
            DVec3::new(max.x, max.y, max.z),
        ]
    }

    /// Axis-aligned bounds of this box after `matrix`
    ///
    /// Under a projective matrix the corner images only bound the result when
    /// every corner has `w` of the same sign; otherwise the box passes through
    /// infinity and the result is [`Rect3D::UNBOUNDED`].
    pub fn transform(&self, matrix: &Matrix3D) -> Rect3D {
        if self.is_empty() || matrix.is_identity() {
            return *self;
        }
        if self.is_unbounded() {
            return Self::UNBOUNDED;
        }
        let corners = self.corners();
        if !matrix.is_affine() {
            let ws = corners.map(|c| matrix.transform_point4(c.extend(1.0)).w);
            let ahead = ws.iter().all(|w| *w > 0.0);
            let behind = ws.iter().all(|w| *w < 0.0);
            if !(ahead || behind) {
                return Self::UNBOUNDED;
            }
        }
        Self::from_points(corners.into_iter().map(|c| matrix.transform_point(c)))
    }
}

/// 2-D rectangle a viewport projects into
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewportRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Linear RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
