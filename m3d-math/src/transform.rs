//! Parametric transforms and transform-group composition
//!
//! A [`TransformOp`] is the value part of a transform object: its parameters
//! plus a cheap `value()` that produces the [`Matrix3D`]. Groups compose their
//! members left to right, so the first member is applied first.

use crate::matrix::Matrix3D;
use glam::{DQuat, DVec3};

/// Rotation representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rotation3D {
    /// Axis and angle in degrees
    AxisAngle { axis: DVec3, angle: f64 },
    Quaternion(DQuat),
}

impl Default for Rotation3D {
    fn default() -> Self {
        Rotation3D::AxisAngle {
            axis: DVec3::Y,
            angle: 0.0,
        }
    }
}

impl Rotation3D {
    /// Normalized quaternion; a zero axis yields no rotation
    pub fn to_quaternion(&self) -> DQuat {
        match *self {
            Rotation3D::AxisAngle { axis, angle } => match axis.try_normalize() {
                Some(axis) => DQuat::from_axis_angle(axis, angle.to_radians()),
                None => DQuat::IDENTITY,
            },
            Rotation3D::Quaternion(q) => {
                if q.length_squared() == 0.0 {
                    DQuat::IDENTITY
                } else {
                    q.normalize()
                }
            }
        }
    }

    pub fn is_identity(&self) -> bool {
        match *self {
            Rotation3D::AxisAngle { angle, axis } => angle % 360.0 == 0.0 || axis == DVec3::ZERO,
            Rotation3D::Quaternion(q) => q == DQuat::IDENTITY,
        }
    }
}

/// Leaf transform parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    Translate { offset: DVec3 },
    Scale { scale: DVec3, center: DVec3 },
    Rotate { rotation: Rotation3D, center: DVec3 },
    Matrix(Matrix3D),
}

impl Default for TransformOp {
    fn default() -> Self {
        TransformOp::Matrix(Matrix3D::IDENTITY)
    }
}

impl TransformOp {
    pub fn translate(offset: DVec3) -> Self {
        TransformOp::Translate { offset }
    }

    pub fn scale(scale: DVec3) -> Self {
        TransformOp::Scale {
            scale,
            center: DVec3::ZERO,
        }
    }

    pub fn rotate_axis_angle(axis: DVec3, angle_degrees: f64) -> Self {
        TransformOp::Rotate {
            rotation: Rotation3D::AxisAngle {
                axis,
                angle: angle_degrees,
            },
            center: DVec3::ZERO,
        }
    }

    /// Matrix for these parameters
    ///
    /// Parameters that describe no change produce the distinguished identity so
    /// downstream composition takes the fast path.
    pub fn value(&self) -> Matrix3D {
        match *self {
            TransformOp::Translate { offset } => {
                if offset == DVec3::ZERO {
                    Matrix3D::IDENTITY
                } else {
                    Matrix3D::from_translation(offset)
                }
            }
            TransformOp::Scale { scale, center } => {
                if scale == DVec3::ONE {
                    Matrix3D::IDENTITY
                } else {
                    Matrix3D::from_scale_at(scale, center)
                }
            }
            TransformOp::Rotate { rotation, center } => {
                if rotation.is_identity() {
                    Matrix3D::IDENTITY
                } else {
                    Matrix3D::from_rotation_at(rotation.to_quaternion(), center)
                }
            }
            TransformOp::Matrix(m) => m,
        }
    }

    /// Only an explicit matrix can carry projective terms
    pub fn is_affine(&self) -> bool {
        match self {
            TransformOp::Matrix(m) => m.is_affine(),
            _ => true,
        }
    }
}

/// Compose a sequence of matrices left to right
///
/// An empty sequence yields the distinguished identity.
pub fn compose_all<I>(values: I) -> Matrix3D
where
    I: IntoIterator<Item = Matrix3D>,
{
    values
        .into_iter()
        .fold(Matrix3D::IDENTITY, |acc, m| acc.compose(&m))
}

/// Group affinity: every member affine, stopping at the first that is not
pub fn all_affine<I>(values: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    values.into_iter().all(|affine| affine)
}
