//! Camera view/projection matrices and viewport unprojection
//!
//! Projections map the near plane to NDC z = 0 and the far plane to z = 1.
//! Cameras look down their look direction with a right-handed basis.

use crate::matrix::Matrix3D;
use crate::types::ViewportRect;
use glam::{DVec2, DVec3};

/// Half-line used for hit testing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray3D {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray3D {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    pub fn point_at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Ray in the space `matrix` maps into
    ///
    /// Projective matrices move the direction by transforming a second point.
    pub fn transform(&self, matrix: &Matrix3D) -> Ray3D {
        if matrix.is_distinguished_identity() {
            return *self;
        }
        if matrix.is_affine() {
            return Ray3D {
                origin: matrix.transform_point(self.origin),
                direction: matrix.transform_vector(self.direction),
            };
        }
        let origin = matrix.transform_point(self.origin);
        let ahead = matrix.transform_point(self.origin + self.direction);
        Ray3D {
            origin,
            direction: ahead - origin,
        }
    }
}

/// World-to-view matrix for a camera at `position`
///
/// Returns `None` when the look and up directions are degenerate.
pub fn look_at_view(position: DVec3, look_direction: DVec3, up_direction: DVec3) -> Option<Matrix3D> {
    let z_axis = (-look_direction).try_normalize()?;
    let x_axis = up_direction.cross(z_axis).try_normalize()?;
    let y_axis = z_axis.cross(x_axis);

    Some(Matrix3D::from_rows([
        [x_axis.x, y_axis.x, z_axis.x, 0.0],
        [x_axis.y, y_axis.y, z_axis.y, 0.0],
        [x_axis.z, y_axis.z, z_axis.z, 0.0],
        [
            -x_axis.dot(position),
            -y_axis.dot(position),
            -z_axis.dot(position),
            1.0,
        ],
    ]))
}

/// Perspective projection from a horizontal field of view in degrees
///
/// An infinite `far` produces the limit matrix.
pub fn perspective_projection(field_of_view: f64, aspect_ratio: f64, near: f64, far: f64) -> Matrix3D {
    let x_scale = 1.0 / (field_of_view.to_radians() * 0.5).tan();
    let y_scale = aspect_ratio * x_scale;
    let (z_scale, z_offset) = if far.is_infinite() {
        (-1.0, -near)
    } else {
        let z_scale = far / (near - far);
        (z_scale, near * z_scale)
    };

    Matrix3D::from_rows([
        [x_scale, 0.0, 0.0, 0.0],
        [0.0, y_scale, 0.0, 0.0],
        [0.0, 0.0, z_scale, -1.0],
        [0.0, 0.0, z_offset, 0.0],
    ])
}

/// Orthographic projection covering `width` units horizontally
pub fn orthographic_projection(width: f64, aspect_ratio: f64, near: f64, far: f64) -> Matrix3D {
    let x_scale = 2.0 / width;
    let y_scale = aspect_ratio * x_scale;
    let depth = near - far;

    Matrix3D::from_rows([
        [x_scale, 0.0, 0.0, 0.0],
        [0.0, y_scale, 0.0, 0.0],
        [0.0, 0.0, 1.0 / depth, 0.0],
        [0.0, 0.0, near / depth, 1.0],
    ])
}

/// Normalized device coordinates of a point inside `viewport`
pub fn viewport_to_ndc(point: DVec2, viewport: &ViewportRect) -> DVec2 {
    DVec2::new(
        (point.x - viewport.x) / viewport.width * 2.0 - 1.0,
        1.0 - (point.y - viewport.y) / viewport.height * 2.0,
    )
}

/// World ray through a viewport point
///
/// `view_projection` maps world space to clip space. Returns `None` for a
/// degenerate viewport or a non-invertible camera.
pub fn unproject(point: DVec2, viewport: &ViewportRect, view_projection: &Matrix3D) -> Option<Ray3D> {
    if viewport.is_degenerate() {
        return None;
    }
    let inverse = view_projection.inverse().ok()?;
    let ndc = viewport_to_ndc(point, viewport);

    // depth 1 is at infinity for an infinite far plane; aim through the middle
    let near = inverse.transform_point(DVec3::new(ndc.x, ndc.y, 0.0));
    let middle = inverse.transform_point(DVec3::new(ndc.x, ndc.y, 0.5));
    let direction = middle - near;
    if !near.is_finite() || !direction.is_finite() || direction == DVec3::ZERO {
        return None;
    }
    Some(Ray3D::new(near, direction))
}

/// Normalized depth of a world point, in [0, 1] between the clip planes
pub fn projected_depth(point: DVec3, view_projection: &Matrix3D) -> f64 {
    let clip = view_projection.transform_point4(point.extend(1.0));
    clip.z / clip.w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn camera() -> Matrix3D {
        let view = look_at_view(DVec3::new(0.0, 0.0, 5.0), DVec3::NEG_Z, DVec3::Y).unwrap();
        view * perspective_projection(90.0, 1.0, 1.0, 100.0)
    }

    #[test]
    fn test_look_at_moves_camera_to_origin() {
        let view = look_at_view(DVec3::new(1.0, 2.0, 3.0), DVec3::NEG_Z, DVec3::Y).unwrap();
        let p = view.transform_point(DVec3::new(1.0, 2.0, 3.0));
        assert_abs_diff_eq!(p.length(), 0.0, epsilon = 1e-12);
        let ahead = view.transform_point(DVec3::new(1.0, 2.0, 2.0));
        assert_abs_diff_eq!(ahead.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_look_at() {
        assert!(look_at_view(DVec3::ZERO, DVec3::Y, DVec3::Y).is_none());
        assert!(look_at_view(DVec3::ZERO, DVec3::ZERO, DVec3::Y).is_none());
    }

    #[test]
    fn test_perspective_depth_range() {
        let vp = camera();
        assert_abs_diff_eq!(projected_depth(DVec3::new(0.0, 0.0, 4.0), &vp), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(projected_depth(DVec3::new(0.0, 0.0, -95.0), &vp), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orthographic_depth_range() {
        let proj = orthographic_projection(10.0, 1.0, 1.0, 11.0);
        assert_abs_diff_eq!(projected_depth(DVec3::new(0.0, 0.0, -1.0), &proj), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(projected_depth(DVec3::new(0.0, 0.0, -11.0), &proj), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unproject_center_looks_forward() {
        let viewport = ViewportRect::new(0.0, 0.0, 200.0, 200.0);
        let ray = unproject(DVec2::new(100.0, 100.0), &viewport, &camera()).unwrap();
        assert_abs_diff_eq!(ray.origin.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ray.origin.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ray.origin.z, 4.0, epsilon = 1e-9);
        let dir = ray.direction.normalize();
        assert_abs_diff_eq!(dir.z, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unproject_infinite_far_plane() {
        let view = look_at_view(DVec3::new(0.0, 0.0, 5.0), DVec3::NEG_Z, DVec3::Y).unwrap();
        let vp = view * perspective_projection(45.0, 1.0, 0.125, f64::INFINITY);
        let viewport = ViewportRect::new(0.0, 0.0, 100.0, 100.0);
        let ray = unproject(DVec2::new(50.0, 50.0), &viewport, &vp).unwrap();
        assert!(ray.direction.is_finite());
        assert_abs_diff_eq!(ray.direction.normalize().z, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unproject_degenerate_viewport() {
        let viewport = ViewportRect::new(0.0, 0.0, 0.0, 200.0);
        assert!(unproject(DVec2::ZERO, &viewport, &camera()).is_none());
    }

    #[test]
    fn test_ray_transform_translation() {
        let ray = Ray3D::new(DVec3::ZERO, DVec3::X);
        let moved = ray.transform(&Matrix3D::from_translation(DVec3::new(0.0, 1.0, 0.0)));
        assert_eq!(moved.origin, DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(moved.direction, DVec3::X);
    }
}
