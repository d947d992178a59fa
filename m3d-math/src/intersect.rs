//! Ray/box and ray/triangle intersection

use crate::projection::Ray3D;
use crate::types::Rect3D;
use glam::DVec3;

/// Result of a ray/triangle test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Ray parameter; the hit point is `origin + direction * distance`
    pub distance: f64,
    /// Barycentric weights of the three vertices, summing to 1
    pub weights: [f64; 3],
    /// Counter-clockwise winding as seen from the ray origin
    pub front_facing: bool,
}

impl TriangleHit {
    pub fn interpolate(&self, vertices: [DVec3; 3]) -> DVec3 {
        vertices[0] * self.weights[0] + vertices[1] * self.weights[1] + vertices[2] * self.weights[2]
    }
}

/// Slab test of a ray (t >= 0) against a box
pub fn ray_intersects_box(ray: &Ray3D, bounds: &Rect3D) -> bool {
    ray_box_range(ray, bounds, 0.0).is_some()
}

/// Slab test of an infinite line against a box
pub fn line_intersects_box(ray: &Ray3D, bounds: &Rect3D) -> bool {
    ray_box_range(ray, bounds, f64::NEG_INFINITY).is_some()
}

/// Parameter interval where the ray is inside the box, clipped below at `t_min`
pub fn ray_box_range(ray: &Ray3D, bounds: &Rect3D, t_min: f64) -> Option<(f64, f64)> {
    if bounds.is_empty() {
        return None;
    }

    let min = bounds.min();
    let max = bounds.max();
    let mut near = t_min;
    let mut far = f64::INFINITY;

    for axis in 0..3 {
        let origin = ray.origin[axis];
        let direction = ray.direction[axis];
        if direction == 0.0 {
            // parallel to this slab: inside or never
            if origin < min[axis] || origin > max[axis] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / direction;
        let mut t0 = (min[axis] - origin) * inv;
        let mut t1 = (max[axis] - origin) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        near = near.max(t0);
        far = far.min(t1);
        if near > far {
            return None;
        }
    }

    Some((near, far))
}

/// Möller–Trumbore ray/triangle intersection
///
/// Accepts hits with a strictly positive distance only. `epsilon` rejects rays
/// (nearly) parallel to the triangle plane and degenerate triangles.
pub fn intersect_triangle(ray: &Ray3D, vertices: [DVec3; 3], epsilon: f64) -> Option<TriangleHit> {
    let [v0, v1, v2] = vertices;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);

    let scale = edge1.length() * edge2.length() * ray.direction.length();
    if det.abs() <= epsilon * scale || scale == 0.0 {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    if t <= 0.0 {
        return None;
    }

    Some(TriangleHit {
        distance: t,
        weights: [1.0 - u - v, u, v],
        // det > 0 means the ray runs against the face normal
        front_facing: det > 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_box() -> Rect3D {
        Rect3D::from_corners(DVec3::ZERO, DVec3::ONE)
    }

    fn triangle() -> [DVec3; 3] {
        [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_ray_hits_box() {
        let ray = Ray3D::new(DVec3::new(0.5, 0.5, 5.0), DVec3::NEG_Z);
        assert!(ray_intersects_box(&ray, &unit_box()));
        let (near, far) = ray_box_range(&ray, &unit_box(), 0.0).unwrap();
        assert_abs_diff_eq!(near, 4.0);
        assert_abs_diff_eq!(far, 5.0);
    }

    #[test]
    fn test_ray_behind_box_misses_but_line_hits() {
        let ray = Ray3D::new(DVec3::new(0.5, 0.5, 5.0), DVec3::Z);
        assert!(!ray_intersects_box(&ray, &unit_box()));
        assert!(line_intersects_box(&ray, &unit_box()));
    }

    #[test]
    fn test_parallel_ray_outside_slab_misses() {
        let ray = Ray3D::new(DVec3::new(2.0, 0.5, 5.0), DVec3::NEG_Z);
        assert!(!ray_intersects_box(&ray, &unit_box()));
        assert!(!ray_intersects_box(&ray, &Rect3D::EMPTY));
    }

    #[test]
    fn test_triangle_hit_weights() {
        let ray = Ray3D::new(DVec3::new(0.25, 0.25, 1.0), DVec3::NEG_Z);
        let hit = intersect_triangle(&ray, triangle(), 1e-12).unwrap();
        assert_abs_diff_eq!(hit.distance, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hit.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hit.weights[1], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(hit.weights[2], 0.25, epsilon = 1e-12);
        assert!(hit.front_facing);

        let point = hit.interpolate(triangle());
        assert_abs_diff_eq!((point - DVec3::new(0.25, 0.25, 0.0)).length(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_back_face() {
        let ray = Ray3D::new(DVec3::new(0.25, 0.25, -1.0), DVec3::Z);
        let hit = intersect_triangle(&ray, triangle(), 1e-12).unwrap();
        assert!(!hit.front_facing);
    }

    #[test]
    fn test_triangle_behind_origin_rejected() {
        let ray = Ray3D::new(DVec3::new(0.25, 0.25, -1.0), DVec3::NEG_Z);
        assert!(intersect_triangle(&ray, triangle(), 1e-12).is_none());
    }

    #[test]
    fn test_triangle_miss_and_parallel() {
        let outside = Ray3D::new(DVec3::new(0.9, 0.9, 1.0), DVec3::NEG_Z);
        assert!(intersect_triangle(&outside, triangle(), 1e-12).is_none());

        let parallel = Ray3D::new(DVec3::new(-1.0, 0.25, 0.0), DVec3::X);
        assert!(intersect_triangle(&parallel, triangle(), 1e-12).is_none());
    }
}
