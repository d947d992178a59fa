//! 4x4 homogeneous transform with identity and affine fast paths
//!
//! Row-vector convention: a point transforms as `p' = p * M`, translation
//! lives in the fourth row and the projective terms in the fourth column.
//! Composition `a * b` therefore applies `a` first, then `b`.

use crate::error::{MathError, Result};
use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};
use std::ops::Mul;

const IDENTITY_ROWS: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Relative tolerance used when deciding whether a determinant is zero
const DETERMINANT_EPSILON: f64 = 10.0 * f64::EPSILON;

/// True when `value` is zero relative to `magnitude`
fn is_zero_relative(value: f64, magnitude: f64) -> bool {
    value.abs() <= DETERMINANT_EPSILON * magnitude
}

/// 4x4 transform matrix
///
/// [`Matrix3D::IDENTITY`] carries a tag that lets composition and point
/// transformation skip all arithmetic. A matrix built from explicit identity
/// values is equal to it but does not carry the tag.
#[derive(Debug, Clone, Copy)]
pub struct Matrix3D {
    m: [[f64; 4]; 4],
    identity: bool,
}

impl Default for Matrix3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl PartialEq for Matrix3D {
    fn eq(&self, other: &Self) -> bool {
        (self.identity && other.identity) || self.m == other.m
    }
}

impl Matrix3D {
    pub const IDENTITY: Matrix3D = Matrix3D {
        m: IDENTITY_ROWS,
        identity: true,
    };

    pub const fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m, identity: false }
    }

    pub fn rows(&self) -> [[f64; 4]; 4] {
        self.m
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.m[row][col]
    }

    /// Set one element; clears the identity tag
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.m[row][col] = value;
        self.identity = false;
    }

    pub fn is_distinguished_identity(&self) -> bool {
        self.identity
    }

    pub fn is_identity(&self) -> bool {
        self.identity || self.m == IDENTITY_ROWS
    }

    /// Projective column equals (0, 0, 0, 1)
    pub fn is_affine(&self) -> bool {
        self.identity
            || (self.m[0][3] == 0.0
                && self.m[1][3] == 0.0
                && self.m[2][3] == 0.0
                && self.m[3][3] == 1.0)
    }

    pub fn offset(&self) -> DVec3 {
        DVec3::new(self.m[3][0], self.m[3][1], self.m[3][2])
    }

    pub fn from_translation(offset: DVec3) -> Self {
        let mut m = IDENTITY_ROWS;
        m[3][0] = offset.x;
        m[3][1] = offset.y;
        m[3][2] = offset.z;
        Self::from_rows(m)
    }

    pub fn from_scale(scale: DVec3) -> Self {
        Self::from_scale_at(scale, DVec3::ZERO)
    }

    /// Scale about `center`
    pub fn from_scale_at(scale: DVec3, center: DVec3) -> Self {
        let offset = center - center * scale;
        Self::from_rows([
            [scale.x, 0.0, 0.0, 0.0],
            [0.0, scale.y, 0.0, 0.0],
            [0.0, 0.0, scale.z, 0.0],
            [offset.x, offset.y, offset.z, 1.0],
        ])
    }

    pub fn from_quaternion(rotation: DQuat) -> Self {
        Self::from_rotation_at(rotation, DVec3::ZERO)
    }

    /// Rotate about `center`
    pub fn from_rotation_at(rotation: DQuat, center: DVec3) -> Self {
        // glam is column-vector, so its columns are our rows
        let r = DMat3::from_quat(rotation.normalize());
        let rotated_center = r * center;
        let offset = center - rotated_center;
        Self::from_rows([
            [r.x_axis.x, r.x_axis.y, r.x_axis.z, 0.0],
            [r.y_axis.x, r.y_axis.y, r.y_axis.z, 0.0],
            [r.z_axis.x, r.z_axis.y, r.z_axis.z, 0.0],
            [offset.x, offset.y, offset.z, 1.0],
        ])
    }

    /// Column-vector glam matrix with the same effect
    pub fn to_dmat4(&self) -> DMat4 {
        DMat4::from_cols_array_2d(&self.m)
    }

    pub fn from_dmat4(matrix: &DMat4) -> Self {
        Self::from_rows(matrix.to_cols_array_2d())
    }

    /// `self` followed by `other`
    ///
    /// Either operand being the distinguished identity returns the other
    /// unchanged, so `IDENTITY * IDENTITY` keeps the tag.
    pub fn compose(&self, other: &Matrix3D) -> Matrix3D {
        if self.identity {
            return *other;
        }
        if other.identity {
            return *self;
        }

        let a = &self.m;
        let b = &other.m;
        let mut out = [[0.0f64; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j] + a[i][3] * b[3][j];
            }
        }
        Self::from_rows(out)
    }

    pub fn append(&mut self, other: &Matrix3D) {
        *self = self.compose(other);
    }

    pub fn prepend(&mut self, other: &Matrix3D) {
        *self = other.compose(self);
    }

    pub fn determinant(&self) -> f64 {
        if self.identity {
            return 1.0;
        }
        if self.is_affine() {
            self.determinant_3x3()
        } else {
            self.determinant_4x4()
        }
    }

    fn determinant_3x3(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            + m[0][1] * (m[1][2] * m[2][0] - m[1][0] * m[2][2])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    fn determinant_4x4(&self) -> f64 {
        let (s, c) = self.minors_2x2();
        s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0]
    }

    /// 2x2 minors of the top two rows (`s`) and the bottom two rows (`c`)
    fn minors_2x2(&self) -> ([f64; 6], [f64; 6]) {
        let a = &self.m;
        let s = [
            a[0][0] * a[1][1] - a[1][0] * a[0][1],
            a[0][0] * a[1][2] - a[1][0] * a[0][2],
            a[0][0] * a[1][3] - a[1][0] * a[0][3],
            a[0][1] * a[1][2] - a[1][1] * a[0][2],
            a[0][1] * a[1][3] - a[1][1] * a[0][3],
            a[0][2] * a[1][3] - a[1][2] * a[0][3],
        ];
        let c = [
            a[2][0] * a[3][1] - a[3][0] * a[2][1],
            a[2][0] * a[3][2] - a[3][0] * a[2][2],
            a[2][0] * a[3][3] - a[3][0] * a[2][3],
            a[2][1] * a[3][2] - a[3][1] * a[2][2],
            a[2][1] * a[3][3] - a[3][1] * a[2][3],
            a[2][2] * a[3][3] - a[3][2] * a[2][3],
        ];
        (s, c)
    }

    /// Product of the row lengths of the upper-left `size` block
    ///
    /// Bounds |det| from above (Hadamard), so a determinant that is tiny
    /// against it means the rows are close to dependent.
    fn row_norm_product(&self, size: usize) -> f64 {
        self.m[..size]
            .iter()
            .map(|row| row[..size].iter().map(|v| v * v).sum::<f64>().sqrt())
            .product()
    }

    pub fn has_inverse(&self) -> bool {
        self.inverse().is_ok()
    }

    /// Inverse matrix, or [`MathError::NotInvertible`]
    pub fn inverse(&self) -> Result<Matrix3D> {
        if self.identity {
            return Ok(*self);
        }
        if self.is_affine() {
            self.inverse_affine()
        } else {
            self.inverse_general()
        }
    }

    /// Invert in place; on failure the matrix is left unchanged
    pub fn invert(&mut self) -> Result<()> {
        *self = self.inverse()?;
        Ok(())
    }

    fn inverse_affine(&self) -> Result<Matrix3D> {
        let m = &self.m;
        let det = self.determinant_3x3();
        if is_zero_relative(det, self.row_norm_product(3)) {
            return Err(MathError::NotInvertible);
        }

        // cofactors[i][j] of the upper-left 3x3
        let cofactors = [
            [
                m[1][1] * m[2][2] - m[1][2] * m[2][1],
                m[1][2] * m[2][0] - m[1][0] * m[2][2],
                m[1][0] * m[2][1] - m[1][1] * m[2][0],
            ],
            [
                m[0][2] * m[2][1] - m[0][1] * m[2][2],
                m[0][0] * m[2][2] - m[0][2] * m[2][0],
                m[0][1] * m[2][0] - m[0][0] * m[2][1],
            ],
            [
                m[0][1] * m[1][2] - m[0][2] * m[1][1],
                m[0][2] * m[1][0] - m[0][0] * m[1][2],
                m[0][0] * m[1][1] - m[0][1] * m[1][0],
            ],
        ];

        let inv_det = 1.0 / det;
        let mut out = IDENTITY_ROWS;
        for i in 0..3 {
            for j in 0..3 {
                out[i][j] = cofactors[j][i] * inv_det;
            }
        }

        // translation row becomes -(t * A^-1)
        let t = [m[3][0], m[3][1], m[3][2]];
        for j in 0..3 {
            out[3][j] = -(t[0] * out[0][j] + t[1] * out[1][j] + t[2] * out[2][j]);
        }

        Ok(Self::from_rows(out))
    }

    fn inverse_general(&self) -> Result<Matrix3D> {
        let a = &self.m;
        let (s, c) = self.minors_2x2();
        let det = s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0];
        if is_zero_relative(det, self.row_norm_product(4)) {
            return Err(MathError::NotInvertible);
        }

        let inv_det = 1.0 / det;
        let adjugate = [
            [
                a[1][1] * c[5] - a[1][2] * c[4] + a[1][3] * c[3],
                -a[0][1] * c[5] + a[0][2] * c[4] - a[0][3] * c[3],
                a[3][1] * s[5] - a[3][2] * s[4] + a[3][3] * s[3],
                -a[2][1] * s[5] + a[2][2] * s[4] - a[2][3] * s[3],
            ],
            [
                -a[1][0] * c[5] + a[1][2] * c[2] - a[1][3] * c[1],
                a[0][0] * c[5] - a[0][2] * c[2] + a[0][3] * c[1],
                -a[3][0] * s[5] + a[3][2] * s[2] - a[3][3] * s[1],
                a[2][0] * s[5] - a[2][2] * s[2] + a[2][3] * s[1],
            ],
            [
                a[1][0] * c[4] - a[1][1] * c[2] + a[1][3] * c[0],
                -a[0][0] * c[4] + a[0][1] * c[2] - a[0][3] * c[0],
                a[3][0] * s[4] - a[3][1] * s[2] + a[3][3] * s[0],
                -a[2][0] * s[4] + a[2][1] * s[2] - a[2][3] * s[0],
            ],
            [
                -a[1][0] * c[3] + a[1][1] * c[1] - a[1][2] * c[0],
                a[0][0] * c[3] - a[0][1] * c[1] + a[0][2] * c[0],
                -a[3][0] * s[3] + a[3][1] * s[1] - a[3][2] * s[0],
                a[2][0] * s[3] - a[2][1] * s[1] + a[2][2] * s[0],
            ],
        ];

        let mut out = [[0.0f64; 4]; 4];
        for (out_row, adj_row) in out.iter_mut().zip(adjugate.iter()) {
            for (cell, adj) in out_row.iter_mut().zip(adj_row.iter()) {
                *cell = adj * inv_det;
            }
        }
        Ok(Self::from_rows(out))
    }

    /// Transform a point, dividing by `w` for projective matrices
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        if self.identity {
            return p;
        }
        let m = &self.m;
        let x = p.x * m[0][0] + p.y * m[1][0] + p.z * m[2][0] + m[3][0];
        let y = p.x * m[0][1] + p.y * m[1][1] + p.z * m[2][1] + m[3][1];
        let z = p.x * m[0][2] + p.y * m[1][2] + p.z * m[2][2] + m[3][2];
        if self.is_affine() {
            return DVec3::new(x, y, z);
        }
        let w = p.x * m[0][3] + p.y * m[1][3] + p.z * m[2][3] + m[3][3];
        DVec3::new(x / w, y / w, z / w)
    }

    /// Transform a homogeneous point without dividing
    pub fn transform_point4(&self, p: DVec4) -> DVec4 {
        if self.identity {
            return p;
        }
        let m = &self.m;
        DVec4::new(
            p.x * m[0][0] + p.y * m[1][0] + p.z * m[2][0] + p.w * m[3][0],
            p.x * m[0][1] + p.y * m[1][1] + p.z * m[2][1] + p.w * m[3][1],
            p.x * m[0][2] + p.y * m[1][2] + p.z * m[2][2] + p.w * m[3][2],
            p.x * m[0][3] + p.y * m[1][3] + p.z * m[2][3] + p.w * m[3][3],
        )
    }

    /// Transform a direction; translation is never applied
    pub fn transform_vector(&self, v: DVec3) -> DVec3 {
        if self.identity {
            return v;
        }
        let m = &self.m;
        DVec3::new(
            v.x * m[0][0] + v.y * m[1][0] + v.z * m[2][0],
            v.x * m[0][1] + v.y * m[1][1] + v.z * m[2][1],
            v.x * m[0][2] + v.y * m[1][2] + v.z * m[2][2],
        )
    }

    pub fn transform_points(&self, points: &mut [DVec3]) {
        if self.identity {
            return;
        }
        for p in points.iter_mut() {
            *p = self.transform_point(*p);
        }
    }
}

impl Mul for Matrix3D {
    type Output = Matrix3D;

    fn mul(self, rhs: Matrix3D) -> Matrix3D {
        self.compose(&rhs)
    }
}

impl Mul<&Matrix3D> for &Matrix3D {
    type Output = Matrix3D;

    fn mul(self, rhs: &Matrix3D) -> Matrix3D {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_matrix_near(a: &Matrix3D, b: &Matrix3D, eps: f64) {
        for i in 0..4 {
            for j in 0..4 {
                assert_abs_diff_eq!(a.get(i, j), b.get(i, j), epsilon = eps);
            }
        }
    }

    fn sample_affine() -> Matrix3D {
        Matrix3D::from_scale_at(DVec3::new(2.0, 3.0, 0.5), DVec3::new(1.0, 1.0, 1.0))
            * Matrix3D::from_rotation_at(
                DQuat::from_axis_angle(DVec3::new(1.0, 1.0, 0.0).normalize(), 0.7),
                DVec3::new(0.0, 2.0, 0.0),
            )
            * Matrix3D::from_translation(DVec3::new(5.0, -1.0, 3.0))
    }

    fn sample_projective() -> Matrix3D {
        Matrix3D::from_rows([
            [1.5, 0.0, 0.2, 0.0],
            [0.1, 2.0, 0.0, 0.0],
            [0.0, 0.3, -1.0, -1.0],
            [0.5, 0.0, -0.2, 0.0],
        ])
    }

    #[test]
    fn test_identity_compose_fast_path() {
        let t = sample_affine();
        assert_eq!(Matrix3D::IDENTITY * t, t);
        assert_eq!(t * Matrix3D::IDENTITY, t);
        assert!(!(Matrix3D::IDENTITY * t).is_distinguished_identity());

        let both = Matrix3D::IDENTITY * Matrix3D::IDENTITY;
        assert!(both.is_distinguished_identity());
    }

    #[test]
    fn test_explicit_identity_is_not_tagged() {
        let explicit = Matrix3D::from_rows(IDENTITY_ROWS);
        assert!(explicit.is_identity());
        assert!(!explicit.is_distinguished_identity());
        assert_eq!(explicit, Matrix3D::IDENTITY);

        let mut tagged = Matrix3D::IDENTITY;
        tagged.set(0, 0, 1.0);
        assert!(!tagged.is_distinguished_identity());
    }

    #[test]
    fn test_is_affine() {
        assert!(Matrix3D::IDENTITY.is_affine());
        assert!(sample_affine().is_affine());
        assert!(!sample_projective().is_affine());
    }

    #[test]
    fn test_affine_invert_round_trip() {
        let t = sample_affine();
        let inv = t.inverse().unwrap();
        assert_matrix_near(&(t * inv), &Matrix3D::IDENTITY, 1e-12);
        assert_matrix_near(&(inv * t), &Matrix3D::IDENTITY, 1e-12);
    }

    #[test]
    fn test_general_invert_round_trip() {
        let t = sample_projective();
        let inv = t.inverse().unwrap();
        assert_matrix_near(&(t * inv), &Matrix3D::IDENTITY, 1e-12);
    }

    #[test]
    fn test_singular_matrix_reports_not_invertible() {
        let mut singular = Matrix3D::from_scale(DVec3::new(1.0, 0.0, 1.0));
        let before = singular;
        assert_eq!(singular.invert(), Err(MathError::NotInvertible));
        assert_eq!(singular, before);
        assert!(!singular.has_inverse());

        let mut projective_singular = Matrix3D::from_rows([
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 4.0, 6.0, 8.0],
            [0.0, 1.0, 0.0, 1.0],
            [1.0, 0.0, 1.0, 0.0],
        ]);
        assert_eq!(projective_singular.invert(), Err(MathError::NotInvertible));
    }

    #[test]
    fn test_small_uniform_scale_is_invertible() {
        let tiny = Matrix3D::from_scale(DVec3::splat(1e-6));
        assert!(tiny.has_inverse());
    }

    #[test]
    fn test_anisotropic_scale_is_invertible() {
        let m = Matrix3D::from_scale(DVec3::new(1e5, 1e-5, 1.0));
        let inv = m.inverse().unwrap();
        let p = DVec3::new(2.0, 3.0, 4.0);
        let back = inv.transform_point(m.transform_point(p));
        assert_abs_diff_eq!((back - p).length(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_far_camera_view_projection_is_invertible() {
        use crate::projection::{look_at_view, perspective_projection};

        for distance in [5.0, 2000.0, 5000.0, 1e6] {
            let view = look_at_view(DVec3::new(0.0, 0.0, distance), DVec3::NEG_Z, DVec3::Y).unwrap();
            let vp = view * perspective_projection(45.0, 1.0, 0.125, f64::INFINITY);
            let inv = vp.inverse().unwrap();
            let near = inv.transform_point(DVec3::new(0.0, 0.0, 0.0));
            assert_abs_diff_eq!(near.z, distance - 0.125, epsilon = 1e-6 * distance.max(1.0));
        }
    }

    #[test]
    fn test_determinant_paths_agree() {
        let affine = sample_affine();
        assert_abs_diff_eq!(affine.determinant(), affine.determinant_4x4(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            Matrix3D::from_scale(DVec3::new(2.0, 3.0, 4.0)).determinant(),
            24.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            sample_projective().determinant(),
            sample_projective().to_dmat4().determinant(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_transform_point_and_vector() {
        let t = Matrix3D::from_translation(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(t.transform_point(DVec3::ZERO), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(t.transform_vector(DVec3::X), DVec3::X);

        let r = Matrix3D::from_quaternion(DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2));
        let p = r.transform_point(DVec3::X);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projective_point_divides_by_w() {
        let mut m = Matrix3D::IDENTITY;
        m.set(3, 3, 2.0);
        let p = m.transform_point(DVec3::new(2.0, 4.0, 6.0));
        assert_eq!(p, DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rotation_about_center_keeps_center_fixed() {
        let center = DVec3::new(3.0, -2.0, 1.0);
        let m = Matrix3D::from_rotation_at(DQuat::from_rotation_y(1.1), center);
        let p = m.transform_point(center);
        assert_abs_diff_eq!((p - center).length(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dmat4_conversion_matches_transform() {
        let t = sample_affine();
        let p = DVec3::new(0.3, -1.2, 4.0);
        let expected = t.transform_point(p);
        let via_glam = t.to_dmat4().transform_point3(p);
        assert_abs_diff_eq!((expected - via_glam).length(), 0.0, epsilon = 1e-12);
        assert_eq!(Matrix3D::from_dmat4(&t.to_dmat4()), t);
    }
}
