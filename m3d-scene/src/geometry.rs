//! Triangle mesh geometry
//!
//! Wraps the shared mesh arrays with a lazily computed bounds cache. Arrays
//! are `Arc`-shared so serializing or cloning a mesh never copies vertices.

use glam::{DVec2, DVec3};
use m3d_channel::MeshData;
use m3d_math::Rect3D;
use std::cell::Cell;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MeshGeometry {
    data: MeshData,
    bounds: Cell<Option<Rect3D>>,
}

impl MeshGeometry {
    /// Indexed mesh; pass empty `indices` for a sequential triangle list
    pub fn new(positions: impl Into<Arc<[DVec3]>>, indices: impl Into<Arc<[u32]>>) -> Self {
        Self::from_data(MeshData::new(positions, indices))
    }

    pub fn from_data(data: MeshData) -> Self {
        Self {
            data,
            bounds: Cell::new(None),
        }
    }

    /// Two triangles spanning the axis-aligned rectangle `min..max` at `z`
    pub fn quad(min: DVec2, max: DVec2, z: f64) -> Self {
        let positions = vec![
            DVec3::new(min.x, min.y, z),
            DVec3::new(max.x, min.y, z),
            DVec3::new(max.x, max.y, z),
            DVec3::new(min.x, max.y, z),
        ];
        let mut mesh = Self::new(positions, vec![0, 1, 2, 0, 2, 3]);
        mesh.set_normals(vec![DVec3::Z; 4]);
        mesh.set_texture_coordinates(vec![
            DVec2::new(0.0, 1.0),
            DVec2::new(1.0, 1.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 0.0),
        ]);
        mesh
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.data.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.data.indices
    }

    pub fn set_positions(&mut self, positions: impl Into<Arc<[DVec3]>>) {
        self.data.positions = positions.into();
        self.bounds.set(None);
    }

    pub fn set_indices(&mut self, indices: impl Into<Arc<[u32]>>) {
        self.data.indices = indices.into();
    }

    pub fn set_normals(&mut self, normals: impl Into<Arc<[DVec3]>>) {
        self.data.normals = normals.into();
    }

    pub fn set_texture_coordinates(&mut self, coordinates: impl Into<Arc<[DVec2]>>) {
        self.data.texture_coordinates = coordinates.into();
    }

    /// Box around every position, indexed or not
    pub fn bounds(&self) -> Rect3D {
        if let Some(bounds) = self.bounds.get() {
            return bounds;
        }
        let bounds = Rect3D::from_points(self.data.positions.iter().copied());
        self.bounds.set(Some(bounds));
        bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.data.triangle_count()
    }

    /// Number of leading triangles whose vertex indices are all in range
    ///
    /// Processing of an indexed mesh stops at the first bad triangle.
    pub fn valid_triangle_count(&self) -> usize {
        if !self.data.is_indexed() {
            return self.data.positions.len() / 3;
        }
        let vertex_count = self.data.positions.len();
        self.data
            .indices
            .chunks_exact(3)
            .take_while(|tri| tri.iter().all(|&i| (i as usize) < vertex_count))
            .count()
    }

    /// Vertex indices of triangle `n`, assuming it is valid
    pub fn triangle_indices(&self, n: usize) -> [u32; 3] {
        triangle_indices(&self.data.indices, n)
    }
}

pub(crate) fn triangle_indices(indices: &[u32], n: usize) -> [u32; 3] {
    if indices.is_empty() {
        let base = (n * 3) as u32;
        [base, base + 1, base + 2]
    } else {
        [indices[n * 3], indices[n * 3 + 1], indices[n * 3 + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_cached_and_invalidated() {
        let mut mesh = MeshGeometry::quad(DVec2::ZERO, DVec2::ONE, 0.5);
        let bounds = mesh.bounds();
        assert_eq!(bounds.min(), DVec3::new(0.0, 0.0, 0.5));
        assert_eq!(bounds.max(), DVec3::new(1.0, 1.0, 0.5));

        mesh.set_positions(vec![DVec3::splat(-1.0), DVec3::splat(2.0)]);
        assert_eq!(mesh.bounds().min(), DVec3::splat(-1.0));
    }

    #[test]
    fn test_empty_mesh_has_empty_bounds() {
        assert!(MeshGeometry::default().bounds().is_empty());
    }

    #[test]
    fn test_valid_triangles_stop_at_bad_index() {
        let positions = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
        let mesh = MeshGeometry::new(positions.clone(), vec![0, 1, 2, 0, 9, 1, 0, 1, 2]);
        assert_eq!(mesh.triangle_count(), 3);
        assert_eq!(mesh.valid_triangle_count(), 1);

        let soup = MeshGeometry::new(positions, Vec::new());
        assert_eq!(soup.valid_triangle_count(), 1);
        assert_eq!(soup.triangle_indices(0), [0, 1, 2]);
    }
}
