//! Resource model shared by the scene and its channels
//!
//! Handles, resource kinds, and the update packets that carry an object's
//! state to a channel. Packets own their data (mesh arrays are `Arc`-shared)
//! so a batch can be shipped to another thread as-is.

use bytemuck::{Pod, Zeroable};
use glam::{DVec2, DVec3};
use m3d_math::{
    look_at_view, orthographic_projection, perspective_projection, Color, Matrix3D, ViewportRect,
};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Identifies one registered channel on a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Opaque per-channel resource handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(NonZeroU32);

impl ResourceHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(ResourceHandle)
    }

    /// Handle for a zero-based allocation counter
    pub(crate) fn from_index(index: u32) -> Self {
        ResourceHandle(NonZeroU32::MIN.saturating_add(index))
    }

    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Type of a remote resource
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    MeshGeometry = 1,
    DiffuseMaterial = 2,
    SpecularMaterial = 3,
    EmissiveMaterial = 4,
    MaterialGroup = 5,
    Transform = 6,
    TransformGroup = 7,
    Camera = 8,
    GeometryModel = 9,
    Light = 10,
    ModelGroup = 11,
    ModelVisual = 12,
    ViewportVisual = 13,
}

impl ResourceKind {
    /// Scene-graph model resources (leaf or group)
    pub fn is_model(self) -> bool {
        matches!(
            self,
            ResourceKind::GeometryModel | ResourceKind::Light | ResourceKind::ModelGroup
        )
    }

    pub fn is_visual(self) -> bool {
        matches!(self, ResourceKind::ModelVisual | ResourceKind::ViewportVisual)
    }

    /// Kinds that accept `AppendChild` / `ChildListReset`
    pub fn has_children(self) -> bool {
        matches!(
            self,
            ResourceKind::MaterialGroup
                | ResourceKind::TransformGroup
                | ResourceKind::ModelGroup
                | ResourceKind::ModelVisual
                | ResourceKind::ViewportVisual
        )
    }

    /// Kinds that accept `SetTransform`
    pub fn has_transform(self) -> bool {
        matches!(
            self,
            ResourceKind::Camera
                | ResourceKind::GeometryModel
                | ResourceKind::Light
                | ResourceKind::ModelGroup
                | ResourceKind::ModelVisual
        )
    }
}

/// Triangle mesh arrays
///
/// Empty `indices` means the positions are consumed three at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Arc<[DVec3]>,
    pub normals: Arc<[DVec3]>,
    pub texture_coordinates: Arc<[DVec2]>,
    pub indices: Arc<[u32]>,
}

impl MeshData {
    pub fn new(positions: impl Into<Arc<[DVec3]>>, indices: impl Into<Arc<[u32]>>) -> Self {
        Self {
            positions: positions.into(),
            normals: Arc::from(Vec::new()),
            texture_coordinates: Arc::from(Vec::new()),
            indices: indices.into(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Triangles described by the arrays, ignoring index validity
    pub fn triangle_count(&self) -> usize {
        if self.is_indexed() {
            self.indices.len() / 3
        } else {
            self.positions.len() / 3
        }
    }
}

/// Surface description of a leaf material
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialData {
    Diffuse { color: Color, ambient_color: Color },
    Specular { color: Color, specular_power: f64 },
    Emissive { color: Color },
}

impl MaterialData {
    pub fn diffuse(color: Color) -> Self {
        MaterialData::Diffuse {
            color,
            ambient_color: Color::WHITE,
        }
    }

    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            MaterialData::Diffuse { .. } => ResourceKind::DiffuseMaterial,
            MaterialData::Specular { .. } => ResourceKind::SpecularMaterial,
            MaterialData::Emissive { .. } => ResourceKind::EmissiveMaterial,
        }
    }
}

/// Distance falloff of point and spot lights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    pub constant: f64,
    pub linear: f64,
    pub quadratic: f64,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional {
        direction: DVec3,
    },
    Point {
        position: DVec3,
        range: f64,
        attenuation: Attenuation,
    },
    Spot {
        position: DVec3,
        direction: DVec3,
        range: f64,
        attenuation: Attenuation,
        /// Degrees
        inner_cone_angle: f64,
        /// Degrees
        outer_cone_angle: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    pub color: Color,
    pub kind: LightKind,
}

impl LightData {
    pub fn ambient(color: Color) -> Self {
        Self {
            color,
            kind: LightKind::Ambient,
        }
    }

    pub fn directional(color: Color, direction: DVec3) -> Self {
        Self {
            color,
            kind: LightKind::Directional { direction },
        }
    }

    pub fn point(color: Color, position: DVec3) -> Self {
        Self {
            color,
            kind: LightKind::Point {
                position,
                range: f64::INFINITY,
                attenuation: Attenuation::default(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraProjection {
    /// Horizontal field of view in degrees
    Perspective { field_of_view: f64 },
    /// Horizontal extent in world units
    Orthographic { width: f64 },
    /// Explicit view and projection; position and planes are ignored
    Matrix { view: Matrix3D, projection: Matrix3D },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub position: DVec3,
    pub look_direction: DVec3,
    pub up_direction: DVec3,
    pub near_plane: f64,
    pub far_plane: f64,
    pub projection: CameraProjection,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            look_direction: DVec3::NEG_Z,
            up_direction: DVec3::Y,
            near_plane: 0.125,
            far_plane: f64::INFINITY,
            projection: CameraProjection::Perspective {
                field_of_view: 45.0,
            },
        }
    }
}

impl CameraData {
    pub fn perspective(position: DVec3, look_direction: DVec3, field_of_view: f64) -> Self {
        Self {
            position,
            look_direction,
            projection: CameraProjection::Perspective { field_of_view },
            ..Self::default()
        }
    }

    pub fn orthographic(position: DVec3, look_direction: DVec3, width: f64) -> Self {
        Self {
            position,
            look_direction,
            projection: CameraProjection::Orthographic { width },
            ..Self::default()
        }
    }

    /// World-to-view matrix, before any camera transform
    ///
    /// `None` when the look and up directions are degenerate.
    pub fn view_matrix(&self) -> Option<Matrix3D> {
        match self.projection {
            CameraProjection::Matrix { view, .. } => Some(view),
            _ => look_at_view(self.position, self.look_direction, self.up_direction),
        }
    }

    pub fn projection_matrix(&self, aspect_ratio: f64) -> Matrix3D {
        match self.projection {
            CameraProjection::Perspective { field_of_view } => {
                perspective_projection(field_of_view, aspect_ratio, self.near_plane, self.far_plane)
            }
            CameraProjection::Orthographic { width } => {
                orthographic_projection(width, aspect_ratio, self.near_plane, self.far_plane)
            }
            CameraProjection::Matrix { projection, .. } => projection,
        }
    }
}

/// State packet sent to a resource
///
/// Reference fields carry the handle of an already-created resource on the
/// same channel; `None` stands for an unset slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceUpdate {
    Mesh(MeshData),
    Material(MaterialData),
    Transform {
        value: Matrix3D,
    },
    Light(LightData),
    Camera(CameraData),
    GeometryModel {
        geometry: Option<ResourceHandle>,
        material: Option<ResourceHandle>,
        back_material: Option<ResourceHandle>,
    },
    Visual {
        content: Option<ResourceHandle>,
    },
    Viewport {
        camera: Option<ResourceHandle>,
        viewport: ViewportRect,
    },
    SetTransform {
        transform: Option<ResourceHandle>,
    },
    /// Drops every structural child; followed by `AppendChild` commands
    ChildListReset,
}

impl ResourceUpdate {
    /// Whether a resource of `kind` can receive this packet
    pub fn accepts(&self, kind: ResourceKind) -> bool {
        match self {
            ResourceUpdate::Mesh(_) => kind == ResourceKind::MeshGeometry,
            ResourceUpdate::Material(data) => data.resource_kind() == kind,
            ResourceUpdate::Transform { .. } => kind == ResourceKind::Transform,
            ResourceUpdate::Light(_) => kind == ResourceKind::Light,
            ResourceUpdate::Camera(_) => kind == ResourceKind::Camera,
            ResourceUpdate::GeometryModel { .. } => kind == ResourceKind::GeometryModel,
            ResourceUpdate::Visual { .. } => kind == ResourceKind::ModelVisual,
            ResourceUpdate::Viewport { .. } => kind == ResourceKind::ViewportVisual,
            ResourceUpdate::SetTransform { .. } => kind.has_transform(),
            ResourceUpdate::ChildListReset => kind.has_children(),
        }
    }

    /// Handles this packet refers to
    pub fn references(&self) -> impl Iterator<Item = ResourceHandle> {
        let refs: [Option<ResourceHandle>; 3] = match *self {
            ResourceUpdate::GeometryModel {
                geometry,
                material,
                back_material,
            } => [geometry, material, back_material],
            ResourceUpdate::Visual { content } => [content, None, None],
            ResourceUpdate::Viewport { camera, .. } => [camera, None, None],
            ResourceUpdate::SetTransform { transform } => [transform, None, None],
            _ => [None, None, None],
        };
        refs.into_iter().flatten()
    }
}

/// One command as delivered to a channel
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        handle: ResourceHandle,
        kind: ResourceKind,
    },
    Update {
        handle: ResourceHandle,
        update: ResourceUpdate,
    },
    AppendChild {
        parent: ResourceHandle,
        child: ResourceHandle,
        index: usize,
    },
    Release {
        handle: ResourceHandle,
    },
}

/// Interleaved vertex as uploaded to the render side
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texture_coordinate: [f32; 2],
}

impl PackedVertex {
    /// Interleave mesh arrays; missing normals and coordinates are zero
    pub fn pack(mesh: &MeshData) -> Vec<PackedVertex> {
        mesh.positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let normal = mesh.normals.get(i).copied().unwrap_or(DVec3::ZERO);
                let uv = mesh.texture_coordinates.get(i).copied().unwrap_or(DVec2::ZERO);
                PackedVertex {
                    position: p.as_vec3().to_array(),
                    normal: normal.as_vec3().to_array(),
                    texture_coordinate: uv.as_vec2().to_array(),
                }
            })
            .collect()
    }
}
