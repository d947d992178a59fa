//! Scene object kinds
//!
//! One closed sum type per category, dispatched by `match`. Reference slots
//! hold `ObjectId`s into the scene arena; the null id means "unset".

use crate::collection::Collection;
use crate::geometry::MeshGeometry;
use crate::value::{ObjectId, ValueHeader};
use m3d_channel::{CameraData, LightData, MaterialData, ResourceKind};
use m3d_math::{Rect3D, TransformOp, ViewportRect};
use slotmap::Key;
use smallvec::SmallVec;
use std::cell::Cell;

/// Broad category of an object, used for slot and element type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    Geometry,
    Material,
    Transform,
    Camera,
    Model,
    Visual,
    Collection,
}

impl ObjectCategory {
    pub fn name(self) -> &'static str {
        match self {
            ObjectCategory::Geometry => "geometry",
            ObjectCategory::Material => "material",
            ObjectCategory::Transform => "transform",
            ObjectCategory::Camera => "camera",
            ObjectCategory::Model => "model",
            ObjectCategory::Visual => "visual",
            ObjectCategory::Collection => "collection",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Material {
    Leaf(MaterialData),
    /// Layered materials; the collection is allocated on first use
    Group { children: Option<ObjectId> },
}

#[derive(Debug, Clone)]
pub enum Transform {
    Op(TransformOp),
    /// Members compose first to last
    Group { children: Option<ObjectId> },
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub(crate) transform: ObjectId,
    pub(crate) data: CameraData,
}

impl Camera {
    pub fn transform(&self) -> ObjectId {
        self.transform
    }

    pub fn data(&self) -> &CameraData {
        &self.data
    }
}

#[derive(Debug, Clone)]
pub enum ModelKind {
    Geometry {
        geometry: ObjectId,
        material: ObjectId,
        back_material: ObjectId,
    },
    Light(LightData),
    Group {
        children: Option<ObjectId>,
    },
}

#[derive(Debug, Clone)]
pub struct Model {
    pub(crate) transform: ObjectId,
    pub(crate) kind: ModelKind,
    pub(crate) bounds: NodeBounds,
}

impl Model {
    pub fn transform(&self) -> ObjectId {
        self.transform
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn bounds(&self) -> &NodeBounds {
        &self.bounds
    }
}

#[derive(Debug, Clone)]
pub enum VisualKind {
    /// Transformable container showing one model
    Model { content: ObjectId, transform: ObjectId },
    /// Root seen through a camera; children are in world space
    Viewport {
        camera: ObjectId,
        viewport: ViewportRect,
    },
}

#[derive(Debug, Clone)]
pub struct Visual {
    pub(crate) parent: Option<ObjectId>,
    pub(crate) children: Vec<ObjectId>,
    /// Position in the parent's child list
    pub(crate) index_in_parent: usize,
    /// Active `walk_children` calls on this visual
    pub(crate) walk_depth: u32,
    pub(crate) kind: VisualKind,
    pub(crate) bounds: NodeBounds,
}

impl Visual {
    pub(crate) fn new(kind: VisualKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            index_in_parent: 0,
            walk_depth: 0,
            kind,
            bounds: NodeBounds::default(),
        }
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    pub fn index_in_parent(&self) -> usize {
        self.index_in_parent
    }

    pub fn kind(&self) -> &VisualKind {
        &self.kind
    }

    pub fn bounds(&self) -> &NodeBounds {
        &self.bounds
    }

    /// Transform slot; null for viewport visuals
    pub fn transform(&self) -> ObjectId {
        match self.kind {
            VisualKind::Model { transform, .. } => transform,
            VisualKind::Viewport { .. } => ObjectId::default(),
        }
    }
}

/// Cached bounds of a model or visual node
#[derive(Debug, Clone)]
pub struct NodeBounds {
    pub(crate) content: Cell<Rect3D>,
    /// In the node's parent space
    pub(crate) subtree: Cell<Rect3D>,
    pub(crate) content_valid: Cell<bool>,
    pub(crate) subtree_dirty: Cell<bool>,
}

impl Default for NodeBounds {
    fn default() -> Self {
        Self {
            content: Cell::new(Rect3D::EMPTY),
            subtree: Cell::new(Rect3D::EMPTY),
            content_valid: Cell::new(false),
            subtree_dirty: Cell::new(true),
        }
    }
}

impl NodeBounds {
    pub fn is_dirty(&self) -> bool {
        self.subtree_dirty.get()
    }

    pub fn is_content_valid(&self) -> bool {
        self.content_valid.get()
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Geometry(MeshGeometry),
    Material(Material),
    Transform(Transform),
    Camera(Camera),
    Model(Model),
    Visual(Visual),
    Collection(Collection),
}

impl ObjectKind {
    pub fn category(&self) -> ObjectCategory {
        match self {
            ObjectKind::Geometry(_) => ObjectCategory::Geometry,
            ObjectKind::Material(_) => ObjectCategory::Material,
            ObjectKind::Transform(_) => ObjectCategory::Transform,
            ObjectKind::Camera(_) => ObjectCategory::Camera,
            ObjectKind::Model(_) => ObjectCategory::Model,
            ObjectKind::Visual(_) => ObjectCategory::Visual,
            ObjectKind::Collection(_) => ObjectCategory::Collection,
        }
    }

    /// Remote resource type; collections have none
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        let kind = match self {
            ObjectKind::Geometry(_) => ResourceKind::MeshGeometry,
            ObjectKind::Material(Material::Leaf(data)) => data.resource_kind(),
            ObjectKind::Material(Material::Group { .. }) => ResourceKind::MaterialGroup,
            ObjectKind::Transform(Transform::Op(_)) => ResourceKind::Transform,
            ObjectKind::Transform(Transform::Group { .. }) => ResourceKind::TransformGroup,
            ObjectKind::Camera(_) => ResourceKind::Camera,
            ObjectKind::Model(model) => match model.kind {
                ModelKind::Geometry { .. } => ResourceKind::GeometryModel,
                ModelKind::Light(_) => ResourceKind::Light,
                ModelKind::Group { .. } => ResourceKind::ModelGroup,
            },
            ObjectKind::Visual(visual) => match visual.kind {
                VisualKind::Model { .. } => ResourceKind::ModelVisual,
                VisualKind::Viewport { .. } => ResourceKind::ViewportVisual,
            },
            ObjectKind::Collection(_) => return None,
        };
        Some(kind)
    }

    /// Transform slot of objects that have one
    pub(crate) fn transform_slot(&self) -> Option<ObjectId> {
        match self {
            ObjectKind::Camera(camera) => Some(camera.transform),
            ObjectKind::Model(model) => Some(model.transform),
            ObjectKind::Visual(visual) => match visual.kind {
                VisualKind::Model { transform, .. } => Some(transform),
                VisualKind::Viewport { .. } => None,
            },
            _ => None,
        }
    }

    /// Child collection of a group
    pub(crate) fn group_children(&self) -> Option<Option<ObjectId>> {
        match self {
            ObjectKind::Material(Material::Group { children })
            | ObjectKind::Transform(Transform::Group { children }) => Some(*children),
            ObjectKind::Model(Model {
                kind: ModelKind::Group { children },
                ..
            }) => Some(*children),
            _ => None,
        }
    }

    pub(crate) fn group_children_mut(&mut self) -> Option<&mut Option<ObjectId>> {
        match self {
            ObjectKind::Material(Material::Group { children })
            | ObjectKind::Transform(Transform::Group { children }) => Some(children),
            ObjectKind::Model(Model {
                kind: ModelKind::Group { children },
                ..
            }) => Some(children),
            _ => None,
        }
    }

    pub(crate) fn node_bounds(&self) -> Option<&NodeBounds> {
        match self {
            ObjectKind::Model(model) => Some(&model.bounds),
            ObjectKind::Visual(visual) => Some(&visual.bounds),
            _ => None,
        }
    }

    /// Every non-null reference slot, in serialization order
    pub(crate) fn references(&self) -> SmallVec<[ObjectId; 4]> {
        let mut refs = SmallVec::new();
        self.visit_references(|id| refs.push(id));
        refs
    }

    fn visit_references(&self, mut f: impl FnMut(ObjectId)) {
        let mut push = |id: ObjectId| {
            if !id.is_null() {
                f(id)
            }
        };
        match self {
            ObjectKind::Geometry(_) => {}
            ObjectKind::Material(Material::Leaf(_)) | ObjectKind::Transform(Transform::Op(_)) => {}
            ObjectKind::Material(Material::Group { children })
            | ObjectKind::Transform(Transform::Group { children }) => {
                children.iter().copied().for_each(&mut push)
            }
            ObjectKind::Camera(camera) => push(camera.transform),
            ObjectKind::Model(model) => {
                push(model.transform);
                match &model.kind {
                    ModelKind::Geometry {
                        geometry,
                        material,
                        back_material,
                    } => {
                        push(*geometry);
                        push(*material);
                        push(*back_material);
                    }
                    ModelKind::Light(_) => {}
                    ModelKind::Group { children } => children.iter().copied().for_each(&mut push),
                }
            }
            ObjectKind::Visual(visual) => {
                match visual.kind {
                    VisualKind::Model { content, transform } => {
                        push(transform);
                        push(content);
                    }
                    VisualKind::Viewport { camera, .. } => push(camera),
                }
                visual.children.iter().copied().for_each(&mut push);
            }
            ObjectKind::Collection(collection) => {
                collection.items().iter().copied().for_each(&mut push)
            }
        }
    }

    /// Rewrite every non-null reference slot in place
    pub(crate) fn map_references(&mut self, mut f: impl FnMut(ObjectId) -> ObjectId) {
        let mut map = |slot: &mut ObjectId| {
            if !slot.is_null() {
                *slot = f(*slot);
            }
        };
        match self {
            ObjectKind::Geometry(_) => {}
            ObjectKind::Material(Material::Leaf(_)) | ObjectKind::Transform(Transform::Op(_)) => {}
            ObjectKind::Material(Material::Group { children })
            | ObjectKind::Transform(Transform::Group { children }) => {
                children.iter_mut().for_each(&mut map)
            }
            ObjectKind::Camera(camera) => map(&mut camera.transform),
            ObjectKind::Model(model) => {
                map(&mut model.transform);
                match &mut model.kind {
                    ModelKind::Geometry {
                        geometry,
                        material,
                        back_material,
                    } => {
                        map(geometry);
                        map(material);
                        map(back_material);
                    }
                    ModelKind::Light(_) => {}
                    ModelKind::Group { children } => children.iter_mut().for_each(&mut map),
                }
            }
            ObjectKind::Visual(visual) => {
                match &mut visual.kind {
                    VisualKind::Model { content, transform } => {
                        map(transform);
                        map(content);
                    }
                    VisualKind::Viewport { camera, .. } => map(camera),
                }
                visual.children.iter_mut().for_each(&mut map);
            }
            ObjectKind::Collection(collection) => collection.items_mut().iter_mut().for_each(&mut map),
        }
    }
}

/// One arena slot
#[derive(Debug)]
pub struct SceneObject {
    pub(crate) header: ValueHeader,
    pub(crate) kind: ObjectKind,
}

impl SceneObject {
    pub(crate) fn new(kind: ObjectKind) -> Self {
        Self {
            header: ValueHeader::default(),
            kind,
        }
    }

    pub fn header(&self) -> &ValueHeader {
        &self.header
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn category(&self) -> ObjectCategory {
        self.kind.category()
    }
}
