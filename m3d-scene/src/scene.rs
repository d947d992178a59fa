//! Scene arena and the versioned-value contract
//!
//! Every object lives in one `slotmap` arena owned by the [`Scene`]. Objects
//! reference each other by [`ObjectId`]; each referenced object records its
//! holders so changes bubble up and channel bindings follow ownership.
//!
//! A scene is driven by a single thread. The composition engine lock is
//! held around slot swaps on connected objects and around reconciliation so
//! a render side sharing the lock never sees a half-swapped binding.

use crate::collection::{Collection, ElementKind};
use crate::config::SceneConfig;
use crate::error::{Result, SceneError};
use crate::geometry::MeshGeometry;
use crate::object::{
    Camera, Material, Model, ModelKind, NodeBounds, ObjectCategory, ObjectKind, SceneObject,
    Transform, Visual, VisualKind,
};
use crate::resource::DirtyFlags;
use crate::sync::ChannelSlot;
use crate::value::{ChangeEvent, ObjectId, Observer, ObserverId, ValueHeader, ValueState};
use m3d_channel::{CameraData, LightData, MaterialData};
use m3d_math::{compose_all, Matrix3D, TransformOp, ViewportRect};
use parking_lot::Mutex;
use slotmap::{Key, SlotMap};
use smallvec::SmallVec;
use std::sync::Arc;

/// Reference slot of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Camera, model or model visual transform
    Transform,
    Geometry,
    Material,
    BackMaterial,
    /// Model shown by a model visual
    Content,
    /// Camera of a viewport visual
    Camera,
}

impl Slot {
    fn category(self) -> ObjectCategory {
        match self {
            Slot::Transform => ObjectCategory::Transform,
            Slot::Geometry => ObjectCategory::Geometry,
            Slot::Material | Slot::BackMaterial => ObjectCategory::Material,
            Slot::Content => ObjectCategory::Model,
            Slot::Camera => ObjectCategory::Camera,
        }
    }

    fn project(self, kind: &mut ObjectKind) -> Option<&mut ObjectId> {
        match (self, kind) {
            (Slot::Transform, ObjectKind::Camera(camera)) => Some(&mut camera.transform),
            (Slot::Transform, ObjectKind::Model(model)) => Some(&mut model.transform),
            (
                Slot::Transform,
                ObjectKind::Visual(Visual {
                    kind: VisualKind::Model { transform, .. },
                    ..
                }),
            ) => Some(transform),
            (
                Slot::Geometry,
                ObjectKind::Model(Model {
                    kind: ModelKind::Geometry { geometry, .. },
                    ..
                }),
            ) => Some(geometry),
            (
                Slot::Material,
                ObjectKind::Model(Model {
                    kind: ModelKind::Geometry { material, .. },
                    ..
                }),
            ) => Some(material),
            (
                Slot::BackMaterial,
                ObjectKind::Model(Model {
                    kind: ModelKind::Geometry { back_material, .. },
                    ..
                }),
            ) => Some(back_material),
            (
                Slot::Content,
                ObjectKind::Visual(Visual {
                    kind: VisualKind::Model { content, .. },
                    ..
                }),
            ) => Some(content),
            (
                Slot::Camera,
                ObjectKind::Visual(Visual {
                    kind: VisualKind::Viewport { camera, .. },
                    ..
                }),
            ) => Some(camera),
            _ => None,
        }
    }

    fn read(self, kind: &ObjectKind) -> Option<ObjectId> {
        match (self, kind) {
            (Slot::Transform, _) => kind.transform_slot(),
            (Slot::Geometry | Slot::Material | Slot::BackMaterial, ObjectKind::Model(model)) => {
                match model.kind {
                    ModelKind::Geometry {
                        geometry,
                        material,
                        back_material,
                    } => Some(match self {
                        Slot::Geometry => geometry,
                        Slot::Material => material,
                        _ => back_material,
                    }),
                    _ => None,
                }
            }
            (Slot::Content | Slot::Camera, ObjectKind::Visual(visual)) => {
                match (self, &visual.kind) {
                    (Slot::Content, VisualKind::Model { content, .. }) => Some(*content),
                    (Slot::Camera, VisualKind::Viewport { camera, .. }) => Some(*camera),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Dirty bit a slot change sets on the holder
    fn dirty_bit(self) -> DirtyFlags {
        match self {
            Slot::Transform => DirtyFlags::TRANSFORM,
            _ => DirtyFlags::CONTENT,
        }
    }
}

/// Retained-mode scene graph
pub struct Scene {
    pub(crate) config: SceneConfig,
    pub(crate) objects: SlotMap<ObjectId, SceneObject>,
    pub(crate) channels: Vec<ChannelSlot>,
    pub(crate) next_channel: u32,
    next_observer: u64,
    engine_lock: Arc<Mutex<()>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            objects: SlotMap::with_capacity_and_key(config.initial_capacity),
            channels: Vec::with_capacity(config.max_channels),
            next_channel: 0,
            next_observer: 0,
            engine_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// The composition engine lock, shared with whoever consumes channels
    pub fn engine_lock(&self) -> Arc<Mutex<()>> {
        self.engine_lock.clone()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub(crate) fn get(&self, id: ObjectId) -> Result<&SceneObject> {
        if id.is_null() {
            return Err(SceneError::NullArgument);
        }
        self.objects.get(id).ok_or(SceneError::UnknownObject(id))
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject> {
        if id.is_null() {
            return Err(SceneError::NullArgument);
        }
        self.objects.get_mut(id).ok_or(SceneError::UnknownObject(id))
    }

    pub fn object(&self, id: ObjectId) -> Result<&SceneObject> {
        self.get(id)
    }

    pub fn header(&self, id: ObjectId) -> Result<&ValueHeader> {
        Ok(&self.get(id)?.header)
    }

    pub fn state(&self, id: ObjectId) -> Result<ValueState> {
        Ok(self.get(id)?.header.state())
    }

    pub fn version(&self, id: ObjectId) -> Result<u64> {
        Ok(self.get(id)?.header.version)
    }

    pub fn is_frozen(&self, id: ObjectId) -> Result<bool> {
        Ok(self.get(id)?.header.frozen)
    }

    pub fn category(&self, id: ObjectId) -> Result<ObjectCategory> {
        Ok(self.get(id)?.kind.category())
    }

    pub fn holders(&self, id: ObjectId) -> Result<&[ObjectId]> {
        Ok(self.get(id)?.header.holders())
    }

    pub(crate) fn expect_category(&self, id: ObjectId, category: ObjectCategory) -> Result<()> {
        if self.get(id)?.kind.category() == category {
            Ok(())
        } else {
            Err(SceneError::KindMismatch {
                object: id,
                expected: category.name(),
            })
        }
    }

    /// Null is accepted; anything else must exist and match
    fn expect_optional(&self, id: ObjectId, category: ObjectCategory) -> Result<()> {
        if id.is_null() {
            Ok(())
        } else {
            self.expect_category(id, category)
        }
    }

    /// Insert an object and register it as holder of everything it references
    pub(crate) fn insert_object(&mut self, kind: ObjectKind) -> ObjectId {
        let refs = kind.references();
        let id = self.objects.insert(SceneObject::new(kind));
        for r in refs {
            if let Some(held) = self.objects.get_mut(r) {
                held.header.add_holder(id);
            }
        }
        id
    }

    // ---- construction ----

    /// Mesh geometry object owning `mesh`
    pub fn create_mesh_geometry(&mut self, mesh: MeshGeometry) -> ObjectId {
        self.insert_object(ObjectKind::Geometry(mesh))
    }

    /// Leaf material
    pub fn create_material(&mut self, data: MaterialData) -> ObjectId {
        self.insert_object(ObjectKind::Material(Material::Leaf(data)))
    }

    /// Empty material group; its children collection is created on first use
    pub fn create_material_group(&mut self) -> ObjectId {
        self.insert_object(ObjectKind::Material(Material::Group { children: None }))
    }

    /// Leaf transform from a single operation
    pub fn create_transform(&mut self, op: TransformOp) -> ObjectId {
        self.insert_object(ObjectKind::Transform(Transform::Op(op)))
    }

    /// Transform group composing its children in order (first applied first)
    pub fn create_transform_group(&mut self) -> ObjectId {
        self.insert_object(ObjectKind::Transform(Transform::Group { children: None }))
    }

    /// Camera with an unset transform
    pub fn create_camera(&mut self, data: CameraData) -> ObjectId {
        self.insert_object(ObjectKind::Camera(Camera {
            transform: ObjectId::default(),
            data,
        }))
    }

    /// Geometry leaf; either reference may be null
    pub fn create_geometry_model(&mut self, geometry: ObjectId, material: ObjectId) -> Result<ObjectId> {
        self.expect_optional(geometry, ObjectCategory::Geometry)?;
        self.expect_optional(material, ObjectCategory::Material)?;
        Ok(self.insert_object(ObjectKind::Model(Model {
            transform: ObjectId::default(),
            kind: ModelKind::Geometry {
                geometry,
                material,
                back_material: ObjectId::default(),
            },
            bounds: NodeBounds::default(),
        })))
    }

    /// Light model; lights have no bounds and are never hit
    pub fn create_light(&mut self, data: LightData) -> ObjectId {
        self.insert_object(ObjectKind::Model(Model {
            transform: ObjectId::default(),
            kind: ModelKind::Light(data),
            bounds: NodeBounds::default(),
        }))
    }

    /// Empty model group
    pub fn create_model_group(&mut self) -> ObjectId {
        self.insert_object(ObjectKind::Model(Model {
            transform: ObjectId::default(),
            kind: ModelKind::Group { children: None },
            bounds: NodeBounds::default(),
        }))
    }

    /// Model visual showing `content` (may be null)
    pub fn create_model_visual(&mut self, content: ObjectId) -> Result<ObjectId> {
        self.expect_optional(content, ObjectCategory::Model)?;
        Ok(self.insert_object(ObjectKind::Visual(Visual::new(VisualKind::Model {
            content,
            transform: ObjectId::default(),
        }))))
    }

    /// Viewport visual looking through `camera` (may be null) into `viewport`
    pub fn create_viewport_visual(&mut self, camera: ObjectId, viewport: ViewportRect) -> Result<ObjectId> {
        self.expect_optional(camera, ObjectCategory::Camera)?;
        Ok(self.insert_object(ObjectKind::Visual(Visual::new(VisualKind::Viewport {
            camera,
            viewport,
        }))))
    }

    // ---- typed access ----

    pub fn geometry(&self, id: ObjectId) -> Result<&MeshGeometry> {
        match &self.get(id)?.kind {
            ObjectKind::Geometry(mesh) => Ok(mesh),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "geometry",
            }),
        }
    }

    pub fn material(&self, id: ObjectId) -> Result<&Material> {
        match &self.get(id)?.kind {
            ObjectKind::Material(material) => Ok(material),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "material",
            }),
        }
    }

    pub fn transform(&self, id: ObjectId) -> Result<&Transform> {
        match &self.get(id)?.kind {
            ObjectKind::Transform(transform) => Ok(transform),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "transform",
            }),
        }
    }

    pub fn camera(&self, id: ObjectId) -> Result<&Camera> {
        match &self.get(id)?.kind {
            ObjectKind::Camera(camera) => Ok(camera),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "camera",
            }),
        }
    }

    pub fn model(&self, id: ObjectId) -> Result<&Model> {
        match &self.get(id)?.kind {
            ObjectKind::Model(model) => Ok(model),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "model",
            }),
        }
    }

    pub fn visual(&self, id: ObjectId) -> Result<&Visual> {
        match &self.get(id)?.kind {
            ObjectKind::Visual(visual) => Ok(visual),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "visual",
            }),
        }
    }

    /// Current reference in `slot`; null when unset
    pub fn slot(&self, id: ObjectId, slot: Slot) -> Result<ObjectId> {
        slot.read(&self.get(id)?.kind)
            .ok_or(SceneError::KindMismatch {
                object: id,
                expected: slot.category().name(),
            })
    }

    /// Value of a transform object with animations applied
    ///
    /// The null id stands for an unset transform and yields identity.
    pub fn transform_value(&self, id: ObjectId) -> Result<Matrix3D> {
        if id.is_null() {
            return Ok(Matrix3D::IDENTITY);
        }
        match &self.get(id)?.kind {
            ObjectKind::Transform(Transform::Op(op)) => Ok(self.effective_op(id, op).value()),
            ObjectKind::Transform(Transform::Group { children }) => {
                let members = self.collection_items_or_empty(*children)?;
                let values = members
                    .iter()
                    .map(|m| self.transform_value(*m))
                    .collect::<Result<SmallVec<[Matrix3D; 4]>>>()?;
                Ok(compose_all(values))
            }
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "transform",
            }),
        }
    }

    /// Inverse of [`Scene::transform_value`]
    pub fn inverse_transform_value(&self, id: ObjectId) -> Result<Matrix3D> {
        Ok(self.transform_value(id)?.inverse()?)
    }

    /// Whether a transform object's value has no projective terms
    pub fn transform_is_affine(&self, id: ObjectId) -> Result<bool> {
        if id.is_null() {
            return Ok(true);
        }
        match &self.get(id)?.kind {
            ObjectKind::Transform(Transform::Op(op)) => Ok(self.effective_op(id, op).is_affine()),
            ObjectKind::Transform(Transform::Group { children }) => {
                for member in self.collection_items_or_empty(*children)? {
                    if !self.transform_is_affine(*member)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "transform",
            }),
        }
    }

    /// Local transform of a camera, model or visual
    pub fn local_transform(&self, id: ObjectId) -> Result<Matrix3D> {
        match self.get(id)?.kind.transform_slot() {
            Some(transform) => self.transform_value(transform),
            None => Ok(Matrix3D::IDENTITY),
        }
    }

    // ---- write contract ----

    pub(crate) fn begin_write(&self, id: ObjectId) -> Result<()> {
        if self.get(id)?.header.frozen {
            return Err(SceneError::Frozen(id));
        }
        Ok(())
    }

    /// Commit a change: bump the version, mark own bindings, invalidate
    /// bounds and notify observers up the holder chain
    pub(crate) fn end_write(&mut self, id: ObjectId, dirty: DirtyFlags) -> Result<()> {
        let object = self.get_mut(id)?;
        object.header.version += 1;
        object.header.resources.mark_dirty(dirty);
        self.invalidate_bounds(id);
        self.publish_change(id);
        Ok(())
    }

    fn publish_change(&mut self, source: ObjectId) {
        let mut visited: SmallVec<[ObjectId; 8]> = SmallVec::new();
        let mut pending: SmallVec<[ObjectId; 8]> = SmallVec::new();
        pending.push(source);

        while let Some(id) = pending.pop() {
            if visited.contains(&id) {
                continue;
            }
            visited.push(id);

            let Some(object) = self.objects.get_mut(id) else {
                continue;
            };
            if id != source {
                object.header.version += 1;
            }
            let event = ChangeEvent {
                object: id,
                source,
                version: object.header.version,
            };
            for (_, observer) in object.header.observers.iter_mut() {
                observer(&event);
            }
            pending.extend(object.header.holders.iter().copied());
        }
    }

    fn write_payload<T, R>(
        &mut self,
        id: ObjectId,
        expected: &'static str,
        project: fn(&mut ObjectKind) -> Option<&mut T>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        self.begin_write(id)?;
        let object = self.get_mut(id)?;
        let target = project(&mut object.kind).ok_or(SceneError::KindMismatch {
            object: id,
            expected,
        })?;
        let out = f(target);
        self.end_write(id, DirtyFlags::CONTENT)?;
        Ok(out)
    }

    /// Mutate the mesh of a geometry object in place
    ///
    /// Fails with `Frozen` before `f` runs. A successful write bumps the
    /// version of the object and of every holder above it, and marks the
    /// content dirty on each bound channel.
    pub fn write_geometry<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut MeshGeometry) -> R) -> Result<R> {
        self.write_payload(
            id,
            "geometry",
            |kind| match kind {
                ObjectKind::Geometry(mesh) => Some(mesh),
                _ => None,
            },
            f,
        )
    }

    /// Mutate a leaf material; see [`Scene::write_geometry`]
    pub fn write_material<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut MaterialData) -> R) -> Result<R> {
        self.write_payload(
            id,
            "leaf material",
            |kind| match kind {
                ObjectKind::Material(Material::Leaf(data)) => Some(data),
                _ => None,
            },
            f,
        )
    }

    /// Mutate a leaf transform; see [`Scene::write_geometry`]
    pub fn write_transform<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut TransformOp) -> R) -> Result<R> {
        self.write_payload(
            id,
            "leaf transform",
            |kind| match kind {
                ObjectKind::Transform(Transform::Op(op)) => Some(op),
                _ => None,
            },
            f,
        )
    }

    /// Mutate a light model; see [`Scene::write_geometry`]
    pub fn write_light<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut LightData) -> R) -> Result<R> {
        self.write_payload(
            id,
            "light",
            |kind| match kind {
                ObjectKind::Model(Model {
                    kind: ModelKind::Light(data),
                    ..
                }) => Some(data),
                _ => None,
            },
            f,
        )
    }

    /// Mutate camera parameters; see [`Scene::write_geometry`]
    pub fn write_camera<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut CameraData) -> R) -> Result<R> {
        self.write_payload(
            id,
            "camera",
            |kind| match kind {
                ObjectKind::Camera(camera) => Some(&mut camera.data),
                _ => None,
            },
            f,
        )
    }

    /// Replace the 2-D rectangle of a viewport visual
    pub fn set_viewport(&mut self, id: ObjectId, rect: ViewportRect) -> Result<()> {
        self.write_payload(
            id,
            "viewport visual",
            |kind| match kind {
                ObjectKind::Visual(Visual {
                    kind: VisualKind::Viewport { viewport, .. },
                    ..
                }) => Some(viewport),
                _ => None,
            },
            |viewport| *viewport = rect,
        )
    }

    /// Replace the reference in `slot`, returning the previous one
    ///
    /// On every channel the object is bound on, the new value is connected
    /// before the old one is released.
    pub fn set_slot(&mut self, id: ObjectId, slot: Slot, value: ObjectId) -> Result<ObjectId> {
        self.begin_write(id)?;
        let previous = self.slot(id, slot)?;
        self.expect_optional(value, slot.category())?;
        if previous == value {
            return Ok(previous);
        }

        let lock = self.engine_lock.clone();
        let _guard = lock.lock();

        let channels: SmallVec<[_; 2]> = self.get(id)?.header.resources.channels().collect();
        if !value.is_null() {
            for &channel in &channels {
                self.connect(value, channel)?;
            }
            self.get_mut(value)?.header.add_holder(id);
        }

        if let Some(target) = slot.project(&mut self.get_mut(id)?.kind) {
            *target = value;
        }

        if !previous.is_null() {
            for &channel in &channels {
                self.disconnect(previous, channel)?;
            }
            self.get_mut(previous)?.header.remove_holder(id);
        }

        self.end_write(id, slot.dirty_bit())?;
        Ok(previous)
    }

    pub fn set_transform(&mut self, id: ObjectId, transform: ObjectId) -> Result<ObjectId> {
        self.set_slot(id, Slot::Transform, transform)
    }

    pub fn set_geometry(&mut self, model: ObjectId, geometry: ObjectId) -> Result<ObjectId> {
        self.set_slot(model, Slot::Geometry, geometry)
    }

    pub fn set_material(&mut self, model: ObjectId, material: ObjectId) -> Result<ObjectId> {
        self.set_slot(model, Slot::Material, material)
    }

    pub fn set_back_material(&mut self, model: ObjectId, material: ObjectId) -> Result<ObjectId> {
        self.set_slot(model, Slot::BackMaterial, material)
    }

    pub fn set_content(&mut self, visual: ObjectId, model: ObjectId) -> Result<ObjectId> {
        self.set_slot(visual, Slot::Content, model)
    }

    pub fn set_camera(&mut self, viewport: ObjectId, camera: ObjectId) -> Result<ObjectId> {
        self.set_slot(viewport, Slot::Camera, camera)
    }

    // ---- observers ----

    /// Register a change observer; called after every successful write
    pub fn subscribe(&mut self, id: ObjectId, observer: impl FnMut(&ChangeEvent) + 'static) -> Result<ObserverId> {
        let handle = ObserverId(self.next_observer);
        let observer: Observer = Box::new(observer);
        self.get_mut(id)?.header.observers.push((handle, observer));
        self.next_observer += 1;
        Ok(handle)
    }

    pub fn unsubscribe(&mut self, id: ObjectId, observer: ObserverId) -> Result<bool> {
        let observers = &mut self.get_mut(id)?.header.observers;
        let before = observers.len();
        observers.retain(|(handle, _)| *handle != observer);
        Ok(observers.len() != before)
    }

    // ---- freeze ----

    /// Unfrozen objects reachable from `id`, or the first that cannot freeze
    fn freeze_set(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut pending = vec![id];
        let mut found = Vec::new();
        while let Some(current) = pending.pop() {
            let object = self.get(current)?;
            if object.header.frozen || found.contains(&current) {
                continue;
            }
            if object.header.is_animated() || object.kind.category() == ObjectCategory::Visual {
                return Err(SceneError::CannotFreeze(current));
            }
            found.push(current);
            pending.extend(object.kind.references());
        }
        Ok(found)
    }

    /// Whether `id` and everything it references could be frozen
    pub fn can_freeze(&self, id: ObjectId) -> Result<bool> {
        match self.freeze_set(id) {
            Ok(_) => Ok(true),
            Err(SceneError::CannotFreeze(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Freeze `id` and every sub-value it owns; all or nothing
    pub fn freeze(&mut self, id: ObjectId) -> Result<()> {
        for object in self.freeze_set(id)? {
            self.get_mut(object)?.header.frozen = true;
        }
        Ok(())
    }

    // ---- clone ----

    /// Deep copy as a new mutable, unshared value
    pub fn clone_value(&mut self, id: ObjectId) -> Result<ObjectId> {
        self.clone_deep(id, false)
    }

    /// Deep copy with every animated property collapsed to its current value
    pub fn clone_current_value(&mut self, id: ObjectId) -> Result<ObjectId> {
        self.clone_deep(id, true)
    }

    fn clone_deep(&mut self, id: ObjectId, current: bool) -> Result<ObjectId> {
        let object = self.get(id)?;
        if object.kind.category() == ObjectCategory::Visual {
            return Err(SceneError::KindMismatch {
                object: id,
                expected: "value (visuals are not cloneable)",
            });
        }

        let mut kind = if current {
            self.effective_kind(id)?
        } else {
            object.kind.clone()
        };
        match &mut kind {
            ObjectKind::Model(model) => model.bounds = NodeBounds::default(),
            ObjectKind::Collection(collection) => *collection = collection.fresh_copy(),
            _ => {}
        }

        let mut copies: SmallVec<[ObjectId; 4]> = SmallVec::new();
        for sub_value in kind.references() {
            copies.push(self.clone_deep(sub_value, current)?);
        }
        let mut copies = copies.into_iter();
        kind.map_references(|_| copies.next().unwrap_or_default());

        Ok(self.insert_object(kind))
    }

    // ---- destruction ----

    /// Remove an object that nothing holds and no channel binds
    ///
    /// Owned sub-values left without a holder go with it. Child visuals are
    /// detached and survive as roots.
    pub fn destroy(&mut self, id: ObjectId) -> Result<()> {
        let object = self.get(id)?;
        if !object.header.holders.is_empty() || !object.header.resources.is_empty() {
            return Err(SceneError::InUse(id));
        }
        if let ObjectKind::Visual(visual) = &object.kind {
            if visual.walk_depth > 0 {
                return Err(SceneError::TreeWalkInProgress(id));
            }
        }

        let Some(object) = self.objects.remove(id) else {
            return Err(SceneError::UnknownObject(id));
        };
        log::trace!("Destroyed {:?}", id);

        for sub_value in object.kind.references() {
            let Some(held) = self.objects.get_mut(sub_value) else {
                continue;
            };
            held.header.remove_holder(id);
            if let ObjectKind::Visual(child) = &mut held.kind {
                if child.parent == Some(id) {
                    child.parent = None;
                    child.index_in_parent = 0;
                }
                continue;
            }
            if held.header.holders.is_empty() && held.header.resources.is_empty() {
                self.destroy(sub_value)?;
            }
        }
        Ok(())
    }

    // ---- helpers shared with collections ----

    /// Items of an optional group collection; unset yields the shared empty one
    pub(crate) fn collection_items_or_empty(&self, collection: Option<ObjectId>) -> Result<&[ObjectId]> {
        match collection {
            None => Ok(Collection::empty().items()),
            Some(id) => match &self.get(id)?.kind {
                ObjectKind::Collection(c) => Ok(c.items()),
                _ => Err(SceneError::KindMismatch {
                    object: id,
                    expected: "collection",
                }),
            },
        }
    }

    /// Child collection of a group, allocated on first use
    pub fn group_children(&mut self, group: ObjectId) -> Result<ObjectId> {
        let object = self.get(group)?;
        let element = match &object.kind {
            ObjectKind::Material(Material::Group { .. }) => ElementKind::Material,
            ObjectKind::Transform(Transform::Group { .. }) => ElementKind::Transform,
            ObjectKind::Model(Model {
                kind: ModelKind::Group { .. },
                ..
            }) => ElementKind::Model,
            _ => {
                return Err(SceneError::KindMismatch {
                    object: group,
                    expected: "group",
                })
            }
        };
        if let Some(Some(existing)) = object.kind.group_children() {
            return Ok(existing);
        }
        if object.header.frozen {
            return Err(SceneError::Frozen(group));
        }

        let collection = self.insert_object(ObjectKind::Collection(Collection::new(element)));
        if let Some(slot) = self.get_mut(group)?.kind.group_children_mut() {
            *slot = Some(collection);
        }
        self.get_mut(collection)?.header.add_holder(group);
        Ok(collection)
    }

    /// Current children of a group; empty when none were ever added
    pub fn group_items(&self, group: ObjectId) -> Result<&[ObjectId]> {
        match self.get(group)?.kind.group_children() {
            Some(children) => self.collection_items_or_empty(children),
            None => Err(SceneError::KindMismatch {
                object: group,
                expected: "group",
            }),
        }
    }

    /// Whether `to` is reachable from `from` through references
    pub(crate) fn reaches(&self, from: ObjectId, to: ObjectId) -> bool {
        let mut pending = vec![from];
        let mut visited: Vec<ObjectId> = Vec::new();
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);
            if let Some(object) = self.objects.get(current) {
                pending.extend(object.kind.references());
            }
        }
        false
    }
}
