//! Channel registry, resource refcounting and reconciliation
//!
//! An object gets a resource on a channel the first time something connects
//! it there. The first connect creates the resource, connects everything the
//! object references, then sends the object's full state, so a packet never
//! names a handle the channel has not seen. Later connects only count.
//!
//! Writes leave dirty bits on every channel the object is bound on;
//! `reconcile` turns those bits into the smallest set of update packets.

use crate::error::{Result, SceneError};
use crate::object::{Material, ModelKind, ObjectKind, Transform, VisualKind};
use crate::resource::{DirtyFlags, Release};
use crate::scene::Scene;
use crate::value::ObjectId;
use m3d_channel::{Channel, ChannelId, ResourceHandle, ResourceUpdate};
use slotmap::Key;
use smallvec::SmallVec;
use std::ops::AddAssign;

pub(crate) struct ChannelSlot {
    pub(crate) id: ChannelId,
    pub(crate) channel: Box<dyn Channel>,
}

/// Work done by one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Objects bound on the channel that were examined
    pub objects_visited: usize,
    pub content_updates: usize,
    pub transform_updates: usize,
    pub structure_updates: usize,
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.objects_visited += other.objects_visited;
        self.content_updates += other.content_updates;
        self.transform_updates += other.transform_updates;
        self.structure_updates += other.structure_updates;
    }
}

type Dependencies = SmallVec<[ObjectId; 8]>;

impl Scene {
    // ---- channel registry ----

    /// Register a channel; objects bind to it through [`Scene::add_ref_on_channel`]
    pub fn add_channel(&mut self, channel: Box<dyn Channel>) -> Result<ChannelId> {
        if self.channels.len() >= self.config.max_channels {
            return Err(SceneError::TooManyChannels(self.config.max_channels));
        }
        let id = ChannelId(self.next_channel);
        self.next_channel += 1;
        self.channels.push(ChannelSlot { id, channel });
        log::debug!("Registered {}", id);
        Ok(id)
    }

    /// Unregister a channel and forget every binding on it
    ///
    /// No release commands are sent; the caller owns the channel again.
    pub fn remove_channel(&mut self, id: ChannelId) -> Result<Box<dyn Channel>> {
        let pos = self.channel_index(id)?;
        let slot = self.channels.remove(pos);
        for object in self.objects.values_mut() {
            object.header.resources.remove_channel(id);
        }
        log::debug!("Removed {}", id);
        Ok(slot.channel)
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|slot| slot.id).collect()
    }

    /// Direct access to a registered channel
    pub fn channel_mut(&mut self, id: ChannelId) -> Result<&mut dyn Channel> {
        let pos = self.channel_index(id)?;
        Ok(self.channels[pos].channel.as_mut())
    }

    fn channel_index(&self, id: ChannelId) -> Result<usize> {
        self.channels
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(SceneError::UnknownChannel(id))
    }

    fn sink(&mut self, id: ChannelId) -> Result<&mut dyn Channel> {
        self.channel_mut(id)
    }

    // ---- refcounting ----

    /// Connect `id` on `channel`, creating the resource on first use
    pub fn add_ref_on_channel(&mut self, id: ObjectId, channel: ChannelId) -> Result<ResourceHandle> {
        let lock = self.engine_lock();
        let _guard = lock.lock();
        self.connect(id, channel)
    }

    /// Drop one reference; the last one releases the resource and everything
    /// it references
    pub fn release_on_channel(&mut self, id: ObjectId, channel: ChannelId) -> Result<()> {
        let lock = self.engine_lock();
        let _guard = lock.lock();
        self.disconnect(id, channel)
    }

    /// Callers hold the engine lock
    pub(crate) fn connect(&mut self, id: ObjectId, channel: ChannelId) -> Result<ResourceHandle> {
        self.channel_index(channel)?;
        let object = self.get_mut(id)?;
        if let Some(handle) = object.header.resources.add_ref(channel) {
            return Ok(handle);
        }
        let kind = object.kind.resource_kind().ok_or(SceneError::KindMismatch {
            object: id,
            expected: "resource-backed object",
        })?;

        let handle = self.sink(channel)?.create_resource(kind);
        self.get_mut(id)?.header.resources.insert(channel, handle);
        log::debug!("Connected {:?} as {:?} {} on {}", id, kind, handle, channel);

        for dependency in self.channel_dependencies(id)? {
            self.connect(dependency, channel)?;
        }
        self.send_full_state(id, channel, handle)?;
        Ok(handle)
    }

    /// Callers hold the engine lock
    pub(crate) fn disconnect(&mut self, id: ObjectId, channel: ChannelId) -> Result<()> {
        self.channel_index(channel)?;
        let handle = match self.get_mut(id)?.header.resources.release(channel) {
            None => {
                log::error!("Resource underflow releasing {:?} on {}", id, channel);
                return Err(SceneError::ResourceUnderflow { object: id, channel });
            }
            Some(Release::Remaining(_)) => return Ok(()),
            Some(Release::Released(handle)) => handle,
        };

        for dependency in self.channel_dependencies(id)? {
            self.disconnect(dependency, channel)?;
        }
        self.sink(channel)?.release_resource(handle);
        log::debug!("Released {:?} ({}) on {}", id, handle, channel);
        Ok(())
    }

    // ---- queries ----

    pub fn handle_on(&self, id: ObjectId, channel: ChannelId) -> Result<Option<ResourceHandle>> {
        Ok(self.get(id)?.header.resources.handle_on(channel))
    }

    pub fn refcount_on(&self, id: ObjectId, channel: ChannelId) -> Result<u32> {
        Ok(self.get(id)?.header.resources.refcount_on(channel))
    }

    pub fn dirty_on(&self, id: ObjectId, channel: ChannelId) -> Result<DirtyFlags> {
        Ok(self.get(id)?.header.resources.dirty_on(channel))
    }

    pub fn is_bound_on(&self, id: ObjectId, channel: ChannelId) -> Result<bool> {
        Ok(self.get(id)?.header.resources.is_bound_on(channel))
    }

    // ---- serialization ----

    /// Everything `id` references, with collections replaced by their items
    fn channel_dependencies(&self, id: ObjectId) -> Result<Dependencies> {
        let mut dependencies = Dependencies::new();
        for reference in self.get(id)?.kind.references() {
            match &self.get(reference)?.kind {
                ObjectKind::Collection(collection) => dependencies.extend_from_slice(collection.items()),
                _ => dependencies.push(reference),
            }
        }
        Ok(dependencies)
    }

    fn handle_of(&self, id: ObjectId, channel: ChannelId) -> Option<ResourceHandle> {
        if id.is_null() {
            return None;
        }
        self.objects
            .get(id)
            .and_then(|object| object.header.resources.handle_on(channel))
    }

    /// Content packet with animations applied; groups have none
    fn content_update(&self, id: ObjectId, channel: ChannelId) -> Result<Option<ResourceUpdate>> {
        let update = match self.effective_kind(id)? {
            ObjectKind::Geometry(mesh) => ResourceUpdate::Mesh(mesh.data().clone()),
            ObjectKind::Material(Material::Leaf(data)) => ResourceUpdate::Material(data),
            ObjectKind::Transform(Transform::Op(op)) => ResourceUpdate::Transform { value: op.value() },
            ObjectKind::Camera(camera) => ResourceUpdate::Camera(camera.data),
            ObjectKind::Model(model) => match model.kind {
                ModelKind::Geometry {
                    geometry,
                    material,
                    back_material,
                } => ResourceUpdate::GeometryModel {
                    geometry: self.handle_of(geometry, channel),
                    material: self.handle_of(material, channel),
                    back_material: self.handle_of(back_material, channel),
                },
                ModelKind::Light(data) => ResourceUpdate::Light(data),
                ModelKind::Group { .. } => return Ok(None),
            },
            ObjectKind::Visual(visual) => match visual.kind {
                VisualKind::Model { content, .. } => ResourceUpdate::Visual {
                    content: self.handle_of(content, channel),
                },
                VisualKind::Viewport { camera, viewport } => ResourceUpdate::Viewport {
                    camera: self.handle_of(camera, channel),
                    viewport,
                },
            },
            ObjectKind::Material(Material::Group { .. })
            | ObjectKind::Transform(Transform::Group { .. })
            | ObjectKind::Collection(_) => return Ok(None),
        };
        Ok(Some(update))
    }

    fn transform_update(&self, id: ObjectId, channel: ChannelId) -> Result<Option<ResourceUpdate>> {
        Ok(self
            .get(id)?
            .kind
            .transform_slot()
            .map(|transform| ResourceUpdate::SetTransform {
                transform: self.handle_of(transform, channel),
            }))
    }

    /// Ordered structural children; `None` for kinds without a child list
    fn structural_children(&self, id: ObjectId) -> Result<Option<Dependencies>> {
        let kind = &self.get(id)?.kind;
        if let ObjectKind::Visual(visual) = kind {
            return Ok(Some(visual.children.iter().copied().collect()));
        }
        match kind.group_children() {
            Some(children) => Ok(Some(
                self.collection_items_or_empty(children)?.iter().copied().collect(),
            )),
            None => Ok(None),
        }
    }

    /// Returns false when the object has no child list
    fn send_structure(&mut self, id: ObjectId, channel: ChannelId, handle: ResourceHandle) -> Result<bool> {
        let Some(children) = self.structural_children(id)? else {
            return Ok(false);
        };
        let handles: SmallVec<[ResourceHandle; 8]> = children
            .iter()
            .filter_map(|child| self.handle_of(*child, channel))
            .collect();
        let sink = self.sink(channel)?;
        sink.update_resource(handle, ResourceUpdate::ChildListReset);
        for (index, child) in handles.into_iter().enumerate() {
            sink.append_child(handle, child, index);
        }
        Ok(true)
    }

    fn send_full_state(&mut self, id: ObjectId, channel: ChannelId, handle: ResourceHandle) -> Result<()> {
        if let Some(update) = self.content_update(id, channel)? {
            self.sink(channel)?.update_resource(handle, update);
        }
        if let Some(update) = self.transform_update(id, channel)? {
            self.sink(channel)?.update_resource(handle, update);
        }
        self.send_structure(id, channel, handle)?;
        Ok(())
    }

    // ---- reconciliation ----

    /// Flush dirty state on one channel and commit it
    ///
    /// Content and transform packets go out before any structural list so
    /// every child a list names is already up to date.
    pub fn reconcile(&mut self, channel: ChannelId) -> Result<ReconcileStats> {
        self.channel_index(channel)?;
        let lock = self.engine_lock();
        let _guard = lock.lock();

        let mut stats = ReconcileStats::default();
        let mut dirty: Vec<(ObjectId, ResourceHandle, DirtyFlags)> = Vec::new();
        for (id, object) in self.objects.iter() {
            let Some(entry) = object.header.resources.entry(channel) else {
                continue;
            };
            stats.objects_visited += 1;
            if !entry.dirty.is_empty() {
                dirty.push((id, entry.handle, entry.dirty));
            }
        }

        // bits are cleared per object once its packets are out, so a failed
        // pass leaves the rest for the next one
        for &(id, handle, bits) in &dirty {
            if bits.contains(DirtyFlags::CONTENT) {
                if let Some(update) = self.content_update(id, channel)? {
                    log::trace!("Content update for {:?} on {}", id, channel);
                    self.sink(channel)?.update_resource(handle, update);
                    stats.content_updates += 1;
                }
            }
            if bits.contains(DirtyFlags::TRANSFORM) {
                if let Some(update) = self.transform_update(id, channel)? {
                    log::trace!("Transform update for {:?} on {}", id, channel);
                    self.sink(channel)?.update_resource(handle, update);
                    stats.transform_updates += 1;
                }
            }
            self.clear_dirty(id, channel, DirtyFlags::CONTENT | DirtyFlags::TRANSFORM)?;
        }

        for &(id, handle, bits) in &dirty {
            if bits.contains(DirtyFlags::STRUCTURE) && self.send_structure(id, channel, handle)? {
                log::trace!("Structure update for {:?} on {}", id, channel);
                stats.structure_updates += 1;
            }
            self.clear_dirty(id, channel, DirtyFlags::STRUCTURE)?;
        }

        self.sink(channel)?.commit();
        Ok(stats)
    }

    fn clear_dirty(&mut self, id: ObjectId, channel: ChannelId, bits: DirtyFlags) -> Result<()> {
        self.get_mut(id)?.header.resources.clear_dirty(channel, bits);
        Ok(())
    }

    /// Reconcile every registered channel in registration order
    ///
    /// Stops at the first failing channel; later channels keep their bits.
    pub fn reconcile_all(&mut self) -> Result<ReconcileStats> {
        let mut total = ReconcileStats::default();
        for channel in self.channel_ids() {
            total += self.reconcile(channel)?;
        }
        Ok(total)
    }
}
