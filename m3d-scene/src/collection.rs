//! Typed observable collections
//!
//! Ordered children of model, transform and material groups. Every
//! structural change bumps the collection's structure version, keeps the
//! item's holder link and channel bindings in step with the groups holding
//! the collection, and marks those groups structure-dirty.

use crate::error::{Result, SceneError};
use crate::object::{ObjectCategory, ObjectKind};
use crate::resource::DirtyFlags;
use crate::scene::Scene;
use crate::value::ObjectId;
use m3d_channel::ChannelId;
use slotmap::Key;
use smallvec::SmallVec;
use std::sync::OnceLock;

/// Element type a collection accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Model,
    Transform,
    Material,
}

impl ElementKind {
    pub fn category(self) -> ObjectCategory {
        match self {
            ElementKind::Model => ObjectCategory::Model,
            ElementKind::Transform => ObjectCategory::Transform,
            ElementKind::Material => ObjectCategory::Material,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Collection {
    element: ElementKind,
    items: Vec<ObjectId>,
    structure_version: u64,
}

impl Collection {
    pub fn new(element: ElementKind) -> Self {
        Self {
            element,
            items: Vec::new(),
            structure_version: 0,
        }
    }

    /// Process-wide immutable empty collection
    ///
    /// Returned for groups that never allocated children.
    pub fn empty() -> &'static Collection {
        static EMPTY: OnceLock<Collection> = OnceLock::new();
        EMPTY.get_or_init(|| Collection::new(ElementKind::Model))
    }

    pub fn element(&self) -> ElementKind {
        self.element
    }

    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<ObjectId> {
        &mut self.items
    }

    /// Same items, fresh version history
    pub(crate) fn fresh_copy(&self) -> Self {
        Self {
            element: self.element,
            items: self.items.clone(),
            structure_version: 0,
        }
    }
}

/// Fail-fast enumerator over a collection
///
/// Captures the structure version; any structural change made after that
/// makes the next step fail with `ConcurrentModification`.
#[derive(Debug, Clone, Copy)]
pub struct CollectionCursor {
    collection: ObjectId,
    version: u64,
    position: usize,
}

impl CollectionCursor {
    pub fn next(&mut self, scene: &Scene) -> Result<Option<ObjectId>> {
        let collection = self.check(scene)?;
        let item = collection.items.get(self.position).copied();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    pub fn reset(&mut self, scene: &Scene) -> Result<()> {
        self.check(scene)?;
        self.position = 0;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn check<'a>(&self, scene: &'a Scene) -> Result<&'a Collection> {
        let collection = scene.collection(self.collection)?;
        if collection.structure_version != self.version {
            return Err(SceneError::ConcurrentModification(self.collection));
        }
        Ok(collection)
    }
}

type HolderChannels = SmallVec<[ChannelId; 4]>;

impl Scene {
    pub fn collection(&self, id: ObjectId) -> Result<&Collection> {
        match &self.get(id)?.kind {
            ObjectKind::Collection(collection) => Ok(collection),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "collection",
            }),
        }
    }

    fn collection_mut(&mut self, id: ObjectId) -> Result<&mut Collection> {
        match &mut self.get_mut(id)?.kind {
            ObjectKind::Collection(collection) => Ok(collection),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "collection",
            }),
        }
    }

    pub fn collection_len(&self, id: ObjectId) -> Result<usize> {
        Ok(self.collection(id)?.len())
    }

    pub fn collection_items(&self, id: ObjectId) -> Result<&[ObjectId]> {
        Ok(self.collection(id)?.items())
    }

    pub fn collection_get(&self, id: ObjectId, index: usize) -> Result<ObjectId> {
        let collection = self.collection(id)?;
        collection
            .items
            .get(index)
            .copied()
            .ok_or(SceneError::ArgumentOutOfRange {
                index,
                len: collection.len(),
            })
    }

    pub fn collection_index_of(&self, id: ObjectId, item: ObjectId) -> Result<Option<usize>> {
        Ok(self.collection(id)?.items.iter().position(|i| *i == item))
    }

    pub fn collection_cursor(&self, id: ObjectId) -> Result<CollectionCursor> {
        Ok(CollectionCursor {
            collection: id,
            version: self.collection(id)?.structure_version,
            position: 0,
        })
    }

    /// Append; returns the new item's index
    pub fn collection_add(&mut self, id: ObjectId, item: ObjectId) -> Result<usize> {
        let index = self.collection_len(id)?;
        self.collection_insert(id, index, item)?;
        Ok(index)
    }

    /// Insert `item` at `index` (`index == len` appends)
    pub fn collection_insert(&mut self, id: ObjectId, index: usize, item: ObjectId) -> Result<()> {
        self.begin_write(id)?;
        let len = self.collection_len(id)?;
        if index > len {
            return Err(SceneError::ArgumentOutOfRange { index, len });
        }
        self.check_item(id, item)?;

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let channels = self.holder_channels(id)?;
        self.link_item(id, item, &channels)?;
        let collection = self.collection_mut(id)?;
        collection.items.insert(index, item);
        collection.structure_version += 1;
        self.structure_changed(id)
    }

    /// Remove and return the item at `index`
    pub fn collection_remove_at(&mut self, id: ObjectId, index: usize) -> Result<ObjectId> {
        self.begin_write(id)?;
        let item = self.collection_get(id, index)?;

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let collection = self.collection_mut(id)?;
        collection.items.remove(index);
        collection.structure_version += 1;
        let channels = self.holder_channels(id)?;
        self.unlink_item(id, item, &channels)?;
        self.structure_changed(id)?;
        Ok(item)
    }

    /// Remove the first occurrence of `item`
    pub fn collection_remove(&mut self, id: ObjectId, item: ObjectId) -> Result<bool> {
        match self.collection_index_of(id, item)? {
            Some(index) => {
                self.collection_remove_at(id, index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the item at `index`, returning the previous one
    pub fn collection_set(&mut self, id: ObjectId, index: usize, item: ObjectId) -> Result<ObjectId> {
        self.begin_write(id)?;
        let previous = self.collection_get(id, index)?;
        self.check_item(id, item)?;

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let channels = self.holder_channels(id)?;
        self.link_item(id, item, &channels)?;
        let collection = self.collection_mut(id)?;
        collection.items[index] = item;
        collection.structure_version += 1;
        self.unlink_item(id, previous, &channels)?;
        self.structure_changed(id)?;
        Ok(previous)
    }

    /// Remove every item, releasing each on the channels its holders are bound on
    pub fn collection_clear(&mut self, id: ObjectId) -> Result<()> {
        self.begin_write(id)?;

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let collection = self.collection_mut(id)?;
        let items = std::mem::take(&mut collection.items);
        collection.structure_version += 1;
        let channels = self.holder_channels(id)?;
        for item in items {
            self.unlink_item(id, item, &channels)?;
        }
        self.structure_changed(id)
    }

    fn check_item(&self, id: ObjectId, item: ObjectId) -> Result<()> {
        if item.is_null() {
            return Err(SceneError::NullArgument);
        }
        let element = self.collection(id)?.element;
        self.expect_category(item, element.category())?;
        if self.reaches(item, id) {
            return Err(SceneError::Cycle {
                parent: id,
                child: item,
            });
        }
        Ok(())
    }

    /// Channels the groups holding this collection are bound on, once per
    /// (holder, channel) binding
    fn holder_channels(&self, id: ObjectId) -> Result<HolderChannels> {
        let mut channels = HolderChannels::new();
        for holder in self.get(id)?.header.holders() {
            channels.extend(self.get(*holder)?.header.resources.channels());
        }
        Ok(channels)
    }

    fn link_item(&mut self, id: ObjectId, item: ObjectId, channels: &[ChannelId]) -> Result<()> {
        for &channel in channels {
            self.connect(item, channel)?;
        }
        self.get_mut(item)?.header.add_holder(id);
        Ok(())
    }

    fn unlink_item(&mut self, id: ObjectId, item: ObjectId, channels: &[ChannelId]) -> Result<()> {
        for &channel in channels {
            self.disconnect(item, channel)?;
        }
        self.get_mut(item)?.header.remove_holder(id);
        Ok(())
    }

    fn structure_changed(&mut self, id: ObjectId) -> Result<()> {
        let holders: SmallVec<[ObjectId; 2]> = self.get(id)?.header.holders().into();
        for holder in holders {
            self.get_mut(holder)?
                .header
                .resources
                .mark_dirty(DirtyFlags::STRUCTURE);
        }
        self.end_write(id, DirtyFlags::empty())
    }
}
