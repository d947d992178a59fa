//! Versioned value header shared by every scene object
//!
//! Each object carries a change version, a frozen flag, its holders
//! (non-owning back-references to the objects that reference it), its
//! per-channel resource table, change observers and property animations.

use crate::animation::{Animator, Property};
use crate::resource::ResourceTable;
use slotmap::new_key_type;
use smallvec::SmallVec;

new_key_type! {
    /// Arena key of a scene object; the default key is the null reference
    pub struct ObjectId;
}

/// Mutability state derived from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    /// Mutable and referenced by at most one holder
    Mutable,
    /// Mutable and referenced by several holders
    Shared,
    /// Permanently immutable
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

/// Delivered to observers after a change commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The observed object
    pub object: ObjectId,
    /// The object that was written; differs from `object` for changes that
    /// bubbled up from a sub-value
    pub source: ObjectId,
    /// Version of `object` after the change
    pub version: u64,
}

pub type Observer = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Default)]
pub struct ValueHeader {
    pub(crate) frozen: bool,
    pub(crate) version: u64,
    /// One entry per referencing slot; a holder referencing twice appears twice
    pub(crate) holders: SmallVec<[ObjectId; 1]>,
    pub(crate) resources: ResourceTable,
    pub(crate) observers: Vec<(ObserverId, Observer)>,
    pub(crate) animations: Vec<(Property, Box<dyn Animator>)>,
}

impl ValueHeader {
    pub fn state(&self) -> ValueState {
        if self.frozen {
            ValueState::Frozen
        } else if self.holders.len() > 1 {
            ValueState::Shared
        } else {
            ValueState::Mutable
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn holders(&self) -> &[ObjectId] {
        &self.holders
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn is_animated(&self) -> bool {
        !self.animations.is_empty()
    }

    pub(crate) fn add_holder(&mut self, holder: ObjectId) {
        self.holders.push(holder);
    }

    /// Drop one link from `holder`; false when there was none
    pub(crate) fn remove_holder(&mut self, holder: ObjectId) -> bool {
        match self.holders.iter().position(|h| *h == holder) {
            Some(pos) => {
                self.holders.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn animator(&self, property: Property) -> Option<&dyn Animator> {
        self.animations
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, a)| a.as_ref())
    }
}

impl std::fmt::Debug for ValueHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueHeader")
            .field("frozen", &self.frozen)
            .field("version", &self.version)
            .field("holders", &self.holders)
            .field("resources", &self.resources)
            .field("observers", &self.observers.len())
            .field("animations", &self.animations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{Key, SlotMap};

    #[test]
    fn test_state_is_derived() {
        let mut keys: SlotMap<ObjectId, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());

        let mut header = ValueHeader::default();
        assert_eq!(header.state(), ValueState::Mutable);
        header.add_holder(a);
        assert_eq!(header.state(), ValueState::Mutable);
        header.add_holder(b);
        assert_eq!(header.state(), ValueState::Shared);
        assert!(header.remove_holder(a));
        assert!(!header.remove_holder(a));
        assert_eq!(header.state(), ValueState::Mutable);
        header.frozen = true;
        assert_eq!(header.state(), ValueState::Frozen);
    }

    #[test]
    fn test_null_key() {
        assert!(ObjectId::default().is_null());
    }
}
