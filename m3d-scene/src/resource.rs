//! Per-object, per-channel resource bookkeeping
//!
//! A handle is valid on a channel exactly while its refcount is above zero;
//! the entry is removed when the count drops to zero.

use bitflags::bitflags;
use m3d_channel::{ChannelId, ResourceHandle};
use smallvec::SmallVec;

bitflags! {
    /// State categories waiting to be resent on a channel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u8 {
        /// The object's own content packet
        const CONTENT = 1 << 0;
        /// The transform reference
        const TRANSFORM = 1 << 1;
        /// The structural child list
        const STRUCTURE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    pub channel: ChannelId,
    pub handle: ResourceHandle,
    pub refcount: u32,
    pub dirty: DirtyFlags,
}

/// Outcome of dropping one reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Remaining(u32),
    /// Last reference dropped; the entry is gone
    Released(ResourceHandle),
}

/// Small inline table; objects rarely live on more than two channels
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    entries: SmallVec<[ChannelEntry; 2]>,
}

impl ResourceTable {
    pub fn entry(&self, channel: ChannelId) -> Option<&ChannelEntry> {
        self.entries.iter().find(|e| e.channel == channel)
    }

    fn entry_mut(&mut self, channel: ChannelId) -> Option<&mut ChannelEntry> {
        self.entries.iter_mut().find(|e| e.channel == channel)
    }

    pub fn handle_on(&self, channel: ChannelId) -> Option<ResourceHandle> {
        self.entry(channel).map(|e| e.handle)
    }

    pub fn refcount_on(&self, channel: ChannelId) -> u32 {
        self.entry(channel).map_or(0, |e| e.refcount)
    }

    pub fn is_bound_on(&self, channel: ChannelId) -> bool {
        self.entry(channel).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.entries.iter().map(|e| e.channel)
    }

    /// First reference on `channel`
    pub(crate) fn insert(&mut self, channel: ChannelId, handle: ResourceHandle) {
        self.entries.push(ChannelEntry {
            channel,
            handle,
            refcount: 1,
            dirty: DirtyFlags::empty(),
        });
    }

    /// Another reference on a channel the object already lives on
    pub(crate) fn add_ref(&mut self, channel: ChannelId) -> Option<ResourceHandle> {
        let entry = self.entry_mut(channel)?;
        entry.refcount += 1;
        Some(entry.handle)
    }

    /// `None` when there is no entry to release
    pub(crate) fn release(&mut self, channel: ChannelId) -> Option<Release> {
        let pos = self.entries.iter().position(|e| e.channel == channel)?;
        let entry = &mut self.entries[pos];
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Some(Release::Remaining(entry.refcount));
        }
        let handle = entry.handle;
        self.entries.remove(pos);
        Some(Release::Released(handle))
    }

    /// OR `bits` into every existing entry
    pub(crate) fn mark_dirty(&mut self, bits: DirtyFlags) {
        for entry in &mut self.entries {
            entry.dirty |= bits;
        }
    }

    pub fn dirty_on(&self, channel: ChannelId) -> DirtyFlags {
        self.entry(channel).map_or(DirtyFlags::empty(), |e| e.dirty)
    }

    /// Clear `bits` on `channel`, returning the bits that were set
    pub(crate) fn clear_dirty(&mut self, channel: ChannelId, bits: DirtyFlags) -> DirtyFlags {
        match self.entry_mut(channel) {
            Some(entry) => {
                let cleared = entry.dirty & bits;
                entry.dirty.remove(bits);
                cleared
            }
            None => DirtyFlags::empty(),
        }
    }

    /// Forget `channel` without releasing anything
    pub(crate) fn remove_channel(&mut self, channel: ChannelId) {
        self.entries.retain(|e| e.channel != channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(raw: u32) -> ResourceHandle {
        ResourceHandle::new(raw).unwrap()
    }

    #[test]
    fn test_refcount_balance() {
        let ch = ChannelId(0);
        let mut table = ResourceTable::default();
        assert!(table.release(ch).is_none());

        table.insert(ch, handle(4));
        assert_eq!(table.add_ref(ch), Some(handle(4)));
        assert_eq!(table.refcount_on(ch), 2);
        assert_eq!(table.release(ch), Some(Release::Remaining(1)));
        assert_eq!(table.release(ch), Some(Release::Released(handle(4))));
        assert!(!table.is_bound_on(ch));
        assert!(table.release(ch).is_none());
    }

    #[test]
    fn test_dirty_bits_per_channel() {
        let (a, b) = (ChannelId(0), ChannelId(1));
        let mut table = ResourceTable::default();
        table.mark_dirty(DirtyFlags::CONTENT);
        assert!(table.is_empty());

        table.insert(a, handle(1));
        table.insert(b, handle(1));
        table.mark_dirty(DirtyFlags::CONTENT | DirtyFlags::STRUCTURE);
        assert_eq!(
            table.clear_dirty(a, DirtyFlags::CONTENT | DirtyFlags::TRANSFORM),
            DirtyFlags::CONTENT
        );
        assert_eq!(table.dirty_on(a), DirtyFlags::STRUCTURE);
        table.clear_dirty(a, DirtyFlags::all());
        assert!(table.dirty_on(a).is_empty());
        assert!(table.dirty_on(b).contains(DirtyFlags::STRUCTURE));

        table.remove_channel(b);
        assert_eq!(table.channels().collect::<Vec<_>>(), vec![a]);
    }
}
