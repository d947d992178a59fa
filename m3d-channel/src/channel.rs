//! The sink a scene serializes its objects into

use crate::types::{ResourceHandle, ResourceKind, ResourceUpdate};

/// Command sink for one output channel
///
/// Commands are delivered in call order. Handles are allocated by the
/// channel and stay valid until released on it.
pub trait Channel: Send {
    fn create_resource(&mut self, kind: ResourceKind) -> ResourceHandle;

    fn update_resource(&mut self, handle: ResourceHandle, update: ResourceUpdate);

    /// Insert `child` at `index` in `parent`'s structural child list
    fn append_child(&mut self, parent: ResourceHandle, child: ResourceHandle, index: usize);

    fn release_resource(&mut self, handle: ResourceHandle);

    /// End of a reconciliation pass; batching channels submit here
    fn commit(&mut self) {}
}

/// Handle allocator with reuse of released handles
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u32,
    free: Vec<ResourceHandle>,
    live: usize,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ResourceHandle {
        self.live += 1;
        if let Some(handle) = self.free.pop() {
            return handle;
        }
        let handle = ResourceHandle::from_index(self.next);
        self.next += 1;
        handle
    }

    pub fn free(&mut self, handle: ResourceHandle) {
        self.live = self.live.saturating_sub(1);
        self.free.push(handle);
    }

    /// Handles allocated and not yet freed
    pub fn live(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_until_freed() {
        let mut alloc = HandleAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, b);
        assert_eq!(alloc.live(), 2);

        alloc.free(a);
        assert_eq!(alloc.live(), 1);
        let c = alloc.allocate();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }
}
