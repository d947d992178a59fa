//! Render-side copy of the resources on one channel
//!
//! Applies the command stream and validates it: every referenced handle must
//! already exist, packets must match the resource kind, and structural
//! children are inserted within bounds.

use crate::types::{Command, PackedVertex, ResourceHandle, ResourceKind, ResourceUpdate};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("resource {0} does not exist")]
    UnknownHandle(ResourceHandle),

    #[error("resource {0} already exists")]
    DuplicateHandle(ResourceHandle),

    #[error("resource {handle} of kind {kind:?} cannot take this update")]
    KindMismatch {
        handle: ResourceHandle,
        kind: ResourceKind,
    },

    #[error("resource {handle} references {referenced}, which does not exist")]
    DanglingReference {
        handle: ResourceHandle,
        referenced: ResourceHandle,
    },

    #[error("child index {index} out of range for {parent} with {len} children")]
    ChildIndex {
        parent: ResourceHandle,
        index: usize,
        len: usize,
    },
}

pub type Result<T> = std::result::Result<T, MirrorError>;

/// Mirrored state of one resource
#[derive(Debug, Clone)]
pub struct MirrorEntry {
    pub kind: ResourceKind,
    /// Last content packet
    pub content: Option<ResourceUpdate>,
    pub transform: Option<ResourceHandle>,
    pub children: Vec<ResourceHandle>,
    /// Interleaved vertices of a mesh resource
    pub vertices: Vec<PackedVertex>,
    pub updates: u64,
}

impl MirrorEntry {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            content: None,
            transform: None,
            children: Vec::new(),
            vertices: Vec::new(),
            updates: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResourceMirror {
    resources: HashMap<ResourceHandle, MirrorEntry>,
    applied: u64,
}

impl ResourceMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command; on error the mirror is unchanged
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Create { handle, kind } => {
                if self.resources.contains_key(&handle) {
                    return Err(MirrorError::DuplicateHandle(handle));
                }
                self.resources.insert(handle, MirrorEntry::new(kind));
            }
            Command::Update { handle, update } => self.apply_update(handle, update)?,
            Command::AppendChild {
                parent,
                child,
                index,
            } => {
                if !self.resources.contains_key(&child) {
                    return Err(MirrorError::DanglingReference {
                        handle: parent,
                        referenced: child,
                    });
                }
                let entry = self
                    .resources
                    .get_mut(&parent)
                    .ok_or(MirrorError::UnknownHandle(parent))?;
                if !entry.kind.has_children() {
                    return Err(MirrorError::KindMismatch {
                        handle: parent,
                        kind: entry.kind,
                    });
                }
                if index > entry.children.len() {
                    return Err(MirrorError::ChildIndex {
                        parent,
                        index,
                        len: entry.children.len(),
                    });
                }
                entry.children.insert(index, child);
            }
            Command::Release { handle } => {
                self.resources
                    .remove(&handle)
                    .ok_or(MirrorError::UnknownHandle(handle))?;
            }
        }
        self.applied += 1;
        Ok(())
    }

    fn apply_update(&mut self, handle: ResourceHandle, update: ResourceUpdate) -> Result<()> {
        for referenced in update.references() {
            if !self.resources.contains_key(&referenced) {
                return Err(MirrorError::DanglingReference { handle, referenced });
            }
        }

        let entry = self
            .resources
            .get_mut(&handle)
            .ok_or(MirrorError::UnknownHandle(handle))?;
        if !update.accepts(entry.kind) {
            return Err(MirrorError::KindMismatch {
                handle,
                kind: entry.kind,
            });
        }

        entry.updates += 1;
        match update {
            ResourceUpdate::SetTransform { transform } => entry.transform = transform,
            ResourceUpdate::ChildListReset => entry.children.clear(),
            ResourceUpdate::Mesh(mesh) => {
                entry.vertices = PackedVertex::pack(&mesh);
                entry.content = Some(ResourceUpdate::Mesh(mesh));
            }
            content => entry.content = Some(content),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, handle: ResourceHandle) -> Option<&MirrorEntry> {
        self.resources.get(&handle)
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.resources.contains_key(&handle)
    }

    pub fn children(&self, handle: ResourceHandle) -> &[ResourceHandle] {
        self.resources
            .get(&handle)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Raw vertex buffer contents of a mesh resource
    pub fn vertex_bytes(&self, handle: ResourceHandle) -> Option<&[u8]> {
        self.resources
            .get(&handle)
            .map(|e| bytemuck::cast_slice(e.vertices.as_slice()))
    }

    pub fn count_kind(&self, kind: ResourceKind) -> usize {
        self.resources.values().filter(|e| e.kind == kind).count()
    }

    /// Commands applied successfully
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeshData;
    use glam::DVec3;

    fn h(raw: u32) -> ResourceHandle {
        ResourceHandle::new(raw).unwrap()
    }

    #[test]
    fn test_create_update_release() {
        let mut mirror = ResourceMirror::new();
        mirror
            .apply(Command::Create {
                handle: h(1),
                kind: ResourceKind::MeshGeometry,
            })
            .unwrap();
        let mesh = MeshData::new(vec![DVec3::ZERO, DVec3::X, DVec3::Y], Vec::new());
        mirror
            .apply(Command::Update {
                handle: h(1),
                update: ResourceUpdate::Mesh(mesh),
            })
            .unwrap();

        let bytes = mirror.vertex_bytes(h(1)).unwrap();
        assert_eq!(bytes.len(), 3 * std::mem::size_of::<PackedVertex>());

        mirror.apply(Command::Release { handle: h(1) }).unwrap();
        assert!(mirror.is_empty());
        assert_eq!(mirror.applied(), 3);
    }

    #[test]
    fn test_rejects_dangling_child() {
        let mut mirror = ResourceMirror::new();
        mirror
            .apply(Command::Create {
                handle: h(1),
                kind: ResourceKind::ModelGroup,
            })
            .unwrap();
        let err = mirror
            .apply(Command::AppendChild {
                parent: h(1),
                child: h(2),
                index: 0,
            })
            .unwrap_err();
        assert_eq!(
            err,
            MirrorError::DanglingReference {
                handle: h(1),
                referenced: h(2)
            }
        );
        assert!(mirror.children(h(1)).is_empty());
    }

    #[test]
    fn test_rejects_wrong_kind_and_index() {
        let mut mirror = ResourceMirror::new();
        for (raw, kind) in [(1, ResourceKind::Light), (2, ResourceKind::ModelGroup)] {
            mirror
                .apply(Command::Create {
                    handle: h(raw),
                    kind,
                })
                .unwrap();
        }

        let err = mirror
            .apply(Command::Update {
                handle: h(1),
                update: ResourceUpdate::ChildListReset,
            })
            .unwrap_err();
        assert!(matches!(err, MirrorError::KindMismatch { .. }));

        let err = mirror
            .apply(Command::AppendChild {
                parent: h(2),
                child: h(1),
                index: 3,
            })
            .unwrap_err();
        assert!(matches!(err, MirrorError::ChildIndex { len: 0, .. }));
    }

    #[test]
    fn test_child_list_reset() {
        let mut mirror = ResourceMirror::new();
        for (raw, kind) in [(1, ResourceKind::ModelGroup), (2, ResourceKind::Light)] {
            mirror
                .apply(Command::Create {
                    handle: h(raw),
                    kind,
                })
                .unwrap();
        }
        mirror
            .apply(Command::AppendChild {
                parent: h(1),
                child: h(2),
                index: 0,
            })
            .unwrap();
        assert_eq!(mirror.children(h(1)), &[h(2)]);

        mirror
            .apply(Command::Update {
                handle: h(1),
                update: ResourceUpdate::ChildListReset,
            })
            .unwrap();
        assert!(mirror.children(h(1)).is_empty());
        assert_eq!(mirror.count_kind(ResourceKind::Light), 1);
    }
}
