//! Visual tree: parent links, child lists and guarded child walks

use crate::error::{Result, SceneError};
use crate::object::{ObjectKind, Visual};
use crate::resource::DirtyFlags;
use crate::scene::Scene;
use crate::value::ObjectId;
use m3d_channel::ChannelId;
use smallvec::SmallVec;

impl Scene {
    fn visual_mut(&mut self, id: ObjectId) -> Result<&mut Visual> {
        match &mut self.get_mut(id)?.kind {
            ObjectKind::Visual(visual) => Ok(visual),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "visual",
            }),
        }
    }

    fn check_not_walking(&self, parent: ObjectId) -> Result<()> {
        if self.visual(parent)?.walk_depth > 0 {
            return Err(SceneError::TreeWalkInProgress(parent));
        }
        Ok(())
    }

    /// Append `child` to `parent`'s children
    pub fn attach(&mut self, parent: ObjectId, child: ObjectId) -> Result<()> {
        self.check_not_walking(parent)?;
        if self.visual(child)?.parent.is_some() {
            return Err(SceneError::AlreadyParented(child));
        }
        if self.reaches(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let channels: SmallVec<[ChannelId; 2]> = self.get(parent)?.header.resources.channels().collect();
        for &channel in &channels {
            self.connect(child, channel)?;
        }

        let parent_visual = self.visual_mut(parent)?;
        let index = parent_visual.children.len();
        parent_visual.children.push(child);

        let child_object = self.get_mut(child)?;
        child_object.header.add_holder(parent);
        if let ObjectKind::Visual(visual) = &mut child_object.kind {
            visual.parent = Some(parent);
            visual.index_in_parent = index;
        }

        self.end_write(parent, DirtyFlags::STRUCTURE)
    }

    /// Remove `child` from `parent`'s children; it survives as a root
    pub fn detach(&mut self, parent: ObjectId, child: ObjectId) -> Result<()> {
        self.check_not_walking(parent)?;
        let index = {
            let visual = self.visual(child)?;
            if visual.parent != Some(parent) {
                return Err(SceneError::NotAChild { parent, child });
            }
            visual.index_in_parent
        };

        let lock = self.engine_lock();
        let _guard = lock.lock();

        let channels: SmallVec<[ChannelId; 2]> = self.get(parent)?.header.resources.channels().collect();
        for &channel in &channels {
            if self.get(child)?.header.resources.is_bound_on(channel) {
                self.disconnect(child, channel)?;
            }
        }
        self.get_mut(parent)?
            .header
            .resources
            .mark_dirty(DirtyFlags::STRUCTURE);

        let siblings = {
            let parent_visual = self.visual_mut(parent)?;
            parent_visual.children.remove(index);
            parent_visual.children[index..].to_vec()
        };
        for (offset, sibling) in siblings.into_iter().enumerate() {
            self.visual_mut(sibling)?.index_in_parent = index + offset;
        }

        let child_object = self.get_mut(child)?;
        child_object.header.remove_holder(parent);
        if let ObjectKind::Visual(visual) = &mut child_object.kind {
            visual.parent = None;
            visual.index_in_parent = 0;
        }

        self.end_write(parent, DirtyFlags::empty())
    }

    /// Call `f` for each child of `parent`
    ///
    /// Attaching to or detaching from `parent` inside `f` fails with
    /// `TreeWalkInProgress`.
    pub fn walk_children(
        &mut self,
        parent: ObjectId,
        mut f: impl FnMut(&mut Scene, ObjectId) -> Result<()>,
    ) -> Result<()> {
        let children = self.visual(parent)?.children.clone();
        self.visual_mut(parent)?.walk_depth += 1;

        let mut result = Ok(());
        for child in children {
            result = f(self, child);
            if result.is_err() {
                break;
            }
        }

        if let Ok(visual) = self.visual_mut(parent) {
            visual.walk_depth -= 1;
        }
        result
    }

    pub fn parent_of(&self, visual: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.visual(visual)?.parent)
    }

    pub fn children_of(&self, visual: ObjectId) -> Result<&[ObjectId]> {
        Ok(&self.visual(visual)?.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3d_channel::RecordingChannel;

    fn visual(scene: &mut Scene) -> ObjectId {
        scene.create_model_visual(ObjectId::default()).unwrap()
    }

    #[test]
    fn test_attach_and_detach_keep_indices() {
        let mut scene = Scene::new();
        let root = visual(&mut scene);
        let kids: Vec<_> = (0..3).map(|_| visual(&mut scene)).collect();
        for kid in &kids {
            scene.attach(root, *kid).unwrap();
        }
        assert_eq!(scene.children_of(root).unwrap(), kids.as_slice());
        assert_eq!(scene.visual(kids[2]).unwrap().index_in_parent(), 2);
        assert_eq!(scene.parent_of(kids[1]).unwrap(), Some(root));

        scene.detach(root, kids[0]).unwrap();
        assert_eq!(scene.children_of(root).unwrap(), &kids[1..]);
        assert_eq!(scene.visual(kids[1]).unwrap().index_in_parent(), 0);
        assert_eq!(scene.visual(kids[2]).unwrap().index_in_parent(), 1);
        assert_eq!(scene.parent_of(kids[0]).unwrap(), None);
        assert!(scene.holders(kids[0]).unwrap().is_empty());
    }

    #[test]
    fn test_attach_guards() {
        let mut scene = Scene::new();
        let root = visual(&mut scene);
        let other = visual(&mut scene);
        let child = visual(&mut scene);
        scene.attach(root, child).unwrap();

        assert_eq!(
            scene.attach(other, child),
            Err(SceneError::AlreadyParented(child))
        );
        assert_eq!(
            scene.attach(child, root),
            Err(SceneError::Cycle {
                parent: child,
                child: root
            })
        );
        assert_eq!(
            scene.detach(other, child),
            Err(SceneError::NotAChild {
                parent: other,
                child
            })
        );
    }

    #[test]
    fn test_walk_blocks_structural_changes() {
        let mut scene = Scene::new();
        let root = visual(&mut scene);
        let child = visual(&mut scene);
        let extra = visual(&mut scene);
        scene.attach(root, child).unwrap();

        let mut seen = Vec::new();
        let result = scene.walk_children(root, |scene, id| {
            seen.push(id);
            scene.attach(root, extra)
        });
        assert_eq!(result, Err(SceneError::TreeWalkInProgress(root)));
        assert_eq!(seen, vec![child]);

        let result = scene.walk_children(root, |scene, _| scene.destroy(root));
        assert_eq!(result, Err(SceneError::TreeWalkInProgress(root)));

        let result = scene.walk_children(root, |scene, id| scene.detach(root, id));
        assert_eq!(result, Err(SceneError::TreeWalkInProgress(root)));
        assert_eq!(scene.parent_of(child).unwrap(), Some(root));

        // the guard is released when the walk ends
        scene.attach(root, extra).unwrap();
        assert_eq!(scene.children_of(root).unwrap(), &[child, extra]);
    }

    #[test]
    fn test_collection_edits_allowed_during_walk() {
        let mut scene = Scene::new();
        let root = visual(&mut scene);
        let child = visual(&mut scene);
        scene.attach(root, child).unwrap();
        let group = scene.create_model_group();
        let children = scene.group_children(group).unwrap();

        // the guard covers the walked child list only
        scene
            .walk_children(root, |scene, _| {
                let model = scene.create_model_group();
                scene.collection_add(children, model).map(|_| ())
            })
            .unwrap();
        assert_eq!(scene.group_items(group).unwrap().len(), 1);
        assert_eq!(scene.visual(root).unwrap().walk_depth, 0);
    }

    #[test]
    fn test_attach_connects_on_parent_channels() {
        let mut scene = Scene::new();
        let (channel, log) = RecordingChannel::new();
        let channel = scene.add_channel(Box::new(channel)).unwrap();
        let root = visual(&mut scene);
        scene.add_ref_on_channel(root, channel).unwrap();

        let child = visual(&mut scene);
        scene.attach(root, child).unwrap();
        assert!(scene.is_bound_on(child, channel).unwrap());
        assert!(scene
            .dirty_on(root, channel)
            .unwrap()
            .contains(DirtyFlags::STRUCTURE));

        let child_handle = scene.handle_on(child, channel).unwrap().unwrap();
        scene.detach(root, child).unwrap();
        assert!(!scene.is_bound_on(child, channel).unwrap());
        assert_eq!(log.released(), vec![child_handle]);
        scene.destroy(child).unwrap();
    }
}
