//! Lazy bounds caching for models and visuals
//!
//! Each node caches its content bounds and its subtree bounds in parent
//! space. A change marks the node dirty and walks up the holder chain,
//! stopping at the first node that was already dirty: a dirty node always has
//! dirty ancestors, so nothing above it can be clean.

use crate::error::{Result, SceneError};
use crate::object::{ModelKind, ObjectKind, VisualKind};
use crate::scene::Scene;
use crate::value::ObjectId;
use m3d_math::Rect3D;
use slotmap::Key;
use smallvec::SmallVec;

pub(crate) type NodeChildren = SmallVec<[ObjectId; 8]>;

impl Scene {
    /// Mark `id` and the nodes above it for recomputation
    pub(crate) fn invalidate_bounds(&self, id: ObjectId) {
        // (node, reference it changed through); null means the node itself
        let mut pending: SmallVec<[(ObjectId, ObjectId); 8]> = SmallVec::new();
        pending.push((id, ObjectId::default()));

        while let Some((node, from)) = pending.pop() {
            let Some(object) = self.objects.get(node) else {
                continue;
            };
            if let Some(bounds) = object.kind.node_bounds() {
                if from.is_null() || self.changes_content(&object.kind, from) {
                    bounds.content_valid.set(false);
                }
                if bounds.subtree_dirty.replace(true) {
                    continue;
                }
            }
            pending.extend(object.header.holders().iter().map(|holder| (*holder, node)));
        }
    }

    /// Whether a change of `from` affects the content of a node holding it
    fn changes_content(&self, kind: &ObjectKind, from: ObjectId) -> bool {
        if kind.transform_slot() == Some(from) {
            return false;
        }
        match kind {
            ObjectKind::Model(model) => !matches!(model.kind, ModelKind::Group { children } if children == Some(from)),
            ObjectKind::Visual(visual) => !visual.children.contains(&from),
            _ => false,
        }
    }

    /// Children that contribute to a node's subtree bounds
    pub(crate) fn node_children(&self, id: ObjectId) -> Result<NodeChildren> {
        match &self.get(id)?.kind {
            ObjectKind::Model(model) => match model.kind {
                ModelKind::Group { children } => {
                    Ok(self.collection_items_or_empty(children)?.iter().copied().collect())
                }
                _ => Ok(NodeChildren::new()),
            },
            ObjectKind::Visual(visual) => Ok(visual.children.iter().copied().collect()),
            _ => Err(SceneError::KindMismatch {
                object: id,
                expected: "model or visual",
            }),
        }
    }

    /// Bounds of a node's own content in its local space
    ///
    /// Mesh bounds for geometry models, the shown model's subtree bounds for
    /// model visuals, empty otherwise.
    pub fn content_bounds(&self, id: ObjectId) -> Result<Rect3D> {
        let object = self.get(id)?;
        let bounds = object.kind.node_bounds().ok_or(SceneError::KindMismatch {
            object: id,
            expected: "model or visual",
        })?;
        if bounds.content_valid.get() {
            return Ok(bounds.content.get());
        }

        let content = match &object.kind {
            ObjectKind::Model(model) => match model.kind {
                ModelKind::Geometry { geometry, .. } if !geometry.is_null() => {
                    self.geometry(geometry)?.bounds()
                }
                _ => Rect3D::EMPTY,
            },
            ObjectKind::Visual(visual) => match visual.kind {
                VisualKind::Model { content, .. } if !content.is_null() => self.subtree_bounds(content)?,
                _ => Rect3D::EMPTY,
            },
            _ => Rect3D::EMPTY,
        };
        bounds.content.set(content);
        bounds.content_valid.set(true);
        Ok(content)
    }

    /// Bounds of a node and its descendants in the node's parent space
    ///
    /// Clean nodes answer from the cache without traversal.
    pub fn subtree_bounds(&self, id: ObjectId) -> Result<Rect3D> {
        let object = self.get(id)?;
        let bounds = object.kind.node_bounds().ok_or(SceneError::KindMismatch {
            object: id,
            expected: "model or visual",
        })?;
        if !bounds.subtree_dirty.get() {
            return Ok(bounds.subtree.get());
        }

        let mut local = self.content_bounds(id)?;
        for child in self.node_children(id)? {
            local = local.union(&self.subtree_bounds(child)?);
        }
        let subtree = local.transform(&self.local_transform(id)?);

        bounds.subtree.set(subtree);
        bounds.subtree_dirty.set(false);
        Ok(subtree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MeshGeometry;
    use glam::{DVec2, DVec3};
    use m3d_channel::{LightData, MaterialData};
    use m3d_math::{Color, TransformOp};

    fn leaf(scene: &mut Scene, min: DVec2, max: DVec2) -> ObjectId {
        let geometry = scene.create_mesh_geometry(MeshGeometry::quad(min, max, 0.0));
        let material = scene.create_material(MaterialData::diffuse(Color::WHITE));
        scene.create_geometry_model(geometry, material).unwrap()
    }

    #[test]
    fn test_empty_sentinel_without_content() {
        let mut scene = Scene::new();
        let group = scene.create_model_group();
        let light = scene.create_light(LightData::ambient(Color::WHITE));
        assert!(scene.subtree_bounds(group).unwrap().is_empty());
        assert!(scene.subtree_bounds(light).unwrap().is_empty());

        let visual = scene.create_model_visual(ObjectId::default()).unwrap();
        assert_eq!(scene.subtree_bounds(visual).unwrap(), Rect3D::EMPTY);

        let transform = scene.create_transform(TransformOp::default());
        assert!(matches!(
            scene.subtree_bounds(transform),
            Err(SceneError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_group_contains_transformed_leaves() {
        let mut scene = Scene::new();
        let group = scene.create_model_group();
        let children = scene.group_children(group).unwrap();
        let a = leaf(&mut scene, DVec2::ZERO, DVec2::ONE);
        let b = leaf(&mut scene, DVec2::ZERO, DVec2::ONE);
        let offset = scene.create_transform(TransformOp::translate(DVec3::new(5.0, 0.0, 2.0)));
        scene.set_transform(b, offset).unwrap();
        scene.collection_add(children, a).unwrap();
        scene.collection_add(children, b).unwrap();

        let bounds = scene.subtree_bounds(group).unwrap();
        for model in [a, b] {
            let leaf_bounds = scene.subtree_bounds(model).unwrap();
            assert!(bounds.contains_rect(&leaf_bounds, 1e-12));
        }
        assert_eq!(bounds.min(), DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max(), DVec3::new(6.0, 1.0, 2.0));
    }

    #[test]
    fn test_cache_and_invalidation() {
        let mut scene = Scene::new();
        let model = leaf(&mut scene, DVec2::ZERO, DVec2::ONE);
        let visual = scene.create_model_visual(model).unwrap();
        let root = scene.create_model_visual(ObjectId::default()).unwrap();
        scene.attach(root, visual).unwrap();

        let before = scene.subtree_bounds(root).unwrap();
        assert!(!scene.model(model).unwrap().bounds().is_dirty());
        assert!(!scene.visual(root).unwrap().bounds().is_dirty());

        let geometry = scene.slot(model, crate::scene::Slot::Geometry).unwrap();
        scene
            .write_geometry(geometry, |mesh| {
                mesh.set_positions(vec![DVec3::ZERO, DVec3::X * 4.0, DVec3::Y * 4.0]);
                mesh.set_indices(Vec::new());
            })
            .unwrap();
        assert!(scene.model(model).unwrap().bounds().is_dirty());
        assert!(!scene.model(model).unwrap().bounds().is_content_valid());
        assert!(scene.visual(root).unwrap().bounds().is_dirty());

        let after = scene.subtree_bounds(root).unwrap();
        assert_ne!(before, after);
        assert_eq!(after.max(), DVec3::new(4.0, 4.0, 0.0));
    }

    #[test]
    fn test_transform_change_keeps_content_cache() {
        let mut scene = Scene::new();
        let model = leaf(&mut scene, DVec2::ZERO, DVec2::ONE);
        let transform = scene.create_transform(TransformOp::translate(DVec3::ZERO));
        scene.set_transform(model, transform).unwrap();
        scene.subtree_bounds(model).unwrap();

        scene
            .write_transform(transform, |op| *op = TransformOp::translate(DVec3::Z))
            .unwrap();
        let bounds = scene.model(model).unwrap().bounds();
        assert!(bounds.is_dirty());
        assert!(bounds.is_content_valid());
        assert_eq!(scene.subtree_bounds(model).unwrap().min().z, 1.0);
    }
}
