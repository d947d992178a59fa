//! Animated property overrides
//!
//! The animation clock lives outside the scene. It attaches an [`Animator`]
//! per property and calls [`Scene::invalidate_animations`] after each tick;
//! reads through `effective_*` then see the animated value while the base
//! value stays untouched.

use crate::error::{Result, SceneError};
use crate::object::{Material, ModelKind, ObjectKind, Transform};
use crate::resource::DirtyFlags;
use crate::scene::Scene;
use crate::value::ObjectId;
use glam::DVec3;
use m3d_channel::{CameraData, CameraProjection, LightData, LightKind, MaterialData};
use m3d_math::{Color, Matrix3D, Rotation3D, TransformOp};

/// Animatable property of a scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Offset,
    ScaleFactor,
    Center,
    RotationAngle,
    RotationAxis,
    Matrix,
    Color,
    AmbientColor,
    SpecularPower,
    Position,
    Direction,
    LookDirection,
    UpDirection,
    Range,
    InnerConeAngle,
    OuterConeAngle,
    NearPlane,
    FarPlane,
    FieldOfView,
    Width,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Scalar(f64),
    Vector(DVec3),
    Color(Color),
    Matrix(Matrix3D),
}

impl PropertyValue {
    fn same_type(&self, other: &PropertyValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Supplies the current value of one animated property
pub trait Animator {
    fn current_value(&self, base: &PropertyValue) -> PropertyValue;
}

impl<F> Animator for F
where
    F: Fn(&PropertyValue) -> PropertyValue,
{
    fn current_value(&self, base: &PropertyValue) -> PropertyValue {
        self(base)
    }
}

enum PropertySlot<'a> {
    Scalar(&'a mut f64),
    Vector(&'a mut DVec3),
    Color(&'a mut Color),
    Matrix(&'a mut Matrix3D),
}

impl PropertySlot<'_> {
    fn get(&self) -> PropertyValue {
        match self {
            PropertySlot::Scalar(v) => PropertyValue::Scalar(**v),
            PropertySlot::Vector(v) => PropertyValue::Vector(**v),
            PropertySlot::Color(v) => PropertyValue::Color(**v),
            PropertySlot::Matrix(v) => PropertyValue::Matrix(**v),
        }
    }

    /// False when the value has a different type
    fn set(self, value: PropertyValue) -> bool {
        match (self, value) {
            (PropertySlot::Scalar(slot), PropertyValue::Scalar(v)) => *slot = v,
            (PropertySlot::Vector(slot), PropertyValue::Vector(v)) => *slot = v,
            (PropertySlot::Color(slot), PropertyValue::Color(v)) => *slot = v,
            (PropertySlot::Matrix(slot), PropertyValue::Matrix(v)) => *slot = v,
            _ => return false,
        }
        true
    }
}

/// Animator output for `base`, or `base` itself when the animator answers
/// with a different type
fn animated_value(id: ObjectId, property: Property, animator: &dyn Animator, base: PropertyValue) -> PropertyValue {
    let value = animator.current_value(&base);
    if value.same_type(&base) {
        value
    } else {
        log::warn!("Animator for {:?} on {:?} returned a mistyped value", property, id);
        base
    }
}

fn transform_slot(op: &mut TransformOp, property: Property) -> Option<PropertySlot<'_>> {
    let slot = match (op, property) {
        (TransformOp::Translate { offset }, Property::Offset) => PropertySlot::Vector(offset),
        (TransformOp::Scale { scale, .. }, Property::ScaleFactor) => PropertySlot::Vector(scale),
        (TransformOp::Scale { center, .. } | TransformOp::Rotate { center, .. }, Property::Center) => {
            PropertySlot::Vector(center)
        }
        (
            TransformOp::Rotate {
                rotation: Rotation3D::AxisAngle { angle, .. },
                ..
            },
            Property::RotationAngle,
        ) => PropertySlot::Scalar(angle),
        (
            TransformOp::Rotate {
                rotation: Rotation3D::AxisAngle { axis, .. },
                ..
            },
            Property::RotationAxis,
        ) => PropertySlot::Vector(axis),
        (TransformOp::Matrix(matrix), Property::Matrix) => PropertySlot::Matrix(matrix),
        _ => return None,
    };
    Some(slot)
}

fn material_slot(data: &mut MaterialData, property: Property) -> Option<PropertySlot<'_>> {
    let slot = match (data, property) {
        (
            MaterialData::Diffuse { color, .. }
            | MaterialData::Specular { color, .. }
            | MaterialData::Emissive { color },
            Property::Color,
        ) => PropertySlot::Color(color),
        (MaterialData::Diffuse { ambient_color, .. }, Property::AmbientColor) => {
            PropertySlot::Color(ambient_color)
        }
        (MaterialData::Specular { specular_power, .. }, Property::SpecularPower) => {
            PropertySlot::Scalar(specular_power)
        }
        _ => return None,
    };
    Some(slot)
}

fn light_slot(data: &mut LightData, property: Property) -> Option<PropertySlot<'_>> {
    if property == Property::Color {
        return Some(PropertySlot::Color(&mut data.color));
    }
    let slot = match (&mut data.kind, property) {
        (
            LightKind::Directional { direction } | LightKind::Spot { direction, .. },
            Property::Direction,
        ) => PropertySlot::Vector(direction),
        (
            LightKind::Point { position, .. } | LightKind::Spot { position, .. },
            Property::Position,
        ) => PropertySlot::Vector(position),
        (LightKind::Point { range, .. } | LightKind::Spot { range, .. }, Property::Range) => {
            PropertySlot::Scalar(range)
        }
        (LightKind::Spot { inner_cone_angle, .. }, Property::InnerConeAngle) => {
            PropertySlot::Scalar(inner_cone_angle)
        }
        (LightKind::Spot { outer_cone_angle, .. }, Property::OuterConeAngle) => {
            PropertySlot::Scalar(outer_cone_angle)
        }
        _ => return None,
    };
    Some(slot)
}

fn camera_slot(data: &mut CameraData, property: Property) -> Option<PropertySlot<'_>> {
    let slot = match property {
        Property::Position => PropertySlot::Vector(&mut data.position),
        Property::LookDirection => PropertySlot::Vector(&mut data.look_direction),
        Property::UpDirection => PropertySlot::Vector(&mut data.up_direction),
        Property::NearPlane => PropertySlot::Scalar(&mut data.near_plane),
        Property::FarPlane => PropertySlot::Scalar(&mut data.far_plane),
        Property::FieldOfView => match &mut data.projection {
            CameraProjection::Perspective { field_of_view } => PropertySlot::Scalar(field_of_view),
            _ => return None,
        },
        Property::Width => match &mut data.projection {
            CameraProjection::Orthographic { width } => PropertySlot::Scalar(width),
            _ => return None,
        },
        _ => return None,
    };
    Some(slot)
}

fn property_slot(kind: &mut ObjectKind, property: Property) -> Option<PropertySlot<'_>> {
    match kind {
        ObjectKind::Transform(Transform::Op(op)) => transform_slot(op, property),
        ObjectKind::Material(Material::Leaf(data)) => material_slot(data, property),
        ObjectKind::Model(model) => match &mut model.kind {
            ModelKind::Light(data) => light_slot(data, property),
            _ => None,
        },
        ObjectKind::Camera(camera) => camera_slot(&mut camera.data, property),
        _ => None,
    }
}

/// Read a property without cloning the whole object; payloads are `Copy`
fn read_property(kind: &ObjectKind, property: Property) -> Option<PropertyValue> {
    let value = match kind {
        ObjectKind::Transform(Transform::Op(op)) => {
            let mut op = *op;
            transform_slot(&mut op, property)?.get()
        }
        ObjectKind::Material(Material::Leaf(data)) => {
            let mut data = *data;
            material_slot(&mut data, property)?.get()
        }
        ObjectKind::Model(model) => match model.kind {
            ModelKind::Light(mut data) => light_slot(&mut data, property)?.get(),
            _ => return None,
        },
        ObjectKind::Camera(camera) => {
            let mut data = camera.data;
            camera_slot(&mut data, property)?.get()
        }
        _ => return None,
    };
    Some(value)
}

impl Scene {
    /// Attach an animator to `property`, replacing any earlier one
    pub fn animate(
        &mut self,
        id: ObjectId,
        property: Property,
        animator: impl Animator + 'static,
    ) -> Result<()> {
        self.begin_write(id)?;
        let object = self.get_mut(id)?;
        if read_property(&object.kind, property).is_none() {
            return Err(SceneError::UnknownProperty {
                object: id,
                property,
            });
        }
        let animator: Box<dyn Animator> = Box::new(animator);
        let animations = &mut object.header.animations;
        animations.retain(|(p, _)| *p != property);
        animations.push((property, animator));
        self.end_write(id, DirtyFlags::CONTENT)
    }

    /// Detach the animator of `property`; false when there was none
    pub fn stop_animation(&mut self, id: ObjectId, property: Property) -> Result<bool> {
        let animations = &mut self.get_mut(id)?.header.animations;
        let before = animations.len();
        animations.retain(|(p, _)| *p != property);
        if animations.len() == before {
            return Ok(false);
        }
        self.end_write(id, DirtyFlags::CONTENT)?;
        Ok(true)
    }

    pub fn is_animated(&self, id: ObjectId) -> Result<bool> {
        Ok(self.get(id)?.header.is_animated())
    }

    /// Un-animated value
    pub fn base_property(&self, id: ObjectId, property: Property) -> Result<PropertyValue> {
        read_property(&self.get(id)?.kind, property).ok_or(SceneError::UnknownProperty {
            object: id,
            property,
        })
    }

    /// Value with the property's animator applied
    pub fn effective_property(&self, id: ObjectId, property: Property) -> Result<PropertyValue> {
        let base = self.base_property(id, property)?;
        let header = &self.get(id)?.header;
        Ok(match header.animator(property) {
            Some(animator) => animated_value(id, property, animator, base),
            None => base,
        })
    }

    /// Write the base value of one property
    pub fn set_property(&mut self, id: ObjectId, property: Property, value: PropertyValue) -> Result<()> {
        self.begin_write(id)?;
        let object = self.get_mut(id)?;
        let slot = property_slot(&mut object.kind, property).ok_or(SceneError::UnknownProperty {
            object: id,
            property,
        })?;
        if !slot.set(value) {
            return Err(SceneError::PropertyType(property));
        }
        self.end_write(id, DirtyFlags::CONTENT)
    }

    /// Called by the clock after a tick; returns how many objects changed
    pub fn invalidate_animations(&mut self) -> Result<usize> {
        let animated: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, object)| object.header.is_animated())
            .map(|(id, _)| id)
            .collect();
        for id in &animated {
            self.end_write(*id, DirtyFlags::CONTENT)?;
        }
        Ok(animated.len())
    }

    /// Copy of the object's kind with every animated property collapsed
    pub(crate) fn effective_kind(&self, id: ObjectId) -> Result<ObjectKind> {
        let object = self.get(id)?;
        let mut kind = object.kind.clone();
        for (property, _) in &object.header.animations {
            let value = self.effective_property(id, *property)?;
            if let Some(slot) = property_slot(&mut kind, *property) {
                slot.set(value);
            }
        }
        Ok(kind)
    }

    /// `op` with the animations of transform `id` applied
    pub(crate) fn effective_op(&self, id: ObjectId, op: &TransformOp) -> TransformOp {
        let mut op = *op;
        let Some(object) = self.objects.get(id) else {
            return op;
        };
        for (property, animator) in &object.header.animations {
            if let Some(slot) = transform_slot(&mut op, *property) {
                let value = animated_value(id, *property, animator.as_ref(), slot.get());
                slot.set(value);
            }
        }
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueState;
    use m3d_channel::LightData;

    #[test]
    fn test_animated_transform_value() {
        let mut scene = Scene::new();
        let transform = scene.create_transform(TransformOp::translate(DVec3::X));
        scene
            .animate(transform, Property::Offset, |_: &PropertyValue| {
                PropertyValue::Vector(DVec3::new(0.0, 5.0, 0.0))
            })
            .unwrap();

        assert!(scene.is_animated(transform).unwrap());
        assert_eq!(
            scene.base_property(transform, Property::Offset).unwrap(),
            PropertyValue::Vector(DVec3::X)
        );
        let value = scene.transform_value(transform).unwrap();
        assert_eq!(value.transform_point(DVec3::ZERO), DVec3::new(0.0, 5.0, 0.0));

        assert!(scene.stop_animation(transform, Property::Offset).unwrap());
        assert!(!scene.stop_animation(transform, Property::Offset).unwrap());
        let value = scene.transform_value(transform).unwrap();
        assert_eq!(value.transform_point(DVec3::ZERO), DVec3::X);
    }

    #[test]
    fn test_mistyped_transform_animator_keeps_base() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scene = Scene::new();
        let transform = scene.create_transform(TransformOp::translate(DVec3::X));
        scene
            .animate(transform, Property::Offset, |_: &PropertyValue| PropertyValue::Scalar(3.0))
            .unwrap();

        let value = scene.transform_value(transform).unwrap();
        assert_eq!(value.transform_point(DVec3::ZERO), DVec3::X);
        assert_eq!(
            scene.effective_property(transform, Property::Offset).unwrap(),
            PropertyValue::Vector(DVec3::X)
        );
    }

    #[test]
    fn test_animated_value_cannot_freeze() {
        let mut scene = Scene::new();
        let light = scene.create_light(LightData::ambient(Color::WHITE));
        scene
            .animate(light, Property::Color, |_: &PropertyValue| {
                PropertyValue::Color(Color::BLACK)
            })
            .unwrap();
        assert!(!scene.can_freeze(light).unwrap());
        assert_eq!(scene.freeze(light), Err(SceneError::CannotFreeze(light)));
        assert_eq!(scene.state(light).unwrap(), ValueState::Mutable);
    }

    #[test]
    fn test_clone_current_value_collapses_animation() {
        let mut scene = Scene::new();
        let material = scene.create_material(MaterialData::diffuse(Color::WHITE));
        scene
            .animate(material, Property::Color, |_: &PropertyValue| {
                PropertyValue::Color(Color::BLACK)
            })
            .unwrap();

        let plain = scene.clone_value(material).unwrap();
        let current = scene.clone_current_value(material).unwrap();
        assert!(!scene.is_animated(current).unwrap());
        assert_eq!(
            scene.base_property(plain, Property::Color).unwrap(),
            PropertyValue::Color(Color::WHITE)
        );
        assert_eq!(
            scene.base_property(current, Property::Color).unwrap(),
            PropertyValue::Color(Color::BLACK)
        );
    }

    #[test]
    fn test_property_errors() {
        let mut scene = Scene::new();
        let light = scene.create_light(LightData::ambient(Color::WHITE));
        assert_eq!(
            scene.base_property(light, Property::Range),
            Err(SceneError::UnknownProperty {
                object: light,
                property: Property::Range
            })
        );
        assert_eq!(
            scene.set_property(light, Property::Color, PropertyValue::Scalar(1.0)),
            Err(SceneError::PropertyType(Property::Color))
        );
        assert_eq!(scene.version(light).unwrap(), 0);

        scene
            .set_property(light, Property::Color, PropertyValue::Color(Color::BLACK))
            .unwrap();
        assert_eq!(scene.version(light).unwrap(), 1);
    }

    #[test]
    fn test_invalidate_animations_bumps_animated_only() {
        let mut scene = Scene::new();
        let animated = scene.create_transform(TransformOp::translate(DVec3::X));
        let still = scene.create_transform(TransformOp::translate(DVec3::X));
        scene
            .animate(animated, Property::Offset, |base: &PropertyValue| *base)
            .unwrap();
        let before = scene.version(animated).unwrap();

        assert_eq!(scene.invalidate_animations().unwrap(), 1);
        assert_eq!(scene.version(animated).unwrap(), before + 1);
        assert_eq!(scene.version(still).unwrap(), 0);
    }
}
