//! Error type for scene-graph operations
//!
//! Every failing operation leaves the scene as it was.

use crate::value::ObjectId;
use m3d_channel::ChannelId;
use m3d_math::MathError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("object {0:?} is frozen")]
    Frozen(ObjectId),

    #[error("visual {0:?} already has a parent")]
    AlreadyParented(ObjectId),

    #[error("children of {0:?} are being walked")]
    TreeWalkInProgress(ObjectId),

    #[error("object {object:?} has no resource on {channel}")]
    ResourceUnderflow {
        object: ObjectId,
        channel: ChannelId,
    },

    #[error("transform is not invertible")]
    NotInvertible,

    #[error(transparent)]
    Math(MathError),

    #[error("index {index} out of range for length {len}")]
    ArgumentOutOfRange { index: usize, len: usize },

    #[error("null object reference")]
    NullArgument,

    #[error("collection {0:?} was modified during enumeration")]
    ConcurrentModification(ObjectId),

    #[error("object {0:?} does not exist")]
    UnknownObject(ObjectId),

    #[error("object {object:?} is not a {expected}")]
    KindMismatch {
        object: ObjectId,
        expected: &'static str,
    },

    #[error("object {0:?} cannot be frozen")]
    CannotFreeze(ObjectId),

    #[error("adding {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: ObjectId, child: ObjectId },

    #[error("object {0:?} is still referenced or bound")]
    InUse(ObjectId),

    #[error("{0} is not registered")]
    UnknownChannel(ChannelId),

    #[error("channel limit of {0} reached")]
    TooManyChannels(usize),

    #[error("object {object:?} has no property {property:?}")]
    UnknownProperty {
        object: ObjectId,
        property: crate::animation::Property,
    },

    #[error("value for {0:?} has the wrong type")]
    PropertyType(crate::animation::Property),

    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild { parent: ObjectId, child: ObjectId },
}

impl From<MathError> for SceneError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::NotInvertible => SceneError::NotInvertible,
            other => SceneError::Math(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;
