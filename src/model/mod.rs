//! Typed documents of the feed service and their declared target states.

use serde::{ Serialize, Deserialize };
use bson::Bson;
use crate::{
    target::{ CollectionTarget, IndexSpec, FieldDefault },
    error::{ Error, ErrorKind, Result },
};

pub mod feed;
pub mod notification;
pub mod audit;
pub mod seed;

pub use self::feed::Feed;
pub use self::notification::{ Notification, NotificationKind };

/// Implemented by top-level (direct collection member) documents only.
/// These types always have an associated collection name and an `_id`.
pub trait Doc: Serialize + for<'a> Deserialize<'a> {
    /// The name of the collection within the database.
    const NAME: &'static str;

    /// The named indexes the collection must bear, in application order.
    /// The `_id` index is implied and never declared.
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    /// The fields that pre-existing documents are backfilled with.
    fn field_defaults() -> Vec<FieldDefault> {
        Vec::new()
    }

    /// The full target state of the collection.
    fn target() -> CollectionTarget {
        let target = Self::indexes().into_iter().fold(CollectionTarget::new(Self::NAME), CollectionTarget::index);
        Self::field_defaults().into_iter().fold(target, CollectionTarget::field_default)
    }

    /// The `_id` of the document, if it has one yet.
    fn id(&self) -> Option<&Bson>;
}

/// Target state of `feeds`.
pub fn feeds() -> CollectionTarget {
    Feed::target()
}

/// Target state of `notifications`.
pub fn notifications() -> CollectionTarget {
    Notification::target()
}

/// Every collection the tool knows how to migrate, in default run order.
pub fn builtin_targets() -> Vec<CollectionTarget> {
    vec![feeds(), notifications()]
}

/// Looks up a built-in target by collection name.
pub fn target_by_name(name: &str) -> Result<CollectionTarget> {
    builtin_targets()
        .into_iter()
        .find(|target| target.name == name)
        .ok_or_else(|| Error::new(
            ErrorKind::Config,
            format!("unknown collection `{}`; known: {}", name, builtin_names().join(", "))
        ))
}

/// Names of the built-in targets.
pub fn builtin_names() -> Vec<String> {
    builtin_targets().into_iter().map(|target| target.name).collect()
}
