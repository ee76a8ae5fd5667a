//! Declarative description of the state a collection should be brought to.
//!
//! A `CollectionTarget` names a collection, the indexes it must carry (each
//! under a fixed name, since names are what dashboards and ops tooling key
//! on), and the defaults that pre-existing documents must be backfilled with.

use std::collections::HashSet;
use std::fmt;
use bson::{ Bson, Document };
use crate::{
    literal::{ BsonType, IndexType },
    error::{ Error, ErrorKind, Result },
};

/// A declared index: a fixed name plus an ordered key pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// The index name. Stable across runs.
    pub name: String,
    /// Keys in declaration order; order is significant for compound indexes.
    pub keys: Vec<(String, IndexType)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether documents lacking the indexed fields are left out.
    pub sparse: bool,
}

impl IndexSpec {
    /// Starts a declaration with the given name and no keys.
    pub fn new<S: Into<String>>(name: S) -> Self {
        IndexSpec {
            name: name.into(),
            keys: Vec::new(),
            unique: false,
            sparse: false,
        }
    }

    /// Appends a key to the pattern.
    pub fn key<K, T>(mut self, field: K, index_type: T) -> Self
        where K: Into<String>,
              T: Into<IndexType>,
    {
        self.keys.push((field.into(), index_type.into()));
        self
    }

    /// Marks the index as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index as sparse.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// The key pattern as the server expects it.
    pub fn key_document(&self) -> Document {
        self.keys
            .iter()
            .map(|(field, index_type)| (field.clone(), Bson::from(*index_type)))
            .collect()
    }

    /// Whether `keys` is exactly this declaration's pattern, order included.
    pub fn has_keys(&self, keys: &[(String, IndexType)]) -> bool {
        self.keys.as_slice() == keys
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, KeyPattern(&self.keys))
    }
}

/// Displays a key pattern the way the mongo shell prints it.
#[derive(Debug, Clone, Copy)]
pub struct KeyPattern<'a>(pub &'a [(String, IndexType)]);

impl<'a> fmt::Display for KeyPattern<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("{ ")?;

        for (i, (field, index_type)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field, index_type)?;
        }

        f.write_str(" }")
    }
}

/// The value a field must hold when it is absent, null, or ill-typed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefault {
    /// Field name or dotted path.
    pub field: String,
    /// The value written by the backfill.
    pub default: Bson,
    /// Types a present value may have without being rewritten.
    pub expected: BsonType,
}

impl FieldDefault {
    /// A default whose expected type is the type of the default itself,
    /// e.g. an empty array means "must be an array".
    pub fn new<S: Into<String>>(field: S, default: Bson) -> Self {
        let expected = BsonType::of(&default);
        FieldDefault { field: field.into(), default, expected }
    }

    /// Overrides the set of acceptable types.
    pub fn expecting(mut self, expected: BsonType) -> Self {
        self.expected = expected;
        self
    }
}

/// The desired shape of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTarget {
    /// The collection name, unique within a database.
    pub name: String,
    /// Indexes that must be present, in application order.
    pub indexes: Vec<IndexSpec>,
    /// Fields that must be present and well-typed on every document.
    pub field_defaults: Vec<FieldDefault>,
}

impl CollectionTarget {
    /// A target with no indexes and no field defaults.
    pub fn new<S: Into<String>>(name: S) -> Self {
        CollectionTarget {
            name: name.into(),
            indexes: Vec::new(),
            field_defaults: Vec::new(),
        }
    }

    /// Declares an index.
    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    /// Declares a field default.
    pub fn field_default(mut self, default: FieldDefault) -> Self {
        self.field_defaults.push(default);
        self
    }

    /// Names of all declared indexes, in declaration order.
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.iter().map(|spec| spec.name.as_str())
    }

    /// Checks the declaration for mistakes that would make re-application
    /// non-idempotent or the backfill ill-defined.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('$') || self.name.contains('\0') {
            return Err(Error::new(
                ErrorKind::Config,
                format!("invalid collection name `{}`", self.name)
            ));
        }

        let mut names = HashSet::new();

        for spec in &self.indexes {
            if spec.name.is_empty() {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("unnamed index declared on `{}`", self.name)
                ));
            }
            if spec.keys.is_empty() {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("index `{}` on `{}` has an empty key pattern", spec.name, self.name)
                ));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("index name `{}` declared twice on `{}`", spec.name, self.name)
                ));
            }
        }

        let mut fields = HashSet::new();

        for default in &self.field_defaults {
            if default.field.is_empty() || default.field.starts_with('$') {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("invalid field name `{}` on `{}`", default.field, self.name)
                ));
            }
            if !fields.insert(default.field.as_str()) {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("field `{}` has two defaults on `{}`", default.field, self.name)
                ));
            }
            if default.expected.is_empty() || !default.expected.admits(&default.default) {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("default for `{}.{}` is not of its own expected type ({})",
                            self.name, default.field, default.expected)
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::literal::Order;
    use crate::error::ErrorExt;
    use super::*;

    fn receiver_created() -> IndexSpec {
        IndexSpec::new("idx_receiverId_createdAt")
            .key("receiverId", Order::Ascending)
            .key("createdAt", Order::Descending)
    }

    #[test]
    fn key_document_preserves_declaration_order() {
        let spec = receiver_created();

        assert_eq!(spec.key_document(), doc!{ "receiverId": 1, "createdAt": -1 });
        assert_eq!(spec.to_string(), "idx_receiverId_createdAt { receiverId: 1, createdAt: -1 }");

        let reversed = vec![
            (String::from("createdAt"), IndexType::Ordered(Order::Descending)),
            (String::from("receiverId"), IndexType::Ordered(Order::Ascending)),
        ];
        assert!(!spec.has_keys(&reversed));
        assert!(spec.has_keys(&receiver_created().keys));
    }

    #[test]
    fn field_default_expects_its_own_type() {
        let likes = FieldDefault::new("likes", Bson::Array(Vec::new()));
        let is_read = FieldDefault::new("isRead", Bson::Boolean(false));

        assert_eq!(likes.expected, BsonType::ARRAY);
        assert_eq!(is_read.expected, BsonType::BOOL);
    }

    #[test]
    fn duplicate_index_names_are_rejected() {
        let target = CollectionTarget::new("notifications")
            .index(receiver_created())
            .index(receiver_created());

        let error = target.validate().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.to_string().contains("declared twice"));
    }

    #[test]
    fn ill_typed_defaults_are_rejected() {
        let target = CollectionTarget::new("feeds")
            .field_default(FieldDefault::new("likes", Bson::Null).expecting(BsonType::ARRAY));

        assert!(target.validate().is_err());
    }

    #[test]
    fn empty_key_patterns_are_rejected() {
        let target = CollectionTarget::new("feeds").index(IndexSpec::new("idx_nothing"));
        assert!(target.validate().is_err());

        assert!(CollectionTarget::new("").validate().is_err());
        assert!(CollectionTarget::new("feeds").validate().is_ok());
    }
}
