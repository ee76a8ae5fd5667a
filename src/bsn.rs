//! BSON serialization and navigation helpers.

use serde_json::Value;
use bson::{ Bson, Document, ValueAccessError };
use serde::{ Serialize, Deserialize };
use crate::error::{ Error, ErrorKind, Result, ResultExt };

/// Methods for dynamically type-checking JSON.
pub trait JsonExt: Sized {
    /// Ensures that this tree of values doesn't contain integers which are
    /// not expressible by `i64` (the `bson` crate would silently wrap them),
    /// then converts it into a `Bson` tree. Extended JSON objects (`$oid`,
    /// `$date`) are turned back into their native BSON counterparts.
    fn try_into_bson(self) -> Result<Bson>;
}

/// Methods for dynamically type-checking BSON.
pub trait BsonExt: Sized {
    /// Ensures that the BSON value is a `Document` and unwraps it.
    fn try_into_doc(self) -> Result<Document>;
}

/// Methods for reading possibly-nested fields of a document.
pub trait DocumentExt {
    /// Looks up a dotted field path (`"author.name"`). Returns `None` if any
    /// component is absent or an intermediate value is not a document.
    fn get_path(&self, path: &str) -> Option<&Bson>;
}

impl JsonExt for Value {
    fn try_into_bson(self) -> Result<Bson> {
        match self {
            Value::Number(n) => if n.is_i64() || n.is_f64() {
                bson::to_bson(&n).map_err(Into::into)
            } else {
                Err(Error::new(
                    ErrorKind::BsonNumberRepr,
                    format!("Value `{}` can't be represented in BSON", n)
                ))
            },

            Value::Array(values) => values
                .into_iter()
                .map(JsonExt::try_into_bson)
                .collect::<Result<Vec<_>>>()
                .map(Bson::from),

            Value::Object(values) => values
                .into_iter()
                .map(|(k, v)| v.try_into_bson().map(|v| (k, v)))
                .collect::<Result<Document>>()
                .map(Bson::from_extended_document),

            value => Ok(value.into()),
        }
    }
}

impl BsonExt for Bson {
    fn try_into_doc(self) -> Result<Document> {
        match self {
            Bson::Document(doc) => Ok(doc),
            value => Err(Error::with_cause(
                format!("expected Document, got {:?}", value.element_type()),
                ValueAccessError::UnexpectedType,
            ))
        }
    }
}

impl DocumentExt for Document {
    fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut components = path.split('.');
        let first = components.next()?;
        let mut current = self.get(first)?;

        for key in components {
            current = match *current {
                Bson::Document(ref doc) => doc.get(key)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

/// Creates a BSON `Document` out of a serializable value.
pub fn serialize_document<T: Serialize>(value: &T) -> Result<Document> {
    serde_json::to_value(value)
        .map_err(From::from)
        .and_then(JsonExt::try_into_bson)
        .and_then(BsonExt::try_into_doc)
}

/// Decodes a stored document into a strongly-typed value.
pub fn deserialize_document<T>(document: Document) -> Result<T>
    where T: for<'a> Deserialize<'a>
{
    bson::from_bson(Bson::Document(document))
        .chain_kind(ErrorKind::SchemaViolation, "document doesn't match its typed schema")
}

#[cfg(test)]
mod tests {
    use std::{ u64, i64 };
    use crate::error::Result;
    use super::*;

    #[test]
    fn bson_ext_try_into_doc() -> Result<()> {
        let doc = bson!({ "likes": [], "message": "hello" });
        let other = bson!([{ "key": "value" }, false, null]);

        assert_eq!(doc.try_into_doc()?, doc!{ "likes": [], "message": "hello" });
        assert!(other.try_into_doc().is_err());

        Ok(())
    }

    #[test]
    fn nested_field_paths() {
        let doc = doc!{
            "userId": "u1",
            "meta": { "source": { "app": "mobile" } },
        };

        assert_eq!(doc.get_path("userId"), Some(&Bson::from("u1")));
        assert_eq!(doc.get_path("meta.source.app"), Some(&Bson::from("mobile")));
        assert_eq!(doc.get_path("meta.missing"), None);
        assert_eq!(doc.get_path("userId.nested"), None);
    }

    #[test]
    fn serialize_rejects_unrepresentable_numbers() -> Result<()> {
        #[derive(Serialize)]
        struct Counter { value: u64 }

        let good = Counter { value: i64::MAX as u64 };
        let bad = Counter { value: u64::MAX };

        assert_eq!(serialize_document(&good)?, doc!{ "value": i64::MAX });
        assert!(serialize_document(&bad)
                .unwrap_err()
                .to_string()
                .contains("can't be represented in BSON"));

        Ok(())
    }
}
