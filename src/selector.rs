//! Predicates selecting the documents a field backfill has to touch.
//!
//! A `FieldSelector` is usable two ways: as a MongoDB filter document, and
//! as an in-process matcher over already-fetched documents. Both renderings
//! must agree, since the verification report and the in-memory store rely
//! on the latter.

use std::fmt;
use bson::{ Bson, Document };
use crate::{
    bsn::DocumentExt,
    literal::BsonType,
    target::FieldDefault,
};

/// Which condition on the field selects a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCondition {
    /// The field is absent, or explicitly `null`.
    MissingOrNull,
    /// The field is present and non-null, but none of the given types.
    WrongType(BsonType),
    /// Either of the above: the document still needs the backfill.
    NeedsBackfill(BsonType),
}

/// A condition on a single named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    /// Field name or dotted path.
    pub field: String,
    /// What makes a document match.
    pub condition: FieldCondition,
}

impl FieldSelector {
    /// Selects documents where `field` is absent or `null`.
    pub fn missing_or_null<S: Into<String>>(field: S) -> Self {
        FieldSelector { field: field.into(), condition: FieldCondition::MissingOrNull }
    }

    /// Selects documents where `field` holds a non-null value outside `expected`.
    pub fn wrong_type<S: Into<String>>(field: S, expected: BsonType) -> Self {
        FieldSelector { field: field.into(), condition: FieldCondition::WrongType(expected) }
    }

    /// Selects documents matched by either of the two passes.
    pub fn needs_backfill<S: Into<String>>(field: S, expected: BsonType) -> Self {
        FieldSelector { field: field.into(), condition: FieldCondition::NeedsBackfill(expected) }
    }

    /// The union selector for a declared default.
    pub fn for_default(default: &FieldDefault) -> Self {
        Self::needs_backfill(default.field.as_str(), default.expected)
    }

    /// Renders the selector as a query filter.
    ///
    /// The server applies both equality and `$type` to array elements as
    /// well as to the array itself, so `{ field: null }` would also match
    /// `["u1", null]`. Every clause therefore pins down the type of the
    /// field value proper, and the filter selects exactly what `matches()`
    /// selects.
    pub fn to_filter(&self) -> Document {
        let mut clauses = match self.condition {
            FieldCondition::MissingOrNull => self.missing_or_null_clauses(),
            FieldCondition::WrongType(expected) => self.wrong_type_clauses(expected),
            FieldCondition::NeedsBackfill(expected) => {
                let mut clauses = self.missing_or_null_clauses();
                clauses.extend(self.wrong_type_clauses(expected));
                clauses
            }
        };

        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            let clauses: Vec<Bson> = clauses.into_iter().map(Bson::Document).collect();
            doc!{ "$or": clauses }
        }
    }

    /// `{ field: { ... } }`
    fn clause(&self, condition: Document) -> Document {
        let mut clause = Document::new();
        clause.insert(self.field.clone(), condition);
        clause
    }

    /// Absent, or `null` itself rather than an array holding a `null`.
    fn missing_or_null_clauses(&self) -> Vec<Document> {
        vec![
            self.clause(doc!{ "$exists": false }),
            self.clause(doc!{
                "$type": BsonType::NULL,
                "$not": { "$type": BsonType::ARRAY },
            }),
        ]
    }

    /// Present, non-null, and of none of the `expected` types.
    ///
    /// Arrays always match `$type: "array"`, so when arrays are admitted the
    /// negated `$type` is exact. When they aren't, an array whose elements
    /// happen to have an admitted type would escape the negation, hence the
    /// extra clause catching every array.
    fn wrong_type_clauses(&self, expected: BsonType) -> Vec<Document> {
        let admitted = expected | BsonType::NULL;
        let mut clauses = Vec::with_capacity(2);

        if !expected.contains(BsonType::ARRAY) {
            clauses.push(self.clause(doc!{ "$type": BsonType::ARRAY }));
        }

        clauses.push(self.clause(doc!{
            "$exists": true,
            "$not": { "$type": admitted },
        }));

        clauses
    }

    /// Evaluates the selector against a document. Looks at the field value
    /// only, never at array elements.
    pub fn matches(&self, document: &Document) -> bool {
        let value = document.get_path(&self.field);

        match self.condition {
            FieldCondition::MissingOrNull => is_missing_or_null(value),
            FieldCondition::WrongType(expected) => is_wrong_type(value, expected),
            FieldCondition::NeedsBackfill(expected) => {
                is_missing_or_null(value) || is_wrong_type(value, expected)
            }
        }
    }
}

/// First-pass predicate.
fn is_missing_or_null(value: Option<&Bson>) -> bool {
    match value {
        None | Some(&Bson::Null) => true,
        Some(_) => false,
    }
}

/// Second-pass predicate.
fn is_wrong_type(value: Option<&Bson>, expected: BsonType) -> bool {
    match value {
        None | Some(&Bson::Null) => false,
        Some(value) => !expected.admits(value),
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.condition {
            FieldCondition::MissingOrNull => {
                write!(f, "`{}` absent or null", self.field)
            }
            FieldCondition::WrongType(expected) => {
                write!(f, "`{}` present but not {}", self.field, expected)
            }
            FieldCondition::NeedsBackfill(expected) => {
                write!(f, "`{}` missing, null, or not {}", self.field, expected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeds() -> Vec<Document> {
        vec![
            doc!{ "_id": 1, "message": "no likes yet" },
            doc!{ "_id": 2, "likes": Bson::Null },
            doc!{ "_id": 3, "likes": "u1" },
            doc!{ "_id": 4, "likes": ["u1"] },
            doc!{ "_id": 5, "likes": [Bson::Null] },
            doc!{ "_id": 6, "likes": ["u1", Bson::Null] },
        ]
    }

    fn matching_ids(selector: &FieldSelector) -> Vec<i32> {
        feeds()
            .iter()
            .filter(|doc| selector.matches(doc))
            .filter_map(|doc| doc.get_i32("_id").ok())
            .collect()
    }

    #[test]
    fn passes_partition_the_unmigrated_documents() {
        let missing = FieldSelector::missing_or_null("likes");
        let wrong = FieldSelector::wrong_type("likes", BsonType::ARRAY);
        let both = FieldSelector::needs_backfill("likes", BsonType::ARRAY);

        assert_eq!(matching_ids(&missing), [1, 2]);
        assert_eq!(matching_ids(&wrong), [3]);
        assert_eq!(matching_ids(&both), [1, 2, 3]);
    }

    #[test]
    fn arrays_holding_null_are_not_missing() {
        let liked = doc!{ "_id": 6, "likes": ["u1", Bson::Null] };

        assert!(!FieldSelector::missing_or_null("likes").matches(&liked));
        assert!(!FieldSelector::needs_backfill("likes", BsonType::ARRAY).matches(&liked));

        // `{ likes: null }` would match this array on the server, so the
        // rendered filter must exclude arrays explicitly.
        assert_eq!(FieldSelector::missing_or_null("likes").to_filter(), doc!{
            "$or": [
                { "likes": { "$exists": false } },
                { "likes": { "$type": "null", "$not": { "$type": "array" } } },
            ]
        });
    }

    #[test]
    fn arrays_are_wrong_for_scalar_fields() {
        let wrapped = doc!{ "_id": 7, "isRead": [false] };
        let plain = doc!{ "_id": 8, "isRead": false };
        let selector = FieldSelector::wrong_type("isRead", BsonType::BOOL);

        assert!(selector.matches(&wrapped));
        assert!(!selector.matches(&plain));

        // `$not: { $type: "bool" }` alone skips `[false]` on the server.
        assert_eq!(selector.to_filter(), doc!{
            "$or": [
                { "isRead": { "$type": "array" } },
                { "isRead": { "$exists": true, "$not": { "$type": ["null", "bool"] } } },
            ]
        });
    }

    #[test]
    fn filters_render_as_server_queries() {
        let wrong = FieldSelector::wrong_type("likes", BsonType::ARRAY);

        assert_eq!(wrong.to_filter(), doc!{
            "likes": {
                "$exists": true,
                "$not": { "$type": ["null", "array"] },
            }
        });
        assert_eq!(
            FieldSelector::needs_backfill("likes", BsonType::ARRAY).to_filter(),
            doc!{
                "$or": [
                    { "likes": { "$exists": false } },
                    { "likes": { "$type": "null", "$not": { "$type": "array" } } },
                    { "likes": { "$exists": true, "$not": { "$type": ["null", "array"] } } },
                ]
            }
        );
    }

    #[test]
    fn selectors_describe_themselves() {
        let selector = FieldSelector::needs_backfill("isRead", BsonType::BOOL);
        assert_eq!(selector.to_string(), "`isRead` missing, null, or not bool");
    }
}
