//! Read-only re-derivation of a collection's state after a migration.
//!
//! The verifier shares nothing with the stages before it except the target
//! declaration: it lists, counts, and compares from scratch, so it can also
//! be run on its own to audit drift.

use std::fmt;
use crate::{
    store::Store,
    selector::FieldSelector,
    literal::BsonType,
    target::CollectionTarget,
    event::{ Event, Sink },
    error::Error,
};

/// One specific deviation from the target state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// The collection doesn't exist.
    CollectionMissing,
    /// No index bears the declared name.
    IndexMissing {
        /// The declared index name.
        name: String,
    },
    /// An index bears the declared name but has another key pattern.
    IndexMismatch {
        /// The declared index name.
        name: String,
        /// The declaration, rendered.
        declared: String,
        /// The index found, rendered.
        actual: String,
    },
    /// Documents still match the needs-backfill predicate.
    FieldNeedsBackfill {
        /// The field name.
        field: String,
        /// Number of unmigrated documents.
        count: usize,
        /// The types the field may have.
        expected: BsonType,
    },
    /// A check could not be carried out.
    CheckFailed {
        /// What was being checked.
        check: String,
        /// The error chain.
        reason: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Discrepancy::CollectionMissing => f.write_str("collection does not exist"),
            Discrepancy::IndexMissing { ref name } => write!(f, "index {} is missing", name),
            Discrepancy::IndexMismatch { ref name, ref declared, ref actual } => {
                write!(f, "index {} is {} instead of {}", name, actual, declared)
            }
            Discrepancy::FieldNeedsBackfill { ref field, count, expected } => {
                let noun = if count == 1 { "document" } else { "documents" };
                write!(f, "{} {} still missing field {} (absent, null, or not {})",
                       count, noun, field, expected)
            }
            Discrepancy::CheckFailed { ref check, ref reason } => {
                write!(f, "can't check {}: {}", check, reason)
            }
        }
    }
}

/// The final verdict of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The collection is exactly in its target state.
    Pass,
    /// At least one discrepancy was found.
    ReportedDiscrepancy,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Verdict::Pass => "PASS",
            Verdict::ReportedDiscrepancy => "REPORTED_DISCREPANCY",
        })
    }
}

/// Number of documents still needing a field's backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingField {
    /// The field name.
    pub field: String,
    /// Documents matching the needs-backfill predicate.
    pub count: usize,
}

/// Everything the verifier observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Whether the collection exists.
    pub collection_exists: bool,
    /// Declared index names found with the declared key pattern.
    pub indexes_present: Vec<String>,
    /// Unmigrated documents, per declared field.
    pub pending: Vec<PendingField>,
    /// All indexes on the collection, including `_id_` and undeclared ones.
    pub final_index_count: usize,
    /// All documents in the collection.
    pub final_document_count: usize,
    /// Deviations, in the order they were found.
    pub discrepancies: Vec<Discrepancy>,
    /// `Pass` iff `discrepancies` is empty.
    pub verdict: Verdict,
}

impl VerificationReport {
    /// Whether the verdict is `Pass`.
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Total unmigrated documents over all fields.
    pub fn pending_documents(&self) -> usize {
        self.pending.iter().map(|p| p.count).sum()
    }
}

/// Collects discrepancies and reports each as it is found.
struct Findings<'a> {
    /// The collection being verified, for the events.
    collection: &'a str,
    /// Where each discrepancy is reported as soon as it is found.
    sink: &'a mut dyn Sink,
    /// Everything found so far, in order.
    discrepancies: Vec<Discrepancy>,
}

impl<'a> Findings<'a> {
    /// Records a discrepancy and emits it.
    fn push(&mut self, discrepancy: Discrepancy) {
        self.sink.emit(Event::DiscrepancyFound {
            collection: self.collection.to_owned(),
            discrepancy: discrepancy.clone(),
        });
        self.discrepancies.push(discrepancy);
    }

    /// Records a check that couldn't be carried out.
    fn check_failed(&mut self, check: String, error: &Error) {
        self.push(Discrepancy::CheckFailed { check, reason: error.chain_summary() });
    }
}

/// Compares a collection against its target. Never writes.
pub fn verify(store: &dyn Store, target: &CollectionTarget, sink: &mut dyn Sink) -> VerificationReport {
    let collection = target.name.as_str();
    let mut findings = Findings { collection, sink, discrepancies: Vec::new() };
    let mut indexes_present = Vec::new();
    let mut pending = Vec::new();
    let mut final_index_count = 0;
    let mut final_document_count = 0;

    let collection_exists = match store.collection_exists(collection) {
        Ok(exists) => exists,
        Err(error) => {
            findings.check_failed(String::from("collection existence"), &error);
            false
        }
    };

    if collection_exists {
        match store.list_indexes(collection) {
            Ok(existing) => {
                final_index_count = existing.len();

                for spec in &target.indexes {
                    match existing.iter().find(|index| index.name == spec.name) {
                        Some(index) if index.satisfies(spec) => {
                            indexes_present.push(spec.name.clone());
                        }
                        Some(index) => findings.push(Discrepancy::IndexMismatch {
                            name: spec.name.clone(),
                            declared: spec.to_string(),
                            actual: index.to_string(),
                        }),
                        None => findings.push(Discrepancy::IndexMissing { name: spec.name.clone() }),
                    }
                }
            }
            Err(error) => findings.check_failed(format!("indexes of {}", collection), &error),
        }

        for default in &target.field_defaults {
            let selector = FieldSelector::for_default(default);

            match store.count(collection, Some(&selector)) {
                Ok(count) => {
                    pending.push(PendingField { field: default.field.clone(), count });

                    if count > 0 {
                        findings.push(Discrepancy::FieldNeedsBackfill {
                            field: default.field.clone(),
                            count,
                            expected: default.expected,
                        });
                    }
                }
                Err(error) => findings.check_failed(format!("field {}", default.field), &error),
            }
        }

        match store.count(collection, None) {
            Ok(count) => final_document_count = count,
            Err(error) => findings.check_failed(format!("document count of {}", collection), &error),
        }
    } else if findings.discrepancies.is_empty() {
        findings.push(Discrepancy::CollectionMissing);
    }

    let discrepancies = findings.discrepancies;
    let verdict = if discrepancies.is_empty() {
        Verdict::Pass
    } else {
        Verdict::ReportedDiscrepancy
    };

    findings.sink.emit(Event::Verified { collection: collection.to_owned(), verdict });

    VerificationReport {
        collection_exists,
        indexes_present,
        pending,
        final_index_count,
        final_document_count,
        discrepancies,
        verdict,
    }
}
