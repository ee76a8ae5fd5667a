//! Applying a declared index set, one index at a time.

use crate::{
    store::{ Store, ExistingIndex },
    target::IndexSpec,
    event::{ Event, Sink },
    error::{ Error, ErrorKind, ErrorExt },
};

/// A declared index that could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    /// The declared index name.
    pub name: String,
    /// Structured kind of the underlying error.
    pub kind: ErrorKind,
    /// The error chain, rendered.
    pub reason: String,
}

/// The three outcome buckets, each in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Indexes created by this run (or, in a dry run, that would be).
    pub created: Vec<String>,
    /// Indexes already present with the declared name and key pattern.
    pub skipped_existing: Vec<String>,
    /// Indexes that could not be created.
    pub failed: Vec<IndexFailure>,
}

impl IndexReport {
    /// Total number of declarations processed.
    pub fn len(&self) -> usize {
        self.created.len() + self.skipped_existing.len() + self.failed.len()
    }

    /// Whether no declaration was processed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a failure and reports it.
    fn fail(&mut self, collection: &str, spec: &IndexSpec, error: &Error, sink: &mut dyn Sink) {
        let reason = error.chain_summary();

        sink.emit(Event::IndexFailed {
            collection: collection.to_owned(),
            index: spec.name.clone(),
            reason: reason.clone(),
        });

        self.failed.push(IndexFailure { name: spec.name.clone(), kind: error.kind(), reason });
    }
}

/// Ensures that every declared index is present on a collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexApplier {
    /// Only diff declared against existing indexes.
    pub dry_run: bool,
}

impl IndexApplier {
    /// Processes every declaration in order and never stops early: a failed
    /// index is recorded, then the next one is attempted.
    ///
    /// An existing index with the declared name is skipped if its key
    /// pattern matches and is a failure otherwise; it is never dropped or
    /// rebuilt.
    pub fn apply(
        &self,
        store: &dyn Store,
        collection: &str,
        indexes: &[IndexSpec],
        sink: &mut dyn Sink,
    ) -> IndexReport {
        let mut report = IndexReport::default();

        let existing = match store.list_indexes(collection) {
            Ok(existing) => existing,
            Err(error) => {
                let error = Error::with_cause(format!("can't list indexes of {}", collection), error);
                for spec in indexes {
                    report.fail(collection, spec, &error, sink);
                }
                return report;
            }
        };

        for spec in indexes {
            self.apply_one(store, collection, spec, &existing, &mut report, sink);
        }

        report
    }

    /// Classifies one declaration into its bucket.
    fn apply_one(
        &self,
        store: &dyn Store,
        collection: &str,
        spec: &IndexSpec,
        existing: &[ExistingIndex],
        report: &mut IndexReport,
        sink: &mut dyn Sink,
    ) {
        if let Some(index) = existing.iter().find(|index| index.name == spec.name) {
            if index.satisfies(spec) {
                report.skipped_existing.push(spec.name.clone());
                sink.emit(Event::IndexSkipped {
                    collection: collection.to_owned(),
                    index: spec.name.clone(),
                });
            } else {
                let error = Error::new(
                    ErrorKind::IndexConflict,
                    format!("declared as {} but exists as {}", spec, index)
                );
                report.fail(collection, spec, &error, sink);
            }
            return;
        }

        if !self.dry_run {
            match store.create_index(collection, spec) {
                Ok(()) => {}
                Err(ref error) if error.is(ErrorKind::IndexExists) => {
                    report.skipped_existing.push(spec.name.clone());
                    sink.emit(Event::IndexSkipped {
                        collection: collection.to_owned(),
                        index: spec.name.clone(),
                    });
                    return;
                }
                Err(error) => {
                    report.fail(collection, spec, &error, sink);
                    return;
                }
            }
        }

        report.created.push(spec.name.clone());
        sink.emit(Event::IndexCreated {
            collection: collection.to_owned(),
            index: spec.to_string(),
            dry_run: self.dry_run,
        });
    }
}
