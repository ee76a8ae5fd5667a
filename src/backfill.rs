//! Rewriting documents whose field is missing, null, or ill-typed.

use std::fmt;
use crate::{
    store::{ Store, UpdateManyResult },
    selector::FieldSelector,
    target::FieldDefault,
    event::{ Event, Sink },
    error::Result,
};

/// One of the two corrective queries run for every field default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillPass {
    /// The field is absent or `null`.
    MissingOrNull,
    /// The field is present with a value of an unexpected type.
    WrongType,
}

impl BackfillPass {
    /// Both passes, in the order they are run.
    pub const ALL: [BackfillPass; 2] = [BackfillPass::MissingOrNull, BackfillPass::WrongType];

    /// The predicate of this pass for the given default.
    pub fn selector(self, default: &FieldDefault) -> FieldSelector {
        match self {
            BackfillPass::MissingOrNull => FieldSelector::missing_or_null(default.field.as_str()),
            BackfillPass::WrongType => FieldSelector::wrong_type(default.field.as_str(), default.expected),
        }
    }
}

impl fmt::Display for BackfillPass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            BackfillPass::MissingOrNull => "missing-or-null pass",
            BackfillPass::WrongType => "wrong-type pass",
        })
    }
}

/// Counts reported by one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    /// Which pass.
    pub pass: BackfillPass,
    /// Documents matched by the predicate.
    pub matched: usize,
    /// Documents actually rewritten. Always 0 in a dry run.
    pub modified: usize,
    /// The error chain, if the pass failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassOutcome {
    /// Whether the counts diverged. Only a concurrent writer can cause this.
    pub fn is_partial(&self) -> bool {
        self.error.is_none() && self.modified < self.matched
    }
}

/// Both passes over one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBackfill {
    /// The field name.
    pub field: String,
    /// One outcome per pass, in pass order.
    pub passes: Vec<PassOutcome>,
}

impl FieldBackfill {
    /// Documents matched by either pass.
    pub fn matched(&self) -> usize {
        self.passes.iter().map(|p| p.matched).sum()
    }

    /// Documents rewritten by either pass.
    pub fn modified(&self) -> usize {
        self.passes.iter().map(|p| p.modified).sum()
    }

    /// The outcome of a specific pass.
    pub fn pass(&self, pass: BackfillPass) -> Option<&PassOutcome> {
        self.passes.iter().find(|p| p.pass == pass)
    }
}

/// Every field of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Per-field outcomes, in declaration order.
    pub fields: Vec<FieldBackfill>,
}

impl BackfillReport {
    /// Documents matched across all fields and passes.
    pub fn matched(&self) -> usize {
        self.fields.iter().map(FieldBackfill::matched).sum()
    }

    /// Documents rewritten across all fields and passes.
    pub fn modified(&self) -> usize {
        self.fields.iter().map(FieldBackfill::modified).sum()
    }

    /// Number of passes that failed outright.
    pub fn failures(&self) -> usize {
        self.fields
            .iter()
            .flat_map(|f| &f.passes)
            .filter(|p| p.error.is_some())
            .count()
    }
}

/// Brings every document in line with the declared field defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillSweep {
    /// Only count what the passes would match.
    pub dry_run: bool,
}

impl BackfillSweep {
    /// Runs both passes for every default. A failed pass is recorded and
    /// the sweep continues with the next one.
    pub fn sweep(
        &self,
        store: &dyn Store,
        collection: &str,
        defaults: &[FieldDefault],
        sink: &mut dyn Sink,
    ) -> BackfillReport {
        BackfillReport {
            fields: defaults
                .iter()
                .map(|default| self.sweep_field(store, collection, default, sink))
                .collect(),
        }
    }

    /// Runs both passes for one default.
    pub fn sweep_field(
        &self,
        store: &dyn Store,
        collection: &str,
        default: &FieldDefault,
        sink: &mut dyn Sink,
    ) -> FieldBackfill {
        let passes = BackfillPass::ALL
            .iter()
            .map(|&pass| self.run_pass(store, collection, default, pass, sink))
            .collect();

        FieldBackfill { field: default.field.clone(), passes }
    }

    /// Runs one pass and reports it.
    fn run_pass(
        &self,
        store: &dyn Store,
        collection: &str,
        default: &FieldDefault,
        pass: BackfillPass,
        sink: &mut dyn Sink,
    ) -> PassOutcome {
        let selector = pass.selector(default);

        let result: Result<UpdateManyResult> = if self.dry_run {
            store.count(collection, Some(&selector)).map(|num_matched| {
                UpdateManyResult { num_matched, num_modified: 0 }
            })
        } else {
            store.update_many(collection, &selector, &default.default)
        };

        match result {
            Ok(UpdateManyResult { num_matched: matched, num_modified: modified }) => {
                sink.emit(Event::BackfillApplied {
                    collection: collection.to_owned(),
                    field: default.field.clone(),
                    pass,
                    matched,
                    modified,
                    dry_run: self.dry_run,
                });

                let outcome = PassOutcome { pass, matched, modified, error: None };

                if !self.dry_run && outcome.is_partial() {
                    sink.emit(Event::BackfillPartial {
                        collection: collection.to_owned(),
                        field: default.field.clone(),
                        pass,
                        matched,
                        modified,
                    });
                }

                outcome
            }
            Err(error) => {
                let reason = error.chain_summary();

                sink.emit(Event::BackfillFailed {
                    collection: collection.to_owned(),
                    field: default.field.clone(),
                    pass,
                    reason: reason.clone(),
                });

                PassOutcome { pass, matched: 0, modified: 0, error: Some(reason) }
            }
        }
    }
}
