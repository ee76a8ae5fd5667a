//! Progress events and the sink they are written to.
//!
//! Stages never print. They report what they did as `Event`s to a `Sink`
//! handed to them by the caller; the binary installs a `TracingSink`, the
//! tests collect events into a `Vec`.

use std::fmt;
use crate::{
    bootstrap::BootstrapMethod,
    backfill::BackfillPass,
    verify::{ Discrepancy, Verdict },
};

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The bootstrapper looked the collection up.
    CollectionChecked {
        /// The target collection.
        collection: String,
        /// Whether it was already there.
        existed: bool,
    },
    /// The bootstrapper brought the collection into existence.
    CollectionCreated {
        /// The target collection.
        collection: String,
        /// How it was created.
        method: BootstrapMethod,
    },
    /// Dry run: the collection is absent and would be created.
    CollectionWouldBeCreated {
        /// The target collection.
        collection: String,
    },
    /// A declared index was created (or, in a dry run, would be).
    IndexCreated {
        /// The target collection.
        collection: String,
        /// The declared index, rendered with its key pattern.
        index: String,
        /// Whether this is only a plan.
        dry_run: bool,
    },
    /// A declared index was already present under its name.
    IndexSkipped {
        /// The target collection.
        collection: String,
        /// The declared index name.
        index: String,
    },
    /// Creating a declared index failed; the applier moved on.
    IndexFailed {
        /// The target collection.
        collection: String,
        /// The declared index name.
        index: String,
        /// The error chain.
        reason: String,
    },
    /// One backfill pass finished.
    BackfillApplied {
        /// The target collection.
        collection: String,
        /// The backfilled field.
        field: String,
        /// Which of the two passes.
        pass: BackfillPass,
        /// Documents matched by the pass predicate.
        matched: usize,
        /// Documents rewritten.
        modified: usize,
        /// Whether this is only a count.
        dry_run: bool,
    },
    /// Matched and modified counts of a pass diverged.
    BackfillPartial {
        /// The target collection.
        collection: String,
        /// The backfilled field.
        field: String,
        /// Which of the two passes.
        pass: BackfillPass,
        /// Documents matched by the pass predicate.
        matched: usize,
        /// Documents rewritten.
        modified: usize,
    },
    /// A backfill pass failed; the sweep moved on.
    BackfillFailed {
        /// The target collection.
        collection: String,
        /// The backfilled field.
        field: String,
        /// Which of the two passes.
        pass: BackfillPass,
        /// The error chain.
        reason: String,
    },
    /// Verification found a deviation from the target state.
    DiscrepancyFound {
        /// The target collection.
        collection: String,
        /// What is wrong.
        discrepancy: Discrepancy,
    },
    /// Verification finished.
    Verified {
        /// The target collection.
        collection: String,
        /// The verdict.
        verdict: Verdict,
    },
    /// The run was halted before indexing.
    RunAborted {
        /// The target collection.
        collection: String,
        /// The error chain.
        reason: String,
    },
    /// The run record was appended to the ledger.
    RunRecorded {
        /// The target collection.
        collection: String,
        /// The identifier of the run.
        run_id: String,
    },
    /// The run record could not be appended to the ledger.
    LedgerFailed {
        /// The target collection.
        collection: String,
        /// The error chain.
        reason: String,
    },
}

impl Event {
    /// The collection the event is about.
    pub fn collection(&self) -> &str {
        use self::Event::*;

        match *self {
            CollectionChecked { ref collection, .. }
            | CollectionCreated { ref collection, .. }
            | CollectionWouldBeCreated { ref collection }
            | IndexCreated { ref collection, .. }
            | IndexSkipped { ref collection, .. }
            | IndexFailed { ref collection, .. }
            | BackfillApplied { ref collection, .. }
            | BackfillPartial { ref collection, .. }
            | BackfillFailed { ref collection, .. }
            | DiscrepancyFound { ref collection, .. }
            | Verified { ref collection, .. }
            | RunAborted { ref collection, .. }
            | RunRecorded { ref collection, .. }
            | LedgerFailed { ref collection, .. } => collection,
        }
    }

    /// Whether the event reports something an operator has to look at.
    pub fn is_failure(&self) -> bool {
        match *self {
            Event::IndexFailed { .. }
            | Event::BackfillFailed { .. }
            | Event::DiscrepancyFound { .. }
            | Event::RunAborted { .. }
            | Event::LedgerFailed { .. } => true,
            Event::Verified { verdict, .. } => verdict != Verdict::Pass,
            _ => false,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Event::*;

        match *self {
            CollectionChecked { ref collection, existed } => {
                let state = if existed { "exists" } else { "does not exist" };
                write!(f, "[{}] collection {}", collection, state)
            }
            CollectionCreated { ref collection, method } => {
                write!(f, "[{}] collection created ({})", collection, method)
            }
            CollectionWouldBeCreated { ref collection } => {
                write!(f, "[{}] collection would be created", collection)
            }
            IndexCreated { ref collection, ref index, dry_run } => {
                let verb = if dry_run { "would create" } else { "created" };
                write!(f, "[{}] {} index {}", collection, verb, index)
            }
            IndexSkipped { ref collection, ref index } => {
                write!(f, "[{}] index {} already exists", collection, index)
            }
            IndexFailed { ref collection, ref index, ref reason } => {
                write!(f, "[{}] index {} failed: {}", collection, index, reason)
            }
            BackfillApplied { ref collection, ref field, pass, matched, modified, dry_run } => {
                let suffix = if dry_run { " (dry run)" } else { "" };
                write!(f, "[{}] backfill `{}` {}: matched {}, modified {}{}",
                       collection, field, pass, matched, modified, suffix)
            }
            BackfillPartial { ref collection, ref field, pass, matched, modified } => {
                write!(f, "[{}] backfill `{}` {}: modified {} of {} matched (concurrent writes?)",
                       collection, field, pass, modified, matched)
            }
            BackfillFailed { ref collection, ref field, pass, ref reason } => {
                write!(f, "[{}] backfill `{}` {} failed: {}", collection, field, pass, reason)
            }
            DiscrepancyFound { ref collection, ref discrepancy } => {
                write!(f, "[{}] discrepancy: {}", collection, discrepancy)
            }
            Verified { ref collection, verdict } => {
                write!(f, "[{}] verification: {}", collection, verdict)
            }
            RunAborted { ref collection, ref reason } => {
                write!(f, "[{}] run aborted: {}", collection, reason)
            }
            RunRecorded { ref collection, ref run_id } => {
                write!(f, "[{}] run {} recorded", collection, run_id)
            }
            LedgerFailed { ref collection, ref reason } => {
                write!(f, "[{}] can't record run: {}", collection, reason)
            }
        }
    }
}

/// Receives progress events.
pub trait Sink {
    /// Records one event.
    fn emit(&mut self, event: Event);
}

impl Sink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn emit(&mut self, event: Event) {
        (**self).emit(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn emit(&mut self, _: Event) {}
}

/// Forwards events to `tracing`, with the identifying parts as fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&mut self, event: Event) {
        use self::Event::*;

        match event {
            CollectionChecked { ref collection, existed } => {
                tracing::info!(collection = %collection, existed, "collection checked");
            }
            CollectionCreated { ref collection, method } => {
                tracing::info!(collection = %collection, method = %method, "collection created");
            }
            CollectionWouldBeCreated { ref collection } => {
                tracing::info!(collection = %collection, "collection would be created");
            }
            IndexCreated { ref collection, ref index, dry_run } => {
                tracing::info!(collection = %collection, index = %index, dry_run, "index created");
            }
            IndexSkipped { ref collection, ref index } => {
                tracing::warn!(collection = %collection, index = %index, "index already exists, skipped");
            }
            IndexFailed { ref collection, ref index, ref reason } => {
                tracing::error!(collection = %collection, index = %index, reason = %reason, "index creation failed");
            }
            BackfillApplied { ref collection, ref field, pass, matched, modified, dry_run } => {
                tracing::info!(
                    collection = %collection, field = %field, pass = %pass,
                    matched, modified, dry_run,
                    "backfill pass applied"
                );
            }
            BackfillPartial { ref collection, ref field, pass, matched, modified } => {
                tracing::warn!(
                    collection = %collection, field = %field, pass = %pass,
                    matched, modified,
                    "backfill modified fewer documents than it matched"
                );
            }
            BackfillFailed { ref collection, ref field, pass, ref reason } => {
                tracing::error!(
                    collection = %collection, field = %field, pass = %pass, reason = %reason,
                    "backfill pass failed"
                );
            }
            DiscrepancyFound { ref collection, ref discrepancy } => {
                tracing::error!(collection = %collection, "{}", discrepancy);
            }
            Verified { ref collection, verdict } => {
                if verdict == Verdict::Pass {
                    tracing::info!(collection = %collection, verdict = %verdict, "verification finished");
                } else {
                    tracing::error!(collection = %collection, verdict = %verdict, "verification finished");
                }
            }
            RunAborted { ref collection, ref reason } => {
                tracing::error!(collection = %collection, reason = %reason, "run aborted");
            }
            RunRecorded { ref collection, ref run_id } => {
                tracing::debug!(collection = %collection, run_id = %run_id, "run recorded in ledger");
            }
            LedgerFailed { ref collection, ref reason } => {
                tracing::warn!(collection = %collection, reason = %reason, "can't record run in ledger");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_as_progress_lines() {
        let events = vec![
            Event::IndexCreated {
                collection: String::from("feeds"),
                index: String::from("idx_feeds_user_id { userId: 1 }"),
                dry_run: true,
            },
            Event::BackfillPartial {
                collection: String::from("feeds"),
                field: String::from("likes"),
                pass: BackfillPass::MissingOrNull,
                matched: 3,
                modified: 2,
            },
        ];

        assert_eq!(events[0].to_string(), "[feeds] would create index idx_feeds_user_id { userId: 1 }");
        assert_eq!(
            events[1].to_string(),
            "[feeds] backfill `likes` missing-or-null pass: modified 2 of 3 matched (concurrent writes?)"
        );
        assert!(events.iter().all(|e| e.collection() == "feeds"));
        assert!(!events.iter().any(Event::is_failure));
    }

    #[test]
    fn borrowed_sinks_forward() {
        let mut events: Vec<Event> = Vec::new();
        {
            let sink: &mut dyn Sink = &mut events;
            sink.emit(Event::CollectionWouldBeCreated { collection: String::from("feeds") });
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].collection(), "feeds");
    }
}
