//! One invocation of the schema evolution procedure.
//!
//! For each target collection the runner walks
//! `Start → Bootstrapped → Indexed → Backfilled → Verified`, filling in a
//! `RunRecord` as it goes. Index and backfill failures are recorded and the
//! run carries on to verification; a failed bootstrap halts the run, and
//! every collection after it.

use std::fmt;
use uuid::Uuid;
use chrono::{ DateTime, Utc };
use crate::{
    store::Store,
    target::CollectionTarget,
    bootstrap::{ Bootstrapper, BootstrapStrategy, BootstrapOutcome },
    index::{ IndexApplier, IndexReport },
    backfill::{ BackfillSweep, BackfillReport },
    verify::{ self, Verdict, VerificationReport },
    event::{ Event, Sink },
    ledger,
    error::ResultExt,
};

/// The last stage a run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Nothing has been done yet.
    Start,
    /// The collection exists.
    Bootstrapped,
    /// Every declared index has been attempted.
    Indexed,
    /// Every field default has been swept.
    Backfilled,
    /// The post-state has been re-derived.
    Verified,
}

/// Process exit status of an invocation. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitStatus {
    /// Every collection passed verification.
    Pass = 0,
    /// At least one discrepancy was reported.
    Discrepancy = 1,
    /// The run was halted.
    Fatal = 2,
}

impl ExitStatus {
    /// The numeric process exit code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// The most severe status of a set of runs; `Pass` for none.
    pub fn of_all(records: &[RunRecord]) -> Self {
        records
            .iter()
            .map(RunRecord::exit_status)
            .max()
            .unwrap_or(ExitStatus::Pass)
    }
}

/// Options shared by every run of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report the plan without mutating anything.
    pub dry_run: bool,
    /// How missing collections are created.
    pub bootstrap: BootstrapStrategy,
    /// Append each run record to the ledger collection.
    pub ledger: bool,
}

/// The headline observations of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Whether the collection existed before bootstrap.
    pub collection_existed: Option<bool>,
    /// Indexes newly created (or that would be, in a dry run).
    pub indexes_created: usize,
    /// Declared indexes found already present.
    pub indexes_skipped_existing: usize,
    /// Declared indexes that couldn't be created.
    pub indexes_failed: usize,
    /// Documents selected by the backfill passes.
    pub documents_matched: usize,
    /// Documents the backfill actually rewrote.
    pub documents_modified: usize,
    /// All indexes on the collection after the run.
    pub final_index_count: Option<usize>,
    /// All documents in the collection after the run.
    pub final_document_count: Option<usize>,
}

/// What one run observed and did to one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// The target database.
    pub database_name: String,
    /// The target collection.
    pub collection_name: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// The last stage reached.
    pub stage: Stage,
    /// Bootstrap observation; `None` if bootstrap failed.
    pub bootstrap: Option<BootstrapOutcome>,
    /// Index applier buckets.
    pub indexes: IndexReport,
    /// Backfill sweep counts.
    pub backfill: BackfillReport,
    /// Verification report; `None` if the run was halted.
    pub verification: Option<VerificationReport>,
    /// Why the run was halted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached its last stage.
    pub finished_at: Option<DateTime<Utc>>,
    /// The counts above, at the top level of the serialized record.
    /// Refreshed when the run finishes.
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RunRecord {
    /// A fresh record in the `Start` stage.
    pub fn new(database_name: &str, collection_name: &str, dry_run: bool) -> Self {
        RunRecord {
            run_id: Uuid::new_v4(),
            database_name: database_name.to_owned(),
            collection_name: collection_name.to_owned(),
            dry_run,
            stage: Stage::Start,
            bootstrap: None,
            indexes: IndexReport::default(),
            backfill: BackfillReport::default(),
            verification: None,
            fatal: None,
            started_at: Utc::now(),
            finished_at: None,
            summary: RunSummary::default(),
        }
    }

    /// Stamps the completion time and refreshes `summary`.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.summary = self.summarize();
    }

    /// The headline counts, derived from the stage reports.
    pub fn summarize(&self) -> RunSummary {
        RunSummary {
            collection_existed: self.collection_existed(),
            indexes_created: self.indexes_created(),
            indexes_skipped_existing: self.indexes_skipped_existing(),
            indexes_failed: self.indexes_failed(),
            documents_matched: self.documents_matched(),
            documents_modified: self.documents_modified(),
            final_index_count: self.final_index_count(),
            final_document_count: self.final_document_count(),
        }
    }

    /// Whether the collection existed before bootstrap.
    pub fn collection_existed(&self) -> Option<bool> {
        self.bootstrap.map(|b| b.existed)
    }

    /// Number of indexes created (or, in a dry run, to be created).
    pub fn indexes_created(&self) -> usize {
        self.indexes.created.len()
    }

    /// Number of indexes that were already present.
    pub fn indexes_skipped_existing(&self) -> usize {
        self.indexes.skipped_existing.len()
    }

    /// Number of indexes that could not be created.
    pub fn indexes_failed(&self) -> usize {
        self.indexes.failed.len()
    }

    /// Documents matched by the backfill, over all fields and passes.
    pub fn documents_matched(&self) -> usize {
        self.backfill.matched()
    }

    /// Documents rewritten by the backfill, over all fields and passes.
    pub fn documents_modified(&self) -> usize {
        self.backfill.modified()
    }

    /// Indexes on the collection after the run.
    pub fn final_index_count(&self) -> Option<usize> {
        self.verification.as_ref().map(|v| v.final_index_count)
    }

    /// Documents in the collection after the run.
    pub fn final_document_count(&self) -> Option<usize> {
        self.verification.as_ref().map(|v| v.final_document_count)
    }

    /// The verification verdict, if the run got that far.
    pub fn verdict(&self) -> Option<Verdict> {
        self.verification.as_ref().map(|v| v.verdict)
    }

    /// The exit status this run alone calls for.
    pub fn exit_status(&self) -> ExitStatus {
        match (self.fatal.as_ref(), self.verdict()) {
            (Some(_), _) | (None, None) => ExitStatus::Fatal,
            (None, Some(Verdict::Pass)) => ExitStatus::Pass,
            (None, Some(Verdict::ReportedDiscrepancy)) => ExitStatus::Discrepancy,
        }
    }
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "run {} on {}.{}{}", self.run_id, self.database_name, self.collection_name, mode)?;

        match self.bootstrap {
            Some(BootstrapOutcome { existed, method: Some(method) }) => {
                writeln!(f, "  collection existed: {} (then {})", existed, method)?
            }
            Some(BootstrapOutcome { existed, method: None }) => {
                writeln!(f, "  collection existed: {}", existed)?
            }
            None => {}
        }

        if let Some(ref fatal) = self.fatal {
            return writeln!(f, "  halted at {:?}: {}", self.stage, fatal);
        }

        writeln!(f, "  indexes: {} created, {} skipped (existing), {} failed",
                 self.indexes_created(), self.indexes_skipped_existing(), self.indexes_failed())?;

        for failure in &self.indexes.failed {
            writeln!(f, "    {}: {}", failure.name, failure.reason)?;
        }

        for field in &self.backfill.fields {
            write!(f, "  backfill {}:", field.field)?;
            for pass in &field.passes {
                match pass.error {
                    Some(ref error) => write!(f, " {} failed ({});", pass.pass, error)?,
                    None => write!(f, " {} matched {}, modified {};", pass.pass, pass.matched, pass.modified)?,
                }
            }
            writeln!(f)?;
        }

        if let Some(ref verification) = self.verification {
            writeln!(f, "  final: {} indexes, {} documents",
                     verification.final_index_count, verification.final_document_count)?;

            for discrepancy in &verification.discrepancies {
                writeln!(f, "    {}", discrepancy)?;
            }

            writeln!(f, "  verdict: {}", verification.verdict)?;
        }

        Ok(())
    }
}

/// Runs the four stages against one database.
#[derive(Clone, Copy)]
pub struct Runner<'a> {
    /// The database handle.
    store: &'a dyn Store,
    /// Name of the database, for the record.
    database_name: &'a str,
    /// Invocation-wide options.
    options: RunOptions,
}

impl<'a> fmt::Debug for Runner<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Runner")
            .field("database_name", &self.database_name)
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Runner<'a> {
    /// A runner with default options: mutating, automatic bootstrap, no ledger.
    pub fn new(store: &'a dyn Store, database_name: &'a str) -> Self {
        Runner { store, database_name, options: RunOptions::default() }
    }

    /// Replaces the options.
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Brings one collection to its target state and verifies it.
    pub fn run(&self, target: &CollectionTarget, sink: &mut dyn Sink) -> RunRecord {
        let collection = target.name.as_str();
        let dry_run = self.options.dry_run;
        let mut record = RunRecord::new(self.database_name, collection, dry_run);

        let bootstrapper = Bootstrapper { strategy: self.options.bootstrap, dry_run };
        let bootstrap = target
            .validate()
            .chain(|| format!("invalid target for {}", collection))
            .and_then(|()| bootstrapper.ensure(self.store, collection, sink));

        match bootstrap {
            Ok(outcome) => {
                record.bootstrap = Some(outcome);
                record.stage = Stage::Bootstrapped;
            }
            Err(error) => {
                let reason = error.chain_summary();
                sink.emit(Event::RunAborted { collection: collection.to_owned(), reason: reason.clone() });
                record.fatal = Some(reason);
                record.finish();
                return record;
            }
        }

        record.indexes = IndexApplier { dry_run }.apply(self.store, collection, &target.indexes, sink);
        record.stage = Stage::Indexed;

        record.backfill = BackfillSweep { dry_run }.sweep(self.store, collection, &target.field_defaults, sink);
        record.stage = Stage::Backfilled;

        record.verification = Some(verify::verify(self.store, target, sink));
        record.stage = Stage::Verified;
        record.finish();

        if self.options.ledger && !dry_run {
            match ledger::append(self.store, &record) {
                Ok(()) => sink.emit(Event::RunRecorded {
                    collection: collection.to_owned(),
                    run_id: record.run_id.to_string(),
                }),
                Err(error) => sink.emit(Event::LedgerFailed {
                    collection: collection.to_owned(),
                    reason: error.chain_summary(),
                }),
            }
        }

        record
    }

    /// Runs every target in order. A halted run halts the invocation: the
    /// targets after it are not attempted.
    pub fn run_all(&self, targets: &[CollectionTarget], sink: &mut dyn Sink) -> Vec<RunRecord> {
        let mut records = Vec::with_capacity(targets.len());

        for target in targets {
            let record = self.run(target, sink);
            let halted = record.fatal.is_some();
            records.push(record);

            if halted {
                break;
            }
        }

        records
    }
}
