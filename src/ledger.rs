//! An append-only record of completed runs.
//!
//! The ledger is informational. No stage consults it: every run re-checks
//! the actual state of the database from scratch.

use bson::{ Bson, UtcDateTime };
use crate::{
    store::Store,
    runner::RunRecord,
    verify::Verdict,
    bsn::{ serialize_document, deserialize_document },
    error::{ Result, ResultExt },
};

/// The collection run records are appended to.
pub const LEDGER_COLLECTION: &str = "_migration_runs";

/// The parts of a stored run record that `history` reads back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique identifier of the run.
    pub run_id: String,
    /// The target database.
    pub database_name: String,
    /// The target collection.
    pub collection_name: String,
    /// When the run finished.
    #[serde(default)]
    pub finished_at: Option<UtcDateTime>,
    /// Number of indexes created.
    #[serde(default)]
    pub indexes_created: i64,
    /// Documents rewritten by the backfill.
    #[serde(default)]
    pub documents_modified: i64,
    /// The verification verdict.
    #[serde(default)]
    pub verdict: Option<Verdict>,
}

/// Appends a run record, keyed by its run id. The completion time is stored
/// as a native date and the verdict is lifted to the top level.
pub fn append(store: &dyn Store, record: &RunRecord) -> Result<()> {
    let mut document = serialize_document(record)?;

    document.insert("_id", record.run_id.to_string());

    match record.finished_at {
        Some(finished_at) => document.insert("finishedAt", Bson::UtcDatetime(finished_at)),
        None => document.insert("finishedAt", Bson::Null),
    };

    match record.verdict() {
        Some(verdict) => document.insert("verdict", verdict.to_string()),
        None => document.insert("verdict", Bson::Null),
    };

    store
        .insert_one(LEDGER_COLLECTION, document)
        .chain(|| format!("can't append run {} to {}", record.run_id, LEDGER_COLLECTION))
}

/// Every recorded run, oldest first.
pub fn history(store: &dyn Store) -> Result<Vec<LedgerEntry>> {
    let mut entries = store
        .find_all(LEDGER_COLLECTION)
        .chain("can't read the run ledger")?
        .into_iter()
        .map(deserialize_document)
        .collect::<Result<Vec<LedgerEntry>>>()?;

    entries.sort_by_key(|entry| entry.finished_at.as_ref().map(|t| t.0));

    Ok(entries)
}
