//! Integration tests for whole migration runs against the in-memory store.
//! Namely, these tests exercise the following properties:
//! * idempotence of a complete run
//! * safety of bootstrapping an existing collection
//! * correctness of the `likes` backfill
//! * completeness of the declared index set
//! * accuracy of the verification report
//! * tolerance of individual index and backfill failures

#[macro_use]
extern crate bson;
extern crate feedshape;

use std::cell::Cell;
use feedshape::prelude::*;
use feedshape::model::{ self, audit::audit_collection, seed::seed };
use feedshape::store::ExistingIndex;
use feedshape::backfill::BackfillPass;

/// Wraps a `MemoryStore`, failing or distorting selected operations.
#[derive(Debug, Default)]
struct FaultyStore {
    inner: MemoryStore,
    /// Refuse `create` as if not authorized.
    refuse_create_collection: bool,
    /// Refuse to create the index with this name.
    failing_index: Option<&'static str>,
    /// Under-report this many modifications per `update_many`, as a
    /// concurrent writer fixing documents first would cause.
    lost_updates: Cell<usize>,
}

impl Store for FaultyStore {
    fn collection_names(&self) -> Result<Vec<String>> {
        self.inner.collection_names()
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        if self.refuse_create_collection {
            Err(Error::new(ErrorKind::MongoDbError, format!("not authorized on bharathva to execute command {{ create: \"{}\" }}", name)))
        } else {
            self.inner.create_collection(name)
        }
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        if self.refuse_create_collection && !self.inner.collection_exists(collection)? {
            return Err(Error::new(ErrorKind::MongoDbError, "not authorized on bharathva to execute command { insert }"));
        }
        self.inner.insert_one(collection, document)
    }

    fn delete_by_id(&self, collection: &str, id: &Bson) -> Result<bool> {
        self.inner.delete_by_id(collection, id)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>> {
        self.inner.list_indexes(collection)
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        if self.failing_index == Some(spec.name.as_str()) {
            return Err(Error::new(ErrorKind::MongoDbError, "WiredTiger error: No space left on device"));
        }
        self.inner.create_index(collection, spec)
    }

    fn update_many(&self, collection: &str, selector: &FieldSelector, value: &Bson) -> Result<UpdateManyResult> {
        let mut result = self.inner.update_many(collection, selector, value)?;
        let lost = self.lost_updates.get().min(result.num_modified);
        result.num_modified -= lost;
        Ok(result)
    }

    fn count(&self, collection: &str, selector: Option<&FieldSelector>) -> Result<usize> {
        self.inner.count(collection, selector)
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.inner.find_all(collection)
    }
}

/// Two feeds without `likes`, one with `likes: null`, one already liked.
fn legacy_feeds(store: &dyn Store) -> Result<()> {
    store.insert_one("feeds", doc!{ "_id": "f1", "userId": "u1", "message": "one" })?;
    store.insert_one("feeds", doc!{ "_id": "f2", "userId": "u2", "message": "two" })?;
    store.insert_one("feeds", doc!{ "_id": "f3", "userId": "u1", "message": "three", "likes": Bson::Null })?;
    store.insert_one("feeds", doc!{ "_id": "f4", "userId": "u3", "message": "four", "likes": ["u1"] })?;
    Ok(())
}

fn find(store: &dyn Store, collection: &str, id: &str) -> Result<Option<Document>> {
    let id = Bson::from(id);
    Ok(store.find_all(collection)?.into_iter().find(|doc| doc.get("_id") == Some(&id)))
}

#[test]
fn end_to_end_feeds_scenario() -> Result<()> {
    let store = MemoryStore::new();
    legacy_feeds(&store)?;
    let untouched = find(&store, "feeds", "f4")?;

    let mut events: Vec<Event> = Vec::new();
    let record = Runner::new(&store, "bharathva").run(&model::feeds(), &mut events);

    assert_eq!(record.collection_existed(), Some(true));
    assert_eq!(record.indexes_created(), 3);
    assert_eq!(record.indexes_failed(), 0);
    assert_eq!(record.documents_modified(), 3);
    assert_eq!(record.final_document_count(), Some(4));
    assert_eq!(record.final_index_count(), Some(4));
    assert_eq!(record.verdict(), Some(Verdict::Pass));
    assert_eq!(record.exit_status(), ExitStatus::Pass);

    let likes = FieldSelector::needs_backfill("likes", BsonType::ARRAY);
    assert_eq!(store.count("feeds", Some(&likes))?, 0);

    for id in &["f1", "f2", "f3"] {
        let document = find(&store, "feeds", id)?.unwrap();
        assert_eq!(document.get("likes"), Some(&Bson::Array(Vec::new())));
    }
    assert_eq!(find(&store, "feeds", "f4")?, untouched);

    assert!(!events.iter().any(Event::is_failure));
    assert_eq!(events.last(), Some(&Event::Verified {
        collection: String::from("feeds"),
        verdict: Verdict::Pass,
    }));

    Ok(())
}

#[test]
fn second_run_changes_nothing() -> Result<()> {
    let store = MemoryStore::new();
    legacy_feeds(&store)?;
    let runner = Runner::new(&store, "bharathva");

    let first = runner.run(&model::feeds(), &mut NullSink);
    let documents = store.find_all("feeds")?;
    let indexes = store.list_indexes("feeds")?;

    let second = runner.run(&model::feeds(), &mut NullSink);

    assert_eq!(first.documents_modified(), 3);
    assert_eq!(second.indexes_created(), 0);
    assert_eq!(second.indexes_skipped_existing(), 3);
    assert_eq!(second.documents_matched(), 0);
    assert_eq!(second.documents_modified(), 0);
    assert_eq!(second.verdict(), Some(Verdict::Pass));
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(store.find_all("feeds")?, documents);
    assert_eq!(store.list_indexes("feeds")?, indexes);

    Ok(())
}

#[test]
fn verification_counts_exactly_the_reverted_document() -> Result<()> {
    let store = MemoryStore::new();
    legacy_feeds(&store)?;
    Runner::new(&store, "bharathva").run(&model::feeds(), &mut NullSink);

    assert!(store.set_field("feeds", &Bson::from("f2"), "likes", Some(Bson::Null)));

    let report = verify(&store, &model::feeds(), &mut NullSink);

    assert_eq!(report.pending_documents(), 1);
    assert_eq!(report.verdict, Verdict::ReportedDiscrepancy);
    assert_eq!(
        report.discrepancies,
        [Discrepancy::FieldNeedsBackfill {
            field: String::from("likes"),
            count: 1,
            expected: BsonType::ARRAY,
        }]
    );
    assert_eq!(
        report.discrepancies[0].to_string(),
        "1 document still missing field likes (absent, null, or not array)"
    );
    assert_eq!(find(&store, "feeds", "f2")?.and_then(|d| d.get("likes").cloned()), Some(Bson::Null));

    Ok(())
}

#[test]
fn existing_collection_is_never_emptied() -> Result<()> {
    let store = MemoryStore::new();
    legacy_feeds(&store)?;

    for strategy in &[BootstrapStrategy::Auto, BootstrapStrategy::Sentinel] {
        let options = RunOptions { bootstrap: *strategy, ..RunOptions::default() };
        let record = Runner::new(&store, "bharathva").options(options).run(&model::feeds(), &mut NullSink);

        assert_eq!(record.collection_existed(), Some(true));
        assert_eq!(store.count("feeds", None)?, 4);
    }

    Ok(())
}

#[test]
fn missing_collection_gets_every_declared_index() -> Result<()> {
    let store = MemoryStore::new();
    let target = model::notifications();

    let record = Runner::new(&store, "bharathva").run(&target, &mut NullSink);
    let verification = record.verification.as_ref().unwrap();

    assert_eq!(record.collection_existed(), Some(false));
    assert_eq!(record.indexes_created(), 10);
    assert_eq!(verification.indexes_present, target.index_names().collect::<Vec<_>>());
    assert_eq!(verification.final_index_count, 11);
    assert_eq!(verification.final_document_count, 0);
    assert!(record.to_string().contains("indexes: 10 created, 0 skipped (existing), 0 failed"));

    Ok(())
}

#[test]
fn failed_index_does_not_stop_the_run() -> Result<()> {
    let store = FaultyStore { failing_index: Some("idx_type"), ..FaultyStore::default() };
    store.insert_one("notifications", doc!{ "_id": "n1", "senderId": "u2", "type": "LIKE" })?;

    let mut events: Vec<Event> = Vec::new();
    let record = Runner::new(&store, "bharathva").run(&model::notifications(), &mut events);

    assert_eq!(record.indexes_created(), 9);
    assert_eq!(record.indexes_failed(), 1);
    assert_eq!(record.indexes.failed[0].name, "idx_type");
    assert!(record.indexes.failed[0].reason.contains("No space left on device"));

    assert_eq!(record.documents_modified(), 1);
    assert_eq!(record.exit_status(), ExitStatus::Discrepancy);
    assert_eq!(
        record.verification.as_ref().map(|v| v.discrepancies.clone()),
        Some(vec![Discrepancy::IndexMissing { name: String::from("idx_type") }])
    );

    let failed_index_events = events
        .iter()
        .filter(|e| match **e { Event::IndexFailed { .. } => true, _ => false })
        .count();
    assert_eq!(failed_index_events, 1);

    Ok(())
}

#[test]
fn bootstrap_failure_halts_the_invocation() -> Result<()> {
    let store = FaultyStore { refuse_create_collection: true, ..FaultyStore::default() };
    let targets = model::builtin_targets();

    let records = Runner::new(&store, "bharathva").run_all(&targets, &mut NullSink);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].collection_name, "feeds");
    assert!(records[0].fatal.as_ref().unwrap().contains("not authorized"));
    assert!(records[0].verification.is_none());
    assert_eq!(ExitStatus::of_all(&records), ExitStatus::Fatal);
    assert!(store.list_indexes("feeds")?.is_empty());

    Ok(())
}

#[test]
fn diverging_counts_are_reported_but_not_failures() -> Result<()> {
    let store = FaultyStore { lost_updates: Cell::new(1), ..FaultyStore::default() };
    legacy_feeds(&store)?;

    let mut events: Vec<Event> = Vec::new();
    let record = Runner::new(&store, "bharathva").run(&model::feeds(), &mut events);

    let pass = record.backfill.fields[0].pass(BackfillPass::MissingOrNull).unwrap();
    assert_eq!((pass.matched, pass.modified), (3, 2));
    assert!(pass.is_partial());
    assert_eq!(record.verdict(), Some(Verdict::Pass));

    assert!(events.iter().any(|e| match *e {
        Event::BackfillPartial { matched: 3, modified: 2, .. } => true,
        _ => false,
    }));
    assert!(!events.iter().any(Event::is_failure));

    Ok(())
}

#[test]
fn dry_run_leaves_the_database_untouched() -> Result<()> {
    let store = MemoryStore::new();
    legacy_feeds(&store)?;
    let documents = store.find_all("feeds")?;

    let options = RunOptions { dry_run: true, ..RunOptions::default() };
    let record = Runner::new(&store, "bharathva").options(options).run(&model::feeds(), &mut NullSink);

    assert!(record.dry_run);
    assert_eq!(record.indexes_created(), 3);
    assert_eq!(record.documents_matched(), 3);
    assert_eq!(record.documents_modified(), 0);
    assert_eq!(record.exit_status(), ExitStatus::Discrepancy);

    assert_eq!(store.find_all("feeds")?, documents);
    assert_eq!(store.list_indexes("feeds")?.len(), 1);

    Ok(())
}

#[test]
fn seeded_database_migrates_to_a_clean_audit() -> Result<()> {
    let store = MemoryStore::new();
    seed(&store)?;

    assert!(!audit_collection(&store, "feeds")?.is_clean());
    assert!(!audit_collection(&store, "notifications")?.is_clean());

    let records = Runner::new(&store, "bharathva").run_all(&model::builtin_targets(), &mut NullSink);

    assert_eq!(ExitStatus::of_all(&records), ExitStatus::Pass);
    assert_eq!(records[0].documents_modified(), 3);
    assert_eq!(records[1].documents_modified(), 2);

    assert!(audit_collection(&store, "feeds")?.is_clean());
    assert!(audit_collection(&store, "notifications")?.is_clean());

    Ok(())
}
