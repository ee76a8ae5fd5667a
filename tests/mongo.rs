//! Integration tests against a real `mongod`. They check that the driver
//! round-trips of the `Store` implementation behave like the in-memory
//! double the rest of the test suite relies on. Namely:
//! * error classification of `create` and `createIndexes`
//! * the missing-or-null and wrong-type query filters
//! * a complete migration run, twice
//!
//! These need `mongod` on the `PATH`; run them with `cargo test -- --ignored`.

#[macro_use]
extern crate scopeguard;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate bson;
extern crate mongodb;
extern crate feedshape;

use std::env::temp_dir;
use std::fs::create_dir_all;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use std::collections::HashSet;
use std::process::{ Command, Child, Stdio };
use mongodb::db::ThreadedDatabase;
use feedshape::prelude::{
    Store, MemoryStore, Runner, RunOptions, ExitStatus, Verdict, FieldSelector,
    BsonType, BootstrapStrategy, NullSink, IndexSpec, Order, Bson, ErrorKind,
    Result, Client, ThreadedClient, Database,
};
use feedshape::model::{ self, seed::seed, audit::audit_collection };
use feedshape::ledger;

/// Used for killing the MongoDB server process once all tests have run.
struct ProcessGuard {
    handle: Child,
    owners: HashSet<&'static str>,
}

impl ProcessGuard {
    fn new(handle: Child, owners: &[&'static str]) -> Self {
        ProcessGuard {
            handle,
            owners: owners.iter().cloned().collect(),
        }
    }

    fn resign(&mut self, owner: &str) {
        let pid = self.handle.id();

        println!("=== ProcessGuard(#{}): Resigning owner '{}'", pid, owner);
        self.owners.remove(owner);

        if self.owners.is_empty() {
            println!("=== ProcessGuard(#{}): All owners resigned; killing", pid);
            self.handle.kill().expect("couldn't kill child process");
        }
    }
}

macro_rules! implement_tests {
    ($(#[test] $(#[$attr:meta])* fn $test_name:ident() $(-> $ret_ty:ty)? $test_code:block)*) => {
        lazy_static! {
            static ref DB_SERVER_GUARD: Mutex<ProcessGuard> = {
                let dbpath = {
                    let mut tmp = temp_dir();
                    tmp.push(DB_DIR);
                    create_dir_all(&tmp).expect("couldn't create DB temp dir");
                    tmp
                };
                let owners = [$(stringify!($test_name),)*];
                let process = Command::new("mongod")
                    .arg("--noscripting")
                    .arg("--dbpath")
                    .arg(&dbpath)
                    .arg("--port")
                    .arg(DB_PORT)
                    .stdout(Stdio::piped())
                    .spawn()
                    .expect("couldn't start DB server; do you have Mongo installed?");

                Mutex::new(ProcessGuard::new(process, &owners))
            };
        }

        $(
            #[test]
            $(#[$attr])*
            fn $test_name() $(-> $ret_ty)? {
                defer!({
                    DB_SERVER_GUARD.lock().unwrap().resign(stringify!($test_name));
                });
                $test_code
            }
        )*
    }
}

/// Not Quite Random
static DB_PORT: &str = "12986";
/// Data directory under the system temp dir.
static DB_DIR: &str = "feedshape_test_db";

lazy_static! {
    /// The client is never RAII-destroyed; the OS reclaims its sockets.
    /// The server process itself is killed by the last resigning test.
    static ref DB_CLIENT: Client = {
        Client::with_uri(
            &format!("mongodb://localhost:{}/", DB_PORT)
        ).expect(
            "can't connect to mongod server"
        )
    };
}

/// A freshly dropped database, private to one test.
fn fresh_db(name: &str) -> Database {
    // Touching the guard spawns the server.
    drop(DB_SERVER_GUARD.lock().unwrap());

    let db = DB_CLIENT.db(name);

    for _ in 0..50 {
        if Store::collection_names(&db).is_ok() {
            break;
        }
        sleep(Duration::from_millis(100));
    }

    db.drop_database().expect("couldn't drop test database");
    db
}

implement_tests!{
    #[test]
    #[ignore]
    fn create_reports_existing_namespace() -> Result<()> {
        let db = fresh_db("feedshape_namespace");

        Store::create_collection(&db, "feeds")?;
        let error = Store::create_collection(&db, "feeds").unwrap_err();

        assert!(error.is(ErrorKind::NamespaceExists));
        assert!(Store::collection_exists(&db, "feeds")?);

        Ok(())
    }

    #[test]
    #[ignore]
    fn create_index_reports_conflicts() -> Result<()> {
        let db = fresh_db("feedshape_conflict");
        let spec = IndexSpec::new("idx_user").key("userId", Order::Ascending);
        let renamed = IndexSpec::new("idx_user_renamed").key("userId", Order::Ascending);
        let rekeyed = IndexSpec::new("idx_user").key("userId", Order::Descending);

        Store::create_index(&db, "feeds", &spec)?;
        Store::create_index(&db, "feeds", &spec)?;

        assert!(Store::create_index(&db, "feeds", &renamed).unwrap_err().is(ErrorKind::IndexConflict));
        assert!(Store::create_index(&db, "feeds", &rekeyed).unwrap_err().is(ErrorKind::IndexConflict));

        let indexes = Store::list_indexes(&db, "feeds")?;
        assert_eq!(indexes.len(), 2);
        assert!(indexes.iter().any(|index| index.satisfies(&spec)));

        Ok(())
    }

    #[test]
    #[ignore]
    fn filters_agree_with_the_memory_store() -> Result<()> {
        let db = fresh_db("feedshape_filters");
        let memory = MemoryStore::new();
        let documents = vec![
            doc!{ "_id": 1 },
            doc!{ "_id": 2, "likes": Bson::Null },
            doc!{ "_id": 3, "likes": [] },
            doc!{ "_id": 4, "likes": ["u1", Bson::Null] },
            doc!{ "_id": 5, "likes": "u2" },
            doc!{ "_id": 6, "likes": 7 },
        ];

        for document in documents {
            Store::insert_one(&db, "feeds", document.clone())?;
            memory.insert_one("feeds", document)?;
        }

        let selectors = [
            FieldSelector::missing_or_null("likes"),
            FieldSelector::wrong_type("likes", BsonType::ARRAY),
            FieldSelector::needs_backfill("likes", BsonType::ARRAY),
        ];
        let expected = [2, 2, 4];

        for (selector, &count) in selectors.iter().zip(expected.iter()) {
            assert_eq!(Store::count(&db, "feeds", Some(selector))?, count, "{}", selector);
            assert_eq!(memory.count("feeds", Some(selector))?, count, "{}", selector);
        }

        let fixed = Store::update_many(&db, "feeds", &selectors[0], &Bson::Array(Vec::new()))?;
        let liked = Store::find_all(&db, "feeds")?
            .into_iter()
            .find(|document| document.get("_id") == Some(&Bson::I32(4)));

        assert_eq!(fixed.num_matched, 2);
        assert_eq!(liked, Some(doc!{ "_id": 4, "likes": ["u1", Bson::Null] }));

        Ok(())
    }

    #[test]
    #[ignore]
    fn scalar_filters_catch_wrapped_values() -> Result<()> {
        let db = fresh_db("feedshape_scalar_filters");
        let memory = MemoryStore::new();
        let documents = vec![
            doc!{ "_id": 1, "isRead": false },
            doc!{ "_id": 2, "isRead": [false] },
            doc!{ "_id": 3, "isRead": "false" },
            doc!{ "_id": 4 },
        ];

        for document in documents {
            Store::insert_one(&db, "notifications", document.clone())?;
            memory.insert_one("notifications", document)?;
        }

        let selectors = [
            FieldSelector::wrong_type("isRead", BsonType::BOOL),
            FieldSelector::needs_backfill("isRead", BsonType::BOOL),
        ];
        let expected = [2, 3];

        for (selector, &count) in selectors.iter().zip(expected.iter()) {
            assert_eq!(Store::count(&db, "notifications", Some(selector))?, count, "{}", selector);
            assert_eq!(memory.count("notifications", Some(selector))?, count, "{}", selector);
        }

        Ok(())
    }

    #[test]
    #[ignore]
    fn sentinel_bootstrap_leaves_no_trace() -> Result<()> {
        let db = fresh_db("feedshape_sentinel");
        let options = RunOptions { bootstrap: BootstrapStrategy::Sentinel, ..RunOptions::default() };

        let record = Runner::new(&db, "feedshape_sentinel").options(options).run(&model::feeds(), &mut NullSink);

        assert_eq!(record.collection_existed(), Some(false));
        assert_eq!(record.final_document_count(), Some(0));
        assert_eq!(record.final_index_count(), Some(4));
        assert_eq!(record.verdict(), Some(Verdict::Pass));

        Ok(())
    }

    #[test]
    #[ignore]
    fn seeded_database_migrates_idempotently() -> Result<()> {
        let db = fresh_db("feedshape_migrate");
        seed(&db)?;

        let options = RunOptions { ledger: true, ..RunOptions::default() };
        let runner = Runner::new(&db, "feedshape_migrate").options(options);
        let targets = model::builtin_targets();

        let first = runner.run_all(&targets, &mut NullSink);
        let second = runner.run_all(&targets, &mut NullSink);

        assert_eq!(ExitStatus::of_all(&first), ExitStatus::Pass);
        assert_eq!(ExitStatus::of_all(&second), ExitStatus::Pass);
        assert_eq!(first.iter().map(|r| r.documents_modified()).sum::<usize>(), 5);
        assert_eq!(second.iter().map(|r| r.documents_modified()).sum::<usize>(), 0);
        assert_eq!(second.iter().map(|r| r.indexes_created()).sum::<usize>(), 0);

        assert!(audit_collection(&db, "feeds")?.is_clean());
        assert!(audit_collection(&db, "notifications")?.is_clean());
        assert_eq!(ledger::history(&db)?.len(), 4);

        Ok(())
    }
}
