//! Guaranteeing that a target collection exists.

use std::fmt;
use bson::Bson;
use crate::{
    store::Store,
    event::{ Event, Sink },
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// The reserved `_id` of the throwaway document used to create a collection
/// implicitly. No application document ever uses it.
pub const SENTINEL_ID: &str = "__feedshape_bootstrap_sentinel__";

/// How a missing collection is to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapStrategy {
    /// Explicit creation, falling back to the sentinel probe when the
    /// deployment doesn't support it.
    Auto,
    /// Always insert and delete a sentinel document.
    Sentinel,
}

impl Default for BootstrapStrategy {
    fn default() -> Self {
        BootstrapStrategy::Auto
    }
}

/// How a collection actually came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapMethod {
    /// An explicit `create` command.
    Create,
    /// The insert-then-delete sentinel probe.
    Sentinel,
    /// Someone else created it between the existence check and ours.
    Concurrent,
}

impl fmt::Display for BootstrapMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            BootstrapMethod::Create => "explicit create",
            BootstrapMethod::Sentinel => "sentinel insert and delete",
            BootstrapMethod::Concurrent => "created concurrently",
        })
    }
}

/// What the bootstrapper observed and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOutcome {
    /// Whether the collection existed before the bootstrapper ran.
    pub existed: bool,
    /// How it was created, if it was. `None` if it existed or in a dry run.
    pub method: Option<BootstrapMethod>,
}

/// Ensures that one collection exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bootstrapper {
    /// Creation strategy for a missing collection.
    pub strategy: BootstrapStrategy,
    /// Only report whether the collection would be created.
    pub dry_run: bool,
}

impl Bootstrapper {
    /// A bootstrapper with the given strategy that does mutate.
    pub fn new(strategy: BootstrapStrategy) -> Self {
        Bootstrapper { strategy, dry_run: false }
    }

    /// Guarantees that `collection` exists on return, unless in a dry run.
    ///
    /// An "already exists" answer from the server is success. Any other
    /// failure is returned with kind `BootstrapFailed`.
    pub fn ensure(&self, store: &dyn Store, collection: &str, sink: &mut dyn Sink) -> Result<BootstrapOutcome> {
        let existed = store
            .collection_exists(collection)
            .chain_kind(ErrorKind::BootstrapFailed, || format!("can't check whether {} exists", collection))?;

        sink.emit(Event::CollectionChecked { collection: collection.to_owned(), existed });

        if existed {
            return Ok(BootstrapOutcome { existed, method: None });
        }

        if self.dry_run {
            sink.emit(Event::CollectionWouldBeCreated { collection: collection.to_owned() });
            return Ok(BootstrapOutcome { existed, method: None });
        }

        let method = match self.strategy {
            BootstrapStrategy::Auto => create_explicitly(store, collection)?,
            BootstrapStrategy::Sentinel => create_by_sentinel(store, collection)?,
        };

        let exists = store
            .collection_exists(collection)
            .chain_kind(ErrorKind::BootstrapFailed, || format!("can't check whether {} exists", collection))?;

        if !exists {
            return Err(Error::new(
                ErrorKind::BootstrapFailed,
                format!("{} still absent after {}", collection, method)
            ));
        }

        sink.emit(Event::CollectionCreated { collection: collection.to_owned(), method });

        Ok(BootstrapOutcome { existed, method: Some(method) })
    }
}

/// Issues `create`, falling back to the sentinel probe if it's unsupported.
fn create_explicitly(store: &dyn Store, collection: &str) -> Result<BootstrapMethod> {
    match store.create_collection(collection) {
        Ok(()) => Ok(BootstrapMethod::Create),
        Err(ref error) if error.is(ErrorKind::NamespaceExists) => Ok(BootstrapMethod::Concurrent),
        Err(ref error) if error.is(ErrorKind::CommandUnsupported) => create_by_sentinel(store, collection),
        Err(error) => Err(error).chain_kind(
            ErrorKind::BootstrapFailed,
            || format!("can't create collection {}", collection)
        ),
    }
}

/// Inserts the sentinel document, then deletes it by `_id`. The insert
/// creates the collection implicitly.
///
/// A sentinel left behind by an interrupted earlier run makes the insert
/// fail with a duplicate key; the delete below still cleans it up.
fn create_by_sentinel(store: &dyn Store, collection: &str) -> Result<BootstrapMethod> {
    let id = Bson::from(SENTINEL_ID);

    match store.insert_one(collection, doc!{ "_id": id.clone() }) {
        Ok(()) => {}
        Err(ref error) if error.is(ErrorKind::DuplicateKey) => {}
        Err(error) => return Err(error).chain_kind(
            ErrorKind::BootstrapFailed,
            || format!("can't insert sentinel document into {}", collection)
        ),
    }

    store
        .delete_by_id(collection, &id)
        .chain_kind(ErrorKind::BootstrapFailed, || format!("can't delete sentinel document from {}", collection))?;

    Ok(BootstrapMethod::Sentinel)
}

#[cfg(test)]
mod tests {
    use crate::memory::MemoryStore;
    use crate::event::NullSink;
    use crate::error::ErrorExt;
    use super::*;

    #[test]
    fn existing_collection_is_left_alone() -> Result<()> {
        let store = MemoryStore::new();
        store.insert_one("feeds", doc!{ "_id": 1, "likes": [] })?;

        let mut events: Vec<Event> = Vec::new();
        let outcome = Bootstrapper::default().ensure(&store, "feeds", &mut events)?;

        assert_eq!(outcome, BootstrapOutcome { existed: true, method: None });
        assert_eq!(store.count("feeds", None)?, 1);
        assert_eq!(events, vec![
            Event::CollectionChecked { collection: String::from("feeds"), existed: true }
        ]);

        Ok(())
    }

    #[test]
    fn missing_collection_is_created_explicitly() -> Result<()> {
        let store = MemoryStore::new();
        let outcome = Bootstrapper::default().ensure(&store, "feeds", &mut NullSink)?;

        assert_eq!(outcome, BootstrapOutcome { existed: false, method: Some(BootstrapMethod::Create) });
        assert!(store.collection_exists("feeds")?);

        Ok(())
    }

    #[test]
    fn sentinel_probe_leaves_no_residue() -> Result<()> {
        let store = MemoryStore::new();
        let bootstrapper = Bootstrapper::new(BootstrapStrategy::Sentinel);
        let outcome = bootstrapper.ensure(&store, "notifications", &mut NullSink)?;

        assert_eq!(outcome.method, Some(BootstrapMethod::Sentinel));
        assert!(store.collection_exists("notifications")?);
        assert_eq!(store.count("notifications", None)?, 0);

        Ok(())
    }

    #[test]
    fn dry_run_does_not_create() -> Result<()> {
        let store = MemoryStore::new();
        let bootstrapper = Bootstrapper { dry_run: true, ..Bootstrapper::default() };
        let mut events: Vec<Event> = Vec::new();
        let outcome = bootstrapper.ensure(&store, "feeds", &mut events)?;

        assert_eq!(outcome, BootstrapOutcome { existed: false, method: None });
        assert!(!store.collection_exists("feeds")?);
        assert_eq!(events.last(), Some(&Event::CollectionWouldBeCreated {
            collection: String::from("feeds")
        }));

        Ok(())
    }

    #[test]
    fn strategy_reads_lowercase() -> Result<()> {
        let strategy: BootstrapStrategy = serde_json::from_str(r#""sentinel""#)?;
        assert_eq!(strategy, BootstrapStrategy::Sentinel);
        assert!(serde_json::from_str::<BootstrapStrategy>(r#""Create""#).is_err());
        Ok(())
    }

    /// Answers `create` with a fixed error kind; everything else is real.
    struct RefusingCreate {
        inner: MemoryStore,
        kind: ErrorKind,
    }

    impl Store for RefusingCreate {
        fn collection_names(&self) -> Result<Vec<String>> {
            self.inner.collection_names()
        }

        fn create_collection(&self, name: &str) -> Result<()> {
            if self.kind == ErrorKind::NamespaceExists {
                self.inner.create_collection(name)?;
            }
            Err(Error::new(self.kind, format!("refusing to create {}", name)))
        }

        fn insert_one(&self, collection: &str, document: bson::Document) -> Result<()> {
            self.inner.insert_one(collection, document)
        }

        fn delete_by_id(&self, collection: &str, id: &Bson) -> Result<bool> {
            self.inner.delete_by_id(collection, id)
        }

        fn list_indexes(&self, collection: &str) -> Result<Vec<crate::store::ExistingIndex>> {
            self.inner.list_indexes(collection)
        }

        fn create_index(&self, collection: &str, spec: &crate::target::IndexSpec) -> Result<()> {
            self.inner.create_index(collection, spec)
        }

        fn update_many(
            &self,
            collection: &str,
            selector: &crate::selector::FieldSelector,
            value: &Bson,
        ) -> Result<crate::store::UpdateManyResult> {
            self.inner.update_many(collection, selector, value)
        }

        fn count(&self, collection: &str, selector: Option<&crate::selector::FieldSelector>) -> Result<usize> {
            self.inner.count(collection, selector)
        }

        fn find_all(&self, collection: &str) -> Result<Vec<bson::Document>> {
            self.inner.find_all(collection)
        }
    }

    #[test]
    fn unsupported_create_falls_back_to_sentinel() -> Result<()> {
        let store = RefusingCreate { inner: MemoryStore::new(), kind: ErrorKind::CommandUnsupported };
        let outcome = Bootstrapper::default().ensure(&store, "feeds", &mut NullSink)?;

        assert_eq!(outcome.method, Some(BootstrapMethod::Sentinel));
        assert!(store.collection_exists("feeds")?);
        assert_eq!(store.count("feeds", None)?, 0);

        Ok(())
    }

    #[test]
    fn concurrent_creation_counts_as_success() -> Result<()> {
        let store = RefusingCreate { inner: MemoryStore::new(), kind: ErrorKind::NamespaceExists };
        let outcome = Bootstrapper::default().ensure(&store, "feeds", &mut NullSink)?;

        assert_eq!(outcome, BootstrapOutcome { existed: false, method: Some(BootstrapMethod::Concurrent) });
        assert!(store.collection_exists("feeds")?);

        Ok(())
    }

    #[test]
    fn other_refusals_are_fatal() {
        let store = RefusingCreate { inner: MemoryStore::new(), kind: ErrorKind::MongoDbError };
        let error = Bootstrapper::default().ensure(&store, "feeds", &mut NullSink).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::BootstrapFailed);
        assert!(error.is(ErrorKind::MongoDbError));
        assert!(error.to_string().contains("refusing to create feeds"));
    }
}
