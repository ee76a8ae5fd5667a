//! An in-process `Store` with MongoDB's observable behavior for the
//! operations the migration stages use.
//!
//! Used for dry rehearsals and throughout the test suite. Collections are
//! created implicitly on first write, `_id` must be unique, every collection
//! carries the `_id_` index, and index creation follows the server's rules
//! for identical, renamed, and redefined indexes.

use std::collections::BTreeMap;
use std::sync::{ Mutex, MutexGuard, PoisonError };
use bson::{ Bson, Document, oid::ObjectId };
use crate::{
    bsn::DocumentExt,
    selector::FieldSelector,
    store::{ Store, ExistingIndex, UpdateManyResult },
    target::IndexSpec,
    error::{ Error, ErrorKind, Result },
};

/// One collection's documents and indexes.
#[derive(Debug, Clone)]
struct MemoryCollection {
    /// Documents in insertion order.
    documents: Vec<Document>,
    /// Indexes in creation order, `_id_` first.
    indexes: Vec<ExistingIndex>,
}

impl MemoryCollection {
    /// A fresh collection bearing only the `_id_` index.
    fn new() -> Self {
        MemoryCollection {
            documents: Vec::new(),
            indexes: vec![
                ExistingIndex {
                    name: String::from("_id_"),
                    keys: doc!{ "_id": 1 },
                }
            ],
        }
    }
}

/// A thread-safe, in-memory database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Collections by name.
    collections: Mutex<BTreeMap<String, MemoryCollection>>,
}

impl MemoryStore {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the collection map. A panic in another thread can't leave the
    /// map half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<BTreeMap<String, MemoryCollection>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites (or removes, if `value` is `None`) one field of the
    /// document with the given `_id`, bypassing all migration logic.
    /// Returns `false` if no such document exists.
    pub fn set_field(&self, collection: &str, id: &Bson, field: &str, value: Option<Bson>) -> bool {
        let mut collections = self.lock();
        let document = collections
            .get_mut(collection)
            .and_then(|coll| coll.documents.iter_mut().find(|doc| doc.get("_id") == Some(id)));

        match document {
            Some(document) => {
                match value {
                    Some(value) => set_path(document, field, value),
                    None => remove_path(document, field),
                }
                true
            }
            None => false,
        }
    }
}

/// Sets a dotted field path, creating intermediate documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.find('.') {
        None => {
            document.insert(path, value);
        }
        Some(dot) => {
            let (head, rest) = (&path[..dot], &path[dot + 1..]);
            let mut child = match document.remove(head) {
                Some(Bson::Document(child)) => child,
                _ => Document::new(),
            };
            set_path(&mut child, rest, value);
            document.insert(head, child);
        }
    }
}

/// Removes a dotted field path if present.
fn remove_path(document: &mut Document, path: &str) {
    match path.find('.') {
        None => {
            document.remove(path);
        }
        Some(dot) => {
            if let Some(&mut Bson::Document(ref mut child)) = document.get_mut(&path[..dot]) {
                remove_path(child, &path[dot + 1..]);
            }
        }
    }
}

impl Store for MemoryStore {
    fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.lock();

        if collections.contains_key(name) {
            return Err(Error::new(
                ErrorKind::NamespaceExists,
                format!("collection already exists. NS: {}", name)
            ));
        }

        collections.insert(name.to_owned(), MemoryCollection::new());
        Ok(())
    }

    fn insert_one(&self, collection: &str, mut document: Document) -> Result<()> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new()?);
        }

        let mut collections = self.lock();
        let coll = collections
            .entry(collection.to_owned())
            .or_insert_with(MemoryCollection::new);
        let id = document.get("_id").cloned();

        if coll.documents.iter().any(|doc| doc.get("_id").cloned() == id) {
            return Err(Error::new(
                ErrorKind::DuplicateKey,
                format!("E11000 duplicate key error collection: {} index: _id_", collection)
            ));
        }

        coll.documents.push(document);
        Ok(())
    }

    fn delete_by_id(&self, collection: &str, id: &Bson) -> Result<bool> {
        let mut collections = self.lock();
        let coll = match collections.get_mut(collection) {
            Some(coll) => coll,
            None => return Ok(false),
        };

        match coll.documents.iter().position(|doc| doc.get("_id") == Some(id)) {
            Some(index) => {
                coll.documents.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>> {
        Ok(self.lock().get(collection).map_or_else(Vec::new, |coll| coll.indexes.clone()))
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        let mut collections = self.lock();
        let coll = collections
            .entry(collection.to_owned())
            .or_insert_with(MemoryCollection::new);
        let keys = spec.key_document();

        if let Some(existing) = coll.indexes.iter().find(|index| index.name == spec.name) {
            return if existing.satisfies(spec) {
                Ok(())
            } else {
                Err(Error::new(
                    ErrorKind::IndexConflict,
                    format!("Index with name: {} already exists with different options", spec.name)
                ))
            };
        }

        if let Some(existing) = coll.indexes.iter().find(|index| index.keys == keys) {
            return Err(Error::new(
                ErrorKind::IndexConflict,
                format!("Index already exists with a different name: {}", existing.name)
            ));
        }

        coll.indexes.push(ExistingIndex { name: spec.name.clone(), keys });
        Ok(())
    }

    fn update_many(&self, collection: &str, selector: &FieldSelector, value: &Bson) -> Result<UpdateManyResult> {
        let mut collections = self.lock();
        let mut result = UpdateManyResult::default();
        let coll = match collections.get_mut(collection) {
            Some(coll) => coll,
            None => return Ok(result),
        };

        for document in coll.documents.iter_mut().filter(|doc| selector.matches(doc)) {
            result.num_matched += 1;

            if document.get_path(&selector.field) != Some(value) {
                set_path(document, &selector.field, value.clone());
                result.num_modified += 1;
            }
        }

        Ok(result)
    }

    fn count(&self, collection: &str, selector: Option<&FieldSelector>) -> Result<usize> {
        Ok(self.lock().get(collection).map_or(0, |coll| {
            coll.documents
                .iter()
                .filter(|doc| selector.map_or(true, |s| s.matches(doc)))
                .count()
        }))
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.lock().get(collection).map_or_else(Vec::new, |coll| coll.documents.clone()))
    }
}
