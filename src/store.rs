//! The database handle the migration stages operate on.
//!
//! Every stage receives a `&dyn Store` instead of selecting a database
//! globally. The trait covers exactly the round-trips the stages issue;
//! each call is synchronous and blocking. It is implemented for the
//! MongoDB driver's `Database` here and for an in-process double in
//! [`memory`](../memory/index.html).

use std::fmt;
use bson::{ Bson, Document, from_bson };
use mongodb::db::{ Database, ThreadedDatabase };
use mongodb::coll::options::{ IndexModel, IndexOptions };
use crate::{
    literal::IndexType,
    selector::FieldSelector,
    target::{ IndexSpec, KeyPattern },
    utils::int_to_usize_with_msg,
    error::{ Error, ErrorKind, ErrMsg, Result, ResultExt },
};

/// An index as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingIndex {
    /// The index name.
    pub name: String,
    /// The raw key pattern.
    pub keys: Document,
}

impl ExistingIndex {
    /// Parses the raw key pattern. Returns `None` for index types this crate
    /// doesn't model (e.g. legacy `2d`), which never equal a declaration.
    pub fn key_pattern(&self) -> Option<Vec<(String, IndexType)>> {
        self.keys
            .iter()
            .map(|(field, value)| {
                from_bson::<IndexType>(value.clone()).ok().map(|t| (field.clone(), t))
            })
            .collect()
    }

    /// Whether this index has the declared name and exactly its key pattern.
    pub fn satisfies(&self, spec: &IndexSpec) -> bool {
        self.name == spec.name && self.key_pattern().map_or(false, |keys| spec.has_keys(&keys))
    }
}

impl fmt::Display for ExistingIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.key_pattern() {
            Some(keys) => write!(f, "{} {}", self.name, KeyPattern(&keys)),
            None => write!(f, "{} {}", self.name, self.keys),
        }
    }
}

/// The outcome of a successful `update_many()` operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateManyResult {
    /// The number of documents matched by the query criteria.
    pub num_matched: usize,
    /// The number of documents actually changed by the update.
    pub num_modified: usize,
}

/// The database operations the migration stages need.
pub trait Store {
    /// Names of all collections in the database.
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Whether the named collection exists.
    fn collection_exists(&self, name: &str) -> Result<bool> {
        self.collection_names().map(|names| names.iter().any(|n| n == name))
    }

    /// Explicitly creates a collection. Fails with `NamespaceExists` if it
    /// already exists, and with `CommandUnsupported` if the deployment
    /// doesn't allow explicit creation.
    fn create_collection(&self, name: &str) -> Result<()>;

    /// Inserts one document; creates the collection implicitly.
    /// Fails with `DuplicateKey` if the `_id` is taken.
    fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    /// Deletes the document with the given `_id`; `true` if one was deleted.
    fn delete_by_id(&self, collection: &str, id: &Bson) -> Result<bool>;

    /// All indexes of a collection, including `_id_`. A missing collection
    /// has no indexes.
    fn list_indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>>;

    /// Creates one named index. Re-creating an identical index succeeds;
    /// a clash with an existing definition fails with `IndexConflict`.
    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()>;

    /// Sets `field` to `value` on every document matched by `selector`.
    fn update_many(&self, collection: &str, selector: &FieldSelector, value: &Bson) -> Result<UpdateManyResult>;

    /// Counts the documents matched by `selector`, or all of them.
    fn count(&self, collection: &str, selector: Option<&FieldSelector>) -> Result<usize>;

    /// Every document of the collection, in natural order.
    fn find_all(&self, collection: &str) -> Result<Vec<Document>>;
}

/// Maps a server error message onto a structured kind. The 0.3 driver
/// surfaces command failures as plain strings, so this goes by wording
/// rather than by numeric code.
pub fn server_error_kind(message: &str) -> ErrorKind {
    let message = message.to_lowercase();

    if message.contains("e11000") || message.contains("duplicate key") {
        ErrorKind::DuplicateKey
    } else if message.contains("different name")
        || message.contains("different options")
        || message.contains("same name as the requested index")
        || message.contains("must have unique name")
    {
        ErrorKind::IndexConflict
    } else if message.contains("index") && message.contains("already exists") {
        ErrorKind::IndexExists
    } else if message.contains("already exists") {
        ErrorKind::NamespaceExists
    } else if message.contains("no such command")
        || message.contains("no such cmd")
        || message.contains("unrecognized command")
        || message.contains("not supported")
    {
        ErrorKind::CommandUnsupported
    } else {
        ErrorKind::MongoDbError
    }
}

/// Whether the server complained about a namespace that doesn't exist.
fn is_namespace_not_found(error: &mongodb::Error) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("ns does not exist") || message.contains("ns not found")
        || message.contains("namespacenotfound")
}

/// Classifying conversion from driver results.
trait ClassifyExt<T> {
    /// Wraps the error with `message`, its kind derived from the server's wording.
    fn classify<M: ErrMsg>(self, message: M) -> Result<T>;
}

impl<T> ClassifyExt<T> for mongodb::Result<T> {
    fn classify<M: ErrMsg>(self, message: M) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let kind = server_error_kind(&error.to_string());
                Err(error).chain_kind(kind, message)
            }
        }
    }
}

/// Turns a write exception attached to an otherwise successful reply into an error.
fn check_write(exception: Option<mongodb::coll::error::WriteException>, message: String) -> Result<()> {
    match exception {
        None => Ok(()),
        Some(exception) => {
            let kind = server_error_kind(&exception.to_string());
            Err(exception).chain_kind(kind, || message)
        }
    }
}

/// The driver's index model for a declaration.
pub fn index_model(spec: &IndexSpec) -> IndexModel {
    IndexModel {
        keys: spec.key_document(),
        options: IndexOptions {
            name: Some(spec.name.clone()),
            unique: if spec.unique { Some(true) } else { None },
            sparse: if spec.sparse { Some(true) } else { None },
            ..IndexOptions::default()
        },
    }
}

impl Store for Database {
    fn collection_names(&self) -> Result<Vec<String>> {
        ThreadedDatabase::collection_names(self, None).classify("can't list collections")
    }

    fn create_collection(&self, name: &str) -> Result<()> {
        ThreadedDatabase::create_collection(self, name, None)
            .classify(|| format!("can't create collection {}", name))
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        let message = || format!("error in {}::insert_one()", collection);

        self.collection(collection)
            .insert_one(document, None)
            .classify(&message)
            .and_then(|result| check_write(result.write_exception, message()))
    }

    fn delete_by_id(&self, collection: &str, id: &Bson) -> Result<bool> {
        let message = || format!("error in {}::delete_by_id({})", collection, id);

        self.collection(collection)
            .delete_one(doc!{ "_id": id.clone() }, None)
            .classify(&message)
            .and_then(|result| {
                check_write(result.write_exception, message())?;
                Ok(result.deleted_count > 0)
            })
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>> {
        let cursor = match self.collection(collection).list_indexes() {
            Ok(cursor) => cursor,
            Err(ref error) if is_namespace_not_found(error) => return Ok(Vec::new()),
            Err(error) => {
                return Err(error).classify(|| format!("can't list indexes of {}", collection));
            }
        };

        cursor
            .map(|item| {
                let mut raw = item.classify(|| format!("can't read index of {}", collection))?;
                let name = match raw.remove("name") {
                    Some(Bson::String(name)) => name,
                    _ => return Err(Error::new(
                        ErrorKind::MissingDocumentField,
                        format!("index without a name on {}", collection)
                    )),
                };
                let keys = match raw.remove("key") {
                    Some(Bson::Document(keys)) => keys,
                    _ => return Err(Error::new(
                        ErrorKind::MissingDocumentField,
                        format!("index {} on {} has no key pattern", name, collection)
                    )),
                };
                Ok(ExistingIndex { name, keys })
            })
            .collect()
    }

    fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        self.collection(collection)
            .create_indexes(vec![index_model(spec)])
            .map(drop)
            .classify(|| format!("can't create index {} on {}", spec, collection))
    }

    fn update_many(&self, collection: &str, selector: &FieldSelector, value: &Bson) -> Result<UpdateManyResult> {
        let mut fields = Document::new();
        fields.insert(selector.field.clone(), value.clone());
        let message = || format!("error in {}::update_many({})", collection, selector);

        let result = self.collection(collection)
            .update_many(selector.to_filter(), doc!{ "$set": fields }, None)
            .classify(&message)?;

        check_write(result.write_exception, message())?;

        let num_matched = int_to_usize_with_msg(result.matched_count, "# of matched documents")?;
        let num_modified = int_to_usize_with_msg(result.modified_count, "# of modified documents")?;

        Ok(UpdateManyResult { num_matched, num_modified })
    }

    fn count(&self, collection: &str, selector: Option<&FieldSelector>) -> Result<usize> {
        let filter = selector.map(FieldSelector::to_filter);

        self.collection(collection)
            .count(filter, None)
            .classify(|| format!("error in {}::count()", collection))
            .and_then(|n| int_to_usize_with_msg(n, "# of counted documents"))
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.collection(collection)
            .find(None, None)
            .classify(|| format!("error in {}::find()", collection))?
            .map(|item| item.classify(|| format!("can't read document of {}", collection)))
            .collect()
    }
}
