//! The Feedshape prelude provides re-exports of the most commonly used traits
//! and types for convenience, including ones from crates `bson` and `mongodb`.

pub use crate::store::{ Store, ExistingIndex, UpdateManyResult };
pub use crate::memory::MemoryStore;
pub use crate::target::{ CollectionTarget, IndexSpec, FieldDefault };
pub use crate::selector::FieldSelector;
pub use crate::literal::{ Order, IndexType, BsonType };
pub use crate::event::{ Event, Sink, TracingSink, NullSink };
pub use crate::bootstrap::{ Bootstrapper, BootstrapStrategy };
pub use crate::index::IndexApplier;
pub use crate::backfill::BackfillSweep;
pub use crate::verify::{ verify, Verdict, Discrepancy };
pub use crate::runner::{ Runner, RunOptions, RunRecord, RunSummary, ExitStatus };
pub use crate::model::Doc;
pub use crate::config::Config;
pub use crate::error::{ Error, ErrorKind, ErrorExt, Result, ResultExt };
pub use bson::{ Bson, Document, oid::ObjectId };
pub use mongodb::{ Client, ThreadedClient, db::Database };
