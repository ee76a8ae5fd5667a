//! Feedshape: idempotent schema evolution for the BharathVA feed database.
//!
//! A migration brings each target collection to a declared state in four
//! stages, each of which is safe to re-run at any time:
//!
//! 1. the [`Bootstrapper`](bootstrap/struct.Bootstrapper.html) makes sure
//!    the collection exists,
//! 2. the [`IndexApplier`](index/struct.IndexApplier.html) creates every
//!    declared, named index that is missing,
//! 3. the [`BackfillSweep`](backfill/struct.BackfillSweep.html) rewrites
//!    documents whose fields are missing, `null`, or ill-typed,
//! 4. [`verify()`](verify/fn.verify.html) re-derives the resulting state
//!    and reports every deviation.
//!
//! The [`Runner`](runner/struct.Runner.html) strings them together and
//! produces a [`RunRecord`](runner/struct.RunRecord.html) per collection.
//! Every stage talks to the database through the
//! [`Store`](store/trait.Store.html) trait and reports progress to an
//! injected [`Sink`](event/trait.Sink.html).

#![doc(html_root_url = "https://docs.rs/feedshape/0.1.0")]
#![deny(missing_debug_implementations, missing_copy_implementations,
        trivial_casts, trivial_numeric_casts,
        unsafe_code,
        unstable_features,
        unused_import_braces, unused_qualifications, missing_docs)]
#![allow(clippy::single_match, clippy::match_same_arms, clippy::match_ref_pats,
         clippy::clone_on_ref_ptr, clippy::needless_pass_by_value,
         clippy::module_name_repetitions)]
#![deny(clippy::wrong_self_convention, clippy::used_underscore_binding,
        clippy::similar_names,
        clippy::missing_docs_in_private_items,
        clippy::unicode_not_nfc,
        clippy::unwrap_used, clippy::expect_used,
        clippy::map_unwrap_or,
        clippy::int_plus_one, clippy::string_add_assign,
        clippy::invalid_upcast_comparisons,
        clippy::cast_precision_loss,
        clippy::mutex_integer, clippy::mut_mut, clippy::items_after_statements,
        clippy::print_stdout, clippy::mem_forget, clippy::maybe_infinite_iter)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate bson;
#[macro_use]
extern crate serde_derive;

pub mod error;
pub mod literal;
pub mod bsn;
pub mod utils;
pub mod target;
pub mod selector;
pub mod store;
pub mod memory;
pub mod event;
pub mod bootstrap;
pub mod index;
pub mod backfill;
pub mod verify;
pub mod runner;
pub mod ledger;
pub mod model;
pub mod config;
pub mod prelude;
