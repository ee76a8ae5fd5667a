//! Validate-on-read: decoding every stored document into its typed model.

use std::fmt;
use crate::{
    store::Store,
    bsn::deserialize_document,
    error::{ Error, ErrorKind, Result, ResultExt },
};
use super::{ Doc, Feed, Notification };

/// At most this many violations are kept in a report.
pub const MAX_VIOLATIONS: usize = 10;

/// A document that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The `_id` of the document, rendered; `"(none)"` if it has none.
    pub id: String,
    /// The decoding error chain.
    pub reason: String,
}

/// Result of auditing one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// The audited collection.
    pub collection: String,
    /// Documents read.
    pub checked: usize,
    /// Documents that decoded.
    pub valid: usize,
    /// The first few documents that didn't.
    pub violations: Vec<Violation>,
}

impl AuditReport {
    /// Documents that didn't decode.
    pub fn invalid(&self) -> usize {
        self.checked - self.valid
    }

    /// Whether every document decoded.
    pub fn is_clean(&self) -> bool {
        self.checked == self.valid
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "audit of {}: {} checked, {} valid, {} invalid",
                 self.collection, self.checked, self.valid, self.invalid())?;

        for violation in &self.violations {
            writeln!(f, "  {}: {}", violation.id, violation.reason)?;
        }

        if self.invalid() > self.violations.len() {
            writeln!(f, "  ... and {} more", self.invalid() - self.violations.len())?;
        }

        Ok(())
    }
}

/// Decodes every document of `T`'s collection as a `T`. Never writes.
pub fn audit<T: Doc>(store: &dyn Store) -> Result<AuditReport> {
    let documents = store
        .find_all(T::NAME)
        .chain(|| format!("can't read {} for auditing", T::NAME))?;

    let mut report = AuditReport { collection: T::NAME.to_owned(), ..AuditReport::default() };

    for document in documents {
        let id = document
            .get("_id")
            .map_or_else(|| String::from("(none)"), ToString::to_string);

        report.checked += 1;

        match deserialize_document::<T>(document) {
            Ok(_) => report.valid += 1,
            Err(error) => if report.violations.len() < MAX_VIOLATIONS {
                report.violations.push(Violation { id, reason: error.chain_summary() });
            },
        }
    }

    Ok(report)
}

/// Audits a built-in collection by name.
pub fn audit_collection(store: &dyn Store, name: &str) -> Result<AuditReport> {
    if name == Feed::NAME {
        audit::<Feed>(store)
    } else if name == Notification::NAME {
        audit::<Notification>(store)
    } else {
        Err(Error::new(ErrorKind::Config, format!("no typed model for collection `{}`", name)))
    }
}
