//! `Error` and `Result` types arising out of migration runs.

use std::fmt;
use std::error;
use std::result;
use std::ops::Deref;
use std::borrow::Cow;
use bson::ValueAccessError;
use backtrace::Backtrace;

/// Slightly augmented trait for backtrace-able errors.
#[allow(clippy::module_name_repetitions)]
pub trait ErrorExt: error::Error {
    /// Similar to `std::error::Error::source()`, but with richer type info.
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        None
    }

    /// Returns the deepest possible backtrace, if any.
    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason().and_then(ErrorExt::backtrace)
    }

    /// Structured error kind.
    fn kind(&self) -> ErrorKind;

    /// Until subtrait coercions are implemented, this helper method
    /// should return the receiver as an `&std::error::Error` trait object.
    fn as_std_error(&self) -> &(dyn error::Error + 'static);
}

/// A trait for conveniently propagating errors up the call stack.
pub trait ResultExt<T>: Sized {
    /// If this `Result` is an `Err`, then prepend the specified error
    /// to the front of the linked list of causes.
    /// ```
    /// # use feedshape::error::{ Error, ErrorKind, ErrorExt, Result, ResultExt };
    /// #
    /// # fn main() -> Result<()> {
    /// let ok: Result<_> = Ok("success!");
    /// let ok_chained = ok.chain("dummy error message")?;
    /// assert_eq!(ok_chained, "success!");
    ///
    /// let err: Result<i32> = Err(Error::new(
    ///     ErrorKind::MongoDbError, "chained cause"
    /// ));
    /// let err_chained = err.chain("top-level message").unwrap_err();
    /// assert_eq!(err_chained.message(), "top-level message");
    /// assert_eq!(err_chained.kind(), ErrorKind::MongoDbError);
    /// # Ok(())
    /// # }
    /// ```
    fn chain<M: ErrMsg>(self, message: M) -> Result<T>;

    /// Like `chain()`, but also overrides the kind of the resulting error.
    fn chain_kind<M: ErrMsg>(self, kind: ErrorKind, message: M) -> Result<T>;
}

/// Values that can act as or generate an error message.
pub trait ErrMsg: Sized {
    /// Convert the value to an error message.
    fn into_message(self) -> Cow<'static, str>;
}

/// Type alias for a `Result` containing a `feedshape` `Error`.
pub type Result<T> = result::Result<T, Error>;

impl<T, E> ResultExt<T> for result::Result<T, E> where E: ErrorExt + 'static {
    fn chain<M: ErrMsg>(self, message: M) -> Result<T> {
        self.map_err(|cause| Error::with_cause(message.into_message(), cause))
    }

    fn chain_kind<M: ErrMsg>(self, kind: ErrorKind, message: M) -> Result<T> {
        self.map_err(|cause| {
            let mut error = Error::with_cause(message.into_message(), cause);
            error.kind = kind;
            error
        })
    }
}

/// Blanket `impl ErrMsg` for string literals.
impl ErrMsg for &'static str {
    fn into_message(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

/// Blanket `impl ErrMsg` for error message formatting functions.
impl<F> ErrMsg for F where F: FnOnce() -> String {
    fn into_message(self) -> Cow<'static, str> {
        Cow::Owned(self())
    }
}

/// A structured, "machine-readable" error kind.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// There was an error converting between JSON and a strongly-typed value.
    JsonTranscoding,
    /// There was an error converting a strongly-typed value to BSON.
    BsonEncoding,
    /// There was an error converting BSON to a strongly-typed value.
    BsonDecoding,
    /// This numerical value can't be represented in BSON.
    BsonNumberRepr,
    /// A field with the specified key was not found in the BSON document.
    MissingDocumentField,
    /// A field with the specified key was found in the BSON document,
    /// but it was of an unexpected type.
    IllTypedDocumentField,
    /// An `ObjectId` could not be generated.
    ObjectIdGeneration,
    /// An error that comes from the MongoDB driver.
    MongoDbError,
    /// An error coming from MongoDB, related to a single write operation.
    MongoDbWriteException,
    /// A document with the same `_id` (or unique key) already exists.
    DuplicateKey,
    /// The collection to be created already exists.
    NamespaceExists,
    /// The server does not support (or refused to interpret) a command.
    CommandUnsupported,
    /// An index with the requested name and key pattern already exists.
    IndexExists,
    /// An index exists under the requested name or key pattern, but with
    /// a different definition.
    IndexConflict,
    /// The target collection could not be brought into existence.
    BootstrapFailed,
    /// A document did not match its typed schema.
    SchemaViolation,
    /// A collection target or a configuration value is invalid.
    Config,
    /// An I/O error, e.g. while reading a configuration file.
    Io,
    /// An attempt was made to convert a negative integer to a `usize`.
    IntConversionUnderflow,
    /// An attempt was made to convert an integer that is too big to a `usize`.
    IntConversionOverflow,
}

impl ErrorKind {
    /// Returns a human-readable error description for this kind.
    pub fn as_str(self) -> &'static str {
        use self::ErrorKind::*;

        match self {
            JsonTranscoding        => "JSON transcoding error",
            BsonEncoding           => "BSON encoding error",
            BsonDecoding           => "BSON decoding error",
            BsonNumberRepr         => "number not i64 nor f64",
            MissingDocumentField   => "document field not found",
            IllTypedDocumentField  => "document field of unexpected type",
            ObjectIdGeneration     => "an ObjectID could not be generated",
            MongoDbError           => "MongoDB error",
            MongoDbWriteException  => "MongoDB write exception",
            DuplicateKey           => "duplicate key",
            NamespaceExists        => "collection already exists",
            CommandUnsupported     => "command not supported",
            IndexExists            => "index already exists",
            IndexConflict          => "conflicting index definition",
            BootstrapFailed        => "collection bootstrap failed",
            SchemaViolation        => "document violates schema",
            Config                 => "invalid configuration",
            Io                     => "I/O error",
            IntConversionUnderflow => "integer conversion underflowed",
            IntConversionOverflow  => "integer conversion overflowed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The central error type of the crate.
#[derive(Debug)]
pub struct Error {
    /// The structured, "machine-readable" kind of this error.
    kind: ErrorKind,
    /// The human-readable description.
    message: Cow<'static, str>,
    /// The underlying error, if any.
    cause: Option<Box<dyn ErrorExt>>,
    /// The backtrace, if any.
    backtrace: Option<Backtrace>,
}

impl Error {
    /// Creates an error with the specified kind, message, no cause,
    /// and a backtrace.
    /// ```
    /// # use feedshape::error::{ Error, ErrorKind, ErrorExt };
    /// let error = Error::new(ErrorKind::IndexExists, "sample error message");
    /// assert_eq!(error.message(), "sample error message");
    /// assert_eq!(error.kind(), ErrorKind::IndexExists);
    /// assert!(error.reason().is_none());
    /// assert!(error.backtrace().is_some());
    /// ```
    pub fn new<S>(kind: ErrorKind, message: S) -> Self
        where S: Into<Cow<'static, str>>
    {
        Error {
            kind,
            message: message.into(),
            cause: None,
            backtrace: Some(Backtrace::new()),
        }
    }

    /// Creates an error with the specified message and cause. If the cause has
    /// no backtrace, this method will create it and add it to the new instance.
    /// The kind of the new error is inherited from the cause.
    pub fn with_cause<S, E>(message: S, cause: E) -> Self
        where S: Into<Cow<'static, str>>,
              E: ErrorExt + 'static
    {
        let kind = cause.kind();
        let message = message.into();
        let backtrace = if cause.backtrace().is_none() {
            Some(Backtrace::new())
        } else {
            None
        };
        let cause: Option<Box<dyn ErrorExt>> = Some(Box::new(cause));

        Error { kind, message, cause, backtrace }
    }

    /// The top-level human-readable message, without the chain of causes.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if this error or any of its causes is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        let mut current: Option<&dyn ErrorExt> = Some(self);

        while let Some(error) = current {
            if error.kind() == kind {
                return true;
            }
            current = error.reason();
        }

        false
    }

    /// Renders the message and every cause on one line, without the
    /// backtrace. Used in progress events and run summaries.
    pub fn chain_summary(&self) -> String {
        self.to_string()
    }
}

impl ErrorExt for Error {
    fn reason(&self) -> Option<&(dyn ErrorExt + 'static)> {
        self.cause.as_ref().map(Deref::deref)
    }

    #[allow(clippy::or_fun_call)]
    fn backtrace(&self) -> Option<&Backtrace> {
        self.reason().and_then(ErrorExt::backtrace).or(self.backtrace.as_ref())
    }

    fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(cause) = self.cause.as_ref() {
            write!(f, ", caused by: {}", cause)?
        }

        if f.alternate() {
            if let Some(backtrace) = self.backtrace.as_ref() {
                write!(f, "; stack backtrace {:?}", backtrace)?
            }
        }

        Ok(())
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.reason().map(ErrorExt::as_std_error)
    }
}

impl From<ValueAccessError> for Error {
    fn from(error: ValueAccessError) -> Self {
        let message = match error {
            ValueAccessError::NotPresent => "missing value for key in Document",
            ValueAccessError::UnexpectedType => "ill-typed value for key in Document",
        };
        Self::with_cause(message, error)
    }
}

impl ErrorExt for ValueAccessError {
    fn kind(&self) -> ErrorKind {
        match *self {
            ValueAccessError::NotPresent => ErrorKind::MissingDocumentField,
            ValueAccessError::UnexpectedType => ErrorKind::IllTypedDocumentField,
        }
    }

    fn as_std_error(&self) -> &(dyn error::Error + 'static) {
        self
    }
}

/// Implementing `ErrorExt` and `From` boilerplate.
macro_rules! impl_error_type {
    ($ty:path, $kind:ident, $message:expr) => {
        impl From<$ty> for Error {
            fn from(error: $ty) -> Self {
                Self::with_cause($message, error)
            }
        }

        impl ErrorExt for $ty {
            fn kind(&self) -> ErrorKind {
                ErrorKind::$kind
            }

            fn as_std_error(&self) -> &(dyn error::Error + 'static) {
                self
            }
        }
    }
}

impl_error_type! { serde_json::Error,  JsonTranscoding,    "JSON transcoding error" }
impl_error_type! { bson::EncoderError, BsonEncoding,       "BSON encoding error" }
impl_error_type! { bson::DecoderError, BsonDecoding,       "BSON decoding error" }
impl_error_type! { bson::oid::Error,   ObjectIdGeneration, "ObjectId generation error" }
impl_error_type! { mongodb::Error,     MongoDbError,       "MongoDB error" }
impl_error_type! { std::io::Error,     Io,                 "I/O error" }
impl_error_type! {
    mongodb::coll::error::WriteException,
    MongoDbWriteException,
    "MongoDB write exception"
}
