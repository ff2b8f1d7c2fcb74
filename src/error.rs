use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// EmberDB errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Invalid user input: empty or oversize topic/value, malformed topic
    /// grammar, TTL too large, or an invalid message ID.
    BadRequest(String),
    /// The message ID does not exist in the database.
    MsgIdDoesNotExist,
    /// The message ID was deleted.
    MsgIdDeleted,
    /// The entry does not exist in the staging store.
    EntryDoesNotExist,
    /// The message has expired.
    MsgExpired,
    /// The batch sequence is already complete; no further writes accepted.
    BatchSeqComplete,
    /// A write conflicted with a concurrent writer within a batch.
    WriteConflict,
    /// A write was attempted on a database opened read-only.
    Immutable,
    /// The database is closed.
    Closed,
    /// The database directory is locked by another process.
    Locked(String),
    /// On-disk state failed validation: header mismatch, frame out of range.
    Corrupted(String),
    /// The request was understood but access is not allowed.
    Forbidden,
    /// Capacity exceeded.
    Full,
    /// An IO error.
    IoError(String),
    /// An internal invariant does not hold, typically a lifecycle violation.
    InvalidState(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Error::MsgIdDoesNotExist => write!(f, "message id does not exist in database"),
            Error::MsgIdDeleted => write!(f, "message id is deleted"),
            Error::EntryDoesNotExist => write!(f, "entry does not exist"),
            Error::MsgExpired => write!(f, "message has expired"),
            Error::BatchSeqComplete => write!(f, "batch seq is complete"),
            Error::WriteConflict => write!(f, "batch write conflict"),
            Error::Immutable => write!(f, "database is immutable"),
            Error::Closed => write!(f, "database is closed"),
            Error::Locked(msg) => write!(f, "database is locked: {msg}"),
            Error::Corrupted(msg) => write!(f, "database is corrupted: {msg}"),
            Error::Forbidden => write!(f, "access is not allowed"),
            Error::Full => write!(f, "database is full"),
            Error::IoError(msg) => write!(f, "io error: {msg}"),
            Error::InvalidState(msg) => write!(f, "invalid state: {msg}"),
        }
    }
}

/// Constructs an Error::Corrupted for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::Corrupted(format!($($args)*)) };
}

/// Constructs an Error::BadRequest for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::BadRequest(format!($($args)*)) };
}

/// An EmberDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Corrupted(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<snap::Error> for Error {
    fn from(err: snap::Error) -> Self {
        Error::Corrupted(err.to_string())
    }
}
