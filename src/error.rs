//! Crate-wide error and status code types.
//!
//! Mirrors the nested `thiserror` layering of `cryo`'s `storage::StorageError`
//! (one variant per layer, each wrapping a leaf cause), plus a numeric
//! [`StatusCode`] that reproduces the original status code list so the
//! engine's failures can be reported to a non-Rust caller by number.

use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error on {path}: {cause}")]
    Io { path: PathBuf, cause: IoError },

    #[error("pager error: {0}")]
    Pager(#[from] PagerError),

    #[error("btree error: {0}")]
    Btree(#[from] BtreeError),

    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),
}

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("failed to open file")]
    CantOpen,

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("could not make progress writing, device full")]
    Full,

    #[error("fstat failed: {0}")]
    Fstat(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PagerError {
    #[error("page {0} does not exist")]
    NoSuchPage(u32),

    #[error("page {0} is not available for a read-only request")]
    NotAvail(u32),

    #[error("file is not a valid database (bad magic)")]
    NotADatabase,

    #[error("file was written by a newer, incompatible version of this format")]
    CantOpen,

    #[error(transparent)]
    Io(#[from] IoError),
}

#[derive(Debug, thiserror::Error)]
pub enum BtreeError {
    #[error("key exceeds the maximum size for this page")]
    KeyTooLarge,

    #[error(transparent)]
    Pager(#[from] PagerError),
}

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("collection {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    Btree(#[from] BtreeError),

    #[error(transparent)]
    Pager(#[from] PagerError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document is truncated")]
    Truncated,

    #[error("document is missing an _id field")]
    MissingId,
}

/// Numeric status codes, taken verbatim from `sakhadb.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    InvalidArg = 1,
    NoMem = 2,
    IoErr = 3,
    IoErrRead = 4,
    IoErrShortRead = 5,
    IoErrWrite = 6,
    IoErrFstat = 7,
    Full = 8,
    NotAvail = 9,
    NotADb = 10,
    NotFound = 11,
    CantOpen = 12,
}

impl From<&Error> for StatusCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Io { cause, .. } => StatusCode::from(cause),
            Error::Pager(e) => StatusCode::from(e),
            Error::Btree(e) => StatusCode::from(e),
            Error::Collection(e) => StatusCode::from(e),
            Error::Document(_) => StatusCode::InvalidArg,
        }
    }
}

impl From<&IoError> for StatusCode {
    fn from(err: &IoError) -> Self {
        match err {
            IoError::CantOpen => StatusCode::CantOpen,
            IoError::ShortRead { .. } => StatusCode::IoErrShortRead,
            IoError::Read(_) => StatusCode::IoErrRead,
            IoError::Write(_) => StatusCode::IoErrWrite,
            IoError::Full => StatusCode::Full,
            IoError::Fstat(_) => StatusCode::IoErrFstat,
        }
    }
}

impl From<&PagerError> for StatusCode {
    fn from(err: &PagerError) -> Self {
        match err {
            PagerError::NoSuchPage(_) => StatusCode::NotFound,
            PagerError::NotAvail(_) => StatusCode::NotAvail,
            PagerError::NotADatabase => StatusCode::NotADb,
            PagerError::CantOpen => StatusCode::CantOpen,
            PagerError::Io(e) => StatusCode::from(e),
        }
    }
}

impl From<&BtreeError> for StatusCode {
    fn from(err: &BtreeError) -> Self {
        match err {
            BtreeError::KeyTooLarge => StatusCode::InvalidArg,
            BtreeError::Pager(e) => StatusCode::from(e),
        }
    }
}

impl From<&CollectionError> for StatusCode {
    fn from(err: &CollectionError) -> Self {
        match err {
            CollectionError::NotFound(_) => StatusCode::NotFound,
            CollectionError::Btree(e) => StatusCode::from(e),
            CollectionError::Pager(e) => StatusCode::from(e),
            CollectionError::Document(_) => StatusCode::InvalidArg,
        }
    }
}
