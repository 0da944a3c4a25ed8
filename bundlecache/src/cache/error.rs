//! Cache error taxonomy.
//!
//! Every cache operation returns an error value; nothing here terminates
//! the process. NotFound variants name the missing package/channel/bundle,
//! decode failures carry the offending store key, and integrity mismatches
//! carry both digests so callers can decide to rebuild.

use std::error::Error as StdError;

use thiserror::Error;

use crate::model::ModelError;

/// Errors returned by cache build, load, integrity, and query operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The named package is not in the index.
    #[error("package {0:?} not found")]
    PackageNotFound(String),

    /// The named channel is not in the package.
    #[error("package {package:?}, channel {channel:?} not found")]
    ChannelNotFound { package: String, channel: String },

    /// The named bundle is not in the channel.
    #[error("package {package:?}, channel {channel:?}, bundle {bundle:?} not found")]
    BundleNotFound {
        package: String,
        channel: String,
        bundle: String,
    },

    /// No bundle in the channel declares the named predecessor.
    #[error("no bundle in package {package:?}, channel {channel:?} replaces or skips {name:?}")]
    NoSuchReplacement {
        package: String,
        channel: String,
        name: String,
    },

    /// No stored bundle provides the API triple.
    #[error("no channel entries found that provide {group}/{version}/{kind}")]
    NoSuchProvider {
        group: String,
        version: String,
        kind: String,
    },

    /// Stored bytes under `key` could not be decoded; the cache is suspect.
    #[error("decode {key:?}: {source}")]
    Decode {
        key: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A value destined for `key` could not be encoded.
    #[error("encode {key:?}: {source}")]
    Encode {
        key: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The stored digest disagrees with the freshly computed one (or is
    /// absent). The cache requires a rebuild; it is never auto-repaired.
    #[error("cache requires rebuild: stored digest is {stored:?}, computed digest is {computed:?}")]
    IntegrityMismatch {
        stored: Option<String>,
        computed: String,
    },

    /// A build precondition failed before any destructive write.
    #[error("build precondition failed: {0}")]
    Precondition(String),

    /// Deriving cache structures from the catalog model failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Underlying key-value store failure.
    #[error("store: {0}")]
    Store(#[from] redb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Several failures from one operation, none of which may be swallowed
    /// (e.g. a query body error plus a store close error).
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<CacheError>),
}

fn join_errors(errors: &[CacheError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<redb::DatabaseError> for CacheError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Store(err.into())
    }
}

impl From<redb::TransactionError> for CacheError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Store(err.into())
    }
}

impl From<redb::TableError> for CacheError {
    fn from(err: redb::TableError) -> Self {
        Self::Store(err.into())
    }
}

impl From<redb::StorageError> for CacheError {
    fn from(err: redb::StorageError) -> Self {
        Self::Store(err.into())
    }
}

impl From<redb::CommitError> for CacheError {
    fn from(err: redb::CommitError) -> Self {
        Self::Store(err.into())
    }
}
