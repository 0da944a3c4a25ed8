//! Content-derived integrity digest.
//!
//! The digest is a 64-bit FNV-1a hash, seeded with a cache-format tag and
//! fed, in order: every source catalog file (path then content, in path
//! order), every index-partition pair, then every bundle-partition pair
//! (store iteration order). Any byte-level change to the source or the
//! store produces a different digest, which is deliberately conservative:
//! the cache is invalidated rather than risking silent staleness.

use std::hash::Hasher;

use fnv::FnvHasher;

use super::error::CacheError;
use super::store::Store;
use crate::source::SourceFs;

/// Literal seed naming the cache format. Bumping this invalidates every
/// existing cache, which is how format changes force rebuilds.
pub(crate) const FORMAT_TAG: &str = "redb.v1";

/// Compute the digest of a source catalog plus an opened store.
pub(crate) fn compute(fsys: &dyn SourceFs, store: &Store) -> Result<String, CacheError> {
    let mut hasher = FnvHasher::default();
    hasher.write(FORMAT_TAG.as_bytes());

    for entry in fsys.entries()? {
        hasher.write(entry.path.as_bytes());
        hasher.write(&entry.data);
    }

    store.for_each_index(|key, value| {
        hasher.write(key.as_bytes());
        hasher.write(value);
        Ok(())
    })?;
    store.for_each_bundle(|key, value| {
        hasher.write(key.as_bytes());
        hasher.write(value);
        Ok(())
    })?;

    Ok(format!("{:016x}", hasher.finish()))
}
