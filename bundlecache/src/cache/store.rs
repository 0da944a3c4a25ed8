//! Persistent store layout.
//!
//! One `redb` database file holds two logical partitions:
//!
//! - the **index** table, key `"<package>.json"`, value = JSON-encoded
//!   [`PackageIndex`](super::index::PackageIndex);
//! - the **bundles** table, key `"<package>/<channel>/<bundle>.bin"`,
//!   value = bincode-encoded [`BundleRecord`](crate::record::BundleRecord).
//!
//! Both partitions are plain key-value maps with no secondary indexes; all
//! derived lookups happen against the in-memory index plus targeted
//! single-key reads here. Build writes both tables in a single transaction,
//! so a crash mid-build can never expose a partially populated store.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::error::CacheError;

/// Store file name inside the cache base directory.
pub(crate) const STORE_FILE: &str = "cache.redb";

const INDEX_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("index");
const BUNDLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bundles");

/// Index-partition key for a package.
pub(crate) fn index_key(package: &str) -> String {
    format!("{package}.json")
}

/// Bundle-partition key for one bundle occurrence in one channel.
pub(crate) fn bundle_key(package: &str, channel: &str, bundle: &str) -> String {
    format!("{package}/{channel}/{bundle}.bin")
}

/// Handle to the on-disk key-value store.
pub struct Store {
    db: Database,
}

impl Store {
    /// Create a fresh store file. Build-time only.
    pub(crate) fn create(path: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            db: Database::create(path)?,
        })
    }

    /// Open an existing store file for querying.
    pub(crate) fn open(path: &Path) -> Result<Self, CacheError> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    /// Write both partitions in one atomic commit: either every key is
    /// visible to readers or none is.
    pub(crate) fn write_all(
        &self,
        index_rows: &[(String, Vec<u8>)],
        bundle_rows: &[(String, Vec<u8>)],
    ) -> Result<(), CacheError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(INDEX_TABLE)?;
            for (key, value) in index_rows {
                table.insert(key.as_str(), value.as_slice())?;
            }
        }
        {
            let mut table = txn.open_table(BUNDLES_TABLE)?;
            for (key, value) in bundle_rows {
                table.insert(key.as_str(), value.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a single bundle record by key.
    pub(crate) fn get_bundle(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BUNDLES_TABLE)?;
        Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Visit every index-partition entry in key order.
    pub(crate) fn for_each_index(
        &self,
        f: impl FnMut(&str, &[u8]) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        self.for_each(INDEX_TABLE, f)
    }

    /// Visit every bundle-partition entry in key order.
    pub(crate) fn for_each_bundle(
        &self,
        f: impl FnMut(&str, &[u8]) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        self.for_each(BUNDLES_TABLE, f)
    }

    fn for_each(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        mut f: impl FnMut(&str, &[u8]) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        for item in table.iter()? {
            let (key, value) = item?;
            f(key.value(), value.value())?;
        }
        Ok(())
    }
}
