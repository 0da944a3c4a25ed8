//! Persistent catalog cache: build, load, integrity, and queries.
//!
//! A [`Cache`] owns a base directory holding two private artifacts: the
//! key-value store file and a plaintext digest sidecar. The lifecycle is:
//!
//! 1. [`Cache::build`] persists an in-memory [`Catalog`] into the store and
//!    writes the digest;
//! 2. [`Cache::load`] (possibly in a different process) hydrates the
//!    lightweight package index into memory, leaving bundle records on
//!    disk;
//! 3. queries answer lookups against the index, opening the store lazily
//!    through a [`SharedHandle`] for targeted bundle reads and closing it
//!    when the last concurrent query finishes;
//! 4. [`Cache::check_integrity`] detects drift between the live catalog
//!    source and the cache at any time.
//!
//! Rebuilding while queries are in flight is unsupported: `build` assumes
//! exclusive access to the base directory.

mod digest;
mod error;
mod index;
mod shared;
mod store;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use error::CacheError;
pub use index::{BundleIndex, ChannelIndex, PackageIndex};
pub use shared::SharedHandle;

use store::Store;

use crate::model::Catalog;
use crate::record::{BundleRecord, BundleSender, ChannelEntry};
use crate::source::SourceFs;

/// Digest sidecar file name inside the cache base directory.
const DIGEST_FILE: &str = "cache.digest";

/// Persistent, queryable cache of one catalog.
pub struct Cache {
    base_dir: PathBuf,
    index: BTreeMap<String, PackageIndex>,
    store: SharedHandle<Store>,
}

impl Cache {
    /// Create a handle on a cache base directory. No I/O happens here; the
    /// store is opened lazily by queries and explicitly by `build`/`load`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let store_path = base_dir.join(store::STORE_FILE);
        let store = SharedHandle::new(move || Store::open(&store_path), |_| Ok(()));
        Self {
            base_dir,
            index: BTreeMap::new(),
            store,
        }
    }

    fn store_path(&self) -> PathBuf {
        self.base_dir.join(store::STORE_FILE)
    }

    fn digest_path(&self) -> PathBuf {
        self.base_dir.join(DIGEST_FILE)
    }

    /// Persist `catalog` into the base directory and write the integrity
    /// digest.
    ///
    /// The base directory must be empty (or absent): a partial prior cache
    /// is never merged into. Both store partitions are written in a single
    /// atomic commit, and the digest file is written only after the store
    /// is complete, so a failure at any step leaves a cache that
    /// [`check_integrity`](Self::check_integrity) correctly rejects.
    pub fn build(&self, fsys: &dyn SourceFs, catalog: &Catalog) -> Result<(), CacheError> {
        ensure_empty_dir(&self.base_dir)?;

        let mut index_rows = Vec::new();
        let mut bundle_rows = Vec::new();
        for package in catalog.packages.values() {
            let package_index = PackageIndex::from_model(package)?;
            let key = store::index_key(&package.name);
            let value = serde_json::to_vec(&package_index).map_err(|err| CacheError::Encode {
                key: key.clone(),
                source: Box::new(err),
            })?;
            index_rows.push((key, value));

            for channel in package.channels.values() {
                for bundle in channel.bundles.values() {
                    let record = BundleRecord::from_model(&package.name, &channel.name, bundle);
                    let key = store::bundle_key(&package.name, &channel.name, &bundle.name);
                    let value = record.encode().map_err(|err| CacheError::Encode {
                        key: key.clone(),
                        source: Box::new(err),
                    })?;
                    bundle_rows.push((key, value));
                }
            }
        }

        let store = Store::create(&self.store_path())?;
        store.write_all(&index_rows, &bundle_rows)?;
        drop(store);

        let digest = self.store.with(|store| digest::compute(fsys, store))?;
        fs::write(self.digest_path(), &digest)?;

        tracing::info!(
            packages = index_rows.len(),
            bundles = bundle_rows.len(),
            digest = %digest,
            "built catalog cache"
        );
        Ok(())
    }

    /// Hydrate the package index from the store.
    ///
    /// Only the index partition is decoded; bundle records stay on disk and
    /// are fetched one key at a time by queries, keeping resident memory
    /// bounded by index size rather than total bundle payload.
    pub fn load(&mut self) -> Result<(), CacheError> {
        let mut packages = BTreeMap::new();
        self.store.with(|store| {
            store.for_each_index(|key, value| {
                let package: PackageIndex =
                    serde_json::from_slice(value).map_err(|err| CacheError::Decode {
                        key: key.to_string(),
                        source: Box::new(err),
                    })?;
                packages.insert(package.name.clone(), package);
                Ok(())
            })
        })?;
        tracing::debug!(packages = packages.len(), "loaded package index");
        self.index = packages;
        Ok(())
    }

    /// Verify that the stored digest matches one freshly computed from
    /// `fsys` and the store contents. A mismatch (or missing digest file)
    /// means the cache requires a rebuild; rebuilding is the caller's
    /// decision.
    pub fn check_integrity(&self, fsys: &dyn SourceFs) -> Result<(), CacheError> {
        let stored = self.existing_digest()?;
        let computed = self.store.with(|store| digest::compute(fsys, store))?;
        match stored {
            Some(ref digest) if *digest == computed => {
                tracing::debug!(digest = %computed, "cache digest verified");
                Ok(())
            }
            stored => Err(CacheError::IntegrityMismatch { stored, computed }),
        }
    }

    fn existing_digest(&self) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.digest_path()) {
            Ok(digest) => Ok(Some(digest.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Names of every package in the loaded index.
    pub fn list_packages(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Index record of one package: default channel, channels, heads, and
    /// per-bundle edge summaries.
    pub fn get_package(&self, package: &str) -> Result<&PackageIndex, CacheError> {
        self.index
            .get(package)
            .ok_or_else(|| CacheError::PackageNotFound(package.to_string()))
    }

    /// Full record of one bundle occurrence.
    ///
    /// Index membership is resolved first, so absences fail with an error
    /// naming the missing level before any store access. The returned
    /// record has embedded-content fields stripped when it carries an
    /// external content locator, and the synthetic `replaces`/`skips`
    /// fields cleared: the index, not the record, is authoritative for
    /// upgrade edges.
    pub fn get_bundle(
        &self,
        package: &str,
        channel: &str,
        name: &str,
    ) -> Result<BundleRecord, CacheError> {
        let (pkg, ch) = self.channel_index(package, channel)?;
        let bundle = ch
            .bundles
            .get(name)
            .ok_or_else(|| CacheError::BundleNotFound {
                package: package.to_string(),
                channel: channel.to_string(),
                bundle: name.to_string(),
            })?;

        let mut record = self.load_record(&pkg.name, &ch.name, &bundle.name)?;
        record.strip_embedded_content();
        record.replaces = None;
        record.skips.clear();
        Ok(record)
    }

    /// Full record of the channel's head bundle, per the index.
    pub fn get_bundle_for_channel(
        &self,
        package: &str,
        channel: &str,
    ) -> Result<BundleRecord, CacheError> {
        let (_, ch) = self.channel_index(package, channel)?;
        let head = ch.head.clone();
        self.get_bundle(package, channel, &head)
    }

    /// The bundle that supersedes `name` in the channel, either by
    /// replacing it or by skipping it.
    ///
    /// When several bundles qualify, the one with the highest declared
    /// version wins (bundle name breaks any remaining tie). This tie-break
    /// is a documented policy choice, not a catalog invariant.
    pub fn get_bundle_that_replaces(
        &self,
        name: &str,
        package: &str,
        channel: &str,
    ) -> Result<BundleRecord, CacheError> {
        let (_, ch) = self.channel_index(package, channel)?;
        let winner = ch
            .bundles
            .values()
            .filter(|b| b.supersedes(name))
            .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)))
            .ok_or_else(|| CacheError::NoSuchReplacement {
                package: package.to_string(),
                channel: channel.to_string(),
                name: name.to_string(),
            })?;
        let winner = winner.name.clone();
        self.get_bundle(package, channel, &winner)
    }

    /// Every channel entry whose bundle provides the API triple: one entry
    /// for the bundle's `replaces` edge plus one per skipped predecessor.
    pub fn get_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<Vec<ChannelEntry>, CacheError> {
        let mut entries = Vec::new();
        for package in self.index.values() {
            for channel in package.channels.values() {
                for bundle in channel.bundles.values() {
                    if !bundle.provides(group, version, kind) {
                        continue;
                    }
                    entries.push(ChannelEntry {
                        package: package.name.clone(),
                        channel: channel.name.clone(),
                        name: bundle.name.clone(),
                        replaces: bundle.replaces.clone(),
                    });
                    for skip in &bundle.skips {
                        entries.push(ChannelEntry {
                            package: package.name.clone(),
                            channel: channel.name.clone(),
                            name: bundle.name.clone(),
                            replaces: Some(skip.clone()),
                        });
                    }
                }
            }
        }
        if entries.is_empty() {
            return Err(no_such_provider(group, version, kind));
        }
        Ok(entries)
    }

    /// Like [`get_channel_entries_that_provide`](Self::get_channel_entries_that_provide),
    /// but restricted, per channel, to bundles still reachable from the
    /// channel head (i.e. not superseded), keeping only the highest-version
    /// match in each channel.
    pub fn get_latest_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<Vec<ChannelEntry>, CacheError> {
        let mut entries = Vec::new();
        for package in self.index.values() {
            for channel in package.channels.values() {
                let reachable = channel.reachable_from_head();
                let best = channel
                    .bundles
                    .values()
                    .filter(|b| {
                        reachable.contains(b.name.as_str()) && b.provides(group, version, kind)
                    })
                    .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));
                if let Some(bundle) = best {
                    entries.push(ChannelEntry {
                        package: package.name.clone(),
                        channel: channel.name.clone(),
                        name: bundle.name.clone(),
                        replaces: bundle.replaces.clone(),
                    });
                }
            }
        }
        if entries.is_empty() {
            return Err(no_such_provider(group, version, kind));
        }
        Ok(entries)
    }

    /// The full record of the bundle that provides the API triple, chosen
    /// from each package's default channel among non-superseded bundles.
    /// Across packages, the highest version wins (package name breaks
    /// ties).
    pub fn get_bundle_that_provides(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Result<BundleRecord, CacheError> {
        let entries = self.get_latest_channel_entries_that_provide(group, version, kind)?;

        let mut best: Option<(&BundleIndex, &str, &str)> = None;
        for entry in &entries {
            let package = self.get_package(&entry.package)?;
            if entry.channel != package.default_channel {
                continue;
            }
            let Some(channel) = package.channels.get(&entry.channel) else {
                continue;
            };
            let Some(bundle) = channel.bundles.get(&entry.name) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((current, current_pkg, _)) => {
                    match bundle.version.cmp(&current.version) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Equal => entry.package.as_str() < current_pkg,
                    }
                }
            };
            if better {
                best = Some((bundle, entry.package.as_str(), entry.channel.as_str()));
            }
        }

        match best {
            Some((bundle, package, channel)) => {
                let (package, channel, name) =
                    (package.to_string(), channel.to_string(), bundle.name.clone());
                self.get_bundle(&package, &channel, &name)
            }
            None => Err(no_such_provider(group, version, kind)),
        }
    }

    /// Every stored bundle record, in store key order.
    pub fn list_bundles(&self) -> Result<Vec<BundleRecord>, CacheError> {
        let mut records = Vec::new();
        self.send_bundles(&mut records)?;
        Ok(records)
    }

    /// Push every stored bundle record through `sender`, aborting on the
    /// first decode or send error. Records with an external content locator
    /// are stripped of embedded-content fields; the synthetic upgrade edges
    /// are kept, as in bulk export the index is not consulted.
    pub fn send_bundles(&self, sender: &mut dyn BundleSender) -> Result<(), CacheError> {
        self.store.with(|store| {
            store.for_each_bundle(|key, value| {
                let mut record =
                    BundleRecord::decode(value).map_err(|err| CacheError::Decode {
                        key: key.to_string(),
                        source: Box::new(err),
                    })?;
                record.strip_embedded_content();
                sender.send(record)
            })
        })
    }

    fn channel_index(
        &self,
        package: &str,
        channel: &str,
    ) -> Result<(&PackageIndex, &ChannelIndex), CacheError> {
        let pkg = self.get_package(package)?;
        let ch = pkg
            .channels
            .get(channel)
            .ok_or_else(|| CacheError::ChannelNotFound {
                package: package.to_string(),
                channel: channel.to_string(),
            })?;
        Ok((pkg, ch))
    }

    fn load_record(
        &self,
        package: &str,
        channel: &str,
        name: &str,
    ) -> Result<BundleRecord, CacheError> {
        let key = store::bundle_key(package, channel, name);
        let bytes = self.store.with(|store| {
            store
                .get_bundle(&key)?
                .ok_or_else(|| CacheError::BundleNotFound {
                    package: package.to_string(),
                    channel: channel.to_string(),
                    bundle: name.to_string(),
                })
        })?;
        BundleRecord::decode(&bytes).map_err(|err| CacheError::Decode {
            key,
            source: Box::new(err),
        })
    }
}

fn no_such_provider(group: &str, version: &str, kind: &str) -> CacheError {
    CacheError::NoSuchProvider {
        group: group.to_string(),
        version: version.to_string(),
        kind: kind.to_string(),
    }
}

/// Create `dir` if absent; fail if it exists and is not an empty directory.
fn ensure_empty_dir(dir: &Path) -> Result<(), CacheError> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(CacheError::Precondition(format!(
                    "cache directory {} is not empty",
                    dir.display()
                )));
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_empty_dir_creates_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");
        ensure_empty_dir(&dir).unwrap();
        assert!(dir.is_dir());
        // Idempotent while still empty.
        ensure_empty_dir(&dir).unwrap();
    }

    #[test]
    fn test_ensure_empty_dir_rejects_populated() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("leftover"), b"x").unwrap();
        let err = ensure_empty_dir(temp.path()).unwrap_err();
        assert!(matches!(err, CacheError::Precondition(_)));
    }

    #[test]
    fn test_queries_before_load_report_not_found() {
        let temp = TempDir::new().unwrap();
        let cache = Cache::new(temp.path().join("cache"));
        let err = cache.get_bundle("etcd", "stable", "etcd.v1").unwrap_err();
        assert!(matches!(err, CacheError::PackageNotFound(_)));
    }
}
