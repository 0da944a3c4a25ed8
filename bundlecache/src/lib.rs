//! BundleCache - persistence and query core for versioned package catalogs.
//!
//! This library takes an in-memory catalog model (packages, channels,
//! bundles and their upgrade-edge metadata), persists it into a compact
//! on-disk cache, verifies that an existing cache still matches its source
//! catalog, and answers point and graph queries against the cache with safe
//! concurrent access - without re-parsing the source catalog on every
//! query.
//!
//! # Overview
//!
//! - [`model`]: the decoded catalog supplied by an external loader.
//! - [`cache`]: build/load/integrity pipeline, the [`SharedHandle`]
//!   concurrency primitive, and the query engine.
//! - [`record`]: full bundle records and the one-at-a-time egress seam.
//! - [`source`]: the ordered `(path, content)` view of the catalog source
//!   used for integrity digests.
//!
//! # Example
//!
//! ```no_run
//! use bundlecache::{Cache, Catalog, MemSource};
//!
//! # fn main() -> Result<(), bundlecache::CacheError> {
//! let catalog = Catalog::new(); // supplied by a catalog loader
//! let source = MemSource::new(); // the raw catalog files
//!
//! let mut cache = Cache::new("/var/cache/catalog");
//! cache.build(&source, &catalog)?;
//! cache.load()?;
//! cache.check_integrity(&source)?;
//!
//! let bundle = cache.get_bundle_for_channel("etcd", "stable")?;
//! println!("head of etcd/stable is {}", bundle.name);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod model;
pub mod record;
pub mod source;

pub use cache::{BundleIndex, Cache, CacheError, ChannelIndex, PackageIndex, SharedHandle};
pub use model::{ApiKey, Bundle, Catalog, Channel, ModelError, Package, RelatedImage};
pub use record::{BundleRecord, BundleSender, ChannelEntry};
pub use source::{DirSource, MemSource, SourceEntry, SourceFs};
