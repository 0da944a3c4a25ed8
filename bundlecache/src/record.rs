//! Full bundle records and the record egress seam.
//!
//! [`BundleRecord`] is the value stored in the bundle partition: everything
//! the catalog knows about one bundle occurrence in one channel. Records are
//! encoded with `bincode` for compactness; the lightweight per-package index
//! (see [`cache::index`](crate::cache)) answers structural queries without
//! touching them.

use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::model::{self, ApiKey, RelatedImage};

/// Fully decoded bundle record, as persisted in the bundle partition.
///
/// The `replaces`/`skips` fields are synthetic: they are populated at build
/// time but the package index is authoritative for upgrade edges, so point
/// lookups return them cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRecord {
    /// Bundle name.
    pub name: String,

    /// Owning package name.
    pub package: String,

    /// Owning channel name. The same logical bundle may appear in several
    /// channels; each occurrence is an independent record.
    pub channel: String,

    /// Declared version, rendered as a string.
    pub version: String,

    /// Synthetic upgrade edge: the single predecessor this bundle replaces.
    pub replaces: Option<String>,

    /// Synthetic upgrade edges: predecessors superseded without replacement.
    pub skips: Vec<String>,

    /// Version-range expression of superseded predecessors, if declared.
    pub skip_range: Option<String>,

    /// API capabilities this bundle provides.
    pub provided_apis: Vec<ApiKey>,

    /// API capabilities this bundle requires.
    pub required_apis: Vec<ApiKey>,

    /// External content location; empty for embedded-content bundles.
    pub content_path: String,

    /// Images referenced by the bundle content.
    pub related_images: Vec<RelatedImage>,

    /// Full descriptor document, JSON-encoded. Only meaningful for
    /// embedded-content bundles.
    pub descriptor_json: String,

    /// Embedded manifest objects. Only meaningful for embedded-content
    /// bundles.
    pub objects: Vec<String>,
}

impl BundleRecord {
    /// Derive the record for one bundle occurrence in one channel.
    pub fn from_model(package: &str, channel: &str, bundle: &model::Bundle) -> Self {
        Self {
            name: bundle.name.clone(),
            package: package.to_string(),
            channel: channel.to_string(),
            version: bundle.version.to_string(),
            replaces: bundle.replaces.clone(),
            skips: bundle.skips.clone(),
            skip_range: bundle.skip_range.clone(),
            provided_apis: bundle.provided_apis.clone(),
            required_apis: bundle.required_apis.clone(),
            content_path: bundle.content_path.clone(),
            related_images: bundle.related_images.clone(),
            descriptor_json: bundle.descriptor_json.clone(),
            objects: bundle.objects.clone(),
        }
    }

    /// Encode for the bundle partition.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from the bundle partition.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Clear fields that are only meaningful for embedded-content bundles.
    ///
    /// When a record carries an external content locator, the raw descriptor
    /// text and embedded object list cannot be guaranteed consistent with
    /// the external content, so lookups strip them.
    pub fn strip_embedded_content(&mut self) {
        if !self.content_path.is_empty() {
            self.descriptor_json.clear();
            self.objects.clear();
        }
    }
}

/// One row of a channel-entry query: a bundle occurrence plus the upgrade
/// edge it was reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub package: String,
    pub channel: String,
    pub name: String,

    /// The predecessor this entry supersedes, if the entry represents an
    /// upgrade edge rather than a bare bundle occurrence.
    pub replaces: Option<String>,
}

/// One-at-a-time egress for bulk record export.
///
/// [`Cache::send_bundles`](crate::cache::Cache::send_bundles) pushes each
/// decoded record through this seam; batching and back-pressure are the
/// sender's concern.
pub trait BundleSender {
    fn send(&mut self, bundle: BundleRecord) -> Result<(), CacheError>;
}

/// Collects sent records in memory.
impl BundleSender for Vec<BundleRecord> {
    fn send(&mut self, bundle: BundleRecord) -> Result<(), CacheError> {
        self.push(bundle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn sample_bundle() -> model::Bundle {
        let mut bundle = model::Bundle::new("etcd.v1.2.3", Version::new(1, 2, 3));
        bundle.replaces = Some("etcd.v1.2.2".to_string());
        bundle.skips = vec!["etcd.v1.2.1".to_string()];
        bundle.provided_apis = vec![ApiKey::new("etcd.io", "v1", "EtcdCluster")];
        bundle.content_path = "quay.io/etcd/bundle:v1.2.3".to_string();
        bundle.descriptor_json = "{\"kind\":\"csv\"}".to_string();
        bundle.objects = vec!["{}".to_string()];
        bundle
    }

    #[test]
    fn test_record_round_trip() {
        let record = BundleRecord::from_model("etcd", "stable", &sample_bundle());
        let bytes = record.encode().unwrap();
        let decoded = BundleRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_strip_embedded_content_with_external_path() {
        let mut record = BundleRecord::from_model("etcd", "stable", &sample_bundle());
        record.strip_embedded_content();
        assert!(record.descriptor_json.is_empty());
        assert!(record.objects.is_empty());
        // Edges and identity are untouched.
        assert_eq!(record.replaces.as_deref(), Some("etcd.v1.2.2"));
    }

    #[test]
    fn test_strip_embedded_content_keeps_embedded_bundles_intact() {
        let mut bundle = sample_bundle();
        bundle.content_path.clear();
        let mut record = BundleRecord::from_model("etcd", "stable", &bundle);
        record.strip_embedded_content();
        assert_eq!(record.descriptor_json, "{\"kind\":\"csv\"}");
        assert_eq!(record.objects.len(), 1);
    }

    #[test]
    fn test_vec_sender_collects_in_order() {
        let mut sender: Vec<BundleRecord> = Vec::new();
        for name in ["a", "b", "c"] {
            let record = BundleRecord {
                name: name.to_string(),
                ..BundleRecord::default()
            };
            sender.send(record).unwrap();
        }
        let names: Vec<_> = sender.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
