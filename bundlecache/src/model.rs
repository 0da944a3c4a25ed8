//! In-memory catalog model.
//!
//! This module defines the decoded representation of a catalog that the
//! cache consumes: packages own channels, channels own bundles, and bundles
//! carry upgrade edges and API capability declarations. The model is
//! produced by an external loader and treated as read-only input to
//! [`Cache::build`](crate::cache::Cache::build).
//!
//! # Structure
//!
//! ```text
//! Catalog
//! └── Package (name, default channel)
//!     └── Channel (name)
//!         └── Bundle (name, version, upgrade edges, provided/required APIs)
//! ```
//!
//! All collections are `BTreeMap`s so that build output and digests are
//! deterministic regardless of how the loader assembled the model.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while deriving cache structures from the model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// No bundle in the channel is free of incoming upgrade edges.
    ///
    /// Either the channel is empty or its replaces/skips edges form a cycle.
    #[error("no channel head found in channel {channel:?} (empty channel or upgrade-edge cycle)")]
    NoChannelHead { channel: String },

    /// More than one bundle has no incoming upgrade edge.
    #[error("multiple channel heads found in channel {channel:?}: {heads:?}")]
    MultipleChannelHeads { channel: String, heads: Vec<String> },

    /// A bundle's `replaces` edge names a bundle that is not in the channel.
    #[error("bundle {bundle:?} in channel {channel:?} replaces {replaces:?}, which is not in the channel")]
    DanglingReplaces {
        channel: String,
        bundle: String,
        replaces: String,
    },
}

/// An API resource capability, identified by group/version/kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub group: String,
    pub version: String,
    pub kind: String,

    /// Plural resource name, carried for presentation; not part of identity.
    // `skip_serializing_if` would break bincode decoding of `BundleRecord`
    // (non-self-describing format), so the field is always serialized.
    #[serde(default)]
    pub plural: String,
}

impl ApiKey {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: String::new(),
        }
    }

    /// Check identity match on the group/version/kind triple.
    pub fn matches(&self, group: &str, version: &str, kind: &str) -> bool {
        self.group == group && self.version == version && self.kind == kind
    }
}

/// A container image referenced by a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    pub name: String,
    pub image: String,
}

/// One immutable, versioned unit of packaged software within a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Bundle name, unique within its channel.
    pub name: String,

    /// Declared software version.
    pub version: Version,

    /// Name of the single predecessor this bundle replaces, if any.
    pub replaces: Option<String>,

    /// Names of predecessors this bundle supersedes without replacing.
    pub skips: Vec<String>,

    /// Optional version-range expression of superseded predecessors.
    pub skip_range: Option<String>,

    /// API capabilities this bundle provides.
    pub provided_apis: Vec<ApiKey>,

    /// API capabilities this bundle requires.
    pub required_apis: Vec<ApiKey>,

    /// Location of the bundle content (e.g. an image reference). Empty for
    /// bundles whose content is embedded in the catalog.
    pub content_path: String,

    /// Images referenced by the bundle content.
    pub related_images: Vec<RelatedImage>,

    /// Full descriptor document (CSV-equivalent metadata), JSON-encoded.
    pub descriptor_json: String,

    /// Embedded manifest objects, JSON-encoded.
    pub objects: Vec<String>,
}

impl Bundle {
    /// Create a bundle with the given identity and no edges or properties.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            replaces: None,
            skips: Vec::new(),
            skip_range: None,
            provided_apis: Vec::new(),
            required_apis: Vec::new(),
            content_path: String::new(),
            related_images: Vec::new(),
            descriptor_json: String::new(),
            objects: Vec::new(),
        }
    }
}

/// A named upgrade track within a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    /// Channel name, unique within its package.
    pub name: String,

    /// Bundles keyed by name.
    pub bundles: BTreeMap<String, Bundle>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bundles: BTreeMap::new(),
        }
    }

    /// Add a bundle to the channel, keyed by its name.
    pub fn add_bundle(&mut self, bundle: Bundle) {
        self.bundles.insert(bundle.name.clone(), bundle);
    }

    /// Resolve the channel head: the unique bundle that no other bundle in
    /// the channel replaces or skips.
    ///
    /// Head resolution is a pure function of the edge set. It fails if the
    /// edges form a cycle (no bundle is free of incoming edges) or if the
    /// graph is disconnected in a way that yields several candidates.
    pub fn head(&self) -> Result<&Bundle, ModelError> {
        let mut incoming: BTreeSet<&str> = BTreeSet::new();
        for bundle in self.bundles.values() {
            if let Some(replaces) = &bundle.replaces {
                incoming.insert(replaces.as_str());
            }
            for skip in &bundle.skips {
                incoming.insert(skip.as_str());
            }
        }

        let mut heads: Vec<&Bundle> = self
            .bundles
            .values()
            .filter(|b| !incoming.contains(b.name.as_str()))
            .collect();

        match heads.len() {
            0 => Err(ModelError::NoChannelHead {
                channel: self.name.clone(),
            }),
            1 => Ok(heads.remove(0)),
            _ => Err(ModelError::MultipleChannelHeads {
                channel: self.name.clone(),
                heads: heads.iter().map(|b| b.name.clone()).collect(),
            }),
        }
    }
}

/// A versioned software package: a set of channels plus a default channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    /// Package name, unique catalog-wide.
    pub name: String,

    /// Optional human-readable description.
    pub description: String,

    /// Name of the channel new consumers should follow.
    pub default_channel: String,

    /// Channels keyed by name.
    pub channels: BTreeMap<String, Channel>,
}

impl Package {
    pub fn new(name: impl Into<String>, default_channel: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default_channel: default_channel.into(),
            channels: BTreeMap::new(),
        }
    }

    /// Add a channel to the package, keyed by its name.
    pub fn add_channel(&mut self, channel: Channel) {
        self.channels.insert(channel.name.clone(), channel);
    }
}

/// A full decoded catalog: packages keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub packages: BTreeMap<String, Package>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package to the catalog, keyed by its name.
    pub fn add_package(&mut self, package: Package) {
        self.packages.insert(package.name.clone(), package);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_channel() -> Channel {
        // a.v1 <- a.v2 <- a.v3
        let mut ch = Channel::new("stable");
        ch.add_bundle(Bundle::new("a.v1", Version::new(1, 0, 0)));
        let mut b2 = Bundle::new("a.v2", Version::new(2, 0, 0));
        b2.replaces = Some("a.v1".to_string());
        ch.add_bundle(b2);
        let mut b3 = Bundle::new("a.v3", Version::new(3, 0, 0));
        b3.replaces = Some("a.v2".to_string());
        ch.add_bundle(b3);
        ch
    }

    #[test]
    fn test_head_of_linear_chain() {
        let ch = chain_channel();
        assert_eq!(ch.head().unwrap().name, "a.v3");
    }

    #[test]
    fn test_head_of_cycle_fails() {
        let mut ch = chain_channel();
        // Introduce a cycle: a.v1 replaces a.v3.
        ch.bundles.get_mut("a.v1").unwrap().replaces = Some("a.v3".to_string());
        assert_eq!(
            ch.head(),
            Err(ModelError::NoChannelHead {
                channel: "stable".to_string()
            })
        );
    }

    #[test]
    fn test_head_with_multiple_candidates_fails() {
        let mut ch = chain_channel();
        ch.add_bundle(Bundle::new("orphan.v1", Version::new(9, 0, 0)));
        match ch.head() {
            Err(ModelError::MultipleChannelHeads { heads, .. }) => {
                assert_eq!(heads, vec!["a.v3".to_string(), "orphan.v1".to_string()]);
            }
            other => panic!("expected MultipleChannelHeads, got {other:?}"),
        }
    }

    #[test]
    fn test_head_counts_skips_as_incoming_edges() {
        let mut ch = Channel::new("fast");
        ch.add_bundle(Bundle::new("b.v1", Version::new(1, 0, 0)));
        let mut b2 = Bundle::new("b.v2", Version::new(2, 0, 0));
        b2.skips = vec!["b.v1".to_string()];
        ch.add_bundle(b2);
        assert_eq!(ch.head().unwrap().name, "b.v2");
    }

    #[test]
    fn test_head_of_empty_channel_fails() {
        let ch = Channel::new("empty");
        assert!(matches!(ch.head(), Err(ModelError::NoChannelHead { .. })));
    }

    #[test]
    fn test_api_key_matches() {
        let api = ApiKey::new("example.io", "v1", "Widget");
        assert!(api.matches("example.io", "v1", "Widget"));
        assert!(!api.matches("example.io", "v2", "Widget"));
        assert!(!api.matches("other.io", "v1", "Widget"));
    }
}
