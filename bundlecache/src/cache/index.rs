//! Lightweight per-package index.
//!
//! The index partition stores one [`PackageIndex`] per package: channel
//! membership, per-channel heads, and per-bundle upgrade-edge and
//! capability summaries. It is small enough to hydrate fully into memory at
//! load time, which keeps every structural query off the (much larger)
//! bundle partition.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::model::{self, ApiKey, ModelError};

/// Edge and capability summary of one bundle, as persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleIndex {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provided_apis: Vec<ApiKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_apis: Vec<ApiKey>,
}

impl BundleIndex {
    /// Whether this bundle declares the given provided-API triple.
    pub fn provides(&self, group: &str, version: &str, kind: &str) -> bool {
        self.provided_apis
            .iter()
            .any(|api| api.matches(group, version, kind))
    }

    /// Whether this bundle supersedes the named predecessor.
    pub fn supersedes(&self, name: &str) -> bool {
        self.replaces.as_deref() == Some(name) || self.skips.iter().any(|s| s == name)
    }
}

/// Channel summary: the resolved head plus every bundle's summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIndex {
    pub name: String,
    pub head: String,
    pub bundles: BTreeMap<String, BundleIndex>,
}

impl ChannelIndex {
    /// Bundle names reachable from the head by following `replaces` edges
    /// backward. These are the non-superseded entries of the channel.
    pub(crate) fn reachable_from_head(&self) -> BTreeSet<&str> {
        let mut reachable = BTreeSet::new();
        let mut next = Some(self.head.as_str());
        while let Some(name) = next {
            if !reachable.insert(name) {
                break;
            }
            next = self.bundles.get(name).and_then(|b| b.replaces.as_deref());
        }
        reachable
    }
}

/// Per-package index record, the value of the index partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIndex {
    pub name: String,
    pub default_channel: String,
    pub channels: BTreeMap<String, ChannelIndex>,
}

impl PackageIndex {
    /// Derive the index for a package, resolving each channel's head and
    /// validating that every `replaces` edge targets a bundle in the same
    /// channel. `skips` targets may be absent: skipped releases are
    /// routinely pruned from catalogs.
    pub(crate) fn from_model(package: &model::Package) -> Result<Self, ModelError> {
        let mut channels = BTreeMap::new();
        for channel in package.channels.values() {
            let head = channel.head()?;
            let mut bundles = BTreeMap::new();
            for bundle in channel.bundles.values() {
                if let Some(replaces) = &bundle.replaces {
                    if !channel.bundles.contains_key(replaces) {
                        return Err(ModelError::DanglingReplaces {
                            channel: channel.name.clone(),
                            bundle: bundle.name.clone(),
                            replaces: replaces.clone(),
                        });
                    }
                }
                bundles.insert(
                    bundle.name.clone(),
                    BundleIndex {
                        name: bundle.name.clone(),
                        version: bundle.version.clone(),
                        replaces: bundle.replaces.clone(),
                        skips: bundle.skips.clone(),
                        skip_range: bundle.skip_range.clone(),
                        provided_apis: bundle.provided_apis.clone(),
                        required_apis: bundle.required_apis.clone(),
                    },
                );
            }
            channels.insert(
                channel.name.clone(),
                ChannelIndex {
                    name: channel.name.clone(),
                    head: head.name.clone(),
                    bundles,
                },
            );
        }
        Ok(Self {
            name: package.name.clone(),
            default_channel: package.default_channel.clone(),
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bundle, Channel, Package};

    fn sample_package() -> Package {
        let mut package = Package::new("etcd", "stable");
        let mut channel = Channel::new("stable");
        channel.add_bundle(Bundle::new("etcd.v1", Version::new(1, 0, 0)));
        let mut v2 = Bundle::new("etcd.v2", Version::new(2, 0, 0));
        v2.replaces = Some("etcd.v1".to_string());
        v2.skips = vec!["etcd.v1.5".to_string()];
        channel.add_bundle(v2);
        package.add_channel(channel);
        package
    }

    #[test]
    fn test_from_model_resolves_head() {
        let index = PackageIndex::from_model(&sample_package()).unwrap();
        let channel = &index.channels["stable"];
        assert_eq!(channel.head, "etcd.v2");
        assert_eq!(channel.bundles.len(), 2);
    }

    #[test]
    fn test_from_model_rejects_dangling_replaces() {
        let mut package = sample_package();
        let channel = package.channels.get_mut("stable").unwrap();
        let mut v3 = Bundle::new("etcd.v3", Version::new(3, 0, 0));
        v3.replaces = Some("etcd.v2.9".to_string());
        channel.add_bundle(v3);

        match PackageIndex::from_model(&package) {
            Err(ModelError::DanglingReplaces { replaces, .. }) => {
                assert_eq!(replaces, "etcd.v2.9");
            }
            other => panic!("expected DanglingReplaces, got {other:?}"),
        }
    }

    #[test]
    fn test_from_model_allows_absent_skip_targets() {
        // sample_package skips "etcd.v1.5", which is not in the channel.
        assert!(PackageIndex::from_model(&sample_package()).is_ok());
    }

    #[test]
    fn test_reachable_from_head_excludes_skipped() {
        let index = PackageIndex::from_model(&sample_package()).unwrap();
        let reachable = index.channels["stable"].reachable_from_head();
        let names: Vec<_> = reachable.into_iter().collect();
        assert_eq!(names, vec!["etcd.v1", "etcd.v2"]);
    }

    #[test]
    fn test_reachable_from_head_guards_against_cycles() {
        let mut channel = ChannelIndex {
            name: "stable".to_string(),
            head: "a".to_string(),
            bundles: BTreeMap::new(),
        };
        channel.bundles.insert(
            "a".to_string(),
            BundleIndex {
                name: "a".to_string(),
                version: Version::new(1, 0, 0),
                replaces: Some("b".to_string()),
                skips: Vec::new(),
                skip_range: None,
                provided_apis: Vec::new(),
                required_apis: Vec::new(),
            },
        );
        channel.bundles.insert(
            "b".to_string(),
            BundleIndex {
                name: "b".to_string(),
                version: Version::new(0, 9, 0),
                replaces: Some("a".to_string()),
                skips: Vec::new(),
                skip_range: None,
                provided_apis: Vec::new(),
                required_apis: Vec::new(),
            },
        );
        let reachable = channel.reachable_from_head();
        assert_eq!(reachable.len(), 2);
    }

    #[test]
    fn test_supersedes() {
        let index = PackageIndex::from_model(&sample_package()).unwrap();
        let v2 = &index.channels["stable"].bundles["etcd.v2"];
        assert!(v2.supersedes("etcd.v1"));
        assert!(v2.supersedes("etcd.v1.5"));
        assert!(!v2.supersedes("etcd.v0"));
    }

    #[test]
    fn test_index_json_round_trip() {
        let index = PackageIndex::from_model(&sample_package()).unwrap();
        let json = serde_json::to_vec(&index).unwrap();
        let decoded: PackageIndex = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, index);
    }
}
