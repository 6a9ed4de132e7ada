//! Resolved plugin/feature descriptors and platform-filter selection.

use std::fmt;

use serde::Deserialize;

use crate::platform::{ANY, Config};
use crate::properties::Properties;

/// Version requested by an entry that accepts whatever is available.
pub const GENERIC_VERSION: &str = "0.0.0";

/// Canonical (id, version) key used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    pub id: String,
    pub version: String,
}

impl ElementId {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// `<id>_<version>`, the folder/jar stem inside `plugins/` and `features/`.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.id, self.version)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, self.version)
    }
}

/// Per-axis applicability. `None` on an axis means "all"; a value may list
/// several comma-separated platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlatformFilter {
    pub os: Option<String>,
    pub ws: Option<String>,
    pub arch: Option<String>,
}

impl PlatformFilter {
    /// Axis-wise override: the entry's own values win where present.
    pub fn overlay(&self, entry: &PlatformFilter) -> PlatformFilter {
        PlatformFilter {
            os: axis_value(&entry.os).or(axis_value(&self.os)).map(ToOwned::to_owned),
            ws: axis_value(&entry.ws).or(axis_value(&self.ws)).map(ToOwned::to_owned),
            arch: axis_value(&entry.arch)
                .or(axis_value(&self.arch))
                .map(ToOwned::to_owned),
        }
    }

    pub fn matches(&self, config: &Config) -> bool {
        axis_matches(axis_value(&self.os), config.os())
            && axis_matches(axis_value(&self.ws), config.ws())
            && axis_matches(axis_value(&self.arch), config.arch())
    }
}

fn axis_value(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn axis_matches(filter: Option<&str>, value: &str) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    value == ANY || filter.split(',').map(str::trim).any(|f| f == value)
}

/// Configs the filter applies to, in declaration order.
pub fn select_configs(filter: &PlatformFilter, configs: &[Config]) -> Vec<Config> {
    configs
        .iter()
        .filter(|c| filter.matches(c))
        .cloned()
        .collect()
}

/// First matching config in declaration order.
pub fn representative_config<'a>(filter: &PlatformFilter, configs: &'a [Config]) -> Option<&'a Config> {
    configs.iter().find(|c| filter.matches(c))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
    /// Directory of the built bundle, relative to the working directory or absolute.
    pub location: String,
    #[serde(flatten)]
    pub filter: PlatformFilter,
    /// Host bundle id when this descriptor is a fragment.
    #[serde(default)]
    pub fragment_host: Option<String>,
    /// The bundle lists `.` on its classpath, so embedded source is unpacked into `src/`.
    #[serde(default)]
    pub dot_on_classpath: bool,
}

impl PluginDescriptor {
    pub fn element_id(&self) -> ElementId {
        ElementId::new(&self.id, &self.version)
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginEntry {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub fragment: bool,
    #[serde(flatten)]
    pub filter: PlatformFilter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureEntry {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub filter: PlatformFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureDescriptor {
    pub id: String,
    pub version: String,
    /// Feature directory (the one holding `feature.xml`).
    pub location: String,
    #[serde(flatten)]
    pub filter: PlatformFilter,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
    #[serde(default)]
    pub includes: Vec<FeatureEntry>,
    #[serde(default)]
    pub properties: Properties,
}

impl FeatureDescriptor {
    pub fn element_id(&self) -> ElementId {
        ElementId::new(&self.id, &self.version)
    }
}

/// The already-resolved element graph. Read-only for the planner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResolvedSite {
    pub plugins: Vec<PluginDescriptor>,
    pub features: Vec<FeatureDescriptor>,
}

impl ResolvedSite {
    pub fn find_plugin(&self, id: &str, version: Option<&str>, fragment: bool) -> Option<&PluginDescriptor> {
        let version = requested_version(version);
        self.plugins.iter().find(|p| {
            p.id == id && p.is_fragment() == fragment && version.is_none_or(|v| v == p.version)
        })
    }

    pub fn find_feature(&self, id: &str, version: Option<&str>) -> Option<&FeatureDescriptor> {
        let version = requested_version(version);
        self.features
            .iter()
            .find(|f| f.id == id && version.is_none_or(|v| v == f.version))
    }
}

fn requested_version(v: Option<&str>) -> Option<&str> {
    v.map(str::trim)
        .filter(|v| !v.is_empty() && *v != GENERIC_VERSION)
}
