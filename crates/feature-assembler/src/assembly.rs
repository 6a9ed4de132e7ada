//! Per-config registry of what gets assembled.

use std::collections::{BTreeMap, HashSet};

use crate::elements::{ElementId, FeatureDescriptor, PluginDescriptor};
use crate::platform::Config;

/// Insertion-ordered set keyed by (id, version).
#[derive(Debug, Clone)]
pub struct ElementSet<T> {
    keys: HashSet<ElementId>,
    items: Vec<T>,
}

impl<T> Default for ElementSet<T> {
    fn default() -> Self {
        Self {
            keys: HashSet::new(),
            items: Vec::new(),
        }
    }
}

impl<T> ElementSet<T> {
    /// Returns false when an element with the same identity is already present.
    pub fn insert(&mut self, key: ElementId, item: T) -> bool {
        if !self.keys.insert(key) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyLevelConfigInfo {
    plugins: ElementSet<PluginDescriptor>,
    fragments: ElementSet<PluginDescriptor>,
    features: ElementSet<FeatureDescriptor>,
    has_root_file: bool,
}

impl AssemblyLevelConfigInfo {
    pub fn plugins(&self) -> &[PluginDescriptor] {
        self.plugins.as_slice()
    }

    pub fn fragments(&self) -> &[PluginDescriptor] {
        self.fragments.as_slice()
    }

    pub fn features(&self) -> &[FeatureDescriptor] {
        self.features.as_slice()
    }

    pub fn has_root_file(&self) -> bool {
        self.has_root_file
    }
}

/// Buckets are created for every config up front and only ever grow.
#[derive(Debug, Clone)]
pub struct AssemblyInformation {
    configs: Vec<Config>,
    buckets: BTreeMap<Config, AssemblyLevelConfigInfo>,
}

impl AssemblyInformation {
    pub fn new(configs: &[Config]) -> Self {
        let buckets = configs
            .iter()
            .map(|c| (c.clone(), AssemblyLevelConfigInfo::default()))
            .collect();
        Self {
            configs: configs.to_vec(),
            buckets,
        }
    }

    /// Configs in declaration order.
    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    pub fn add_plugin(&mut self, config: &Config, plugin: &PluginDescriptor) -> bool {
        match self.buckets.get_mut(config) {
            Some(b) => b.plugins.insert(plugin.element_id(), plugin.clone()),
            None => false,
        }
    }

    pub fn add_fragment(&mut self, config: &Config, fragment: &PluginDescriptor) -> bool {
        match self.buckets.get_mut(config) {
            Some(b) => b.fragments.insert(fragment.element_id(), fragment.clone()),
            None => false,
        }
    }

    pub fn add_feature(&mut self, config: &Config, feature: &FeatureDescriptor) -> bool {
        match self.buckets.get_mut(config) {
            Some(b) => b.features.insert(feature.element_id(), feature.clone()),
            None => false,
        }
    }

    pub fn set_copy_root_file(&mut self, config: &Config) {
        if let Some(b) = self.buckets.get_mut(config) {
            b.has_root_file = true;
        }
    }

    pub fn copy_root_file(&self, config: &Config) -> bool {
        self.buckets.get(config).is_some_and(|b| b.has_root_file)
    }

    pub fn plugins(&self, config: &Config) -> &[PluginDescriptor] {
        self.buckets.get(config).map(|b| b.plugins()).unwrap_or_default()
    }

    pub fn fragments(&self, config: &Config) -> &[PluginDescriptor] {
        self.buckets.get(config).map(|b| b.fragments()).unwrap_or_default()
    }

    pub fn features(&self, config: &Config) -> &[FeatureDescriptor] {
        self.buckets.get(config).map(|b| b.features()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::PlatformFilter;

    fn plugin(id: &str, version: &str) -> PluginDescriptor {
        PluginDescriptor {
            id: id.into(),
            version: version.into(),
            location: format!("plugins/{id}"),
            filter: PlatformFilter::default(),
            fragment_host: None,
            dot_on_classpath: false,
        }
    }

    #[test]
    fn adding_same_identity_twice_is_a_noop() {
        let linux: Config = "linux,gtk,x86".parse().unwrap();
        let mut info = AssemblyInformation::new(std::slice::from_ref(&linux));
        assert!(info.add_plugin(&linux, &plugin("a", "1.0.0")));
        assert!(!info.add_plugin(&linux, &plugin("a", "1.0.0")));
        assert!(info.add_plugin(&linux, &plugin("a", "1.1.0")));
        assert_eq!(info.plugins(&linux).len(), 2);
    }

    #[test]
    fn keeps_insertion_order() {
        let linux: Config = "linux,gtk,x86".parse().unwrap();
        let mut info = AssemblyInformation::new(std::slice::from_ref(&linux));
        for id in ["c", "a", "b", "a"] {
            info.add_plugin(&linux, &plugin(id, "1"));
        }
        let ids: Vec<_> = info.plugins(&linux).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn root_file_flag_is_per_config_and_sticky() {
        let linux: Config = "linux,gtk,x86".parse().unwrap();
        let win: Config = "win32,win32,x86".parse().unwrap();
        let mut info = AssemblyInformation::new(&[linux.clone(), win.clone()]);
        info.set_copy_root_file(&linux);
        info.set_copy_root_file(&linux);
        assert!(info.copy_root_file(&linux));
        assert!(!info.copy_root_file(&win));
    }

    #[test]
    fn unknown_config_is_ignored() {
        let linux: Config = "linux,gtk,x86".parse().unwrap();
        let mut info = AssemblyInformation::new(&[]);
        assert!(!info.add_plugin(&linux, &plugin("a", "1")));
        assert!(info.plugins(&linux).is_empty());
    }
}
