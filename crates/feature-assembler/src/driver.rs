use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, mpsc};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::assembly::AssemblyInformation;
use crate::elements::{
    ElementId, FeatureDescriptor, PlatformFilter, ResolvedSite, select_configs,
};
use crate::error::{Error, Result};
use crate::planner::{AssemblyPlanner, AssemblySettings, AssemblyUnit};
use crate::platform::Config;
use crate::rootfiles::has_root_files;
use crate::script::AssemblyScript;
use crate::shape::ShapeAdvisor;
use crate::tree::BuildTree;
use crate::workspace::WorkspacePaths;

/// Result of planning one (feature, config) unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub feature: String,
    pub config: Config,
    pub result: Result<AssemblyScript>,
}

impl UnitOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Clone)]
pub struct AssemblyDriver {
    settings: Arc<AssemblySettings>,
    advisor: Arc<ShapeAdvisor>,
    site: Arc<ResolvedSite>,
    workspace: Arc<WorkspacePaths>,
    tree: Arc<dyn BuildTree>,
    configs: Vec<Config>,
}

impl AssemblyDriver {
    pub fn new(
        settings: AssemblySettings,
        advisor: ShapeAdvisor,
        site: ResolvedSite,
        workspace: WorkspacePaths,
        tree: Arc<dyn BuildTree>,
        configs: Vec<Config>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            advisor: Arc::new(advisor),
            site: Arc::new(site),
            workspace: Arc::new(workspace),
            tree,
            configs,
        }
    }

    pub fn configs(&self) -> &[Config] {
        &self.configs
    }

    /// Buckets everything `feature_id` ships, recursively, per config.
    pub fn collect(&self, feature_id: &str) -> Result<AssemblyInformation> {
        let feature = self
            .site
            .find_feature(feature_id, None)
            .ok_or_else(|| Error::missing(feature_id, Config::generic(), format!("features/{feature_id}")))?;
        let mut info = AssemblyInformation::new(&self.configs);
        let mut visited = HashMap::new();
        self.collect_feature(
            &mut info,
            feature,
            &PlatformFilter::default(),
            &self.configs,
            &mut visited,
        )?;
        Ok(info)
    }

    fn collect_feature(
        &self,
        info: &mut AssemblyInformation,
        feature: &FeatureDescriptor,
        entry_filter: &PlatformFilter,
        scope: &[Config],
        visited: &mut HashMap<ElementId, HashSet<Config>>,
    ) -> Result<()> {
        let selected = select_configs(&feature.filter.overlay(entry_filter), scope);
        if selected.is_empty() {
            info!(feature = %feature.element_id(), "feature matches no configuration, excluded");
            return Ok(());
        }
        // A feature reached again through another include path only
        // contributes to the configs it has not reached yet.
        let covered = visited.entry(feature.element_id()).or_default();
        let configs: Vec<Config> = selected
            .into_iter()
            .filter(|c| covered.insert(c.clone()))
            .collect();
        if configs.is_empty() {
            return Ok(());
        }
        let first = configs[0].clone();

        for config in &configs {
            info.add_feature(config, feature);
            if has_root_files(&feature.properties, config) {
                info.set_copy_root_file(config);
            }
        }

        for entry in &feature.plugins {
            let plugin = self
                .site
                .find_plugin(&entry.id, entry.version.as_deref(), entry.fragment)
                .ok_or_else(|| {
                    let folder = if entry.fragment { "fragments" } else { "plugins" };
                    Error::missing(&feature.id, &first, format!("{folder}/{}", entry.id))
                })?;
            let selected = select_configs(&plugin.filter.overlay(&entry.filter), &configs);
            if selected.is_empty() {
                info!(
                    feature = %feature.id,
                    element = %plugin.element_id(),
                    "element matches no configuration, excluded"
                );
                continue;
            }
            for config in &selected {
                if entry.fragment {
                    info.add_fragment(config, plugin);
                } else {
                    info.add_plugin(config, plugin);
                }
            }
        }

        for entry in &feature.includes {
            let Some(included) = self.site.find_feature(&entry.id, entry.version.as_deref()) else {
                if entry.optional {
                    debug!(feature = %feature.id, included = %entry.id, "optional feature not in site, skipping");
                    continue;
                }
                return Err(Error::missing(
                    &feature.id,
                    &first,
                    format!("features/{}", entry.id),
                ));
            };
            self.collect_feature(info, included, &entry.filter, &configs, visited)?;
        }
        Ok(())
    }

    /// Collects and plans a single unit.
    pub fn plan_unit(&self, feature_id: &str, config: &Config) -> Result<AssemblyScript> {
        let info = self.collect(feature_id)?;
        self.plan_collected(feature_id, &info, config)
    }

    fn plan_collected(
        &self,
        feature_id: &str,
        info: &AssemblyInformation,
        config: &Config,
    ) -> Result<AssemblyScript> {
        let features: Vec<&FeatureDescriptor> = info.features(config).iter().collect();
        let root_providers = if info.copy_root_file(config) {
            features
                .iter()
                .copied()
                .filter(|f| has_root_files(&f.properties, config))
                .collect()
        } else {
            Vec::new()
        };
        let unit = AssemblyUnit {
            feature_id,
            config,
            plugins: info
                .plugins(config)
                .iter()
                .chain(info.fragments(config))
                .collect(),
            features,
            root_providers,
        };
        let planner = AssemblyPlanner::new(
            &self.settings,
            &self.advisor,
            self.tree.as_ref(),
            &self.workspace,
        );
        planner.plan(&unit)
    }

    fn units(&self, features: &[String]) -> Vec<(String, Config)> {
        features
            .iter()
            .flat_map(|f| self.configs.iter().map(move |c| (f.clone(), c.clone())))
            .collect()
    }

    /// Plans every (feature, config) unit in order. A failing unit does not
    /// stop the others.
    pub fn generate(&self, features: &[String]) -> Vec<UnitOutcome> {
        let mut out = Vec::new();
        for feature in features {
            match self.collect(feature) {
                Ok(info) => {
                    for config in &self.configs {
                        let result = self.plan_collected(feature, &info, config);
                        out.push(report(feature.clone(), config.clone(), result));
                    }
                }
                Err(_) => {
                    // Collection errors are not cloneable; replay them per unit.
                    for config in &self.configs {
                        let result = self.plan_unit(feature, config);
                        out.push(report(feature.clone(), config.clone(), result));
                    }
                }
            }
        }
        out
    }

    /// Like [`generate`](Self::generate), with units planned on up to
    /// `max_parallel` worker threads (`0` means one per CPU). Outcomes keep
    /// unit order.
    pub fn generate_parallel(&self, features: &[String], max_parallel: usize) -> Vec<UnitOutcome> {
        let max_parallel = if max_parallel == 0 {
            num_cpus::get()
        } else {
            max_parallel
        };
        let units = self.units(features);
        if max_parallel <= 1 || units.len() <= 1 {
            return self.generate(features);
        }

        let (tx, rx) = mpsc::channel::<(usize, Result<AssemblyScript>, u128)>();
        let mut queue = units.iter().cloned().enumerate();
        let mut running: BTreeMap<usize, std::thread::JoinHandle<()>> = BTreeMap::new();
        let mut results: BTreeMap<usize, Result<AssemblyScript>> = BTreeMap::new();

        loop {
            while running.len() < max_parallel {
                let Some((idx, (feature, config))) = queue.next() else {
                    break;
                };
                let tx = tx.clone();
                let driver = self.clone();
                let handle = std::thread::spawn(move || {
                    let start = Instant::now();
                    let r = catch_unwind(AssertUnwindSafe(|| driver.plan_unit(&feature, &config)))
                        .unwrap_or_else(|_| {
                            Err(Error::msg(format!(
                                "planning '{feature}' [{config}] panicked"
                            )))
                        });
                    let _ = tx.send((idx, r, start.elapsed().as_millis()));
                });
                running.insert(idx, handle);
            }

            if running.is_empty() {
                break;
            }

            let Ok((idx, res, elapsed_ms)) = rx.recv() else {
                break;
            };
            if let Some(h) = running.remove(&idx) {
                let _ = h.join();
            }
            debug!(unit = idx, elapsed_ms = elapsed_ms as u64, "unit planned");
            results.insert(idx, res);
        }

        units
            .into_iter()
            .enumerate()
            .map(|(idx, (feature, config))| {
                let result = results.remove(&idx).unwrap_or_else(|| {
                    Err(Error::msg(format!(
                        "planning '{feature}' [{config}] did not report back"
                    )))
                });
                report(feature, config, result)
            })
            .collect()
    }
}

fn report(feature: String, config: Config, result: Result<AssemblyScript>) -> UnitOutcome {
    match &result {
        Ok(script) => info!(
            feature = %feature,
            config = %config,
            steps = script.steps.len(),
            script = %script.file_name,
            "unit planned"
        ),
        Err(e) => warn!(feature = %feature, config = %config, error = %e, "unit failed"),
    }
    UnitOutcome {
        feature,
        config,
        result,
    }
}
