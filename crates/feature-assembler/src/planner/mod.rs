//! Per-(feature, config) assembly planning.
//!
//! A planner turns one unit of already bucketed elements into an ordered
//! step list. Phases run in a fixed order: prologue, initialization,
//! gathering, post-processing, branding, metadata, archiving, epilogue.
//! Nothing is handed to a sink until the whole unit planned successfully.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::archive::{
    ArchiveContext, ArchiveFormat, ArchiveStrategy, Member, root_folder, strategy_for, zip,
};
use crate::elements::{ElementId, FeatureDescriptor, PluginDescriptor};
use crate::error::Result;
use crate::platform::Config;
use crate::rootfiles::RootFilePlan;
use crate::script::{AssemblyScript, FileSet, MetadataMode, Params, RootMetadata, Step, prop};
use crate::shape::{ElementKind, Shape, ShapeAdvisor};
use crate::tree::{BuildTree, join_rel};
use crate::workspace::WorkspacePaths;

const BUILD_SCRIPT: &str = "build.xml";
const TARGET_MAIN: &str = "main";
const TARGET_GATHER_BIN_PARTS: &str = "gather.bin.parts";
const TARGET_GATHER_SOURCES: &str = "gather.sources";
const TARGET_JAR_UP: &str = "jarUp";
const TARGET_JARING: &str = "jarIng";
const TARGET_JAR_SIGNING: &str = "jarSigning";
const TARGET_GENERATE_JNLP: &str = "generateJNLP";
const TARGET_CUSTOM_ASSEMBLY: &str = "customAssembly";
const CUSTOM_ASSEMBLY_SCRIPT: &str = "customAssembly-all-script";
/// Ant `os` guard for `ln -s`.
const LINK_OS: &str = "Linux,Mac OS X";

fn default_j2se() -> String {
    "1.4+".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SigningSettings {
    pub alias: String,
    pub keystore: String,
    pub storepass: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JnlpSettings {
    pub codebase: String,
    #[serde(default = "default_j2se")]
    pub j2se: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductSettings {
    pub id: Option<String>,
    pub version: Option<String>,
    pub launcher: Option<String>,
    pub icons: Vec<String>,
}

/// Build-wide planning options. Shared read-only by every unit.
#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub build_label: String,
    pub format: ArchiveFormat,
    pub archive_prefix: Option<String>,
    pub collecting_folder: String,
    pub zip_args: String,
    pub tar_args: String,
    pub zip_batch_size: usize,
    pub embed_source: bool,
    pub final_packaging: bool,
    /// Whether a metadata generator is available to the build.
    pub metadata_generator: bool,
    pub signing: Option<SigningSettings>,
    pub jnlp: Option<JnlpSettings>,
    pub product: Option<ProductSettings>,
    /// OS the generated script runs on, in config spelling (`win32`, `linux`, ...).
    pub host_os: String,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            build_label: "build".into(),
            format: ArchiveFormat::default(),
            archive_prefix: None,
            collecting_folder: "eclipse".into(),
            zip_args: String::new(),
            tar_args: String::new(),
            zip_batch_size: zip::DEFAULT_BATCH_SIZE,
            embed_source: false,
            final_packaging: false,
            metadata_generator: false,
            signing: None,
            jnlp: None,
            product: None,
            host_os: host_os(),
        }
    }
}

pub fn host_os() -> String {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "macosx",
        other => other,
    }
    .to_string()
}

/// `<feature>-<label>[-<os.ws.arch>]<ext>`, no config suffix for the generic config.
pub fn compute_archive_name(feature_id: &str, settings: &AssemblySettings, config: &Config) -> String {
    let suffix = if config.is_generic() {
        String::new()
    } else {
        format!("-{}", config.dotted_name())
    };
    let ext = strategy_for(settings.format).extension();
    format!("{feature_id}-{}{suffix}{ext}", settings.build_label)
}

/// `assemble[.<feature>][.<os.ws.arch>].xml`; empty parts are left out.
pub fn script_file_name(feature_id: &str, config: &Config) -> String {
    let mut name = String::from("assemble");
    if !feature_id.is_empty() {
        name.push('.');
        name.push_str(feature_id);
    }
    if !config.is_generic() {
        name.push('.');
        name.push_str(&config.dotted_name());
    }
    name.push_str(".xml");
    name
}

/// Everything a planner needs for one (feature, config).
#[derive(Debug, Clone)]
pub struct AssemblyUnit<'a> {
    pub feature_id: &'a str,
    pub config: &'a Config,
    /// Plugins first, then fragments.
    pub plugins: Vec<&'a PluginDescriptor>,
    pub features: Vec<&'a FeatureDescriptor>,
    /// Features whose root files land in this config.
    pub root_providers: Vec<&'a FeatureDescriptor>,
}

fn property(name: &str, value: impl Into<String>) -> Step {
    Step::Property {
        name: name.to_string(),
        value: value.into(),
    }
}

fn target(name: &str) -> Step {
    Step::TargetStart {
        name: name.to_string(),
        depends: None,
        if_set: None,
        description: None,
    }
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn call(target: &str, pairs: &[(&str, &str)]) -> Step {
    Step::AntCall {
        target: target.to_string(),
        params: params(pairs),
    }
}

fn custom_hook(name: &str) -> Step {
    call(TARGET_CUSTOM_ASSEMBLY, &[("customTarget", name)])
}

fn archive_prefixed(prefix: Option<&str>, folder: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}/{folder}"),
        _ => folder.to_string(),
    }
}

pub struct AssemblyPlanner<'a> {
    settings: &'a AssemblySettings,
    advisor: &'a ShapeAdvisor,
    tree: &'a dyn BuildTree,
    workspace: &'a WorkspacePaths,
}

impl<'a> AssemblyPlanner<'a> {
    pub fn new(
        settings: &'a AssemblySettings,
        advisor: &'a ShapeAdvisor,
        tree: &'a dyn BuildTree,
        workspace: &'a WorkspacePaths,
    ) -> Self {
        Self {
            settings,
            advisor,
            tree,
            workspace,
        }
    }

    pub fn plan(&self, unit: &AssemblyUnit<'_>) -> Result<AssemblyScript> {
        let strategy: Box<dyn ArchiveStrategy> = strategy_for(self.settings.format);
        let root_plans = self.root_plans(unit)?;

        let mut steps = Vec::new();
        self.prologue(unit, &mut steps);
        self.initialize(&mut steps);
        self.gather(unit, &root_plans, &mut steps);
        let (plugins, features) = self.post_process(unit, &mut steps);
        self.brand(unit.config, &mut steps);
        self.metadata(unit.config, !root_plans.is_empty(), &mut steps);

        steps.push(custom_hook("assembly.archive"));
        let ctx = ArchiveContext {
            config: unit.config,
            settings: self.settings,
            plugins: &plugins,
            features: &features,
            root_plans: &root_plans,
        };
        strategy.emit(&ctx, &mut steps)?;
        self.epilogue(&mut steps);

        Ok(AssemblyScript {
            feature: unit.feature_id.to_string(),
            config: unit.config.clone(),
            file_name: script_file_name(unit.feature_id, unit.config),
            steps,
        })
    }

    fn root_plans(&self, unit: &AssemblyUnit<'_>) -> Result<Vec<RootFilePlan>> {
        let mut out = Vec::new();
        for feature in &unit.root_providers {
            let plan = RootFilePlan::build(feature, unit.config, self.tree)?;
            if !plan.is_empty() {
                out.push(plan);
            }
        }
        Ok(out)
    }

    fn prologue(&self, unit: &AssemblyUnit<'_>, steps: &mut Vec<Step>) {
        let s = self.settings;
        steps.push(Step::ProjectStart {
            name: format!("Assemble {}", unit.feature_id),
            default_target: TARGET_MAIN.into(),
            basedir: Some(self.workspace.root.to_string_lossy().into_owned()),
        });

        // Defaults for callers that do not pass these in.
        steps.push(property("buildDirectory", prop("basedir")));
        steps.push(property("buildLabel", &s.build_label));
        steps.push(property("collectingFolder", &s.collecting_folder));
        if let Some(prefix) = &s.archive_prefix {
            steps.push(property("archivePrefix", prefix));
        }
        steps.push(property("zipargs", &s.zip_args));
        steps.push(property("tarargs", &s.tar_args));

        let config = unit.config;
        steps.push(property(
            "archiveName",
            compute_archive_name(unit.feature_id, s, config),
        ));
        steps.push(property("os", config.os()));
        steps.push(property("ws", config.ws()));
        steps.push(property("arch", config.arch()));
        steps.push(property(
            "assemblyTempDir",
            format!("{}/tmp", prop("buildDirectory")),
        ));
        steps.push(property(
            "eclipse.base",
            format!("{}/{}", prop("assemblyTempDir"), prop("collectingFolder")),
        ));
        steps.push(property(
            "eclipse.plugins",
            format!("{}/plugins", prop("eclipse.base")),
        ));
        steps.push(property(
            "eclipse.features",
            format!("{}/features", prop("eclipse.base")),
        ));
        steps.push(property(
            "archiveFullPath",
            format!(
                "{}/{}/{}",
                prop("basedir"),
                prop("buildLabel"),
                prop("archiveName")
            ),
        ));
        steps.push(target(TARGET_MAIN));
    }

    fn initialize(&self, steps: &mut Vec<Step>) {
        let temp = prop("assemblyTempDir");
        steps.push(Step::Delete { path: temp.clone() });
        steps.push(Step::Mkdir { dir: temp });
        steps.push(Step::Mkdir {
            dir: prop("buildLabel"),
        });
        let prefix = self.settings.archive_prefix.as_deref();
        steps.push(property(
            "pluginArchivePrefix",
            archive_prefixed(prefix, "plugins"),
        ));
        steps.push(property(
            "featureArchivePrefix",
            archive_prefixed(prefix, "features"),
        ));
    }

    fn gather(&self, unit: &AssemblyUnit<'_>, root_plans: &[RootFilePlan], steps: &mut Vec<Step>) {
        let plugins_dest = prop("eclipse.plugins");
        let feature_base = prop("eclipse.base");

        for p in &unit.plugins {
            steps.push(self.element_call(
                &p.location,
                TARGET_GATHER_BIN_PARTS,
                "destination.temp.folder",
                &plugins_dest,
            ));
        }
        for f in &unit.features {
            steps.push(self.element_call(
                &f.location,
                TARGET_GATHER_BIN_PARTS,
                "feature.base",
                &feature_base,
            ));
        }

        for plan in root_plans {
            self.gather_root_files(unit.config, plan, steps);
        }

        if self.settings.embed_source {
            for p in &unit.plugins {
                steps.push(self.element_call(
                    &p.location,
                    TARGET_GATHER_SOURCES,
                    "destination.temp.folder",
                    &plugins_dest,
                ));
                if p.dot_on_classpath {
                    let base = format!("{plugins_dest}/{}", p.element_id().full_name());
                    steps.push(Step::Unzip {
                        src: format!("{base}/src.zip"),
                        dest: format!("{base}/src"),
                    });
                    steps.push(Step::DeleteFile {
                        file: format!("{base}/src.zip"),
                    });
                }
            }
            for f in &unit.features {
                steps.push(self.element_call(
                    &f.location,
                    TARGET_GATHER_SOURCES,
                    "feature.base",
                    &feature_base,
                ));
            }
        }

        steps.push(custom_hook(TARGET_GATHER_BIN_PARTS));
    }

    fn element_call(&self, location: &str, target: &str, param: &str, value: &str) -> Step {
        Step::Ant {
            antfile: BUILD_SCRIPT.into(),
            dir: self.workspace.relative_location(location),
            target: target.into(),
            params: params(&[(param, value)]),
        }
    }

    fn gather_root_files(&self, config: &Config, plan: &RootFilePlan, steps: &mut Vec<Step>) {
        let root = root_folder(config);
        let location = self.workspace.relative_location(&plan.location);
        steps.push(Step::Mkdir { dir: root.clone() });
        let filesets = plan
            .entries
            .iter()
            .map(|e| {
                let (dir, include) = e.fileset_parts();
                FileSet {
                    dir: join_rel(&location, &dir),
                    includes: Some(include),
                    excludes: None,
                }
            })
            .collect();
        steps.push(Step::Copy {
            todir: root.clone(),
            filesets,
        });
        for (rights, paths) in plan.chmods() {
            steps.push(Step::Chmod {
                dir: root.clone(),
                perm: rights.to_string(),
                includes: paths.join(","),
            });
        }
        if self.settings.host_os == "win32" {
            for (_, name) in plan.links() {
                debug!(feature = %plan.feature, link = %name, "no symlinks on a win32 host, skipping");
            }
            return;
        }
        for (link_target, name) in plan.links() {
            steps.push(Step::Exec {
                executable: "ln".into(),
                dir: root.clone(),
                args: vec![format!("-s {link_target} {name}")],
                os: Some(LINK_OS.into()),
            });
        }
    }

    fn post_process(&self, unit: &AssemblyUnit<'_>, steps: &mut Vec<Step>) -> (Vec<Member>, Vec<Member>) {
        let plugins = unit
            .plugins
            .iter()
            .filter_map(|p| {
                self.post_process_element(ElementKind::Plugin, &p.element_id(), &p.location, steps)
            })
            .collect();
        let features = unit
            .features
            .iter()
            .filter_map(|f| {
                self.post_process_element(ElementKind::Feature, &f.element_id(), &f.location, steps)
            })
            .collect();
        steps.push(custom_hook("post.jarUp"));
        (plugins, features)
    }

    /// Returns the archive member for the element, or `None` when there is
    /// nothing to package.
    fn post_process_element(
        &self,
        kind: ElementKind,
        element: &ElementId,
        location: &str,
        steps: &mut Vec<Step>,
    ) -> Option<Member> {
        let (name, shape) = self.advisor.final_shape(kind, element);
        if shape == Shape::Folder {
            return Some(Member { name, shape });
        }

        let rel = self.workspace.relative_location(location);
        if !self.tree.has_content(&rel) {
            debug!(element = %element, location = %rel, "source folder absent or empty, skipping jar-up");
            return None;
        }

        let source = match kind {
            ElementKind::Plugin => prop("eclipse.plugins"),
            ElementKind::Feature => prop("eclipse.features"),
        };
        let args = [("source", source.as_str()), ("elementName", name.as_str())];
        steps.push(call(TARGET_JAR_UP, &args));
        if self.settings.signing.is_some() {
            steps.push(call(TARGET_JAR_SIGNING, &args));
        }
        if kind == ElementKind::Feature && self.settings.jnlp.is_some() {
            let jar = format!("{name}.jar");
            steps.push(call(
                TARGET_GENERATE_JNLP,
                &[("dir", source.as_str()), ("jnlpJar", jar.as_str())],
            ));
        }
        Some(Member { name, shape })
    }

    fn brand(&self, config: &Config, steps: &mut Vec<Step>) {
        let Some(product) = &self.settings.product else {
            return;
        };
        let Some(launcher) = &product.launcher else {
            return;
        };
        if config.is_generic() {
            return;
        }
        let icons = product
            .icons
            .iter()
            .filter_map(|icon| self.resolve_icon(icon))
            .collect();
        steps.push(Step::Brand {
            root: root_folder(config),
            icons,
            name: launcher.clone(),
            os: config.os().to_string(),
        });
    }

    fn resolve_icon(&self, icon: &str) -> Option<String> {
        let candidates = [
            icon.to_string(),
            join_rel("plugins", icon),
            join_rel("features", icon),
        ];
        let found = candidates.into_iter().find(|c| self.tree.exists(c));
        if found.is_none() {
            warn!(icon, "branding icon not found, dropping it");
        }
        found
    }

    fn metadata(&self, config: &Config, has_root_files: bool, steps: &mut Vec<Step>) {
        if !self.settings.metadata_generator {
            return;
        }
        let mode = if self.settings.final_packaging {
            MetadataMode::Final
        } else {
            MetadataMode::Incremental
        };
        steps.push(Step::GenerateMetadata {
            source: prop("eclipse.base"),
            mode,
            config: config.to_string(),
            root: None,
        });
        if has_root_files {
            let product = self.settings.product.clone().unwrap_or_default();
            steps.push(Step::GenerateMetadata {
                source: root_folder(config),
                mode,
                config: config.to_string(),
                root: Some(RootMetadata {
                    launcher: product.launcher,
                    product_id: product.id,
                    product_version: product.version,
                }),
            });
        }
    }

    fn epilogue(&self, steps: &mut Vec<Step>) {
        if self.settings.format != ArchiveFormat::Folder {
            steps.push(Step::Delete {
                path: prop("assemblyTempDir"),
            });
        }
        steps.push(Step::TargetEnd);

        let element = format!("{}/{}", prop("source"), prop("elementName"));
        let exists = format!("{element}_exists");
        let forward = [
            ("source", prop("source")),
            ("elementName", prop("elementName")),
        ];
        let forward: Vec<(&str, &str)> = forward.iter().map(|(k, v)| (*k, v.as_str())).collect();

        steps.push(Step::TargetStart {
            name: TARGET_JAR_UP.into(),
            depends: None,
            if_set: None,
            description: Some("Create a jar from the given location.".into()),
        });
        steps.push(Step::Available {
            property: exists.clone(),
            path: element.clone(),
        });
        steps.push(call(TARGET_JARING, &forward));
        steps.push(Step::TargetEnd);

        steps.push(Step::TargetStart {
            name: TARGET_JARING.into(),
            depends: None,
            if_set: Some(exists),
            description: None,
        });
        steps.push(Step::Zip {
            destfile: format!("{element}.jar"),
            basedir: element.clone(),
        });
        steps.push(Step::Delete { path: element.clone() });
        steps.push(Step::TargetEnd);

        if let Some(signing) = &self.settings.signing {
            steps.push(target(TARGET_JAR_SIGNING));
            steps.push(Step::SignJar {
                jar: format!("{element}.jar"),
                alias: signing.alias.clone(),
                keystore: signing.keystore.clone(),
                storepass: signing.storepass.clone(),
            });
            steps.push(Step::TargetEnd);
        }

        if let Some(jnlp) = &self.settings.jnlp {
            steps.push(target(TARGET_GENERATE_JNLP));
            steps.push(Step::Jnlp {
                jar: format!("{}/{}", prop("dir"), prop("jnlpJar")),
                codebase: jnlp.codebase.clone(),
                j2se: jnlp.j2se.clone(),
            });
            steps.push(Step::TargetEnd);
        }

        steps.push(Step::TargetStart {
            name: TARGET_CUSTOM_ASSEMBLY.into(),
            depends: None,
            if_set: Some(CUSTOM_ASSEMBLY_SCRIPT.into()),
            description: None,
        });
        steps.push(Step::Ant {
            antfile: prop(CUSTOM_ASSEMBLY_SCRIPT),
            dir: prop("basedir"),
            target: prop("customTarget"),
            params: Vec::new(),
        });
        steps.push(Step::TargetEnd);

        steps.push(Step::ProjectEnd);
    }
}
