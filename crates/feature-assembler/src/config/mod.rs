use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::archive::ArchiveFormat;
use crate::elements::{FeatureDescriptor, PluginDescriptor, ResolvedSite};
use crate::error::{Error, Result};
use crate::planner::{AssemblySettings, JnlpSettings, ProductSettings, SigningSettings, host_os};
use crate::platform::{Config, parse_config_list};
use crate::properties::Properties;
use crate::shape::{ShapeAdvisor, StyleTable};
use crate::workspace::{WorkspaceConfig, WorkspacePaths, load_paths};

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let owned = v.clone();
        let parsed = owned
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }

    /// Directory relative references in this document resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn parse_imports(path: &Path, table: &toml::value::Table) -> Result<Vec<String>> {
    let Some(arr) = table.get("imports").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::msg(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        let s = s.trim();
        if s.is_empty() {
            continue;
        }
        out.push(s.to_string());
    }
    Ok(out)
}

fn inline_imports_in_value(
    file_path: &Path,
    value: &mut Value,
    stack: &mut HashSet<PathBuf>,
) -> Result<()> {
    let Value::Table(tbl) = value else {
        return Ok(());
    };

    // Inline imports at this table level.
    let imports = parse_imports(file_path, tbl)?;
    if !imports.is_empty() {
        let mut acc = Value::Table(Default::default());
        for imp in imports {
            let imp_path = resolve_ref_path(file_path, &imp);
            let loaded = load_value_inner(&imp_path, stack)?;
            merge_values(&mut acc, loaded);
        }

        tbl.remove("imports");
        merge_values(&mut acc, Value::Table(std::mem::take(tbl)));
        if let Value::Table(merged) = acc {
            *tbl = merged;
        }
    } else {
        tbl.remove("imports");
    }

    // Recurse.
    for (_, v) in tbl.iter_mut() {
        inline_imports_in_value(file_path, v, stack)?;
    }

    Ok(())
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "build definition import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path).map_err(|e| {
        Error::msg(format!("failed to read build definition {}: {e}", path.display()))
    })?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    // Root-level single-parent extends (optional).
    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }

    // Root + section-level imports.
    inline_imports_in_value(path, &mut value, stack)?;

    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

/// Apply `key=value` overrides to the `[build]` table. Values are read as
/// TOML when they parse, otherwise as plain strings.
pub fn apply_overrides(doc: &mut ConfigDoc, sets: &[String]) -> Result<()> {
    for raw in sets {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(Error::msg(format!(
                "invalid override '{raw}' (expected key=value)"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::msg(format!("invalid override '{raw}' (empty key)")));
        }
        let parsed = toml::from_str::<toml::Table>(&format!("v = {}", value.trim()))
            .ok()
            .and_then(|mut t| t.remove("v"))
            .unwrap_or_else(|| Value::String(value.trim().to_string()));

        let mut overlay = parsed;
        for seg in key.split('.').rev().chain(std::iter::once("build")) {
            let mut t = toml::Table::new();
            t.insert(seg.to_string(), overlay);
            overlay = Value::Table(t);
        }
        merge_values(&mut doc.value, overlay);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigSpec {
    Joined(String),
    List(Vec<String>),
}

impl ConfigSpec {
    pub fn parse(&self) -> Result<Vec<Config>> {
        match self {
            ConfigSpec::Joined(s) => parse_config_list(s),
            ConfigSpec::List(items) => parse_config_list(&items.join("&")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub features: Vec<String>,
    pub label: Option<String>,
    pub configs: Option<ConfigSpec>,
    pub format: ArchiveFormat,
    pub archive_prefix: Option<String>,
    pub collecting_folder: Option<String>,
    pub zip_args: String,
    pub tar_args: String,
    pub zip_batch_size: Option<usize>,
    pub embed_source: bool,
    pub final_packaging: bool,
    pub force_update_jar: bool,
    pub metadata_generator: bool,
    pub host_os: Option<String>,
}

/// Default build label, e.g. `I20261019-1430`.
pub fn default_build_label() -> String {
    format!("I{}", Local::now().format("%Y%m%d-%H%M"))
}

/// Everything a generation run needs, typed.
#[derive(Debug, Clone)]
pub struct BuildDefinition {
    pub features: Vec<String>,
    pub configs: Vec<Config>,
    pub settings: AssemblySettings,
    pub styles: StyleTable,
    pub force_update_jar: bool,
    pub site: ResolvedSite,
    pub workspace: WorkspaceConfig,
}

impl BuildDefinition {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let build: BuildSection = doc.deserialize_path("build")?.unwrap_or_default();
        let configs = match &build.configs {
            Some(spec) => spec.parse()?,
            None => vec![Config::generic()],
        };
        if build.zip_batch_size == Some(0) {
            return Err(Error::msg("build.zip_batch_size must be at least 1"));
        }

        let defaults = AssemblySettings::default();
        let settings = AssemblySettings {
            build_label: build.label.clone().unwrap_or_else(default_build_label),
            format: build.format,
            archive_prefix: build.archive_prefix.clone(),
            collecting_folder: build
                .collecting_folder
                .clone()
                .unwrap_or(defaults.collecting_folder),
            zip_args: build.zip_args.clone(),
            tar_args: build.tar_args.clone(),
            zip_batch_size: build.zip_batch_size.unwrap_or(defaults.zip_batch_size),
            embed_source: build.embed_source,
            final_packaging: build.final_packaging,
            metadata_generator: build.metadata_generator,
            signing: doc.deserialize_path::<SigningSettings>("signing")?,
            jnlp: doc.deserialize_path::<JnlpSettings>("jnlp")?,
            product: doc.deserialize_path::<ProductSettings>("product")?,
            host_os: build.host_os.clone().unwrap_or_else(host_os),
        };

        let styles = doc
            .deserialize_path::<StyleTable>("postprocessing")?
            .unwrap_or_default();
        let workspace: WorkspaceConfig = doc
            .deserialize_path("workspace")?
            .unwrap_or_default();

        Ok(Self {
            features: build.features,
            configs,
            settings,
            styles,
            force_update_jar: build.force_update_jar,
            site: load_site(doc, &load_paths(&workspace, &doc.base_dir())?)?,
            workspace,
        })
    }

    pub fn advisor(&self) -> ShapeAdvisor {
        ShapeAdvisor::new(self.styles.clone(), self.force_update_jar)
    }
}

/// `properties_file` paths go through the workspace resolver, so `@alias/...`
/// works and relative paths start at the working directory.
fn load_site(doc: &ConfigDoc, paths: &WorkspacePaths) -> Result<ResolvedSite> {
    let plugins = doc
        .deserialize_path::<Vec<PluginDescriptor>>("site.plugins")?
        .unwrap_or_default();

    let mut features = Vec::new();
    let raw = doc
        .value_path("site.features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for (i, mut entry) in raw.into_iter().enumerate() {
        let file = entry
            .as_table_mut()
            .and_then(|t| t.remove("properties_file"))
            .and_then(|v| v.as_str().map(ToOwned::to_owned));
        let mut feature: FeatureDescriptor = entry
            .try_into()
            .map_err(|e| Error::msg(format!("invalid site.features[{i}]: {e}")))?;
        if let Some(file) = file {
            let mut props = Properties::load(&paths.resolve_config_path(&file)?)?;
            for (k, v) in feature.properties.iter() {
                props.set(k, v);
            }
            feature.properties = props;
        }
        features.push(feature);
    }

    Ok(ResolvedSite { plugins, features })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> ConfigDoc {
        ConfigDoc {
            path: PathBuf::from("build.toml"),
            value: toml::from_str(text).expect("parse toml"),
        }
    }

    #[test]
    fn overrides_land_in_build_table() {
        let mut d = doc("[build]\nformat = \"zip\"\n");
        apply_overrides(
            &mut d,
            &[
                "format=antzip".into(),
                "zip_batch_size=3".into(),
                "label=I.Nightly".into(),
            ],
        )
        .unwrap();
        let def = BuildDefinition::from_doc(&d).unwrap();
        assert_eq!(def.settings.format, ArchiveFormat::AntZip);
        assert_eq!(def.settings.zip_batch_size, 3);
        assert_eq!(def.settings.build_label, "I.Nightly");
        assert!(apply_overrides(&mut d, &["novalue".into()]).is_err());
    }

    #[test]
    fn configs_accept_joined_and_list_forms() {
        let d = doc("[build]\nconfigs = \"win32,win32,x86 & linux,gtk,x86\"\n");
        let def = BuildDefinition::from_doc(&d).unwrap();
        assert_eq!(def.configs.len(), 2);

        let d = doc("[build]\nconfigs = [\"macosx,cocoa,x86_64\"]\n");
        let def = BuildDefinition::from_doc(&d).unwrap();
        assert_eq!(def.configs, vec![Config::new("macosx", "cocoa", "x86_64")]);

        let d = doc("[build]\n");
        let def = BuildDefinition::from_doc(&d).unwrap();
        assert_eq!(def.configs, vec![Config::generic()]);
    }

    #[test]
    fn unknown_format_is_a_config_error() {
        let d = doc("[build]\nformat = \"rar\"\n");
        assert!(matches!(
            BuildDefinition::from_doc(&d),
            Err(Error::Config(_))
        ));
    }
}
