//! Root files and the permission/link instructions that apply to them.
//!
//! Feature properties declare root files and rules with a key convention:
//!
//! ```text
//! root                                   common root file list
//! root.<os>.<ws>.<arch>                  config-specific root file list
//! root.permissions.<rights>              common chmod
//! root.<os>.<ws>.<arch>.permissions.<r>  config-specific chmod
//! root.link                              common symlinks (target,name,...)
//! root.<os>.<ws>.<arch>.link             config-specific symlinks
//! ```
//!
//! Everything here is parsed once per (feature, config) into typed values so
//! the planner never touches key prefixes.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::elements::FeatureDescriptor;
use crate::error::{Error, Result};
use crate::platform::Config;
use crate::properties::{Properties, split_list};
use crate::tree::{BuildTree, join_rel};

const ROOT: &str = "root";
const PERMISSIONS: &str = "permissions";
const LINK: &str = "link";
const EXECUTABLE: &str = "executable";
const FILE_PREFIX: &str = "file:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Common,
    Config(Config),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// `rights` is always an octal mode string here.
    Chmod { rights: String, paths: Vec<String> },
    /// (link target, link name) pairs.
    Link { pairs: Vec<(String, String)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionInstruction {
    pub scope: Scope,
    pub key: String,
    pub kind: InstructionKind,
}

impl PermissionInstruction {
    /// Paths inside the root folder this instruction creates or modifies.
    pub fn touched_paths(&self) -> Vec<&str> {
        match &self.kind {
            InstructionKind::Chmod { paths, .. } => paths.iter().map(String::as_str).collect(),
            InstructionKind::Link { pairs } => pairs.iter().map(|(_, name)| name.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFileEntry {
    /// Path relative to the feature location.
    pub path: String,
    /// `file:` entries copy one file, others copy a whole directory.
    pub single_file: bool,
}

impl RootFileEntry {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix(FILE_PREFIX) {
            Some(p) => Self {
                path: p.trim().to_string(),
                single_file: true,
            },
            None => Self {
                path: raw.trim().to_string(),
                single_file: false,
            },
        }
    }

    /// Split into (directory, include pattern) for a copy fileset.
    pub fn fileset_parts(&self) -> (String, String) {
        if !self.single_file {
            return (self.path.trim_end_matches('/').to_string(), "**".to_string());
        }
        match self.path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), self.path.clone()),
        }
    }
}

fn config_infix(config: &Config) -> String {
    config.to_string_with(".")
}

/// Config-specific list first, then the common list. Duplicates are kept.
pub fn root_file_entries(props: &Properties, config: &Config) -> Vec<RootFileEntry> {
    let specific = props.list(&format!("{ROOT}.{}", config_infix(config)));
    let common = props.list(ROOT);
    specific
        .iter()
        .chain(common.iter())
        .map(|raw| RootFileEntry::parse(raw))
        .collect()
}

pub fn has_root_files(props: &Properties, config: &Config) -> bool {
    !root_file_entries(props, config).is_empty()
}

fn rights_pattern() -> &'static Regex {
    static RIGHTS: OnceLock<Regex> = OnceLock::new();
    RIGHTS.get_or_init(|| Regex::new(r"^[0-7]{3,4}$").expect("static regex"))
}

fn normalize_rights(feature: &str, key: &str, token: &str) -> Result<String> {
    let token = token.trim();
    if token == EXECUTABLE {
        return Ok("755".into());
    }
    if rights_pattern().is_match(token) {
        return Ok(token.to_string());
    }
    Err(Error::malformed(
        feature,
        key,
        format!("unrecognized rights '{token}' (expected an octal mode or '{EXECUTABLE}')"),
    ))
}

fn parse_links(feature: &str, key: &str, value: &str) -> Result<Vec<(String, String)>> {
    let items = split_list(value);
    if items.len() % 2 != 0 {
        return Err(Error::malformed(
            feature,
            key,
            format!(
                "link list has {} entries; expected target,name pairs",
                items.len()
            ),
        ));
    }
    Ok(items
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

/// Permission and link instructions that apply to `config`, in property order.
pub fn parse_permissions(
    feature: &str,
    props: &Properties,
    config: &Config,
) -> Result<Vec<PermissionInstruction>> {
    let infix = config_infix(config);
    let specific_permissions = format!("{ROOT}.{infix}.{PERMISSIONS}.");
    let specific_link = format!("{ROOT}.{infix}.{LINK}");
    let common_permissions = format!("{ROOT}.{PERMISSIONS}.");
    let common_link = format!("{ROOT}.{LINK}");

    let mut out = Vec::new();
    for (key, value) in props.iter() {
        let (scope, kind) = if let Some(rights) = key.strip_prefix(&specific_permissions) {
            let rights = normalize_rights(feature, key, rights)?;
            (
                Scope::Config(config.clone()),
                InstructionKind::Chmod {
                    rights,
                    paths: split_list(value),
                },
            )
        } else if key == specific_link {
            (
                Scope::Config(config.clone()),
                InstructionKind::Link {
                    pairs: parse_links(feature, key, value)?,
                },
            )
        } else if let Some(rights) = key.strip_prefix(&common_permissions) {
            let rights = normalize_rights(feature, key, rights)?;
            (
                Scope::Common,
                InstructionKind::Chmod {
                    rights,
                    paths: split_list(value),
                },
            )
        } else if key == common_link {
            (
                Scope::Common,
                InstructionKind::Link {
                    pairs: parse_links(feature, key, value)?,
                },
            )
        } else {
            continue;
        };
        out.push(PermissionInstruction {
            scope,
            key: key.to_string(),
            kind,
        });
    }
    Ok(out)
}

/// Everything one feature contributes to a config's root folder.
#[derive(Debug, Clone)]
pub struct RootFilePlan {
    pub feature: String,
    /// Feature location, the base for `entries`.
    pub location: String,
    pub entries: Vec<RootFileEntry>,
    pub instructions: Vec<PermissionInstruction>,
    /// Paths already covered by a permission or link rule.
    pub claimed: BTreeSet<String>,
}

impl RootFilePlan {
    /// Fails with `MissingElement` when a declared entry is not in the build tree.
    pub fn build(feature: &FeatureDescriptor, config: &Config, tree: &dyn BuildTree) -> Result<Self> {
        let entries = root_file_entries(&feature.properties, config);
        for e in &entries {
            let rel = join_rel(&feature.location, &e.path);
            if !tree.exists(&rel) {
                return Err(Error::missing(&feature.id, config, rel));
            }
        }
        let instructions = parse_permissions(&feature.id, &feature.properties, config)?;
        let claimed = instructions
            .iter()
            .flat_map(|i| i.touched_paths())
            .map(ToOwned::to_owned)
            .collect();
        Ok(Self {
            feature: feature.id.clone(),
            location: feature.location.clone(),
            entries,
            instructions,
            claimed,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chmods(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.instructions.iter().filter_map(|i| match &i.kind {
            InstructionKind::Chmod { rights, paths } => Some((rights.as_str(), paths.as_slice())),
            InstructionKind::Link { .. } => None,
        })
    }

    pub fn links(&self) -> impl Iterator<Item = &(String, String)> {
        self.instructions.iter().flat_map(|i| match &i.kind {
            InstructionKind::Link { pairs } => pairs.as_slice(),
            InstructionKind::Chmod { .. } => &[][..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn win() -> Config {
        "win32,win32,x86".parse().unwrap()
    }

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn config_specific_permissions_claim_their_paths() {
        let p = props(&[("root.win32.win32.x86.permissions.755", "bin/launcher,lib/helper/")]);
        let got = parse_permissions("f", &p, &win()).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].scope, Scope::Config(win()));
        assert_eq!(
            got[0].kind,
            InstructionKind::Chmod {
                rights: "755".into(),
                paths: vec!["bin/launcher".into(), "lib/helper/".into()],
            }
        );
        assert_eq!(got[0].touched_paths(), vec!["bin/launcher", "lib/helper/"]);
    }

    #[test]
    fn other_config_keys_are_ignored() {
        let p = props(&[
            ("root.linux.gtk.x86.permissions.755", "launcher"),
            ("root.linux.gtk.x86.link", "a,b"),
            ("root.permissions.executable", "eclipse"),
        ]);
        let got = parse_permissions("f", &p, &win()).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].scope, Scope::Common);
        assert_eq!(
            got[0].kind,
            InstructionKind::Chmod {
                rights: "755".into(),
                paths: vec!["eclipse".into()],
            }
        );
    }

    #[test]
    fn links_pair_up() {
        let p = props(&[("root.link", "a,b,c,d")]);
        let got = parse_permissions("f", &p, &win()).unwrap();
        assert_eq!(
            got[0].kind,
            InstructionKind::Link {
                pairs: vec![("a".into(), "b".into()), ("c".into(), "d".into())],
            }
        );
        assert_eq!(got[0].touched_paths(), vec!["b", "d"]);
    }

    #[test]
    fn odd_link_list_is_malformed() {
        let p = props(&[("root.win32.win32.x86.link", "a,b,c")]);
        let err = parse_permissions("feat", &p, &win()).unwrap_err();
        match err {
            Error::MalformedInstruction { feature, key, .. } => {
                assert_eq!(feature, "feat");
                assert_eq!(key, "root.win32.win32.x86.link");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_rights_token_is_malformed() {
        let p = props(&[("root.permissions.rwx", "launcher")]);
        assert!(matches!(
            parse_permissions("f", &p, &win()),
            Err(Error::MalformedInstruction { .. })
        ));
        let p = props(&[("root.permissions.0644", "readme")]);
        assert!(parse_permissions("f", &p, &win()).is_ok());
    }

    #[test]
    fn specific_root_files_come_first() {
        let p = props(&[
            ("root", "common,file:license.html"),
            ("root.win32.win32.x86", "win/bin,common"),
        ]);
        let entries = root_file_entries(&p, &win());
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["win/bin", "common", "common", "license.html"]);
        assert!(entries[3].single_file);
        assert_eq!(
            entries[3].fileset_parts(),
            (String::new(), "license.html".to_string())
        );
        assert_eq!(
            entries[0].fileset_parts(),
            ("win/bin".to_string(), "**".to_string())
        );
        assert!(!has_root_files(&Properties::new(), &win()));
    }
}
