use std::collections::BTreeMap;
use std::fs;
use std::path::Component;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_root_dir() -> String {
    ".".into()
}

fn default_out_dir() -> String {
    "assemble".into()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CleanMode {
    #[default]
    None,
    Out,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Working directory of the build; element locations are made relative to it.
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    /// Where generated scripts are written.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
    #[serde(default)]
    pub clean: CleanMode,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            out_dir: default_out_dir(),
            paths: BTreeMap::new(),
            clean: CleanMode::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub out_dir: PathBuf,
    pub named_dirs: BTreeMap<String, PathBuf>,
}

impl WorkspacePaths {
    /// Paths rooted at `root` with scripts written to `root/assemble`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let out_dir = root.join(default_out_dir());
        let mut named_dirs = BTreeMap::new();
        named_dirs.insert("root".into(), root.clone());
        named_dirs.insert("out".into(), out_dir.clone());
        Self {
            root,
            out_dir,
            named_dirs,
        }
    }

    // Resolve a user-configured path:
    // - `@alias/...` expands from `[workspace.paths.alias]`
    // - absolute paths are used as-is
    // - relative paths are rooted at the working directory
    pub fn resolve_config_path(&self, raw: &str) -> Result<PathBuf> {
        resolve_config_path(self, raw)
    }

    /// Element location as seen from the working directory, `/`-separated.
    pub fn relative_location(&self, location: &str) -> String {
        let loc = Path::new(location);
        if !loc.is_absolute() {
            return normalize(loc);
        }
        make_relative(loc, &self.root)
    }
}

/// `base` is the directory holding the build definition.
pub fn load_paths(cfg: &WorkspaceConfig, base: &Path) -> Result<WorkspacePaths> {
    let root = resolve_user_path(base, &cfg.root_dir)?;
    let out_dir = resolve_user_dir(&root, &cfg.out_dir)?;
    let named_dirs = resolve_named_dirs(&root, &out_dir, &cfg.paths)?;
    Ok(WorkspacePaths {
        root,
        out_dir,
        named_dirs,
    })
}

pub fn init_dirs(cfg: &WorkspaceConfig, base: &Path) -> Result<WorkspacePaths> {
    let paths = load_paths(cfg, base)?;

    if cfg.clean == CleanMode::Out {
        safe_remove_dir_all(&paths.root, &paths.out_dir)?;
    }

    fs::create_dir_all(&paths.out_dir).map_err(|source| Error::Io {
        path: paths.out_dir.clone(),
        source,
    })?;

    Ok(paths)
}

fn normalize(p: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(last) if last != "..") {
                    parts.pop();
                } else {
                    parts.push("..".into());
                }
            }
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

fn make_relative(path: &Path, base: &Path) -> String {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<String> = Vec::new();
    for c in &base[common..] {
        if matches!(c, Component::Normal(_)) {
            parts.push("..".into());
        }
    }
    for c in &path[common..] {
        if let Component::Normal(s) = c {
            parts.push(s.to_string_lossy().into_owned());
        }
    }
    parts.join("/")
}

fn resolve_user_dir(root: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace dir"));
    }
    let rel_pb = Path::new(p);
    if rel_pb
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::msg(format!(
            "invalid workspace dir '{}' (contains '..')",
            p
        )));
    }
    let pb = PathBuf::from(p);
    Ok(if pb.is_absolute() { pb } else { root.join(pb) })
}

fn resolve_user_path(base: &Path, p: &str) -> Result<PathBuf> {
    let p = p.trim();
    if p.is_empty() {
        return Err(Error::msg("empty workspace path"));
    }
    let pb = PathBuf::from(p);
    Ok(if pb.is_absolute() { pb } else { base.join(pb) })
}

fn resolve_named_dirs(
    root: &Path,
    out_dir: &Path,
    paths: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut out = BTreeMap::<String, PathBuf>::new();
    out.insert("root".into(), root.to_path_buf());
    out.insert("out".into(), out_dir.to_path_buf());

    for (name, raw) in paths {
        let key = name.trim();
        if key.is_empty() {
            return Err(Error::msg("workspace.paths has an empty key"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::msg(format!(
                "workspace.paths key '{}' is invalid (allowed: a-zA-Z0-9_-)",
                key
            )));
        }
        if key == "root" || key == "out" {
            return Err(Error::msg(format!(
                "workspace.paths key '{}' is reserved",
                key
            )));
        }
        let resolved = resolve_user_path(root, raw)?;
        out.insert(key.to_string(), resolved);
    }

    Ok(out)
}

fn safe_remove_dir_all(root: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let root_can = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let dir_can = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    if !dir_can.starts_with(&root_can) {
        return Err(Error::msg(format!(
            "refusing to remove '{}' (outside workspace root '{}')",
            dir_can.display(),
            root_can.display()
        )));
    }
    fs::remove_dir_all(&dir_can).map_err(|source| Error::Io {
        path: dir_can.clone(),
        source,
    })
}

fn resolve_config_path(ws: &WorkspacePaths, raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::msg("empty path"));
    }

    if let Some(after_at) = raw.strip_prefix('@') {
        let (alias, rest) = if let Some((a, r)) = after_at.split_once('/') {
            (a.trim(), Some(r))
        } else {
            (after_at.trim(), None)
        };
        if alias.is_empty() {
            return Err(Error::msg(format!("invalid alias path '{}'", raw)));
        }
        let base = ws.named_dirs.get(alias).ok_or_else(|| {
            let known = ws.named_dirs.keys().cloned().collect::<Vec<_>>().join(", ");
            Error::msg(format!(
                "unknown workspace path alias '{}' in '{}' (known: {})",
                alias, raw, known
            ))
        })?;
        return Ok(match rest {
            Some(r) if !r.is_empty() => base.join(r),
            _ => base.to_path_buf(),
        });
    }

    let pb = PathBuf::from(raw);
    Ok(if pb.is_absolute() {
        pb
    } else {
        ws.root.join(pb)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_alias_and_relative_paths() {
        let mut ws = WorkspacePaths::at("/tmp/pde-root");
        ws.named_dirs
            .insert("eclipse".into(), PathBuf::from("/opt/eclipse"));

        assert_eq!(
            ws.resolve_config_path("features/f/build.properties")
                .expect("relative path"),
            PathBuf::from("/tmp/pde-root/features/f/build.properties")
        );
        assert_eq!(
            ws.resolve_config_path("@eclipse/plugins/a_1.0")
                .expect("alias path"),
            PathBuf::from("/opt/eclipse/plugins/a_1.0")
        );
        assert!(ws.resolve_config_path("@nope/x").is_err());
    }

    #[test]
    fn locations_are_made_relative_to_working_dir() {
        let ws = WorkspacePaths::at("/work/build");
        assert_eq!(ws.relative_location("/work/build/plugins/a"), "plugins/a");
        assert_eq!(ws.relative_location("/work/other/plugins/b"), "../other/plugins/b");
        assert_eq!(ws.relative_location("./features/f/"), "features/f");
        assert_eq!(ws.relative_location("plugins/x/../y"), "plugins/y");
    }

    #[test]
    fn init_dirs_creates_and_cleans_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WorkspaceConfig {
            clean: CleanMode::Out,
            ..Default::default()
        };
        let paths = init_dirs(&cfg, dir.path()).unwrap();
        fs::write(paths.out_dir.join("stale.xml"), "x").unwrap();
        let paths = init_dirs(&cfg, dir.path()).unwrap();
        assert!(paths.out_dir.is_dir());
        assert!(!paths.out_dir.join("stale.xml").exists());
    }
}
