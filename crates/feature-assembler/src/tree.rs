//! Point-in-time existence probes against the build-time tree.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub trait BuildTree: Send + Sync {
    /// `rel` uses `/` separators and is relative to the working directory
    /// unless absolute.
    fn exists(&self, rel: &str) -> bool;

    /// True when `rel` is a directory with at least one file below it.
    fn has_content(&self, rel: &str) -> bool;
}

/// Join two `/`-separated fragments without doubling separators.
pub fn join_rel(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches("./").trim_start_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rel}"),
    }
}

#[derive(Debug, Clone)]
pub struct FsTree {
    root: PathBuf,
}

impl FsTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        let p = Path::new(rel);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

impl BuildTree for FsTree {
    fn exists(&self, rel: &str) -> bool {
        fs::symlink_metadata(self.resolve(rel)).is_ok()
    }

    fn has_content(&self, rel: &str) -> bool {
        let dir = self.resolve(rel);
        if !dir.is_dir() {
            return false;
        }
        WalkDir::new(&dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| !e.file_type().is_dir())
    }
}

/// In-memory tree: a set of file paths. Directories exist implicitly.
#[derive(Debug, Clone, Default)]
pub struct MemTree {
    files: BTreeSet<String>,
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut t = Self::new();
        for f in files {
            t.add_file(f);
        }
        t
    }

    pub fn add_file(&mut self, path: impl Into<String>) {
        let p: String = path.into();
        self.files.insert(join_rel("", &p));
    }
}

impl BuildTree for MemTree {
    fn exists(&self, rel: &str) -> bool {
        let rel = join_rel("", rel);
        let rel = rel.trim_end_matches('/');
        let dir_prefix = format!("{rel}/");
        self.files
            .iter()
            .any(|f| f == rel || f.starts_with(&dir_prefix))
    }

    fn has_content(&self, rel: &str) -> bool {
        let rel = join_rel("", rel);
        let dir_prefix = format!("{}/", rel.trim_end_matches('/'));
        self.files.iter().any(|f| f.starts_with(&dir_prefix))
    }
}
