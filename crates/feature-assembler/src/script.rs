//! Structured build steps and the sinks that receive them.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::platform::Config;

pub type Params = Vec<(String, String)>;

/// Ant-style property reference, `${name}`.
pub fn prop(name: &str) -> String {
    format!("${{{name}}}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSet {
    pub dir: String,
    pub includes: Option<String>,
    pub excludes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchiveMember {
    /// A directory tree placed under `prefix`.
    Dir {
        dir: String,
        prefix: String,
        includes: Option<String>,
        excludes: Vec<String>,
        filemode: Option<String>,
    },
    /// A single file stored at `full_path`.
    File {
        file: String,
        full_path: String,
        filemode: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataMode {
    Incremental,
    Final,
}

impl MetadataMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataMode::Incremental => "incremental",
            MetadataMode::Final => "final",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootMetadata {
    pub launcher: Option<String>,
    pub product_id: Option<String>,
    pub product_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    ProjectStart {
        name: String,
        default_target: String,
        basedir: Option<String>,
    },
    ProjectEnd,
    Property {
        name: String,
        value: String,
    },
    TargetStart {
        name: String,
        depends: Option<String>,
        if_set: Option<String>,
        description: Option<String>,
    },
    TargetEnd,
    Mkdir {
        dir: String,
    },
    Delete {
        path: String,
    },
    DeleteFile {
        file: String,
    },
    Copy {
        todir: String,
        filesets: Vec<FileSet>,
    },
    Move {
        from_dir: String,
        to_dir: String,
    },
    Exec {
        executable: String,
        dir: String,
        args: Vec<String>,
        os: Option<String>,
    },
    /// Run a target of another element's build script.
    Ant {
        antfile: String,
        dir: String,
        target: String,
        params: Params,
    },
    /// Call a target of this script.
    AntCall {
        target: String,
        params: Params,
    },
    Available {
        property: String,
        path: String,
    },
    Chmod {
        dir: String,
        perm: String,
        includes: String,
    },
    Unzip {
        src: String,
        dest: String,
    },
    Zip {
        destfile: String,
        basedir: String,
    },
    Archive {
        kind: ArchiveKind,
        destfile: String,
        members: Vec<ArchiveMember>,
    },
    GZip {
        src: String,
        destfile: String,
    },
    Brand {
        root: String,
        icons: Vec<String>,
        name: String,
        os: String,
    },
    GenerateMetadata {
        source: String,
        mode: MetadataMode,
        config: String,
        root: Option<RootMetadata>,
    },
    SignJar {
        jar: String,
        alias: String,
        keystore: String,
        storepass: String,
    },
    Jnlp {
        jar: String,
        codebase: String,
        j2se: String,
    },
}

/// Append-only receiver of steps. Order of calls is the only contract.
pub trait ScriptSink {
    fn emit(&mut self, step: &Step) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub steps: Vec<Step>,
}

impl ScriptSink for RecordingSink {
    fn emit(&mut self, step: &Step) -> Result<()> {
        self.steps.push(step.clone());
        Ok(())
    }
}

/// A fully planned assembly script for one (feature, config) unit.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyScript {
    pub feature: String,
    #[serde(serialize_with = "serialize_config")]
    pub config: Config,
    pub file_name: String,
    pub steps: Vec<Step>,
}

fn serialize_config<S: serde::Serializer>(c: &Config, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&c.to_string())
}

impl AssemblyScript {
    pub fn write_to(&self, sink: &mut dyn ScriptSink) -> Result<()> {
        for step in &self.steps {
            sink.emit(step)?;
        }
        sink.finish()
    }

    /// Write as an Ant file named `file_name` inside `dir`.
    pub fn write_ant_file(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        let io_err = |source| Error::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let file = fs::File::create(&path).map_err(io_err)?;
        let mut sink = AntScriptSink::new(BufWriter::new(file), path.clone());
        self.write_to(&mut sink)?;
        Ok(path)
    }

    /// Targets invoked through `<antcall>`, in order.
    pub fn called_targets(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::AntCall { target, .. } => Some(target.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Value of the first `<param>` named `param` for each call of `target`.
    pub fn call_params(&self, target: &str, param: &str) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::AntCall { target: t, params } if t == target => params
                    .iter()
                    .find(|(k, _)| k == param)
                    .map(|(_, v)| v.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.steps.iter().find_map(|s| match s {
            Step::Property { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Directories of the element build scripts called with `target`.
    pub fn ant_dirs(&self, target: &str) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Ant { target: t, dir, .. } if t == target => Some(dir.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Renders steps as an Ant build file.
pub struct AntScriptSink<W: Write> {
    out: W,
    path: PathBuf,
    depth: usize,
}

impl<W: Write> AntScriptSink<W> {
    pub fn new(out: W, path: impl Into<PathBuf>) -> Self {
        Self {
            out,
            path: path.into(),
            depth: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) -> Result<()> {
        let indent = "\t".repeat(self.depth);
        writeln!(self.out, "{indent}{text}").map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn element(&mut self, name: &str, attrs: &[(&str, Option<&str>)]) -> String {
        let mut s = format!("<{name}");
        for (k, v) in attrs {
            if let Some(v) = v {
                s.push_str(&format!(" {k}=\"{}\"", escape(v)));
            }
        }
        s
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, Option<&str>)]) -> Result<()> {
        let s = self.element(name, attrs);
        self.line(&format!("{s}/>"))
    }

    fn open(&mut self, name: &str, attrs: &[(&str, Option<&str>)]) -> Result<()> {
        let s = self.element(name, attrs);
        self.line(&format!("{s}>"))?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{name}>"))
    }

    fn params(&mut self, tag: &str, params: &Params) -> Result<()> {
        for (k, v) in params {
            self.empty(tag, &[("name", Some(k)), ("value", Some(v))])?;
        }
        Ok(())
    }
}

impl<W: Write> ScriptSink for AntScriptSink<W> {
    fn emit(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::ProjectStart {
                name,
                default_target,
                basedir,
            } => {
                self.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
                self.open(
                    "project",
                    &[
                        ("name", Some(name)),
                        ("default", Some(default_target)),
                        ("basedir", basedir.as_deref()),
                    ],
                )
            }
            Step::ProjectEnd => self.close("project"),
            Step::Property { name, value } => {
                self.empty("property", &[("name", Some(name)), ("value", Some(value))])
            }
            Step::TargetStart {
                name,
                depends,
                if_set,
                description,
            } => self.open(
                "target",
                &[
                    ("name", Some(name)),
                    ("depends", depends.as_deref()),
                    ("if", if_set.as_deref()),
                    ("description", description.as_deref()),
                ],
            ),
            Step::TargetEnd => self.close("target"),
            Step::Mkdir { dir } => self.empty("mkdir", &[("dir", Some(dir))]),
            Step::Delete { path } => {
                self.empty("delete", &[("dir", Some(path)), ("quiet", Some("true"))])
            }
            Step::DeleteFile { file } => {
                self.empty("delete", &[("file", Some(file)), ("quiet", Some("true"))])
            }
            Step::Copy { todir, filesets } => {
                self.open(
                    "copy",
                    &[("todir", Some(todir)), ("failonerror", Some("true"))],
                )?;
                for fs in filesets {
                    self.empty(
                        "fileset",
                        &[
                            ("dir", Some(&fs.dir)),
                            ("includes", fs.includes.as_deref()),
                            ("excludes", fs.excludes.as_deref()),
                        ],
                    )?;
                }
                self.close("copy")
            }
            Step::Move { from_dir, to_dir } => {
                self.open("move", &[("todir", Some(to_dir))])?;
                self.empty("fileset", &[("dir", Some(from_dir))])?;
                self.close("move")
            }
            Step::Exec {
                executable,
                dir,
                args,
                os,
            } => {
                self.open(
                    "exec",
                    &[
                        ("executable", Some(executable)),
                        ("dir", Some(dir)),
                        ("os", os.as_deref()),
                        ("failonerror", Some("true")),
                    ],
                )?;
                for a in args {
                    self.empty("arg", &[("line", Some(a))])?;
                }
                self.close("exec")
            }
            Step::Ant {
                antfile,
                dir,
                target,
                params,
            } => {
                self.open(
                    "ant",
                    &[
                        ("antfile", Some(antfile)),
                        ("dir", Some(dir)),
                        ("target", Some(target)),
                    ],
                )?;
                self.params("property", params)?;
                self.close("ant")
            }
            Step::AntCall { target, params } => {
                self.open("antcall", &[("target", Some(target))])?;
                self.params("param", params)?;
                self.close("antcall")
            }
            Step::Available { property, path } => self.empty(
                "available",
                &[("property", Some(property)), ("file", Some(path))],
            ),
            Step::Chmod {
                dir,
                perm,
                includes,
            } => self.empty(
                "chmod",
                &[
                    ("perm", Some(perm)),
                    ("dir", Some(dir)),
                    ("includes", Some(includes)),
                ],
            ),
            Step::Unzip { src, dest } => self.empty(
                "unzip",
                &[
                    ("src", Some(src)),
                    ("dest", Some(dest)),
                    ("overwrite", Some("true")),
                ],
            ),
            Step::Zip { destfile, basedir } => self.empty(
                "zip",
                &[
                    ("destfile", Some(destfile)),
                    ("basedir", Some(basedir)),
                    ("filesonly", Some("false")),
                    ("whenempty", Some("skip")),
                    ("update", Some("false")),
                ],
            ),
            Step::Archive {
                kind,
                destfile,
                members,
            } => {
                let (tag, set_tag) = match kind {
                    ArchiveKind::Zip => ("zip", "zipfileset"),
                    ArchiveKind::TarGz => ("tar", "tarfileset"),
                };
                let compression = matches!(kind, ArchiveKind::TarGz).then_some("gzip");
                let longfile = matches!(kind, ArchiveKind::TarGz).then_some("gnu");
                self.open(
                    tag,
                    &[
                        ("destfile", Some(destfile)),
                        ("compression", compression),
                        ("longfile", longfile),
                    ],
                )?;
                for m in members {
                    match m {
                        ArchiveMember::Dir {
                            dir,
                            prefix,
                            includes,
                            excludes,
                            filemode,
                        } => {
                            let excludes = (!excludes.is_empty()).then(|| excludes.join(","));
                            self.empty(
                                set_tag,
                                &[
                                    ("dir", Some(dir)),
                                    ("prefix", Some(prefix)),
                                    ("includes", includes.as_deref()),
                                    ("excludes", excludes.as_deref()),
                                    ("filemode", filemode.as_deref()),
                                ],
                            )?;
                        }
                        ArchiveMember::File {
                            file,
                            full_path,
                            filemode,
                        } => {
                            self.empty(
                                set_tag,
                                &[
                                    ("file", Some(file)),
                                    ("fullpath", Some(full_path)),
                                    ("filemode", filemode.as_deref()),
                                ],
                            )?;
                        }
                    }
                }
                self.close(tag)
            }
            Step::GZip { src, destfile } => self.empty(
                "gzip",
                &[("src", Some(src)), ("destfile", Some(destfile))],
            ),
            Step::Brand {
                root,
                icons,
                name,
                os,
            } => {
                let icons = icons.join(",");
                self.empty(
                    "eclipse.brand",
                    &[
                        ("root", Some(root)),
                        ("icons", Some(&icons)),
                        ("name", Some(name)),
                        ("os", Some(os)),
                    ],
                )
            }
            Step::GenerateMetadata {
                source,
                mode,
                config,
                root,
            } => {
                let launcher = root.as_ref().and_then(|r| r.launcher.as_deref());
                let product_id = root.as_ref().and_then(|r| r.product_id.as_deref());
                let product_version = root.as_ref().and_then(|r| r.product_version.as_deref());
                self.empty(
                    "p2.generator",
                    &[
                        ("source", Some(source)),
                        ("mode", Some(mode.as_str())),
                        ("config", Some(config)),
                        ("root", root.is_some().then_some("true")),
                        ("launcherName", launcher),
                        ("productId", product_id),
                        ("productVersion", product_version),
                    ],
                )
            }
            Step::SignJar {
                jar,
                alias,
                keystore,
                storepass,
            } => self.empty(
                "signjar",
                &[
                    ("jar", Some(jar)),
                    ("alias", Some(alias)),
                    ("keystore", Some(keystore)),
                    ("storepass", Some(storepass)),
                ],
            ),
            Step::Jnlp {
                jar,
                codebase,
                j2se,
            } => self.empty(
                "eclipse.jnlpGenerator",
                &[
                    ("feature", Some(jar)),
                    ("codebase", Some(codebase)),
                    ("j2se", Some(j2se)),
                ],
            ),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            c => out.push(c),
        }
    }
    out
}
