use std::collections::BTreeSet;

use super::{ArchiveContext, ArchiveFormat, ArchiveStrategy, Member};
use crate::error::Result;
use crate::script::{ArchiveKind, ArchiveMember, Step, prop};
use crate::shape::Shape;

/// One declarative archive task holding every member, with file modes
/// applied inside the archive.
pub struct AntArchiveStrategy {
    kind: ArchiveKind,
}

impl AntArchiveStrategy {
    pub fn zip() -> Self {
        Self {
            kind: ArchiveKind::Zip,
        }
    }

    pub fn tar() -> Self {
        Self {
            kind: ArchiveKind::TarGz,
        }
    }
}

fn element_members(source: &str, prefix: &str, members: &[Member]) -> Vec<ArchiveMember> {
    members
        .iter()
        .map(|m| match m.shape {
            Shape::Folder => ArchiveMember::Dir {
                dir: format!("{source}/{}", m.base_name()),
                prefix: format!("{prefix}/{}", m.base_name()),
                includes: None,
                excludes: Vec::new(),
                filemode: None,
            },
            Shape::File => ArchiveMember::File {
                file: format!("{source}/{}", m.file_name()),
                full_path: format!("{prefix}/{}", m.file_name()),
                filemode: None,
            },
        })
        .collect()
}

fn under(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    }
}

impl ArchiveStrategy for AntArchiveStrategy {
    fn format(&self) -> ArchiveFormat {
        match self.kind {
            ArchiveKind::Zip => ArchiveFormat::AntZip,
            ArchiveKind::TarGz => ArchiveFormat::AntTar,
        }
    }

    fn extension(&self) -> &'static str {
        match self.kind {
            ArchiveKind::Zip => ".zip",
            ArchiveKind::TarGz => ".tar.gz",
        }
    }

    fn emit(&self, ctx: &ArchiveContext<'_>, out: &mut Vec<Step>) -> Result<()> {
        let mut members = element_members(
            &prop("eclipse.plugins"),
            &prop("pluginArchivePrefix"),
            ctx.plugins,
        );
        members.extend(element_members(
            &prop("eclipse.features"),
            &prop("featureArchivePrefix"),
            ctx.features,
        ));

        if ctx.has_root_files() {
            let root = ctx.root_folder();
            let prefix = ctx.settings.archive_prefix.clone().unwrap_or_default();
            let mut claimed = BTreeSet::new();
            for plan in ctx.root_plans {
                for (rights, paths) in plan.chmods() {
                    members.push(ArchiveMember::Dir {
                        dir: root.clone(),
                        prefix: prefix.clone(),
                        includes: Some(paths.join(",")),
                        excludes: Vec::new(),
                        filemode: Some(rights.to_string()),
                    });
                }
                // Linked names are stored as the file the link points at.
                // A win32 host never creates the links.
                let creates_links = ctx.settings.host_os != "win32";
                for (_, name) in plan.links().filter(|_| creates_links) {
                    members.push(ArchiveMember::File {
                        file: format!("{root}/{name}"),
                        full_path: under(&prefix, name),
                        filemode: None,
                    });
                }
                claimed.extend(plan.claimed.iter().cloned());
            }
            members.push(ArchiveMember::Dir {
                dir: root,
                prefix,
                includes: None,
                excludes: claimed.into_iter().collect(),
                filemode: None,
            });
        }

        out.push(Step::Archive {
            kind: self.kind,
            destfile: prop("archiveFullPath"),
            members,
        });
        Ok(())
    }
}
