use super::{ArchiveContext, ArchiveFormat, ArchiveStrategy};
use crate::error::Result;
use crate::script::{Step, prop};

/// Leaves the collected tree in place and merges the root folder into it.
pub struct FolderStrategy;

impl ArchiveStrategy for FolderStrategy {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Folder
    }

    fn extension(&self) -> &'static str {
        ""
    }

    fn emit(&self, ctx: &ArchiveContext<'_>, out: &mut Vec<Step>) -> Result<()> {
        if !ctx.has_root_files() {
            return Ok(());
        }
        let temp = prop("assemblyTempDir");
        if ctx.settings.host_os == "win32" {
            out.push(Step::Move {
                from_dir: ctx.config_staging(),
                to_dir: temp,
            });
        } else {
            out.push(Step::Exec {
                executable: "cp".into(),
                dir: prop("basedir"),
                args: vec![format!("-r {} {temp}", ctx.root_folder())],
                os: None,
            });
        }
        out.push(Step::Delete {
            path: ctx.config_staging(),
        });
        Ok(())
    }
}
