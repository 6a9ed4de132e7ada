use super::{ArchiveContext, ArchiveFormat, ArchiveStrategy};
use crate::error::Result;
use crate::script::{Step, prop};

/// Native `tar` followed by gzip.
pub struct TarGzStrategy;

impl ArchiveStrategy for TarGzStrategy {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Tar
    }

    fn extension(&self) -> &'static str {
        ".tar.gz"
    }

    fn emit(&self, ctx: &ArchiveContext<'_>, out: &mut Vec<Step>) -> Result<()> {
        let temp = prop("assemblyTempDir");
        let tar = format!("{temp}/tmp.tar");
        if ctx.has_root_files() {
            out.push(Step::Exec {
                executable: "cp".into(),
                dir: prop("basedir"),
                args: vec![format!("-r {} {temp}", ctx.root_folder())],
                os: None,
            });
            out.push(Step::Exec {
                executable: "rm".into(),
                dir: prop("basedir"),
                args: vec![format!("-rf {}", ctx.config_staging())],
                os: None,
            });
        }
        out.push(Step::Exec {
            executable: "tar".into(),
            dir: temp.clone(),
            args: vec![format!(
                "-cvf {tar} {} {}",
                prop("tarargs"),
                prop("collectingFolder")
            )],
            os: None,
        });
        out.push(Step::GZip {
            src: tar.clone(),
            destfile: prop("archiveFullPath"),
        });
        out.push(Step::DeleteFile { file: tar });
        Ok(())
    }
}
