use tracing::debug;

use super::{ArchiveContext, ArchiveFormat, ArchiveStrategy, Member};
use crate::error::Result;
use crate::script::{Step, prop};

pub const DEFAULT_BATCH_SIZE: usize = 15;

/// Shells out to `zip`, a bounded number of entries per invocation.
pub struct ZipStrategy;

fn zip_call(dir: String, entries: &[String]) -> Step {
    let mut args = vec![format!(
        "-r -q {} {}",
        prop("zipargs"),
        prop("archiveFullPath")
    )];
    args.extend(entries.iter().cloned());
    Step::Exec {
        executable: "zip".into(),
        dir,
        args,
        os: None,
    }
}

fn entries(folder: &str, members: &[Member]) -> Vec<String> {
    members
        .iter()
        .map(|m| format!("{}/{folder}/{}", prop("collectingFolder"), m.file_name()))
        .collect()
}

impl ArchiveStrategy for ZipStrategy {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn extension(&self) -> &'static str {
        ".zip"
    }

    fn emit(&self, ctx: &ArchiveContext<'_>, out: &mut Vec<Step>) -> Result<()> {
        let batch = ctx.settings.zip_batch_size.max(1);
        for (folder, members) in [("plugins", ctx.plugins), ("features", ctx.features)] {
            let all = entries(folder, members);
            for chunk in all.chunks(batch) {
                out.push(zip_call(prop("assemblyTempDir"), chunk));
            }
            debug!(folder, count = all.len(), batch, "zip batches planned");
        }
        if ctx.has_root_files() {
            out.push(zip_call(
                ctx.config_staging(),
                &[prop("collectingFolder")],
            ));
        }
        Ok(())
    }
}
