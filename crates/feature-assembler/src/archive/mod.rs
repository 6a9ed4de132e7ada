use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::planner::AssemblySettings;
use crate::platform::Config;
use crate::rootfiles::RootFilePlan;
use crate::script::{Step, prop};
use crate::shape::Shape;

pub mod ant;
pub mod folder;
pub mod targz;
pub mod zip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ArchiveFormat {
    Folder,
    #[default]
    Zip,
    AntZip,
    AntTar,
    Tar,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::Folder,
        ArchiveFormat::Zip,
        ArchiveFormat::AntZip,
        ArchiveFormat::AntTar,
        ArchiveFormat::Tar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveFormat::Folder => "folder",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::AntZip => "antzip",
            ArchiveFormat::AntTar => "anttar",
            ArchiveFormat::Tar => "tar",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        ArchiveFormat::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::msg(format!(
                    "unknown archive format '{s}' (expected folder, zip, antzip, anttar or tar)"
                ))
            })
    }
}

impl TryFrom<String> for ArchiveFormat {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A packaged element as the archiver sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// `<id>_<version>`, with a trailing `/` for folders.
    pub name: String,
    pub shape: Shape,
}

impl Member {
    /// Name of the gathered file or directory below the collecting area.
    pub fn file_name(&self) -> String {
        match self.shape {
            Shape::Folder => self.name.clone(),
            Shape::File => format!("{}.jar", self.name),
        }
    }

    pub fn base_name(&self) -> &str {
        self.name.trim_end_matches('/')
    }
}

pub struct ArchiveContext<'a> {
    pub config: &'a Config,
    pub settings: &'a AssemblySettings,
    pub plugins: &'a [Member],
    pub features: &'a [Member],
    pub root_plans: &'a [RootFilePlan],
}

impl ArchiveContext<'_> {
    pub fn has_root_files(&self) -> bool {
        !self.root_plans.is_empty()
    }

    /// Per-config staging folder holding the root folder.
    pub fn config_staging(&self) -> String {
        config_staging(self.config)
    }

    pub fn root_folder(&self) -> String {
        root_folder(self.config)
    }
}

pub fn config_staging(config: &Config) -> String {
    format!("{}/{}", prop("eclipse.base"), config.dotted_name())
}

pub fn root_folder(config: &Config) -> String {
    format!("{}/{}", config_staging(config), prop("collectingFolder"))
}

pub trait ArchiveStrategy: Send + Sync {
    fn format(&self) -> ArchiveFormat;

    /// Archive file extension including the dot, empty for folders.
    fn extension(&self) -> &'static str;

    fn emit(&self, ctx: &ArchiveContext<'_>, out: &mut Vec<Step>) -> Result<()>;
}

pub fn strategy_for(format: ArchiveFormat) -> Box<dyn ArchiveStrategy> {
    match format {
        ArchiveFormat::Folder => Box::new(folder::FolderStrategy),
        ArchiveFormat::Zip => Box::new(zip::ZipStrategy),
        ArchiveFormat::AntZip => Box::new(ant::AntArchiveStrategy::zip()),
        ArchiveFormat::AntTar => Box::new(ant::AntArchiveStrategy::tar()),
        ArchiveFormat::Tar => Box::new(targz::TarGzStrategy),
    }
}
