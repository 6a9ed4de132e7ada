use std::path::PathBuf;

use thiserror::Error as DeriveError;

#[derive(Debug, DeriveError)]
pub enum Error {
    /// A declared plugin, feature or root file could not be located while planning.
    #[error("feature '{feature}' [{config}]: missing {path}")]
    MissingElement {
        feature: String,
        config: String,
        path: String,
    },

    /// A permission or link property that cannot be turned into an instruction.
    #[error("feature '{feature}': malformed instruction '{key}': {reason}")]
    MalformedInstruction {
        feature: String,
        key: String,
        reason: String,
    },

    #[error("{0}")]
    Config(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Config(msg.into())
    }

    pub fn missing(
        feature: impl Into<String>,
        config: impl ToString,
        path: impl Into<String>,
    ) -> Self {
        Self::MissingElement {
            feature: feature.into(),
            config: config.to_string(),
            path: path.into(),
        }
    }

    pub fn malformed(
        feature: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedInstruction {
            feature: feature.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
