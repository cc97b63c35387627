//! Config loading failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("home directory is unknown; pass --config or set GATELINK_CONFIG")]
    NoHomeDir,

    #[error("invalid json5: {0}")]
    Syntax(String),

    #[error("could not encode config: {0}")]
    Encode(#[from] serde_json::Error),

    /// Every problem found by [`Config::validate`](crate::Config::validate).
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether this error only means "no config file yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Individual validation problems, empty for other failures.
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid(problems) => problems,
            _ => &[],
        }
    }
}
