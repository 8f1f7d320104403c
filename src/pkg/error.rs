use std::io;
use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PkgDiffError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Incomplete transfer of {url}: received {received} of {expected} bytes")]
    IncompleteTransfer {
        url: String,
        received: u64,
        expected: u64,
    },
    #[error("Cannot access {}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Extraction error in {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },
    #[error("Cancelled after a peer pipeline failed")]
    Cancelled,
}

impl PkgDiffError {
    pub fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PkgDiffError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PkgDiffError::Cancelled)
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[strum(serialize = "locate")]
    Locate,
    #[strum(serialize = "staging")]
    Staging,
    #[strum(serialize = "download")]
    Download,
    #[strum(serialize = "extract")]
    Extract,
    #[strum(serialize = "parse")]
    Parse,
}

/// A [`PkgDiffError`] tagged with the stage and artifact that produced it.
#[derive(Error, Debug)]
#[error("{stage} stage failed for {family} {version}")]
pub struct PipelineError {
    pub stage: Stage,
    pub family: String,
    pub version: String,
    #[source]
    pub source: PkgDiffError,
}

impl PipelineError {
    pub fn new(stage: Stage, family: &str, version: &str, source: PkgDiffError) -> Self {
        PipelineError {
            stage,
            family: family.to_string(),
            version: version.to_string(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}
