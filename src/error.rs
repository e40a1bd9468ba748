use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipesetError {
    // Config
    #[error("missing required field `{0}` in task configuration")]
    MissingField(&'static str),

    #[error("invalid glob `{glob}`")]
    InvalidGlob {
        glob: String,
        #[source]
        source: globset::Error,
    },

    #[error("file not found with singular glob `{0}`")]
    NoMatch(String),

    // Filesystem
    #[error("IO error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied")]
    PermissionDenied(PathBuf),

    #[error("symlink loop")]
    SymlinkLoop(PathBuf),

    #[error("walk error: {0}")]
    Walk(String),

    // Nested pipelines
    #[error("splice input is closed")]
    SpliceClosed,

    #[error("nested pipeline stopped without signalling completion")]
    SubPipelineAborted,

    // Transformation engines
    #[error("{plugin}: failed to process {}", path.display())]
    Engine {
        plugin: &'static str,
        path:   PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Broad classes of [`PipesetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building a task, before any stream runs.
    Configuration,

    /// A stat/lstat/mkdir/symlink/rm or walk failure.
    FileSystem,

    /// A spliced sub-pipeline stopped abnormally.
    NestedPipeline,

    /// An external transformation engine rejected an entry.
    Engine,
}

impl PipesetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// The path this error occurred at, if applicable.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::PermissionDenied(p)
            | Self::SymlinkLoop(p)
            | Self::Io { path: p, .. }
            | Self::Engine { path: p, .. } => Some(p),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidGlob { .. } => ErrorKind::Configuration,
            Self::NoMatch(_)
            | Self::Io { .. }
            | Self::PermissionDenied(_)
            | Self::SymlinkLoop(_)
            | Self::Walk(_) => ErrorKind::FileSystem,
            Self::SpliceClosed | Self::SubPipelineAborted => ErrorKind::NestedPipeline,
            Self::Engine { .. } => ErrorKind::Engine,
        }
    }
}

pub type Result<T, E = PipesetError> = std::result::Result<T, E>;
