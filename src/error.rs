//! Error type shared by the header repair and the SynthStrip shim.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid NIfTI header: {0}")]
    InvalidHeader(String),

    #[error("unsupported image: {0}")]
    Unsupported(String),

    #[error("input image '{}' does not exist", .0.display())]
    MissingInput(PathBuf),

    /// The external tool returned without writing one of its declared outputs.
    #[error("expected output '{}' was not produced", .0.display())]
    MissingOutput(PathBuf),

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    ToolFailed { program: String, status: ExitStatus },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
