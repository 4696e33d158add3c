//! Unified error types for brig

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for brig operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    Config(String),

    // Filesystem errors
    #[error("{op} failed: {path}: {source}")]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    // Mount/unmount syscall errors
    #[error("{op} failed: {path}: {source}")]
    Mount {
        op: &'static str,
        path: PathBuf,
        source: nix::Error,
    },

    #[error("mknod failed: {path}: {source}")]
    DeviceNode { path: PathBuf, source: nix::Error },

    #[error("copy failed: {from} -> {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    // Privileged syscall errors (chroot, chdir)
    #[error("{op} failed: {path}: {source}")]
    Syscall {
        op: &'static str,
        path: PathBuf,
        source: nix::Error,
    },

    #[error("exec failed: {command}: {source}")]
    Exec { command: String, source: nix::Error },

    // Teardown precondition
    #[error("jail root does not exist: {0}")]
    JailMissing(PathBuf),

    #[error("failed to parse mount table {path}: {msg}")]
    MountTableParse { path: PathBuf, msg: String },
}

impl Error {
    /// Annotate an I/O error with the operation and path it concerns
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for brig operations
pub type Result<T> = std::result::Result<T, Error>;
