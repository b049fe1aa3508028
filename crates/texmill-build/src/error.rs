use crate::artifacts::ArtifactKind;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by a [`ProcessRunner`](crate::process::ProcessRunner).
///
/// A non-zero exit code is *not* a `ProcessError`; the runner reports it as
/// a plain exit code and leaves the interpretation to the caller.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} was terminated by a signal")]
    Signalled { program: PathBuf },
    #[error("{program} was cancelled")]
    Cancelled { program: PathBuf },
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: PathBuf, timeout: Duration },
}

/// Errors surfaced by job construction, configuration and the build phases.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("main document {path} does not exist: {source}")]
    DocumentNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("main document {0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("main document {0} has an empty base name")]
    EmptyBaseName(PathBuf),
    #[error("output location {0} needs a file name inside an existing directory")]
    InvalidOutput(PathBuf),
    #[error("unknown artifact kind '{0}'")]
    UnknownKind(String),
    #[error("artifact kind '{0}' cannot be declared as a requirement")]
    NotDeclarable(ArtifactKind),
    /// A tool ran and exited with a non-zero status.
    #[error("{tool} exited with code {code} while processing {input}")]
    ToolFailed {
        tool: &'static str,
        code: i32,
        input: PathBuf,
    },
    #[error("{tool} could not be run: {source}")]
    Process {
        tool: &'static str,
        #[source]
        source: ProcessError,
    },
    #[error("{0} is not usable on this host")]
    Unusable(&'static str),
    #[error("build was cancelled")]
    Cancelled,
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
