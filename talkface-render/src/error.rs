//! Error types for talkface-render.

use std::path::PathBuf;

use thiserror::Error;

use talkface_assets::ProvisionError;
use talkface_core::{ErrorKind, Stage};

/// Failures of one invocation of the external render executable.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Nonzero exit, or `-1` when killed by a signal.
    #[error("render process failed (exit {exit_code})")]
    ProcessFailed { exit_code: i32, stderr_tail: String },

    #[error("render process exceeded {secs}s and was killed")]
    Timeout { secs: u64 },

    #[error("search path cannot be joined: {0}")]
    InvalidSearchPath(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunnerError::ProcessFailed { .. } => ErrorKind::RenderProcessFailed,
            RunnerError::Timeout { .. } => ErrorKind::Timeout,
            RunnerError::Spawn { .. } | RunnerError::InvalidSearchPath(_) | RunnerError::Io { .. } => {
                ErrorKind::Io
            }
        }
    }
}

/// Failures of locating the output of a finished job.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no artifact produced in {results_dir}")]
    NoArtifactProduced { results_dir: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact scan failed: {0}")]
    Task(String),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::NoArtifactProduced { .. } => ErrorKind::NoArtifactProduced,
            ResolveError::Io { .. } | ResolveError::Task(_) => ErrorKind::Io,
        }
    }
}

/// A failed render request, tagged with the stage it failed in.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Assets(#[from] ProvisionError),

    #[error("invalid job preconditions: {0}")]
    InvalidJobPreconditions(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Artifact(#[from] ResolveError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn stage(&self) -> Stage {
        match self {
            RenderError::Assets(_) => Stage::Assets,
            RenderError::InvalidJobPreconditions(_) | RenderError::Io { .. } => Stage::Preconditions,
            RenderError::Runner(_) => Stage::Render,
            RenderError::Artifact(_) => Stage::Artifact,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Assets(e) => e.kind(),
            RenderError::InvalidJobPreconditions(_) => ErrorKind::InvalidJobPreconditions,
            RenderError::Runner(e) => e.kind(),
            RenderError::Artifact(e) => e.kind(),
            RenderError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Bounded stderr of a failed render process.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            RenderError::Runner(RunnerError::ProcessFailed { stderr_tail, .. }) => {
                Some(stderr_tail.as_str())
            }
            _ => None,
        }
    }

    /// Exit code of a failed render process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RenderError::Runner(RunnerError::ProcessFailed { exit_code, .. }) => Some(*exit_code),
            _ => None,
        }
    }
}

/// Text-to-speech failures.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed (exit {exit_code}): {stderr_tail}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("{path} is not the expected WAV: {reason}")]
    InvalidWav { path: PathBuf, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn runner_io(path: impl Into<PathBuf>, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn resolve_io(path: impl Into<PathBuf>, source: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn tts_io(path: impl Into<PathBuf>, source: std::io::Error) -> TtsError {
    TtsError::Io {
        path: path.into(),
        source,
    }
}
