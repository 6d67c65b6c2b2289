//! Domain types shared by every talkface crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for an asset bundle (e.g. `data-assets`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleName(pub String);

impl fmt::Display for BundleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BundleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BundleName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a single render job, used for log correlation and for
/// naming per-request input files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Asset bundles
// ---------------------------------------------------------------------------

/// A named set of large asset files provisioned once from remote storage.
///
/// `local_dir` is absolute once resolved from the configuration. Its file
/// name is the canonical folder name the extracted archive is normalized to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
    pub name: BundleName,
    /// Opaque locator of the remote archive.
    pub remote_id: String,
    pub local_dir: PathBuf,
    /// Optional hex SHA-256 the downloaded archive must match.
    pub sha256: Option<String>,
}

impl AssetBundle {
    /// Canonical folder name (`May` for `/app/data/May`).
    pub fn expected_name(&self) -> String {
        self.local_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.0.clone())
    }

    /// Directory the archive is downloaded and extracted into.
    pub fn parent_dir(&self) -> PathBuf {
        self.local_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// `<parent>/<expected_name>.zip`
    pub fn archive_path(&self) -> PathBuf {
        self.parent_dir()
            .join(format!("{}.zip", self.expected_name()))
    }

    /// `<parent>/.<expected_name>.staging`: private extraction target.
    pub fn staging_dir(&self) -> PathBuf {
        self.parent_dir()
            .join(format!(".{}.staging", self.expected_name()))
    }
}

// ---------------------------------------------------------------------------
// Render jobs
// ---------------------------------------------------------------------------

/// One invocation of the external render executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub id: JobId,
    pub audio_input_path: PathBuf,
    pub data_root: PathBuf,
    pub workspace_root: PathBuf,
    /// Appended after every fixed argument.
    pub extra_args: Vec<String>,
}

impl RenderJob {
    pub fn new(
        audio_input_path: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: JobId::new(),
            audio_input_path: audio_input_path.into(),
            data_root: data_root.into(),
            workspace_root: workspace_root.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub succeeded: bool,
    pub duration: Duration,
}

/// A candidate output file observed in the results directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.modified)
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Assets,
    Preconditions,
    Render,
    Artifact,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Assets => write!(f, "assets"),
            Stage::Preconditions => write!(f, "preconditions"),
            Stage::Render => write!(f, "render"),
            Stage::Artifact => write!(f, "artifact"),
        }
    }
}

/// Error taxonomy surfaced to callers of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchFailed,
    ExtractionFailed,
    AmbiguousAssetLayout,
    InvalidJobPreconditions,
    RenderProcessFailed,
    NoArtifactProduced,
    Timeout,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::AmbiguousAssetLayout => "ambiguous_asset_layout",
            ErrorKind::InvalidJobPreconditions => "invalid_job_preconditions",
            ErrorKind::RenderProcessFailed => "render_process_failed",
            ErrorKind::NoArtifactProduced => "no_artifact_produced",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(local_dir: &str) -> AssetBundle {
        AssetBundle {
            name: BundleName::from("data-assets"),
            remote_id: "abc".into(),
            local_dir: PathBuf::from(local_dir),
            sha256: None,
        }
    }

    #[test]
    fn bundle_paths_derive_from_local_dir() {
        let b = bundle("/app/data/May");
        assert_eq!(b.expected_name(), "May");
        assert_eq!(b.parent_dir(), PathBuf::from("/app/data"));
        assert_eq!(b.archive_path(), PathBuf::from("/app/data/May.zip"));
        assert_eq!(b.staging_dir(), PathBuf::from("/app/data/.May.staging"));
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn render_job_keeps_extra_args_in_order() {
        let job = RenderJob::new("a.wav", "/d", "/w").with_extra_args(["--fps", "25"]);
        assert_eq!(job.extra_args, vec!["--fps".to_string(), "25".to_string()]);
    }

    #[test]
    fn error_kind_display_matches_serde() {
        let json = serde_yaml::to_string(&ErrorKind::AmbiguousAssetLayout).expect("serialize");
        assert_eq!(json.trim(), ErrorKind::AmbiguousAssetLayout.to_string());
        assert_eq!(Stage::Render.to_string(), "render");
    }
}
