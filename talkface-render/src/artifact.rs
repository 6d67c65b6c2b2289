//! Locating the output of a finished render in the shared results directory.
//!
//! The render executable does not name its output after the job, so the
//! newest matching file wins. `not_before` drops anything older than the
//! job itself, and files present before the run are ignored unless they
//! were rewritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use talkface_core::Artifact;

use crate::error::{resolve_io, ResolveError};

/// Which files in the results directory count as output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
    pub suffix: String,
    pub not_before: Option<SystemTime>,
    /// Files seen before the job ran, with their mtimes at that point.
    pub existing: BTreeMap<PathBuf, SystemTime>,
}

impl Default for ArtifactPattern {
    fn default() -> Self {
        Self::new(".mp4")
    }
}

impl ArtifactPattern {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            not_before: None,
            existing: BTreeMap::new(),
        }
    }

    /// Only accept files modified at or after `t`.
    pub fn not_before(mut self, t: SystemTime) -> Self {
        self.not_before = Some(t);
        self
    }

    /// Reject `seen` files whose mtime is still the one recorded.
    pub fn excluding(mut self, seen: impl IntoIterator<Item = Artifact>) -> Self {
        self.existing
            .extend(seen.into_iter().map(|a| (a.path, a.modified)));
        self
    }

    fn accepts(&self, path: &Path, name: &str, modified: SystemTime) -> bool {
        if !name.ends_with(&self.suffix) {
            return false;
        }
        if self.existing.get(path) == Some(&modified) {
            return false;
        }
        self.not_before.map_or(true, |t| modified >= t)
    }
}

/// Every regular file in `results_dir` accepted by `pattern`, unordered.
/// A missing directory yields no candidates.
pub fn candidates(results_dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<Artifact>, ResolveError> {
    let entries = match std::fs::read_dir(results_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(resolve_io(results_dir, err)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| resolve_io(results_dir, e))?;
        let path = entry.path();
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            // Vanished between listing and stat; another job's cleanup.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(resolve_io(&path, err)),
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().map_err(|e| resolve_io(&path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if pattern.accepts(&path, &name, modified) {
            found.push(Artifact { path, modified });
        }
    }
    Ok(found)
}

/// The newest accepted file; equal mtimes resolve to the greatest path.
pub fn resolve(results_dir: &Path, pattern: &ArtifactPattern) -> Result<Artifact, ResolveError> {
    let artifact = candidates(results_dir, pattern)?
        .into_iter()
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
        .ok_or_else(|| ResolveError::NoArtifactProduced {
            results_dir: results_dir.to_path_buf(),
        })?;
    tracing::debug!(
        path = %artifact.path.display(),
        modified = %artifact.modified_at(),
        "resolved artifact",
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, unix: i64) {
        let path = dir.join(name);
        std::fs::write(&path, b"mp4").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(unix, 0)).unwrap();
    }

    #[test]
    fn newest_file_wins() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a_audio.mp4", 1_000);
        touch(tmp.path(), "b_audio.mp4", 3_000);
        touch(tmp.path(), "c_audio.mp4", 2_000);

        let artifact = resolve(tmp.path(), &ArtifactPattern::default()).unwrap();
        assert_eq!(artifact.file_name(), "b_audio.mp4");
    }

    #[test]
    fn equal_mtimes_resolve_to_greatest_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "x.mp4", 5_000);
        touch(tmp.path(), "z.mp4", 5_000);
        touch(tmp.path(), "y.mp4", 5_000);

        let artifact = resolve(tmp.path(), &ArtifactPattern::default()).unwrap();
        assert_eq!(artifact.file_name(), "z.mp4");
    }

    #[test]
    fn other_suffixes_and_dirs_are_ignored() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "old.mp4", 1_000);
        touch(tmp.path(), "newer.wav", 9_000);
        std::fs::create_dir(tmp.path().join("frames.mp4")).unwrap();

        let artifact = resolve(tmp.path(), &ArtifactPattern::default()).unwrap();
        assert_eq!(artifact.file_name(), "old.mp4");
    }

    #[test]
    fn empty_or_missing_dir_is_no_artifact() {
        let tmp = TempDir::new().unwrap();
        let err = resolve(tmp.path(), &ArtifactPattern::default()).unwrap_err();
        assert!(matches!(err, ResolveError::NoArtifactProduced { .. }));

        let err = resolve(&tmp.path().join("missing"), &ArtifactPattern::default()).unwrap_err();
        assert!(matches!(err, ResolveError::NoArtifactProduced { .. }));
    }

    #[test]
    fn not_before_drops_stale_output() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "stale.mp4", 1_000);
        let start = UNIX_EPOCH + Duration::from_secs(2_000);

        let err = resolve(tmp.path(), &ArtifactPattern::default().not_before(start)).unwrap_err();
        assert!(matches!(err, ResolveError::NoArtifactProduced { .. }));
    }

    #[test]
    fn not_before_is_compared_below_the_second() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prev_job.mp4");
        std::fs::write(&path, b"mp4").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(2_000, 100_000_000)).unwrap();
        let start = UNIX_EPOCH + Duration::from_millis(2_000_900);

        let err = resolve(tmp.path(), &ArtifactPattern::default().not_before(start)).unwrap_err();
        assert!(matches!(err, ResolveError::NoArtifactProduced { .. }));
    }

    #[test]
    fn files_seen_before_the_run_need_a_new_mtime() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "kept.mp4", 5_000);
        touch(tmp.path(), "rewritten.mp4", 4_000);
        let seen = candidates(tmp.path(), &ArtifactPattern::default()).unwrap();

        let pattern = ArtifactPattern::default().excluding(seen);
        let err = resolve(tmp.path(), &pattern).unwrap_err();
        assert!(matches!(err, ResolveError::NoArtifactProduced { .. }));

        touch(tmp.path(), "rewritten.mp4", 4_001);
        let artifact = resolve(tmp.path(), &pattern).unwrap();
        assert_eq!(artifact.file_name(), "rewritten.mp4");
    }
}
