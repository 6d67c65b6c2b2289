//! Normalization of an extracted archive into the canonical bundle folder.
//!
//! Archives come in three shapes:
//!
//! | staging contents                     | bundle becomes               |
//! |--------------------------------------|------------------------------|
//! | a folder named like the bundle       | that folder (exact case wins)|
//! | exactly one folder                   | that folder, renamed         |
//! | loose files only, no folder          | the staging dir itself       |
//!
//! Anything else is ambiguous and left untouched for inspection.

use std::path::{Path, PathBuf};

use crate::error::{io_err, AssetError};

/// Which staging entry becomes the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// A top-level folder inside staging.
    Folder(PathBuf),
    /// The archive had no wrapping folder.
    Flat,
}

/// Archive tooling leaves these behind; they never count as content.
fn is_noise(name: &str) -> bool {
    name.starts_with('.') || name == "__MACOSX"
}

/// Decide which entry of `staging` holds the bundle named `expected`.
pub fn choose(staging: &Path, expected: &str) -> Result<Choice, AssetError> {
    let mut dirs: Vec<(String, PathBuf)> = Vec::new();
    let mut files = 0usize;

    let entries = std::fs::read_dir(staging).map_err(|e| io_err(staging, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(staging, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_noise(&name) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push((name, path));
        } else {
            files += 1;
        }
    }
    dirs.sort();

    if let Some((_, path)) = dirs.iter().find(|(name, _)| name == expected) {
        return Ok(Choice::Folder(path.clone()));
    }

    let folded: Vec<&(String, PathBuf)> = dirs
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(expected))
        .collect();
    match folded.as_slice() {
        [(_, path)] => return Ok(Choice::Folder(path.clone())),
        [] => {}
        _ => return Err(ambiguous(staging, expected, &dirs)),
    }

    match (dirs.len(), files) {
        (0, 0) => Err(AssetError::ExtractionFailed {
            archive: staging.to_path_buf(),
            reason: "archive contained no files".into(),
        }),
        (1, _) => Ok(Choice::Folder(dirs[0].1.clone())),
        (0, _) => Ok(Choice::Flat),
        _ => Err(ambiguous(staging, expected, &dirs)),
    }
}

fn ambiguous(staging: &Path, expected: &str, dirs: &[(String, PathBuf)]) -> AssetError {
    AssetError::AmbiguousAssetLayout {
        staging: staging.to_path_buf(),
        expected: expected.to_string(),
        candidates: dirs.iter().map(|(name, _)| name.clone()).collect(),
    }
}

/// Move the chosen content of `staging` to `local_dir` and drop the rest.
///
/// On [`AssetError::AmbiguousAssetLayout`] nothing is moved and `staging` is
/// kept so the archive contents can be inspected.
pub fn normalize(staging: &Path, local_dir: &Path) -> Result<Choice, AssetError> {
    let expected = local_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let choice = choose(staging, &expected)?;
    let source = match &choice {
        Choice::Folder(path) => path.clone(),
        Choice::Flat => staging.to_path_buf(),
    };

    // An empty leftover target is replaced; a populated one is an error.
    if local_dir.is_dir() {
        std::fs::remove_dir(local_dir).map_err(|e| io_err(local_dir, e))?;
    }
    std::fs::rename(&source, local_dir).map_err(|e| io_err(local_dir, e))?;

    if let Choice::Folder(path) = &choice {
        let found = path.file_name().map(|n| n.to_string_lossy().into_owned());
        if found.as_deref() != Some(expected.as_str()) {
            tracing::info!(
                found = found.as_deref().unwrap_or_default(),
                expected = %expected,
                "renamed extracted folder to canonical name",
            );
        }
        if let Err(err) = std::fs::remove_dir_all(staging) {
            tracing::warn!(staging = %staging.display(), error = %err, "failed to remove staging dir");
        }
    }
    Ok(choice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staging_with(dirs: &[&str], files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join(".May.staging");
        std::fs::create_dir_all(&staging).unwrap();
        for d in dirs {
            std::fs::create_dir_all(staging.join(d)).unwrap();
            std::fs::write(staging.join(d).join("content.bin"), b"x").unwrap();
        }
        for f in files {
            std::fs::write(staging.join(f), b"x").unwrap();
        }
        tmp
    }

    #[test]
    fn exact_match_beats_case_insensitive() {
        let tmp = staging_with(&["May", "MAY"], &[]);
        let staging = tmp.path().join(".May.staging");
        // Case-insensitive filesystems collapse both into one folder.
        let choice = choose(&staging, "May").unwrap();
        assert!(matches!(choice, Choice::Folder(p) if p.ends_with("May")));
    }

    #[test]
    fn differently_cased_folder_is_renamed() {
        let tmp = staging_with(&["MAY"], &[]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        normalize(&staging, &local).unwrap();
        assert!(local.join("content.bin").is_file());
        assert!(!staging.exists());
    }

    #[test]
    fn single_folder_with_other_name_is_renamed() {
        let tmp = staging_with(&["export_2024", "__MACOSX"], &[".DS_Store"]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        let choice = normalize(&staging, &local).unwrap();
        assert!(matches!(choice, Choice::Folder(_)));
        assert!(local.join("content.bin").is_file());
        assert!(!staging.exists());
    }

    #[test]
    fn flat_archive_becomes_the_bundle() {
        let tmp = staging_with(&[], &["transforms.json", "aud.wav"]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        assert_eq!(normalize(&staging, &local).unwrap(), Choice::Flat);
        assert!(local.join("transforms.json").is_file());
        assert!(local.join("aud.wav").is_file());
        assert!(!staging.exists());
    }

    #[test]
    fn single_folder_beside_loose_files_is_the_bundle() {
        let tmp = staging_with(&["export"], &["README.txt"]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        let choice = normalize(&staging, &local).unwrap();
        assert!(matches!(choice, Choice::Folder(p) if p.ends_with("export")));
        assert!(local.join("content.bin").is_file());
        assert!(!local.join("README.txt").exists());
        assert!(!staging.exists());
    }

    #[test]
    fn loose_files_do_not_resolve_several_folders() {
        let tmp = staging_with(&["alpha", "beta"], &["README.txt"]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        let err = normalize(&staging, &local).unwrap_err();
        assert!(
            matches!(err, AssetError::AmbiguousAssetLayout { .. }),
            "got: {err}"
        );
        assert!(!local.exists());
        assert!(staging.join("README.txt").is_file());
    }

    #[test]
    fn several_unrelated_folders_are_ambiguous_and_untouched() {
        let tmp = staging_with(&["alpha", "beta"], &[]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");

        let err = normalize(&staging, &local).unwrap_err();
        match err {
            AssetError::AmbiguousAssetLayout { candidates, expected, .. } => {
                assert_eq!(candidates, vec!["alpha".to_string(), "beta".to_string()]);
                assert_eq!(expected, "May");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!local.exists());
        assert!(staging.join("alpha").is_dir());
        assert!(staging.join("beta").is_dir());
    }

    #[test]
    fn empty_staging_is_an_extraction_failure() {
        let tmp = staging_with(&["__MACOSX"], &[]);
        let staging = tmp.path().join(".May.staging");
        let err = choose(&staging, "May").unwrap_err();
        assert!(matches!(err, AssetError::ExtractionFailed { .. }));
    }

    #[test]
    fn empty_leftover_target_is_replaced() {
        let tmp = staging_with(&["May"], &[]);
        let staging = tmp.path().join(".May.staging");
        let local = tmp.path().join("May");
        std::fs::create_dir_all(&local).unwrap();

        normalize(&staging, &local).unwrap();
        assert!(local.join("content.bin").is_file());
    }
}
