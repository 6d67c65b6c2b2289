//! Provision records: what was installed, from where, and when.
//!
//! Persists one JSON document per bundle at
//! `<parent>/.talkface/<bundle>.json`, next to the bundle folder.
//! Writes use the atomic `.tmp` + rename pattern.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talkface_core::{AssetBundle, BundleName};

use crate::error::{io_err, AssetError};

/// On-disk record of one successful provisioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionRecord {
    pub bundle: BundleName,
    pub remote_id: String,
    pub archive_sha256: String,
    pub provisioned_at: DateTime<Utc>,
}

/// `<parent>/.talkface/<bundle>.json`
pub fn record_path(bundle: &AssetBundle) -> PathBuf {
    bundle
        .parent_dir()
        .join(".talkface")
        .join(format!("{}.json", bundle.name))
}

/// Load the record for `bundle`. `Ok(None)` when never provisioned by us
/// (bundles may also be installed by hand).
pub fn load(bundle: &AssetBundle) -> Result<Option<ProvisionRecord>, AssetError> {
    let path = record_path(bundle);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let record = serde_json::from_str(&contents).map_err(|e| {
        io_err(
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    Ok(Some(record))
}

/// Save atomically: `<path>.tmp` then rename.
pub fn save(bundle: &AssetBundle, record: &ProvisionRecord) -> Result<(), AssetError> {
    save_at(&record_path(bundle), record)
}

fn save_at(path: &Path, record: &ProvisionRecord) -> Result<(), AssetError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid provision record path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(record).map_err(|e| io_err(path, e.into()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle(root: &Path) -> AssetBundle {
        AssetBundle {
            name: BundleName::from("data-assets"),
            remote_id: "abc".into(),
            local_dir: root.join("data").join("May"),
            sha256: None,
        }
    }

    #[test]
    fn missing_record_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load(&bundle(tmp.path())).unwrap().is_none());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let b = bundle(tmp.path());
        let record = ProvisionRecord {
            bundle: b.name.clone(),
            remote_id: b.remote_id.clone(),
            archive_sha256: "deadbeef".into(),
            provisioned_at: Utc::now(),
        };

        save(&b, &record).unwrap();
        assert_eq!(load(&b).unwrap(), Some(record));
        assert_eq!(
            record_path(&b),
            tmp.path().join("data").join(".talkface").join("data-assets.json")
        );
        assert!(!record_path(&b).with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_record_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let b = bundle(tmp.path());
        let path = record_path(&b);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(load(&b), Err(AssetError::Io { .. })));
    }
}
