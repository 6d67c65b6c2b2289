//! Archive download and extraction.
//!
//! ## Download promotion
//!
//! 1. Remove any stale `<dest>.part` left by an interrupted attempt.
//! 2. Stream the response body into `<dest>.part`.
//! 3. Reject empty bodies and HTML interstitials.
//! 4. `fsync`, then rename `.part` to `dest` (atomic on POSIX).
//!
//! A file at `dest` therefore always holds a complete download.

use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, AssetError};

/// Fetches a remote archive and unpacks it. Implementations are blocking and
/// are driven from a `spawn_blocking` thread by the provisioner.
pub trait ArchiveFetcher: Send + Sync {
    /// Download `remote_id` to `dest`. `dest` must only appear once complete.
    fn fetch(&self, remote_id: &str, dest: &Path) -> Result<(), AssetError>;

    /// Unpack `archive` into `dest_dir`.
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), AssetError>;
}

/// `ureq` downloader + `zip` extractor.
pub struct HttpArchiveFetcher {
    agent: ureq::Agent,
    url_template: String,
}

impl HttpArchiveFetcher {
    /// `url_template` must contain `{id}`.
    pub fn new(url_template: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .build();
        Self {
            agent,
            url_template: url_template.into(),
        }
    }

    pub fn url_for(&self, remote_id: &str) -> String {
        self.url_template.replace("{id}", remote_id)
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn fetch(&self, remote_id: &str, dest: &Path) -> Result<(), AssetError> {
        let url = self.url_for(remote_id);
        let failed = |reason: String| AssetError::FetchFailed {
            remote_id: remote_id.to_string(),
            reason,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let part = part_path(dest);
        remove_if_exists(&part)?;

        tracing::debug!(%url, dest = %dest.display(), "downloading archive");
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(failed(format!("HTTP {code}"))),
            Err(err) => return Err(failed(err.to_string())),
        };
        if response.content_type() == "text/html" {
            return Err(failed(
                "server returned an HTML page instead of an archive".into(),
            ));
        }

        let mut file = File::create(&part).map_err(|e| io_err(&part, e))?;
        let mut reader = response.into_reader();
        let copied = std::io::copy(&mut reader, &mut file).and_then(|n| {
            file.sync_all()?;
            Ok(n)
        });
        drop(file);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = std::fs::remove_file(&part);
                return Err(failed(format!("download interrupted: {err}")));
            }
        };
        if bytes == 0 {
            let _ = std::fs::remove_file(&part);
            return Err(failed("empty download".into()));
        }

        if let Err(e) = std::fs::rename(&part, dest) {
            let _ = std::fs::remove_file(&part);
            return Err(io_err(dest, e));
        }
        tracing::info!(remote_id, bytes, dest = %dest.display(), "archive downloaded");
        Ok(())
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<(), AssetError> {
        extract_zip(archive, dest_dir)
    }
}

/// Unpack a zip archive. Entries escaping `dest_dir` are rejected by the
/// `zip` crate and reported as [`AssetError::ExtractionFailed`].
pub fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<(), AssetError> {
    let failed = |reason: String| AssetError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    let file = File::open(archive).map_err(|e| io_err(archive, e))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| failed(e.to_string()))?;
    std::fs::create_dir_all(dest_dir).map_err(|e| io_err(dest_dir, e))?;
    zip.extract(dest_dir).map_err(|e| failed(e.to_string()))?;
    tracing::debug!(
        archive = %archive.display(),
        entries = zip.len(),
        dest = %dest_dir.display(),
        "archive extracted",
    );
    Ok(())
}

/// Extract, then discard the archive whatever the outcome: a corrupt archive
/// must not be reused by the next attempt.
pub(crate) fn extract_and_discard(
    fetcher: &dyn ArchiveFetcher,
    archive: &Path,
    dest_dir: &Path,
) -> Result<(), AssetError> {
    let result = fetcher.extract(archive, dest_dir);
    discard_archive(archive);
    result
}

/// Removal failures are logged, never fatal.
pub(crate) fn discard_archive(archive: &Path) {
    match std::fs::remove_file(archive) {
        Ok(()) => tracing::debug!(archive = %archive.display(), "removed archive"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            archive = %archive.display(),
            error = %err,
            "failed to remove archive",
        ),
    }
}

/// `<dest>.part`
pub fn part_path(dest: &Path) -> PathBuf {
    PathBuf::from(format!("{}.part", dest.display()))
}

fn remove_if_exists(path: &Path) -> Result<(), AssetError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::warn!(path = %path.display(), "removed stale partial download");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
