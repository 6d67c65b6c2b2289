//! Idempotent, single-flight provisioning of asset bundles.
//!
//! ## Flow per bundle
//!
//! 1. Fast path: the bundle folder exists and is non-empty, nothing to do.
//! 2. Under the in-flight lock: join a running provisioning for the same
//!    bundle, or re-check presence, or register a new one.
//! 3. The registered provisioning runs detached on a blocking thread:
//!    fetch, verify, extract into staging, drop the archive, normalize,
//!    write a provision record.
//! 4. Its result is published to every waiter, then the entry is removed.
//!
//! A caller that goes away while waiting does not cancel the provisioning,
//! so a half-extracted bundle is never left behind by an aborted request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use talkface_core::{AssetBundle, BundleName};

use crate::checksum;
use crate::error::{io_err, AssetError, ProvisionError};
use crate::fetcher::{discard_archive, extract_and_discard, ArchiveFetcher};
use crate::layout;
use crate::manifest::{self, ProvisionRecord};

/// `None` until the provisioning finishes.
type Slot = Option<Result<(), Arc<AssetError>>>;

type InFlight = Arc<Mutex<HashMap<BundleName, watch::Receiver<Slot>>>>;

/// Presence snapshot of one bundle.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BundleStatus {
    pub name: BundleName,
    pub local_dir: PathBuf,
    pub present: bool,
    pub in_flight: bool,
    pub provisioned_at: Option<DateTime<Utc>>,
}

pub struct AssetProvisioner {
    fetcher: Arc<dyn ArchiveFetcher>,
    in_flight: InFlight,
}

impl AssetProvisioner {
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        Self {
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A bundle is present when its folder exists and has at least one entry.
    pub fn is_present(local_dir: &Path) -> bool {
        std::fs::read_dir(local_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Ensure every bundle in order; stops at the first failure.
    pub async fn ensure(&self, bundles: &[AssetBundle]) -> Result<(), ProvisionError> {
        for bundle in bundles {
            self.ensure_one(bundle).await?;
        }
        Ok(())
    }

    /// Ensure one bundle is present, provisioning it at most once no matter
    /// how many callers ask concurrently.
    pub async fn ensure_one(&self, bundle: &AssetBundle) -> Result<(), ProvisionError> {
        if Self::is_present(&bundle.local_dir) {
            tracing::trace!(bundle = %bundle.name, "bundle already present");
            return Ok(());
        }

        let mut rx = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&bundle.name) {
                Some(rx) => {
                    tracing::debug!(bundle = %bundle.name, "joining in-flight provisioning");
                    rx.clone()
                }
                None => {
                    // Another caller may have finished between the fast path and the lock.
                    if Self::is_present(&bundle.local_dir) {
                        return Ok(());
                    }
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(bundle.name.clone(), rx.clone());
                    self.spawn_provision(bundle.clone(), tx);
                    rx
                }
            }
        };

        let result = match rx.wait_for(Option::is_some).await {
            Ok(slot) => {
                let value: Slot = (*slot).clone();
                value.unwrap_or_else(|| Err(Arc::new(task_vanished())))
            }
            Err(_) => Err(Arc::new(task_vanished())),
        };
        result.map_err(|source| ProvisionError {
            bundle: bundle.name.clone(),
            source,
        })
    }

    fn spawn_provision(&self, bundle: AssetBundle, tx: watch::Sender<Slot>) {
        let fetcher = Arc::clone(&self.fetcher);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let name = bundle.name.clone();
            let joined =
                tokio::task::spawn_blocking(move || provision(fetcher.as_ref(), &bundle)).await;
            let result = match joined {
                Ok(inner) => inner.map_err(Arc::new),
                Err(err) => Err(Arc::new(AssetError::Task(format!(
                    "provision task join failure: {err}"
                )))),
            };
            if let Err(err) = &result {
                tracing::error!(bundle = %name, error = %err, "provisioning failed");
            }

            let mut guard = in_flight.lock().await;
            let _ = tx.send(Some(result));
            guard.remove(&name);
        });
    }

    /// Presence report for `bundles`, including provision records when known.
    pub async fn status(&self, bundles: &[AssetBundle]) -> Vec<BundleStatus> {
        let in_flight = self.in_flight.lock().await;
        bundles
            .iter()
            .map(|bundle| {
                let provisioned_at = match manifest::load(bundle) {
                    Ok(record) => record.map(|r| r.provisioned_at),
                    Err(err) => {
                        tracing::debug!(bundle = %bundle.name, error = %err, "unreadable provision record");
                        None
                    }
                };
                BundleStatus {
                    name: bundle.name.clone(),
                    local_dir: bundle.local_dir.clone(),
                    present: Self::is_present(&bundle.local_dir),
                    in_flight: in_flight.contains_key(&bundle.name),
                    provisioned_at,
                }
            })
            .collect()
    }
}

fn task_vanished() -> AssetError {
    AssetError::Task("provisioning task exited without a result".into())
}

/// Blocking provisioning of one bundle. Only ever runs once per bundle at a
/// time; see [`AssetProvisioner::ensure_one`].
fn provision(fetcher: &dyn ArchiveFetcher, bundle: &AssetBundle) -> Result<(), AssetError> {
    let started = Instant::now();
    let parent = bundle.parent_dir();
    std::fs::create_dir_all(&parent).map_err(|e| io_err(&parent, e))?;

    let archive = bundle.archive_path();
    tracing::info!(
        bundle = %bundle.name,
        remote_id = %bundle.remote_id,
        local_dir = %bundle.local_dir.display(),
        "provisioning bundle",
    );
    fetcher.fetch(&bundle.remote_id, &archive)?;

    let digest = match &bundle.sha256 {
        Some(expected) => checksum::verify(&archive, expected),
        None => checksum::sha256_file(&archive),
    };
    let digest = match digest {
        Ok(digest) => digest,
        Err(err) => {
            discard_archive(&archive);
            return Err(err);
        }
    };

    let staging = bundle.staging_dir();
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| io_err(&staging, e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| io_err(&staging, e))?;

    if let Err(err) = extract_and_discard(fetcher, &archive, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(err);
    }

    match layout::normalize(&staging, &bundle.local_dir) {
        Ok(_) => {}
        Err(err @ AssetError::AmbiguousAssetLayout { .. }) => {
            tracing::warn!(
                bundle = %bundle.name,
                staging = %staging.display(),
                "ambiguous archive layout, staging kept for inspection",
            );
            return Err(err);
        }
        Err(err) => {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(err);
        }
    }

    if !AssetProvisioner::is_present(&bundle.local_dir) {
        return Err(AssetError::ExtractionFailed {
            archive,
            reason: format!("{} is empty after extraction", bundle.local_dir.display()),
        });
    }

    let record = ProvisionRecord {
        bundle: bundle.name.clone(),
        remote_id: bundle.remote_id.clone(),
        archive_sha256: digest,
        provisioned_at: Utc::now(),
    };
    if let Err(err) = manifest::save(bundle, &record) {
        tracing::warn!(bundle = %bundle.name, error = %err, "failed to write provision record");
    }

    tracing::info!(
        bundle = %bundle.name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "bundle provisioned",
    );
    Ok(())
}
