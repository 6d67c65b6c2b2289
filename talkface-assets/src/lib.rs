//! talkface asset provisioning: download, verify, extract and normalize
//! the bundles a render needs, once.
//!
//! - [`fetcher`]: [`ArchiveFetcher`] trait, HTTP + zip implementation
//! - [`checksum`]: streamed SHA-256 verification
//! - [`layout`]: archive layout normalization into the canonical folder
//! - [`manifest`]: per-bundle provision records
//! - [`provisioner`]: [`AssetProvisioner`], single-flight `ensure`

pub mod checksum;
pub mod error;
pub mod fetcher;
pub mod layout;
pub mod manifest;
pub mod provisioner;

pub use error::{AssetError, ProvisionError};
pub use fetcher::{ArchiveFetcher, HttpArchiveFetcher};
pub use provisioner::{AssetProvisioner, BundleStatus};
