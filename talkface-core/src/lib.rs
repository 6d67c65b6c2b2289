//! talkface core library: domain types, service configuration, errors.
//!
//! - [`types`]: bundles, jobs, outcomes, artifacts and the error taxonomy
//! - [`config`]: `talkface.yaml` load / save / validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{
    Artifact, AssetBundle, BundleName, ErrorKind, JobId, RenderJob, RenderOutcome, Stage,
};
