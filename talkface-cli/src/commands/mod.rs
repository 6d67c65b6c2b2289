pub mod assets;
pub mod config;
pub mod render;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use talkface_core::config::{self as cfg, CONFIG_ENV, DEFAULT_CONFIG_FILE};
use talkface_core::Config;

/// Where the config document came from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Lookup order: `--config`, `$TALKFACE_CONFIG`, `./talkface.yaml`,
/// `<config dir>/talkface/talkface.yaml`, else defaults rooted at the
/// current directory. Explicit paths must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, ConfigSource)> {
    if let Some(path) = explicit_path(explicit) {
        let config = cfg::load_at(&path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?;
        return Ok((config, ConfigSource::File(path)));
    }

    let cwd = std::env::current_dir().context("could not determine current directory")?;
    let candidates = [
        Some(cwd.join(DEFAULT_CONFIG_FILE)),
        dirs::config_dir().map(|d| d.join("talkface").join(DEFAULT_CONFIG_FILE)),
    ];
    for path in candidates.into_iter().flatten() {
        if path.is_file() {
            let config = cfg::load_at(&path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?;
            return Ok((config, ConfigSource::File(path)));
        }
    }
    Ok((Config::for_project_root(cwd), ConfigSource::Defaults))
}

/// `--config`, then `$TALKFACE_CONFIG`.
pub fn explicit_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}
