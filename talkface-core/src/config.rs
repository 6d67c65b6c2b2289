//! YAML service configuration.
//!
//! # Layout
//!
//! ```text
//! <project_root>/
//!   talkface.yaml           (this document)
//!   main.py                 (render entry point)
//!   data/May/               (data bundle)
//!   model/trial_may/        (model bundle = render workspace)
//!     results/              (render output)
//!   demo/                   (synthesized / uploaded audio)
//! ```
//!
//! Every path in the document may be relative; relative paths resolve
//! against `project_root`. Every section has defaults, so a document holding
//! only `project_root` is complete.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{AssetBundle, BundleName};

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "talkface.yaml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TALKFACE_CONFIG";

/// Google Drive direct-download endpoint; `{id}` is the bundle's remote id.
pub const DEFAULT_ARCHIVE_URL_TEMPLATE: &str =
    "https://drive.usercontent.google.com/download?id={id}&export=download&confirm=t";

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root of the `talkface.yaml` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub project_root: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_dir: Option<PathBuf>,
    #[serde(default = "default_archive_url_template")]
    pub archive_url_template: String,
    #[serde(default = "default_bundles")]
    pub bundles: Vec<BundleConfig>,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub tts: TtsSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// One remote archive that must be present locally before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub name: BundleName,
    pub remote_id: String,
    pub local_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// How the external render executable is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub program: String,
    /// Inserted between `program` and `script`.
    pub program_args: Vec<String>,
    /// Entry point handed to `program`; relative to `project_root`.
    pub script: Option<PathBuf>,
    pub mode_flags: Vec<String>,
    pub asr_model: String,
    pub portrait: bool,
    /// Appended to every job, before per-job extras.
    pub extra_args: Vec<String>,
    pub search_path_var: String,
    /// `None` means `[project_root]`.
    pub search_paths: Option<Vec<PathBuf>>,
    /// Sets `DISABLE_MIC=1` for the child.
    pub headless: bool,
    /// Sets `CUDA_VISIBLE_DEVICES=` (empty) for the child.
    pub cpu_only: bool,
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    pub artifact_suffix: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            program: "python".into(),
            program_args: vec![],
            script: Some(PathBuf::from("main.py")),
            mode_flags: vec!["-O".into(), "--test".into(), "--test_train".into()],
            asr_model: "ave".into(),
            portrait: true,
            extra_args: vec![],
            search_path_var: "PYTHONPATH".into(),
            search_paths: None,
            headless: true,
            cpu_only: false,
            env: BTreeMap::new(),
            timeout_secs: None,
            artifact_suffix: ".mp4".into(),
        }
    }
}

/// Text-to-speech command adapter.
///
/// `command` placeholders: `{text}` and `{output}` (intermediate audio file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub command: Vec<String>,
    pub intermediate_ext: String,
    pub ffmpeg: String,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            command: vec![
                "gtts-cli".into(),
                "--lang".into(),
                "en".into(),
                "--output".into(),
                "{output}".into(),
                "{text}".into(),
            ],
            intermediate_ext: "mp3".into(),
            ffmpeg: "ffmpeg".into(),
        }
    }
}

/// HTTP front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Admission limit for concurrent render jobs.
    pub max_concurrent_jobs: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Directory of `.tera` files overriding the embedded pages.
    pub template_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            max_concurrent_jobs: 1,
            sample_rate: 48_000,
            channels: 1,
            template_dir: None,
        }
    }
}

fn default_archive_url_template() -> String {
    DEFAULT_ARCHIVE_URL_TEMPLATE.to_string()
}

fn default_bundles() -> Vec<BundleConfig> {
    vec![
        BundleConfig {
            name: BundleName::from("data-assets"),
            remote_id: "18Q2H612CAReFxBd9kxr-i1dD8U1AUfsV".into(),
            local_dir: PathBuf::from("data/May"),
            sha256: None,
        },
        BundleConfig {
            name: BundleName::from("model-assets"),
            remote_id: "1C2639qi9jvhRygYHwPZDGs8pun3po3W7".into(),
            local_dir: PathBuf::from("model/trial_may"),
            sha256: None,
        },
    ]
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

impl Config {
    /// Defaults rooted at `project_root`.
    pub fn for_project_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            data_root: None,
            workspace_root: None,
            results_dir: None,
            demo_dir: None,
            archive_url_template: default_archive_url_template(),
            bundles: default_bundles(),
            render: RenderSettings::default(),
            tts: TtsSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Resolve `path` against `project_root` unless already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn data_root(&self) -> PathBuf {
        match &self.data_root {
            Some(p) => self.resolve(p),
            None => self.project_root.join("data").join("May"),
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        match &self.workspace_root {
            Some(p) => self.resolve(p),
            None => self.project_root.join("model").join("trial_may"),
        }
    }

    /// `<workspace_root>/results` unless overridden.
    pub fn results_dir(&self) -> PathBuf {
        match &self.results_dir {
            Some(p) => self.resolve(p),
            None => self.workspace_root().join("results"),
        }
    }

    pub fn demo_dir(&self) -> PathBuf {
        match &self.demo_dir {
            Some(p) => self.resolve(p),
            None => self.project_root.join("demo"),
        }
    }

    pub fn render_script(&self) -> Option<PathBuf> {
        self.render.script.as_deref().map(|p| self.resolve(p))
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        match &self.render.search_paths {
            Some(paths) => paths.iter().map(|p| self.resolve(p)).collect(),
            None => vec![self.project_root.clone()],
        }
    }

    pub fn template_dir(&self) -> Option<PathBuf> {
        self.server.template_dir.as_deref().map(|p| self.resolve(p))
    }

    /// Bundles with absolute `local_dir`s.
    pub fn asset_bundles(&self) -> Vec<AssetBundle> {
        self.bundles
            .iter()
            .map(|b| AssetBundle {
                name: b.name.clone(),
                remote_id: b.remote_id.clone(),
                local_dir: self.resolve(&b.local_dir),
                sha256: b.sha256.clone(),
            })
            .collect()
    }

    /// Reject values that would only fail later, mid-request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for bundle in &self.bundles {
            if bundle.name.0.trim().is_empty() {
                return Err(ConfigError::Invalid("bundle name must not be empty".into()));
            }
            if !seen.insert(&bundle.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate bundle name '{}'",
                    bundle.name
                )));
            }
            if bundle.remote_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "bundle '{}' has an empty remote_id",
                    bundle.name
                )));
            }
            if bundle.local_dir.file_name().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "bundle '{}' local_dir {} has no folder name",
                    bundle.name,
                    bundle.local_dir.display()
                )));
            }
        }
        if !self.archive_url_template.contains("{id}") {
            return Err(ConfigError::Invalid(
                "archive_url_template must contain an {id} placeholder".into(),
            ));
        }
        if self.render.program.trim().is_empty() {
            return Err(ConfigError::Invalid("render.program must not be empty".into()));
        }
        if self.render.artifact_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "render.artifact_suffix must not be empty".into(),
            ));
        }
        if self.tts.command.is_empty() {
            return Err(ConfigError::Invalid("tts.command must not be empty".into()));
        }
        if self.server.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "server.max_concurrent_jobs must be at least 1".into(),
            ));
        }
        if self.server.sample_rate == 0 || self.server.channels == 0 {
            return Err(ConfigError::Invalid(
                "server.sample_rate and server.channels must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load and validate the document at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `rename`.
pub fn save_at(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_follow_the_project_layout() {
        let cfg = Config::for_project_root("/app");
        assert_eq!(cfg.data_root(), PathBuf::from("/app/data/May"));
        assert_eq!(cfg.workspace_root(), PathBuf::from("/app/model/trial_may"));
        assert_eq!(cfg.results_dir(), PathBuf::from("/app/model/trial_may/results"));
        assert_eq!(cfg.demo_dir(), PathBuf::from("/app/demo"));
        assert_eq!(cfg.render_script(), Some(PathBuf::from("/app/main.py")));
        assert_eq!(cfg.search_paths(), vec![PathBuf::from("/app")]);
    }

    #[test]
    fn bundle_dirs_resolve_against_project_root() {
        let cfg = Config::for_project_root("/srv/tf");
        let bundles = cfg.asset_bundles();
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].local_dir, PathBuf::from("/srv/tf/data/May"));
        assert_eq!(bundles[1].expected_name(), "trial_may");
    }

    #[test]
    fn minimal_document_gets_every_default() {
        let cfg: Config = serde_yaml::from_str("project_root: /app\n").expect("parse");
        assert_eq!(cfg, Config::for_project_root("/app"));
    }

    #[test]
    fn partial_render_section_keeps_other_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "project_root: /app\nrender:\n  cpu_only: true\n  timeout_secs: 600\n",
        )
        .expect("parse");
        assert!(cfg.render.cpu_only);
        assert_eq!(cfg.render.timeout_secs, Some(600));
        assert_eq!(cfg.render.asr_model, "ave");
        assert_eq!(cfg.render.mode_flags, vec!["-O", "--test", "--test_train"]);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        let mut cfg = Config::for_project_root(tmp.path());
        cfg.server.max_concurrent_jobs = 2;
        save_at(&path, &cfg).expect("save");
        let loaded = load_at(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!tmp.path().join("talkface.yaml.tmp").exists());
    }

    #[test]
    fn duplicate_bundle_names_are_rejected() {
        let mut cfg = Config::for_project_root("/app");
        cfg.bundles[1].name = cfg.bundles[0].name.clone();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate bundle name"), "got: {err}");
    }

    #[test]
    fn zero_job_limit_is_rejected() {
        let mut cfg = Config::for_project_root("/app");
        cfg.server.max_concurrent_jobs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }
}
