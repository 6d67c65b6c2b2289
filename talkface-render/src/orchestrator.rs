//! Asset provisioning, render and artifact resolution for one audio input.
//!
//! ## States
//!
//! ```text
//! Idle -> ProvisioningAssets -> Running -> ResolvingArtifact -> Done
//!           \______________________\___________\______________-> Failed(stage)
//! ```
//!
//! Every transition is logged with the job id and, when a progress channel
//! is supplied, published on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::watch;

use talkface_assets::{AssetProvisioner, HttpArchiveFetcher};
use talkface_core::{Artifact, AssetBundle, Config, JobId, RenderJob, RenderOutcome, Stage};

use crate::artifact::{self, ArtifactPattern};
use crate::error::{RenderError, ResolveError};
use crate::runner::RenderJobRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    ProvisioningAssets,
    Running,
    ResolvingArtifact,
    Done,
    Failed(Stage),
}

/// A finished job and the file it produced.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub job_id: JobId,
    pub artifact: Artifact,
    pub outcome: RenderOutcome,
}

pub struct Orchestrator {
    provisioner: Arc<AssetProvisioner>,
    bundles: Vec<AssetBundle>,
    runner: RenderJobRunner,
    data_root: PathBuf,
    workspace_root: PathBuf,
    results_dir: PathBuf,
    artifact_suffix: String,
}

impl Orchestrator {
    pub fn new(config: &Config, provisioner: Arc<AssetProvisioner>) -> Self {
        Self {
            provisioner,
            bundles: config.asset_bundles(),
            runner: RenderJobRunner::from_config(config),
            data_root: config.data_root(),
            workspace_root: config.workspace_root(),
            results_dir: config.results_dir(),
            artifact_suffix: config.render.artifact_suffix.clone(),
        }
    }

    /// Production wiring: bundles fetched over HTTP.
    pub fn from_config(config: &Config) -> Self {
        let fetcher = HttpArchiveFetcher::new(config.archive_url_template.clone());
        let provisioner = Arc::new(AssetProvisioner::new(Arc::new(fetcher)));
        Self::new(config, provisioner)
    }

    pub fn provisioner(&self) -> &Arc<AssetProvisioner> {
        &self.provisioner
    }

    pub fn bundles(&self) -> &[AssetBundle] {
        &self.bundles
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// A job for `audio` against the configured roots.
    pub fn job_for(&self, audio: impl Into<PathBuf>) -> RenderJob {
        RenderJob::new(audio, self.data_root.clone(), self.workspace_root.clone())
    }

    pub async fn render(&self, audio: &Path) -> Result<Rendered, RenderError> {
        self.render_job(self.job_for(audio), None).await
    }

    /// Run `job` through every stage; the first failing stage ends the job.
    pub async fn render_job(
        &self,
        job: RenderJob,
        progress: Option<&watch::Sender<JobState>>,
    ) -> Result<Rendered, RenderError> {
        let tracker = Tracker {
            job_id: &job.id,
            progress,
        };
        let started = SystemTime::now();
        tracing::info!(job_id = %job.id, audio = %job.audio_input_path.display(), "render job accepted");

        let result = self.run_stages(&job, started, &tracker).await;
        match &result {
            Ok(rendered) => {
                tracker.enter(JobState::Done);
                tracing::info!(
                    job_id = %job.id,
                    artifact = %rendered.artifact.path.display(),
                    duration_ms = rendered.outcome.duration.as_millis() as u64,
                    "render job done",
                );
            }
            Err(err) => {
                tracker.enter(JobState::Failed(err.stage()));
                tracing::error!(
                    job_id = %job.id,
                    stage = %err.stage(),
                    kind = %err.kind(),
                    error = %err,
                    "render job failed",
                );
            }
        }
        result
    }

    async fn run_stages(
        &self,
        job: &RenderJob,
        started: SystemTime,
        tracker: &Tracker<'_>,
    ) -> Result<Rendered, RenderError> {
        tracker.enter(JobState::ProvisioningAssets);
        self.provisioner.ensure(&self.bundles).await?;

        check_preconditions(job).await?;
        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(|source| RenderError::Io {
                path: self.results_dir.clone(),
                source,
            })?;

        let pattern = ArtifactPattern::new(self.artifact_suffix.clone());
        let results_dir = self.results_dir.clone();
        let baseline = {
            let pattern = pattern.clone();
            tokio::task::spawn_blocking(move || artifact::candidates(&results_dir, &pattern))
                .await
                .map_err(|err| ResolveError::Task(err.to_string()))??
        };

        tracker.enter(JobState::Running);
        let outcome = self.runner.run(job).await?;

        tracker.enter(JobState::ResolvingArtifact);
        let pattern = pattern.not_before(started).excluding(baseline);
        let results_dir = self.results_dir.clone();
        let artifact = tokio::task::spawn_blocking(move || artifact::resolve(&results_dir, &pattern))
            .await
            .map_err(|err| ResolveError::Task(err.to_string()))??;

        Ok(Rendered {
            job_id: job.id.clone(),
            artifact,
            outcome,
        })
    }
}

struct Tracker<'a> {
    job_id: &'a JobId,
    progress: Option<&'a watch::Sender<JobState>>,
}

impl Tracker<'_> {
    fn enter(&self, state: JobState) {
        tracing::debug!(job_id = %self.job_id, state = ?state, "job state");
        if let Some(tx) = self.progress {
            tx.send_replace(state);
        }
    }
}

async fn check_preconditions(job: &RenderJob) -> Result<(), RenderError> {
    let invalid = RenderError::InvalidJobPreconditions;
    let audio = &job.audio_input_path;
    match tokio::fs::metadata(audio).await {
        Ok(meta) if !meta.is_file() => {
            return Err(invalid(format!("audio input {} is not a file", audio.display())))
        }
        Ok(meta) if meta.len() == 0 => {
            return Err(invalid(format!("audio input {} is empty", audio.display())))
        }
        Ok(_) => {}
        Err(err) => {
            return Err(invalid(format!(
                "audio input {} is not readable: {err}",
                audio.display()
            )))
        }
    }
    for (label, dir) in [("data root", &job.data_root), ("workspace root", &job.workspace_root)] {
        let is_dir = tokio::fs::metadata(dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(invalid(format!("{label} {} is not a directory", dir.display())));
        }
    }
    Ok(())
}
