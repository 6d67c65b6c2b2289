//! HTTP surface.
//!
//! | Route            | Purpose                                           |
//! |------------------|---------------------------------------------------|
//! | `GET /`          | text form                                         |
//! | `POST /generate` | text → speech → render → result page              |
//! | `POST /render`   | multipart `wav` (or `text`) → `video/mp4` bytes   |
//! | `GET /status`    | bundle presence, roots, free job slots            |
//! | `GET /results/*` | rendered files                                    |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use talkface_assets::BundleStatus;
use talkface_core::{Config, JobId, Stage};
use talkface_render::{
    CommandSynthesizer, Orchestrator, RenderError, Rendered, RunnerError, Synthesizer, TtsError,
};

use crate::error::ServerError;
use crate::pages::{BundleLine, Pages, ResultView};

/// Characters left bare in a `/results/` path segment.
const RESULT_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Uploaded WAVs can be long recordings.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shared state accessible from handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub pages: Arc<Pages>,
    /// Admission control: one permit per concurrently running render.
    pub admission: Arc<Semaphore>,
    pub max_concurrent_jobs: usize,
    pub demo_dir: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AppState {
    /// Production wiring from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        Self::new(
            config,
            Arc::new(Orchestrator::from_config(config)),
            Arc::new(CommandSynthesizer::new(&config.tts)),
        )
    }

    pub fn new(
        config: &Config,
        orchestrator: Arc<Orchestrator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let pages = Pages::new(config.template_dir().as_deref())?;
        let max = config.server.max_concurrent_jobs;
        Ok(Self {
            orchestrator,
            synthesizer,
            pages: Arc::new(pages),
            admission: Arc::new(Semaphore::new(max)),
            max_concurrent_jobs: max,
            demo_dir: config.demo_dir(),
            sample_rate: config.server.sample_rate,
            channels: config.server.channels,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let results = ServeDir::new(state.orchestrator.results_dir());
    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate))
        .route("/render", post(render_upload))
        .route("/status", get(status))
        .nest_service("/results", results)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Failure responses
// ---------------------------------------------------------------------------

/// JSON error body of `/render`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
}

/// A handler failure, rendered as HTML or JSON depending on the route.
#[derive(Debug)]
struct Failure {
    status: StatusCode,
    message: String,
    stage: Option<Stage>,
    kind: Option<String>,
    stderr: Option<String>,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            stage: None,
            kind: None,
            stderr: None,
        }
    }

    fn json(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            stage: self.stage,
            kind: self.kind,
            stderr: self.stderr,
        };
        (self.status, Json(body)).into_response()
    }

    fn html(self, pages: &Pages) -> Response {
        let stage = self.stage.map(|s| s.to_string()).unwrap_or_default();
        let kind = self.kind.unwrap_or_default();
        match pages.error(self.status.as_u16(), &stage, &kind, &self.message) {
            Ok(page) => (self.status, Html(page)).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "error page failed to render");
                (self.status, self.message).into_response()
            }
        }
    }
}

impl From<RenderError> for Failure {
    fn from(err: RenderError) -> Self {
        let status = match (err.stage(), &err) {
            (Stage::Assets, _) => StatusCode::SERVICE_UNAVAILABLE,
            (Stage::Preconditions, RenderError::InvalidJobPreconditions(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            RenderError::Runner(RunnerError::ProcessFailed {
                exit_code,
                stderr_tail,
            }) => format!("render failed (exit {exit_code})\n\nSTDERR:\n{stderr_tail}"),
            other => other.to_string(),
        };
        Self {
            status,
            message,
            stage: Some(err.stage()),
            kind: Some(err.kind().to_string()),
            stderr: err.stderr_tail().map(str::to_string),
        }
    }
}

impl From<TtsError> for Failure {
    fn from(err: TtsError) -> Self {
        let status = match err {
            TtsError::EmptyText => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Failure::new(status, format!("speech synthesis failed: {err}"))
    }
}

// ---------------------------------------------------------------------------
// Shared job flow
// ---------------------------------------------------------------------------

async fn admit(state: &AppState) -> Result<OwnedSemaphorePermit, Failure> {
    Arc::clone(&state.admission)
        .acquire_owned()
        .await
        .map_err(|_| Failure::new(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down"))
}

fn job_wav(state: &AppState, job_id: &JobId) -> PathBuf {
    state.demo_dir.join(format!("{job_id}.wav"))
}

/// The job's input WAV is removed once the render finishes, pass or fail.
async fn render_wav(state: &AppState, job_id: JobId, wav: &Path) -> Result<Rendered, Failure> {
    let result = match admit(state).await {
        Ok(_permit) => {
            let job = state.orchestrator.job_for(wav).with_id(job_id);
            state.orchestrator.render_job(job, None).await.map_err(Failure::from)
        }
        Err(failure) => Err(failure),
    };
    discard_job_wav(wav).await;
    result
}

async fn synthesize(state: &AppState, text: &str, wav: &Path) -> Result<(), Failure> {
    if text.trim().is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "text must not be empty"));
    }
    if let Err(err) = state
        .synthesizer
        .synthesize(text, state.sample_rate, state.channels, wav)
        .await
    {
        discard_job_wav(wav).await;
        return Err(err.into());
    }
    Ok(())
}

async fn discard_job_wav(wav: &Path) {
    match tokio::fs::remove_file(wav).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %wav.display(), error = %err, "failed to remove job wav"),
    }
}

fn result_url(file_name: &str) -> String {
    format!("/results/{}", utf8_percent_encode(file_name, RESULT_SEGMENT))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /
async fn index(State(state): State<AppState>) -> Response {
    let statuses = state
        .orchestrator
        .provisioner()
        .status(state.orchestrator.bundles())
        .await;
    let lines: Vec<BundleLine> = statuses
        .into_iter()
        .map(|s| BundleLine {
            name: s.name.to_string(),
            present: s.present,
        })
        .collect();
    match state.pages.index(&lines) {
        Ok(page) => Html(page).into_response(),
        Err(err) => Failure::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).html(&state.pages),
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    pub text: String,
}

/// POST /generate
async fn generate(State(state): State<AppState>, Form(form): Form<GenerateForm>) -> Response {
    match generate_page(&state, &form.text).await {
        Ok(page) => Html(page).into_response(),
        Err(failure) => failure.html(&state.pages),
    }
}

async fn generate_page(state: &AppState, text: &str) -> Result<String, Failure> {
    let job_id = JobId::new();
    let wav = job_wav(state, &job_id);
    synthesize(state, text, &wav).await?;

    let rendered = render_wav(state, job_id, &wav).await?;
    let file_name = rendered.artifact.file_name();
    let video_url = result_url(&file_name);
    let job_id = rendered.job_id.to_string();
    let view = ResultView {
        job_id: &job_id,
        text,
        video_url: &video_url,
        file_name: &file_name,
        duration_secs: format!("{:.1}", rendered.outcome.duration.as_secs_f64()),
    };
    state
        .pages
        .result(&view)
        .map_err(|err| Failure::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

/// POST /render
async fn render_upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let job_id = JobId::new();
    let wav = job_wav(&state, &job_id);
    match render_upload_inner(&state, job_id, &wav, multipart).await {
        Ok(response) => response,
        Err(failure) => {
            discard_job_wav(&wav).await;
            failure.json()
        }
    }
}

async fn render_upload_inner(
    state: &AppState,
    job_id: JobId,
    wav: &Path,
    mut multipart: Multipart,
) -> Result<Response, Failure> {
    let mut text: Option<String> = None;
    let mut have_wav = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Failure::new(StatusCode::BAD_REQUEST, format!("invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "wav" => {
                let bytes = field.bytes().await.map_err(|err| {
                    Failure::new(StatusCode::BAD_REQUEST, format!("failed to read upload: {err}"))
                })?;
                if bytes.is_empty() {
                    continue;
                }
                tokio::fs::create_dir_all(&state.demo_dir)
                    .await
                    .map_err(|err| Failure::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
                tokio::fs::write(wav, &bytes)
                    .await
                    .map_err(|err| Failure::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
                have_wav = true;
            }
            "text" => {
                let value = field.text().await.map_err(|err| {
                    Failure::new(StatusCode::BAD_REQUEST, format!("failed to read text: {err}"))
                })?;
                text = Some(value);
            }
            _ => {}
        }
    }

    if !have_wav {
        match text.as_deref() {
            Some(text) => synthesize(state, text, wav).await?,
            None => return Err(Failure::new(StatusCode::BAD_REQUEST, "no wav")),
        }
    }

    let rendered = render_wav(state, job_id, wav).await?;
    let path = &rendered.artifact.path;
    let bytes = tokio::fs::read(path).await.map_err(|err| {
        Failure::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read {}: {err}", path.display()),
        )
    })?;
    let disposition = format!("attachment; filename=\"{}\"", rendered.artifact.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub bundles: Vec<BundleStatus>,
    pub data_root: PathBuf,
    pub workspace_root: PathBuf,
    pub results_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub available_job_slots: usize,
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let orchestrator = &state.orchestrator;
    let bundles = orchestrator.provisioner().status(orchestrator.bundles()).await;
    Json(StatusReport {
        bundles,
        data_root: orchestrator.data_root().to_path_buf(),
        workspace_root: orchestrator.workspace_root().to_path_buf(),
        results_dir: orchestrator.results_dir().to_path_buf(),
        max_concurrent_jobs: state.max_concurrent_jobs,
        available_job_slots: state.admission.available_permits(),
    })
}
