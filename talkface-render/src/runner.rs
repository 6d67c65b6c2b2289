//! Invocation of the external render executable.
//!
//! Command line shape:
//!
//! ```text
//! <program> [program args..] [script] <data_root> --workspace <workspace_root>
//!     <mode flags..> --asr_model <model> [--portrait] --aud <audio>
//!     [configured extras..] [job extras..]
//! ```
//!
//! The child inherits the parent environment plus explicit overrides. Its
//! output is captured in full and only surfaced through [`RenderOutcome`]
//! or [`RunnerError::ProcessFailed`].

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use talkface_core::{Config, RenderJob, RenderOutcome};

use crate::error::{runner_io, RunnerError};

/// Upper bound on the stderr carried by [`RunnerError::ProcessFailed`].
pub const STDERR_TAIL_CHARS: usize = 4000;

/// Resolved invocation settings; every path is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub program: String,
    pub program_args: Vec<String>,
    pub script: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub mode_flags: Vec<String>,
    pub asr_model: String,
    pub portrait: bool,
    pub extra_args: Vec<String>,
    pub search_path_var: String,
    pub search_paths: Vec<PathBuf>,
    pub headless: bool,
    pub cpu_only: bool,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        let render = &config.render;
        Self {
            program: render.program.clone(),
            program_args: render.program_args.clone(),
            script: config.render_script(),
            working_dir: config.project_root.clone(),
            mode_flags: render.mode_flags.clone(),
            asr_model: render.asr_model.clone(),
            portrait: render.portrait,
            extra_args: render.extra_args.clone(),
            search_path_var: render.search_path_var.clone(),
            search_paths: config.search_paths(),
            headless: render.headless,
            cpu_only: render.cpu_only,
            env: render.env.clone(),
            timeout: render.timeout_secs.map(Duration::from_secs),
        }
    }
}

pub struct RenderJobRunner {
    settings: RunnerSettings,
}

impl RenderJobRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(RunnerSettings::from_config(config))
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Arguments passed after `program`.
    pub fn command_args(&self, job: &RenderJob) -> Vec<OsString> {
        let s = &self.settings;
        let mut args: Vec<OsString> = s.program_args.iter().map(OsString::from).collect();
        if let Some(script) = &s.script {
            args.push(script.into());
        }
        args.push(job.data_root.clone().into());
        args.push("--workspace".into());
        args.push(job.workspace_root.clone().into());
        args.extend(s.mode_flags.iter().map(OsString::from));
        args.push("--asr_model".into());
        args.push(s.asr_model.clone().into());
        if s.portrait {
            args.push("--portrait".into());
        }
        args.push("--aud".into());
        args.push(job.audio_input_path.clone().into());
        args.extend(s.extra_args.iter().map(OsString::from));
        args.extend(job.extra_args.iter().map(OsString::from));
        args
    }

    /// Environment overrides applied on top of the inherited environment,
    /// in application order.
    pub fn environment(&self) -> Result<Vec<(String, OsString)>, RunnerError> {
        let s = &self.settings;
        let mut overrides = Vec::new();

        if !s.search_paths.is_empty() {
            let mut paths = s.search_paths.clone();
            if let Some(existing) = std::env::var_os(&s.search_path_var) {
                paths.extend(
                    std::env::split_paths(&existing).filter(|p| !p.as_os_str().is_empty()),
                );
            }
            let joined = std::env::join_paths(paths)
                .map_err(|e| RunnerError::InvalidSearchPath(e.to_string()))?;
            overrides.push((s.search_path_var.clone(), joined));
        }
        if s.headless {
            overrides.push(("DISABLE_MIC".to_string(), OsString::from("1")));
        }
        if s.cpu_only {
            overrides.push(("CUDA_VISIBLE_DEVICES".to_string(), OsString::new()));
        }
        for (key, value) in &s.env {
            overrides.push((key.clone(), OsString::from(value)));
        }
        Ok(overrides)
    }

    /// Run `job` to completion.
    ///
    /// Exit code 0 is the only success. A nonzero exit (or death by signal)
    /// is [`RunnerError::ProcessFailed`] with a bounded stderr tail.
    pub async fn run(&self, job: &RenderJob) -> Result<RenderOutcome, RunnerError> {
        let s = &self.settings;
        let args = self.command_args(job);

        let mut cmd = tokio::process::Command::new(&s.program);
        cmd.args(&args)
            .current_dir(&s.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in self.environment()? {
            tracing::debug!(job_id = %job.id, var = %key, value = ?value, "child env override");
            cmd.env(key, value);
        }

        tracing::info!(job_id = %job.id, program = %s.program, args = ?args, "starting render");
        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: s.program.clone(),
            source,
        })?;

        // Dropping the wait future drops the child, which kills it.
        let waited = match s.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::error!(job_id = %job.id, timeout_secs = limit.as_secs(), "render timed out");
                    return Err(RunnerError::Timeout {
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|e| runner_io(&s.program, e))?;

        let duration = started.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let outcome = RenderOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            succeeded: output.status.success(),
            duration,
        };

        if !outcome.succeeded {
            tracing::error!(
                job_id = %job.id,
                exit_code,
                duration_ms = duration.as_millis() as u64,
                stdout = %outcome.stdout,
                stderr = %outcome.stderr,
                "render process failed",
            );
            return Err(RunnerError::ProcessFailed {
                exit_code,
                stderr_tail: tail_chars(&outcome.stderr, STDERR_TAIL_CHARS).to_string(),
            });
        }

        tracing::info!(
            job_id = %job.id,
            duration_ms = duration.as_millis() as u64,
            "render finished",
        );
        Ok(outcome)
    }
}

/// The last `n` characters of `s`, never splitting a UTF-8 sequence.
pub fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[start..]
}
