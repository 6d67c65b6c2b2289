//! Text-to-speech front end for render jobs.
//!
//! [`CommandSynthesizer`] shells out twice: the configured TTS command writes
//! an intermediate compressed file, then `ffmpeg` resamples it to 16-bit PCM
//! at the rate and channel count the caller asks for.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use talkface_core::config::TtsSettings;

use crate::error::{tts_io, TtsError};
use crate::runner::{tail_chars, STDERR_TAIL_CHARS};
use crate::wav;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into a 16-bit PCM WAV at `out_wav`; returns its path.
    async fn synthesize(
        &self,
        text: &str,
        sample_rate: u32,
        channels: u16,
        out_wav: &Path,
    ) -> Result<PathBuf, TtsError>;
}

pub struct CommandSynthesizer {
    command: Vec<String>,
    intermediate_ext: String,
    ffmpeg: String,
}

impl CommandSynthesizer {
    pub fn new(settings: &TtsSettings) -> Self {
        Self {
            command: settings.command.clone(),
            intermediate_ext: settings.intermediate_ext.clone(),
            ffmpeg: settings.ffmpeg.clone(),
        }
    }

    /// The TTS argv with `{text}` and `{output}` substituted.
    pub fn tts_argv(&self, text: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace("{output}", &output).replace("{text}", text))
            .collect()
    }

    pub fn ffmpeg_args(input: &Path, sample_rate: u32, channels: u16, out_wav: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            channels.to_string(),
            "-sample_fmt".into(),
            "s16".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
            out_wav.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        sample_rate: u32,
        channels: u16,
        out_wav: &Path,
    ) -> Result<PathBuf, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }
        if let Some(parent) = out_wav.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| tts_io(parent, e))?;
        }

        let intermediate = out_wav.with_extension(&self.intermediate_ext);
        let argv = self.tts_argv(text, &intermediate);
        let converted: Result<(), TtsError> = async {
            let (program, args) = argv.split_first().ok_or(TtsError::EmptyText)?;
            run_tool(program, args).await?;
            run_tool(
                &self.ffmpeg,
                &Self::ffmpeg_args(&intermediate, sample_rate, channels, out_wav),
            )
            .await
        }
        .await;

        match tokio::fs::remove_file(&intermediate).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %intermediate.display(),
                error = %err,
                "failed to remove intermediate audio",
            ),
        }
        converted?;

        let wav_path = out_wav.to_path_buf();
        let format = tokio::task::spawn_blocking(move || wav::validate(&wav_path, sample_rate, channels))
            .await
            .map_err(|err| tts_io(out_wav, std::io::Error::other(err.to_string())))??;
        tracing::info!(
            path = %out_wav.display(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "speech synthesized",
        );
        Ok(out_wav.to_path_buf())
    }
}

async fn run_tool(program: &str, args: &[String]) -> Result<(), TtsError> {
    tracing::debug!(program, args = ?args, "running tool");
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TtsError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TtsError::CommandFailed {
            program: program.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr_tail: tail_chars(stderr.trim(), STDERR_TAIL_CHARS).to_string(),
        });
    }
    Ok(())
}
