//! `talkface render`: one job from the command line.
//!
//! The artifact path is the only thing written to stdout, so the command
//! composes with shell pipelines.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;

use talkface_core::JobId;
use talkface_render::{CommandSynthesizer, Orchestrator, Rendered, Synthesizer};

use super::{load_config, runtime};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["text", "wav"])))]
pub struct RenderArgs {
    /// Text to synthesize into speech first.
    #[arg(long)]
    pub text: Option<String>,

    /// Existing 16-bit PCM WAV to render from.
    #[arg(long, value_name = "PATH")]
    pub wav: Option<PathBuf>,

    /// Sample rate for synthesized speech.
    #[arg(long = "sr", value_name = "N", default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Channel count for synthesized speech.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub channels: u16,

    /// Overrides `render.asr_model`.
    #[arg(long, value_name = "MODEL")]
    pub asr_model: Option<String>,

    /// Render without the portrait flag.
    #[arg(long)]
    pub no_portrait: bool,

    /// Passed through to the render program after every other argument.
    #[arg(last = true, value_name = "EXTRA")]
    pub extra: Vec<String>,
}

impl RenderArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        talkface_server::init_tracing();
        let (mut config, _) = load_config(config_path)?;
        if let Some(model) = self.asr_model.clone() {
            config.render.asr_model = model;
        }
        if self.no_portrait {
            config.render.portrait = false;
        }

        let orchestrator = Orchestrator::from_config(&config);
        let synthesizer = CommandSynthesizer::new(&config.tts);
        let demo_dir = config.demo_dir();

        let rendered = runtime()?.block_on(self.execute(
            &orchestrator,
            &synthesizer,
            &demo_dir,
            self.sample_rate,
            self.channels,
        ))?;

        eprintln!(
            "{} {} in {:.1}s",
            "✓".green(),
            rendered.artifact.file_name(),
            rendered.outcome.duration.as_secs_f64()
        );
        println!("{}", rendered.artifact.path.display());
        Ok(())
    }

    async fn execute(
        &self,
        orchestrator: &Orchestrator,
        synthesizer: &dyn Synthesizer,
        demo_dir: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Rendered> {
        let job_id = JobId::new();
        let audio = match (&self.text, &self.wav) {
            (Some(text), _) => {
                let out = demo_dir.join(format!("{job_id}.wav"));
                synthesizer
                    .synthesize(text, sample_rate, channels, &out)
                    .await
                    .context("speech synthesis failed")?
            }
            (None, Some(wav)) => wav.clone(),
            (None, None) => bail!("either --text or --wav is required"),
        };

        let job = orchestrator
            .job_for(audio)
            .with_id(job_id.clone())
            .with_extra_args(self.extra.iter().cloned());
        match orchestrator.render_job(job, None).await {
            Ok(rendered) => Ok(rendered),
            Err(err) => {
                if let Some(tail) = err.stderr_tail() {
                    eprintln!("{}\n{}", "render stderr (tail):".yellow(), tail);
                }
                let label = format!("[{}/{}]", err.stage(), err.kind());
                Err(anyhow::Error::new(err).context(format!("job {job_id} failed {label}")))
            }
        }
    }
}
