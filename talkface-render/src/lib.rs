//! talkface render pipeline: runs the external talking-face renderer and
//! finds what it produced.
//!
//! - [`runner`]: [`RenderJobRunner`], command line + environment + capture
//! - [`artifact`]: newest-output resolution in the results directory
//! - [`orchestrator`]: [`Orchestrator`], assets → render → artifact
//! - [`tts`]: [`Synthesizer`] trait and the command-line adapter
//! - [`wav`]: PCM WAV header checks

pub mod artifact;
pub mod error;
pub mod orchestrator;
pub mod runner;
pub mod tts;
pub mod wav;

pub use artifact::ArtifactPattern;
pub use error::{RenderError, ResolveError, RunnerError, TtsError};
pub use orchestrator::{JobState, Orchestrator, Rendered};
pub use runner::{RenderJobRunner, RunnerSettings, STDERR_TAIL_CHARS};
pub use tts::{CommandSynthesizer, Synthesizer};
