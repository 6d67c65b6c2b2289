//! WAV header checks for synthesized speech.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec};

use crate::error::{tts_io, TtsError};

/// Check `path` is 16-bit integer PCM at `sample_rate` with `channels`.
pub fn validate(path: &Path, sample_rate: u32, channels: u16) -> Result<WavSpec, TtsError> {
    let invalid = |reason: String| TtsError::InvalidWav {
        path: path.to_path_buf(),
        reason,
    };
    let spec = match WavReader::open(path) {
        Ok(reader) => reader.spec(),
        Err(hound::Error::IoError(err)) => return Err(tts_io(path, err)),
        Err(err) => return Err(invalid(err.to_string())),
    };
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(invalid(format!(
            "expected 16-bit PCM, got {:?} with {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }
    if spec.sample_rate != sample_rate || spec.channels != channels {
        return Err(invalid(format!(
            "expected {sample_rate} Hz x{channels}, got {} Hz x{}",
            spec.sample_rate, spec.channels
        )));
    }
    Ok(spec)
}

/// Writes `frames` silent 16-bit frames to `path`.
#[cfg(test)]
pub(crate) fn write_pcm16(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..frames * u32::from(channels) {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}
