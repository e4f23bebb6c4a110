//! Audio sinks: where finished clips are sent to be heard

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Format of raw (headerless) audio handed to a sink
///
/// Clips that carry a WAV header describe themselves and the header wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            channels: 1,
            bits_per_sample: 16,
            sample_rate: 22_050,
        }
    }
}

/// True when the buffer starts with a RIFF/WAVE header
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Audio output device abstraction
///
/// `play` resolves once the clip has finished playing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play one clip to completion
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the sink rejects the clip or fails mid-play
    async fn play(&self, bytes: &[u8], format: AudioFormat) -> Result<()>;
}

/// Plays clips by piping them into an `ffplay` process
#[derive(Debug, Clone)]
pub struct FfplaySink {
    program: PathBuf,
}

impl FfplaySink {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one clip; `-` reads the clip from stdin
    fn args(bytes: &[u8], format: AudioFormat) -> Vec<String> {
        let mut args: Vec<String> = ["-autoexit", "-nodisp", "-hide_banner", "-loglevel", "warning"]
            .iter()
            .map(ToString::to_string)
            .collect();

        if !is_wav(bytes) {
            let sample_format = match format.bits_per_sample {
                8 => "u8",
                32 => "s32le",
                _ => "s16le",
            };
            args.extend([
                "-f".to_string(),
                sample_format.to_string(),
                "-ar".to_string(),
                format.sample_rate.to_string(),
                "-ac".to_string(),
                format.channels.to_string(),
            ]);
        }

        args.push("-".to_string());
        args
    }
}

impl Default for FfplaySink {
    fn default() -> Self {
        Self::new("ffplay")
    }
}

#[async_trait]
impl AudioSink for FfplaySink {
    async fn play(&self, bytes: &[u8], format: AudioFormat) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let mut child = tokio::process::Command::new(&self.program)
            .args(Self::args(bytes, format))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Playback(format!("failed to start {}: {e}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(bytes)
                .await
                .map_err(|e| Error::Playback(format!("failed to write clip to ffplay: {e}")))?;
            // Closing stdin tells ffplay the clip is complete
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Playback(format!("failed to wait for ffplay: {e}")))?;
        if !status.success() {
            return Err(Error::Playback(format!("ffplay exited with {status}")));
        }

        tracing::debug!(bytes = bytes.len(), "clip played");
        Ok(())
    }
}

/// Discards every clip; for headless runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, bytes: &[u8], _format: AudioFormat) -> Result<()> {
        tracing::debug!(bytes = bytes.len(), "clip discarded");
        Ok(())
    }
}

/// Render a sine tone as 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if the WAV encoding fails
pub fn tone_wav(frequency: f32, duration_secs: f32, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Playback(e.to_string()))?;

        for i in 0..num_samples {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / sample_rate as f32;
            // 30% volume
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Playback(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Playback(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_is_wav() {
        let wav = tone_wav(440.0, 0.1, 22_050).unwrap();
        assert!(is_wav(&wav));

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 22_050);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 2205);
    }

    #[test]
    fn test_ffplay_args_for_wav() {
        let wav = tone_wav(440.0, 0.01, 16_000).unwrap();
        let args = FfplaySink::args(&wav, AudioFormat::default());
        assert_eq!(
            args,
            vec!["-autoexit", "-nodisp", "-hide_banner", "-loglevel", "warning", "-"]
        );
    }

    #[test]
    fn test_ffplay_args_for_raw_pcm() {
        let format = AudioFormat {
            channels: 2,
            bits_per_sample: 16,
            sample_rate: 24_000,
        };
        let args = FfplaySink::args(&[0, 1, 2, 3], format);
        assert!(args.windows(2).any(|w| w == ["-f", "s16le"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "24000"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "2"]));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[tokio::test]
    async fn test_missing_player_is_playback_error() {
        let sink = FfplaySink::new("/nonexistent/streamspeak-player");
        let err = sink.play(&[1, 2, 3], AudioFormat::default()).await.unwrap_err();
        assert!(matches!(err, Error::Playback(_)));
    }

    #[tokio::test]
    async fn test_player_failure_is_playback_error() {
        // `false` exits non-zero without reading the clip
        let sink = FfplaySink::new("false");
        let wav = tone_wav(440.0, 0.01, 16_000).unwrap();
        let result = sink.play(&wav, AudioFormat::default()).await;
        assert!(matches!(result, Err(Error::Playback(_))));
    }

    #[tokio::test]
    async fn test_null_sink_accepts_everything() {
        tokio_test::assert_ok!(NullSink.play(&[1, 2, 3], AudioFormat::default()).await);
    }
}
