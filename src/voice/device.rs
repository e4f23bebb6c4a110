//! Playback on the default output device

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::sink::{AudioFormat, AudioSink, is_wav};
use crate::{Error, Result};

/// Interleaved PCM ready for the device
struct Pcm {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

/// Plays clips through cpal at the clip's own sample rate
///
/// Clips are never resampled: a device that cannot run at the clip's rate
/// rejects it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceSink;

impl DeviceSink {
    /// Check that an output device is present
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio device sink initialized"
        );
        Ok(Self)
    }
}

#[async_trait]
impl AudioSink for DeviceSink {
    async fn play(&self, bytes: &[u8], format: AudioFormat) -> Result<()> {
        let pcm = to_pcm(bytes, format)?;
        if pcm.samples.is_empty() {
            return Ok(());
        }

        // cpal streams are not Send; keep the whole stream on one blocking thread
        tokio::task::spawn_blocking(move || play_blocking(&pcm))
            .await
            .map_err(|e| Error::Playback(format!("playback thread failed: {e}")))?
    }
}

/// Read a WAV clip, or interpret raw bytes as little-endian 16-bit PCM
fn to_pcm(bytes: &[u8], format: AudioFormat) -> Result<Pcm> {
    if is_wav(bytes) {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| Error::Playback(format!("invalid WAV clip: {e}")))?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(Error::Playback(format!(
                "unsupported WAV format: {} bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let samples = reader
            .samples::<i16>()
            .map(|s| s.map(|s| f32::from(s) / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Playback(format!("invalid WAV clip: {e}")))?;

        return Ok(Pcm {
            samples,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        });
    }

    if format.bits_per_sample != 16 {
        return Err(Error::Playback(format!(
            "unsupported raw format: {} bit",
            format.bits_per_sample
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(Pcm {
        samples,
        channels: format.channels,
        sample_rate: format.sample_rate,
    })
}

fn play_blocking(pcm: &Pcm) -> Result<()> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device".to_string()))?;

    let rate = SampleRate(pcm.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .find(|c| {
            c.channels() == pcm.channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
        .ok_or_else(|| {
            Error::Playback(format!(
                "device cannot play {} channel audio at {} Hz",
                pcm.channels, pcm.sample_rate
            ))
        })?;
    let config: StreamConfig = supported.with_sample_rate(rate).config();

    let samples = Arc::new(pcm.samples.clone());
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let start = position.load(Ordering::Relaxed);
                    let available = samples.len().saturating_sub(start);
                    let n = available.min(data.len());
                    data[..n].copy_from_slice(&samples[start..start + n]);
                    data[n..].fill(0.0);
                    position.store(start + n, Ordering::Relaxed);
                    if start + n >= samples.len() {
                        finished.store(true, Ordering::Release);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Playback(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    let frames = samples.len() / usize::from(pcm.channels.max(1));
    let duration_ms = (frames as u64 * 1000) / u64::from(pcm.sample_rate.max(1));
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while !finished.load(Ordering::Acquire) {
        if start.elapsed() > timeout {
            drop(stream);
            return Err(Error::Playback("device stopped consuming audio".to_string()));
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the device flush its last buffer
    std::thread::sleep(Duration::from_millis(100));
    drop(stream);

    tracing::debug!(frames, "playback complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::tone_wav;

    #[test]
    fn test_wav_clip_uses_header_format() {
        let wav = tone_wav(440.0, 0.1, 16_000).unwrap();
        let pcm = to_pcm(&wav, AudioFormat::default()).unwrap();
        assert_eq!(pcm.sample_rate, 16_000);
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.samples.len(), 1600);
    }

    #[test]
    fn test_raw_clip_uses_configured_format() {
        let raw = [0x00, 0x40, 0x00, 0xC0];
        let pcm = to_pcm(&raw, AudioFormat::default()).unwrap();
        assert_eq!(pcm.sample_rate, 22_050);
        assert_eq!(pcm.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_raw_clip_rejects_other_depths() {
        let format = AudioFormat {
            bits_per_sample: 24,
            ..AudioFormat::default()
        };
        assert!(matches!(to_pcm(&[0; 6], format), Err(Error::Playback(_))));
    }
}
