//! Configuration management for streamspeak

pub mod file;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::text::{DEFAULT_MIN_CHARS, Segmentation};
use crate::voice::AudioFormat;
use crate::{Error, Result};

use file::StreamspeakConfigFile;

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion source
    pub llm: LlmConfig,

    /// Text-to-speech service
    pub tts: TtsConfig,

    /// Text segmentation
    pub chunker: ChunkerConfig,

    /// Conversion scheduling
    pub pipeline: PipelineConfig,

    /// Audio output
    pub playback: PlaybackConfig,
}

/// Ollama connection settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Server URL, from `OLLAMA_BASE`
    pub base_url: String,

    /// Model name, from `OLLAMA_MODEL`
    pub model: String,
}

/// Which TTS API the converter talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    /// Coqui `tts-server`
    #[default]
    Coqui,
    /// OpenAI-compatible speech endpoint
    OpenAi,
}

/// TTS service settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProviderKind,

    /// Service URL without the endpoint path
    pub base_url: String,

    /// Coqui speaker identifier
    pub speaker_id: String,

    /// OpenAI model (e.g. "tts-1")
    pub model: String,

    /// OpenAI voice (e.g. "alloy")
    pub voice: String,

    /// OpenAI speed multiplier (0.25 to 4.0)
    pub speed: f32,

    /// Bearer key for OpenAI-compatible services
    pub api_key: Option<String>,

    /// Per-request timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

/// Chunker settings
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub min_chars: usize,
    pub segmentation: Segmentation,
}

/// Conversion scheduling settings
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Max TTS requests outstanding at once
    pub max_in_flight: usize,
}

/// Where clips are played
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Pipe each clip into `ffplay`
    #[default]
    Ffplay,
    /// Default output device via cpal
    Device,
    /// Discard audio
    Null,
}

/// Audio output settings
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub sink: SinkKind,
    pub ffplay_path: String,
    /// Format assumed for clips without a WAV header
    pub format: AudioFormat,
}

const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
const DEFAULT_TTS_URL: &str = "http://localhost:5003";
const DEFAULT_SPEAKER: &str = "p376";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// The result is not validated so that CLI overrides can still be applied;
    /// call [`Config::validate`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a config file with environment lookups (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn resolve(
        fc: StreamspeakConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let llm = LlmConfig {
            base_url: env("OLLAMA_BASE")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE.to_string()),
            model: env("OLLAMA_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
        };

        let provider = match env("STREAMSPEAK_TTS_PROVIDER") {
            Some(p) => parse_provider(&p)?,
            None => fc.tts.provider.unwrap_or_default(),
        };
        let tts = TtsConfig {
            provider,
            base_url: env("STREAMSPEAK_TTS_URL")
                .or(fc.tts.base_url)
                .unwrap_or_else(|| DEFAULT_TTS_URL.to_string()),
            speaker_id: env("STREAMSPEAK_TTS_SPEAKER")
                .or(fc.tts.speaker_id)
                .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
            model: fc.tts.model.unwrap_or_else(|| "tts-1".to_string()),
            voice: fc.tts.voice.unwrap_or_else(|| "alloy".to_string()),
            speed: fc.tts.speed.unwrap_or(1.0),
            api_key: env("OPENAI_API_KEY").or(fc.tts.api_key),
            timeout_secs: Some(fc.tts.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
                .filter(|secs| *secs > 0),
        };

        let chunker = ChunkerConfig {
            min_chars: fc.chunker.min_chars.unwrap_or(DEFAULT_MIN_CHARS),
            segmentation: fc.chunker.segmentation.unwrap_or_default(),
        };

        let pipeline = PipelineConfig {
            max_in_flight: fc.pipeline.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
        };

        let defaults = AudioFormat::default();
        let format = fc.playback.format.map_or(defaults, |f| AudioFormat {
            channels: f.channels.unwrap_or(defaults.channels),
            bits_per_sample: f.bits_per_sample.unwrap_or(defaults.bits_per_sample),
            sample_rate: f.sample_rate.unwrap_or(defaults.sample_rate),
        });
        let playback = PlaybackConfig {
            sink: fc.playback.sink.unwrap_or_default(),
            ffplay_path: fc.playback.ffplay_path.unwrap_or_else(|| "ffplay".to_string()),
            format,
        };

        Ok(Self {
            llm,
            tts,
            chunker,
            pipeline,
            playback,
        })
    }

    /// Check invariants the pipeline relies on
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(Error::Config("llm.base_url must not be empty".to_string()));
        }
        if self.tts.base_url.trim().is_empty() {
            return Err(Error::Config("tts.base_url must not be empty".to_string()));
        }
        if self.pipeline.max_in_flight == 0 {
            return Err(Error::Config(
                "pipeline.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.playback.format.channels == 0 || self.playback.format.sample_rate == 0 {
            return Err(Error::Config(
                "playback.format needs non-zero channels and sample_rate".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_provider(value: &str) -> Result<TtsProviderKind> {
    match value.to_ascii_lowercase().as_str() {
        "coqui" => Ok(TtsProviderKind::Coqui),
        "openai" => Ok(TtsProviderKind::OpenAi),
        other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
    }
}
