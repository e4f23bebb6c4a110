//! TOML configuration file loading
//!
//! Supports `~/.config/streamspeak/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{SinkKind, TtsProviderKind};
use crate::text::Segmentation;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct StreamspeakConfigFile {
    /// Completion source
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Text-to-speech service
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Text segmentation
    #[serde(default)]
    pub chunker: ChunkerFileConfig,

    /// Conversion scheduling
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Audio output
    #[serde(default)]
    pub playback: PlaybackFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Ollama server URL (e.g. `http://localhost:11434`)
    pub base_url: Option<String>,

    /// Model identifier (e.g. "llama3.1")
    pub model: Option<String>,
}

/// TTS service configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub provider: Option<TtsProviderKind>,
    pub base_url: Option<String>,
    /// Coqui speaker (e.g. "p376")
    pub speaker_id: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Chunker configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChunkerFileConfig {
    /// Characters required before a sentence end emits a chunk
    pub min_chars: Option<usize>,
    pub segmentation: Option<Segmentation>,
}

/// Pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Max concurrent TTS requests
    pub max_in_flight: Option<usize>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    pub sink: Option<SinkKind>,
    pub ffplay_path: Option<String>,
    pub format: Option<AudioFormatFileConfig>,
}

/// Raw audio format overrides
#[derive(Debug, Default, Deserialize)]
pub struct AudioFormatFileConfig {
    pub channels: Option<u16>,
    pub bits_per_sample: Option<u16>,
    pub sample_rate: Option<u32>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `StreamspeakConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> StreamspeakConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return StreamspeakConfigFile::default();
    };

    if !path.exists() {
        return StreamspeakConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                StreamspeakConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            StreamspeakConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/streamspeak/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("streamspeak").join("config.toml"))
}
