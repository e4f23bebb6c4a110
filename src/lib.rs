//! streamspeak - Speak LLM completions while they are still being generated
//!
//! Completion text is cut into speakable chunks as it arrives, each chunk is
//! converted to audio by a TTS service, and the clips are played back in
//! chunk order while the model keeps writing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   fragments   ┌─────────┐   chunks   ┌───────────┐
//! │ Token source │ ────────────▶ │ Chunker │ ─────────▶ │ Converter │ (concurrent)
//! └──────────────┘               └─────────┘            └─────┬─────┘
//!                                                             │ clips, any order
//!                  ┌──────┐   one at a time   ┌──────────┐   ┌▼────────────────┐
//!                  │ Sink │ ◀──────────────── │ Playback │ ◀─│ Ordering barrier │
//!                  └──────┘                   │  queue   │   └─────────────────┘
//!                                             └──────────┘
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod text;
pub mod voice;

pub use config::Config;
pub use error::{ConversionError, Error, Result};
pub use llm::{FragmentStream, OllamaClient, StaticSource, TokenSource};
pub use pipeline::{Coordinator, OrderingBarrier, PipelineSettings, SessionReport, SessionState};
pub use text::{Chunk, Chunker, Segmentation, strip_markdown};
pub use voice::{
    AudioClip, AudioFormat, AudioSink, Converter, FfplaySink, NullSink, PlaybackQueue,
    PlaybackStats, TextToSpeech,
};
