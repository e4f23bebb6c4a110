//! Voice output
//!
//! Handles chunk-to-audio conversion over TTS, audio sinks, and the
//! playback queue that serializes clips onto a sink.

#[cfg(feature = "device")]
mod device;
mod playback;
mod sink;
mod tts;

use std::sync::Arc;

use crate::config::{PlaybackConfig, SinkKind};
use crate::Result;

#[cfg(feature = "device")]
pub use device::DeviceSink;
pub use playback::{PlaybackQueue, PlaybackStats};
pub use sink::{AudioFormat, AudioSink, FfplaySink, NullSink, is_wav, tone_wav};
pub use tts::{AudioClip, Converter, TextToSpeech};

/// Build the sink selected in configuration
///
/// # Errors
///
/// Returns error if the sink cannot be opened or was not compiled in
pub fn sink_from_config(config: &PlaybackConfig) -> Result<Arc<dyn AudioSink>> {
    match config.sink {
        SinkKind::Ffplay => Ok(Arc::new(FfplaySink::new(&config.ffplay_path))),
        SinkKind::Null => Ok(Arc::new(NullSink)),
        #[cfg(feature = "device")]
        SinkKind::Device => Ok(Arc::new(DeviceSink::new()?)),
        #[cfg(not(feature = "device"))]
        SinkKind::Device => Err(crate::Error::Config(
            "device playback requires building with the `device` feature".to_string(),
        )),
    }
}
