//! Session coordinator: token source → chunker → converter → playback
//!
//! Ingestion, conversion and playback run as separate tasks interleaved by
//! the runtime. Conversions may overlap (bounded by `max_in_flight`), but
//! clips reach the playback queue only through the ordering barrier, so they
//! are heard in chunk order whatever order the TTS service answers in.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::barrier::OrderingBarrier;
use super::session::{SessionReport, SessionState};
use crate::config::Config;
use crate::llm::{OllamaClient, TokenSource};
use crate::text::{Chunk, Chunker, DEFAULT_MIN_CHARS, Segmentation};
use crate::voice::{self, AudioClip, AudioFormat, AudioSink, Converter, PlaybackQueue, TextToSpeech};
use crate::{ConversionError, Error, Result};

/// Knobs for one coordinator
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub min_chars: usize,
    pub segmentation: Segmentation,
    /// Max conversions talking to the TTS service at once
    pub max_in_flight: usize,
    /// Format handed to the sink with every clip
    pub format: AudioFormat,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            segmentation: Segmentation::default(),
            max_in_flight: 4,
            format: AudioFormat::default(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            min_chars: config.chunker.min_chars,
            segmentation: config.chunker.segmentation,
            max_in_flight: config.pipeline.max_in_flight,
            format: config.playback.format,
        }
    }
}

type Conversion = std::result::Result<AudioClip, ConversionError>;

/// Conversions in flight and the sequence number each task serves
struct InFlight {
    tasks: JoinSet<Conversion>,
    sequences: HashMap<task::Id, u64>,
    permits: Arc<Semaphore>,
}

impl InFlight {
    fn new(max_in_flight: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            sequences: HashMap::new(),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Start converting `chunk`; never waits for a free slot
    fn dispatch(&mut self, converter: &Arc<dyn Converter>, chunk: Chunk) {
        let sequence = chunk.sequence();
        let converter = Arc::clone(converter);
        let permits = Arc::clone(&self.permits);

        let handle = self.tasks.spawn(
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| ConversionError::other(sequence, "dispatch closed"))?;
                converter.convert(&chunk).await
            }
            .in_current_span(),
        );
        self.sequences.insert(handle.id(), sequence);
        tracing::debug!(sequence, "conversion dispatched");
    }

    /// Wait for the next conversion to settle, in completion order
    async fn next(&mut self) -> Option<(u64, Conversion)> {
        let joined = self.tasks.join_next_with_id().await?;
        Some(match joined {
            Ok((id, outcome)) => {
                let sequence = self.sequences.remove(&id).unwrap_or_else(|| match &outcome {
                    Ok(clip) => clip.sequence(),
                    Err(e) => e.sequence,
                });
                (sequence, outcome)
            }
            Err(e) => {
                let sequence = self.sequences.remove(&e.id()).unwrap_or_default();
                let error = ConversionError::other(sequence, format!("conversion task failed: {e}"));
                (sequence, Err(error))
            }
        })
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn abort(&mut self) {
        self.tasks.abort_all();
        self.sequences.clear();
    }
}

/// Runs prompt-to-speech sessions, one at a time
pub struct Coordinator {
    source: Arc<dyn TokenSource>,
    converter: Arc<dyn Converter>,
    sink: Arc<dyn AudioSink>,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        source: Arc<dyn TokenSource>,
        converter: Arc<dyn Converter>,
        sink: Arc<dyn AudioSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            converter,
            sink,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the Ollama → TTS → sink pipeline described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if any collaborator cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = OllamaClient::new(&config.llm.base_url, &config.llm.model)?;
        Self::with_source(config, Arc::new(source))
    }

    /// Like [`Coordinator::from_config`] but with a caller-supplied token source
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the converter or sink
    /// cannot be created
    pub fn with_source(config: &Config, source: Arc<dyn TokenSource>) -> Result<Self> {
        config.validate()?;
        let converter = TextToSpeech::from_config(&config.tts)?;
        let sink = voice::sink_from_config(&config.playback)?;
        Ok(Self::new(
            source,
            Arc::new(converter),
            sink,
            PipelineSettings::from(config),
        ))
    }

    /// Token that cancels the running session and every later one
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Speak the completion for `prompt`, returning once the last clip has
    /// played or failed
    ///
    /// Conversion and playback failures are logged and skipped; only a token
    /// source failure or cancellation ends the session early.
    ///
    /// # Errors
    ///
    /// Returns the token source's error, or `Error::Cancelled`
    pub async fn run_session(&mut self, prompt: &str) -> Result<SessionReport> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", %id);
        self.drive(id, prompt).instrument(span).await
    }

    #[allow(clippy::too_many_lines)]
    async fn drive(&self, id: Uuid, prompt: &str) -> Result<SessionReport> {
        let cancel = self.cancel.child_token();

        let mut fragments = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            stream = self.source.stream(prompt) => stream.inspect_err(|e| {
                tracing::error!(error = %e, "token source failed to start");
            })?,
        };
        tracing::info!("session started");

        let queue = PlaybackQueue::spawn(Arc::clone(&self.sink), self.settings.format, cancel.clone());
        let mut chunker = Chunker::new(self.settings.min_chars, self.settings.segmentation);
        let mut barrier = OrderingBarrier::new();
        let mut in_flight = InFlight::new(self.settings.max_in_flight);
        let mut skipped = Vec::new();
        let mut state = SessionState::Streaming;

        while state == SessionState::Streaming || !in_flight.is_empty() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    in_flight.abort();
                    let stats = queue.finish().await?;
                    tracing::info!(dropped = stats.dropped, "session cancelled");
                    return Err(Error::Cancelled);
                }
                Some((sequence, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                    let ready = match outcome {
                        Ok(clip) if clip.sequence() == sequence => barrier.complete(clip),
                        Ok(clip) => {
                            tracing::warn!(
                                sequence,
                                returned = clip.sequence(),
                                "converter returned clip for wrong chunk, skipping"
                            );
                            skipped.push(sequence);
                            barrier.skip(sequence)
                        }
                        Err(e) => {
                            tracing::warn!(
                                sequence,
                                status = ?e.status,
                                error = %e,
                                "conversion failed, skipping chunk"
                            );
                            skipped.push(sequence);
                            barrier.skip(sequence)
                        }
                    };
                    for clip in ready {
                        tracing::debug!(sequence = clip.sequence(), "clip released to playback");
                        queue.submit(clip)?;
                    }
                }
                next = fragments.next(), if state == SessionState::Streaming => match next {
                    Some(Ok(fragment)) => {
                        for chunk in chunker.feed(&fragment) {
                            in_flight.dispatch(&self.converter, chunk);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "token source failed, ending session");
                        in_flight.abort();
                        cancel.cancel();
                        queue.finish().await?;
                        return Err(e);
                    }
                    None => {
                        if let Some(chunk) = chunker.flush() {
                            in_flight.dispatch(&self.converter, chunk);
                        }
                        state.advance(SessionState::Draining)?;
                        tracing::debug!(
                            chunks = chunker.emitted(),
                            outstanding = in_flight.len(),
                            "token source finished"
                        );
                    }
                },
            }
        }

        if !barrier.is_drained() {
            tracing::error!(
                held = barrier.held(),
                next = barrier.next_expected(),
                "ordering barrier still holding clips at end of session"
            );
        }

        let stats = queue.finish().await?;
        if cancel.is_cancelled() {
            tracing::info!(dropped = stats.dropped, "session cancelled");
            return Err(Error::Cancelled);
        }
        state.advance(SessionState::Done)?;

        tracing::info!(
            chunks = chunker.emitted(),
            played = stats.played,
            skipped = skipped.len(),
            "session finished"
        );

        Ok(SessionReport {
            id,
            chunks: chunker.emitted(),
            played: stats.played,
            skipped,
            playback_failures: stats.failed,
            state,
        })
    }
}
