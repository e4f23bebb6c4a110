//! Shared test doubles for pipeline tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use streamspeak::{
    AudioClip, AudioFormat, AudioSink, Chunk, ConversionError, Converter, Error, FragmentStream,
    PipelineSettings, Result, Segmentation, TokenSource,
};

/// Text of the `n`th test sentence as the chunker emits it
pub fn sentence(n: u64) -> String {
    format!("Sentence number {n} is here.")
}

/// `count` fragments, one sentence each
pub fn sentences(count: u64) -> Vec<String> {
    (1..=count).map(|n| format!("{} ", sentence(n))).collect()
}

/// Settings where every test sentence becomes its own chunk
pub fn settings(max_in_flight: usize) -> PipelineSettings {
    PipelineSettings {
        min_chars: 5,
        segmentation: Segmentation::Fragment,
        max_in_flight,
        format: AudioFormat::default(),
    }
}

/// Converter with per-sequence latency and failures
#[derive(Default)]
pub struct ScriptedConverter {
    delays: HashMap<u64, Duration>,
    failures: HashSet<u64>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    /// Sequence numbers in completion order
    pub completed: Mutex<Vec<u64>>,
}

impl ScriptedConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, sequence: u64, millis: u64) -> Self {
        self.delays.insert(sequence, Duration::from_millis(millis));
        self
    }

    pub fn fail(mut self, sequence: u64) -> Self {
        self.failures.insert(sequence);
        self
    }

    pub fn completed(&self) -> Vec<u64> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    async fn convert(&self, chunk: &Chunk) -> std::result::Result<AudioClip, ConversionError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(&chunk.sequence())
            .copied()
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(chunk.sequence());

        if self.failures.contains(&chunk.sequence()) {
            return Err(ConversionError::upstream(
                chunk.sequence(),
                500,
                "synthetic failure".to_string(),
            ));
        }
        Ok(AudioClip::new(chunk.sequence(), chunk.text().as_bytes().to_vec()))
    }
}

/// Sink that records clip text and how many clips it played at once
#[derive(Default)]
pub struct RecordingSink {
    reject: Option<String>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub played: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever a clip with this text is played
    pub fn rejecting(text: impl Into<String>) -> Self {
        Self {
            reject: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, bytes: &[u8], _format: AudioFormat) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let text = String::from_utf8_lossy(bytes).into_owned();
        if self.reject.as_deref() == Some(text.as_str()) {
            return Err(Error::Playback("sink rejected clip".to_string()));
        }
        self.played.lock().unwrap().push(text);
        Ok(())
    }
}

/// Token source that fails after yielding some fragments
pub struct FailingSource {
    pub fragments: Vec<String>,
}

#[async_trait]
impl TokenSource for FailingSource {
    async fn stream(&self, _prompt: &str) -> Result<FragmentStream> {
        let items: Vec<Result<String>> = self
            .fragments
            .iter()
            .cloned()
            .map(Ok)
            .chain(std::iter::once(Err(Error::TokenSource(
                "connection reset".to_string(),
            ))))
            .collect();
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Token source that cannot start
pub struct UnreachableSource;

#[async_trait]
impl TokenSource for UnreachableSource {
    async fn stream(&self, _prompt: &str) -> Result<FragmentStream> {
        Err(Error::TokenSource("ollama unreachable".to_string()))
    }
}
