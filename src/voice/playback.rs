//! Single-consumer playback queue
//!
//! Clips submitted to the queue are played one at a time, in submission
//! order. The queue is owned by one background task; producers only hold the
//! sending half of a channel, so no queue state is shared between tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::sink::{AudioFormat, AudioSink};
use super::tts::AudioClip;
use crate::{Error, Result};

/// What happened to the clips handed to a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Clips the sink finished playing
    pub played: usize,
    /// Clips the sink rejected or failed on
    pub failed: usize,
    /// Clips discarded unplayed because the session was cancelled
    pub dropped: usize,
}

/// FIFO of audio clips in front of an audio sink
pub struct PlaybackQueue {
    tx: mpsc::UnboundedSender<AudioClip>,
    task: JoinHandle<PlaybackStats>,
    playing: Arc<AtomicBool>,
}

impl PlaybackQueue {
    /// Start the drain task for `sink`
    ///
    /// Cancelling `cancel` stops playback and discards queued clips.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AudioSink>, format: AudioFormat, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let playing = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(
            drain(rx, sink, format, Arc::clone(&playing), cancel).in_current_span(),
        );

        Self { tx, task, playing }
    }

    /// Append a clip; empty clips are ignored
    ///
    /// # Errors
    ///
    /// Returns error if the drain task has already stopped
    pub fn submit(&self, clip: AudioClip) -> Result<()> {
        if clip.is_empty() {
            tracing::debug!(sequence = clip.sequence(), "empty clip, nothing to play");
            return Ok(());
        }

        self.tx
            .send(clip)
            .map_err(|_| Error::Playback("playback queue closed".to_string()))
    }

    /// Whether a clip is currently at the sink
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Stop accepting clips and wait for everything queued to play
    ///
    /// # Errors
    ///
    /// Returns error if the drain task panicked
    pub async fn finish(self) -> Result<PlaybackStats> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))
    }
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<AudioClip>,
    sink: Arc<dyn AudioSink>,
    format: AudioFormat,
    playing: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> PlaybackStats {
    let mut stats = PlaybackStats::default();

    loop {
        let clip = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            clip = rx.recv() => match clip {
                Some(clip) => clip,
                None => break,
            },
        };

        playing.store(true, Ordering::Release);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = sink.play(clip.bytes(), format) => Some(result),
        };
        playing.store(false, Ordering::Release);

        match outcome {
            Some(Ok(())) => {
                stats.played += 1;
                tracing::debug!(sequence = clip.sequence(), "clip finished");
            }
            Some(Err(e)) => {
                stats.failed += 1;
                tracing::warn!(sequence = clip.sequence(), error = %e, "playback failed, moving on");
            }
            None => {
                stats.dropped += 1;
                break;
            }
        }
    }

    if cancel.is_cancelled() {
        rx.close();
        while rx.try_recv().is_ok() {
            stats.dropped += 1;
        }
        tracing::debug!(dropped = stats.dropped, "playback queue cleared");
    }

    stats
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Records clips and fails on a marker byte
    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, bytes: &[u8], _format: AudioFormat) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if bytes == [0xFF] {
                return Err(Error::Playback("rejected".to_string()));
            }
            self.played.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_in_submission_order() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(sink.clone(), AudioFormat::default(), CancellationToken::new());

        for i in 1..=3u8 {
            queue.submit(AudioClip::new(u64::from(i), vec![i])).unwrap();
        }
        let stats = queue.finish().await.unwrap();

        assert_eq!(stats.played, 3);
        assert_eq!(*sink.played.lock().unwrap(), vec![vec![1], vec![2], vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_clip_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(sink.clone(), AudioFormat::default(), CancellationToken::new());

        queue.submit(AudioClip::new(1, Vec::new())).unwrap();
        let stats = queue.finish().await.unwrap();

        assert_eq!(stats, PlaybackStats::default());
        assert!(sink.played.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_stop_queue() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(sink.clone(), AudioFormat::default(), CancellationToken::new());

        queue.submit(AudioClip::new(1, vec![1])).unwrap();
        queue.submit(AudioClip::new(2, vec![0xFF])).unwrap();
        queue.submit(AudioClip::new(3, vec![3])).unwrap();
        let stats = queue.finish().await.unwrap();

        assert_eq!(stats.played, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(*sink.played.lock().unwrap(), vec![vec![1], vec![3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_queue() {
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let queue = PlaybackQueue::spawn(sink.clone(), AudioFormat::default(), cancel.clone());

        for i in 1..=4u8 {
            queue.submit(AudioClip::new(u64::from(i), vec![i])).unwrap();
        }
        cancel.cancel();
        let stats = queue.finish().await.unwrap();

        assert_eq!(stats.played, 0);
        assert_eq!(stats.dropped, 4);
        assert!(sink.played.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_playing_while_at_sink() {
        let sink = Arc::new(RecordingSink::default());
        let queue = PlaybackQueue::spawn(sink, AudioFormat::default(), CancellationToken::new());
        assert!(!queue.is_playing());

        queue.submit(AudioClip::new(1, vec![1])).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(queue.is_playing());

        queue.finish().await.unwrap();
    }
}
