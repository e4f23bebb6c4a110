//! Session lifecycle and outcome

use std::fmt;

use uuid::Uuid;

use crate::{Error, Result};

/// Phase of a speech session
///
/// Moves forward only: `Streaming` → `Draining` → `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Token source still producing
    Streaming,
    /// Token source finished; waiting on conversions and playback
    Draining,
    /// Nothing outstanding
    Done,
}

impl SessionState {
    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` for any transition other than one step forward
    pub fn advance(&mut self, next: Self) -> Result<()> {
        let allowed = matches!(
            (*self, next),
            (Self::Streaming, Self::Draining) | (Self::Draining, Self::Done)
        );
        if !allowed {
            return Err(Error::Session(format!(
                "invalid session transition {self} -> {next}"
            )));
        }

        tracing::debug!(from = %self, to = %next, "session state");
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of one prompt-to-speech session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: Uuid,
    /// Chunks emitted by the chunker
    pub chunks: u64,
    /// Clips the sink finished playing
    pub played: usize,
    /// Sequence numbers whose conversion failed, in failure order
    pub skipped: Vec<u64>,
    /// Clips the sink rejected
    pub playback_failures: usize,
    pub state: SessionState,
}
