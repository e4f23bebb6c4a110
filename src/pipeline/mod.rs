//! Streaming speech pipeline
//!
//! ```text
//! token source ─▶ Chunker ─▶ Converter (×N) ─▶ OrderingBarrier ─▶ PlaybackQueue ─▶ sink
//! ```

mod barrier;
mod coordinator;
mod session;

pub use barrier::OrderingBarrier;
pub use coordinator::{Coordinator, PipelineSettings};
pub use session::{SessionReport, SessionState};
