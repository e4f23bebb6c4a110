//! Text handling: markdown cleanup and chunk segmentation

mod chunker;
mod markdown;

pub use chunker::{Chunk, Chunker, DEFAULT_MIN_CHARS, Segmentation};
pub use markdown::strip_markdown;
