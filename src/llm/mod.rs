//! LLM token sources
//!
//! A token source turns a prompt into a stream of text fragments. The stream
//! ends when the model is done; an `Err` item is fatal to the session.

mod ollama;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::Result;

pub use ollama::OllamaClient;

/// Incremental completion text, in arrival order
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Producer of completion fragments for a prompt
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Start a completion for `prompt`
    ///
    /// # Errors
    ///
    /// Returns error if the completion cannot be started
    async fn stream(&self, prompt: &str) -> Result<FragmentStream>;
}

/// Replays a fixed piece of text word by word
///
/// Used to speak text directly without a model behind it.
#[derive(Debug, Clone)]
pub struct StaticSource {
    fragments: Vec<String>,
}

impl StaticSource {
    #[must_use]
    pub const fn new(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    /// Split text into whitespace-inclusive word fragments
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::new(text.split_inclusive(' ').map(ToString::to_string).collect())
    }
}

#[async_trait]
impl TokenSource for StaticSource {
    async fn stream(&self, _prompt: &str) -> Result<FragmentStream> {
        let fragments = self.fragments.clone();
        Ok(tokio_stream::iter(fragments.into_iter().map(Ok)).boxed())
    }
}
