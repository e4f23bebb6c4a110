//! Streaming completions from an Ollama server

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use super::{FragmentStream, TokenSource};
use crate::{Error, Result};

/// Streams `/api/generate` output as fragments
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One newline-delimited JSON object of a streamed response
#[derive(Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL or model is empty
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("Ollama base URL required".to_string()));
        }
        if model.trim().is_empty() {
            return Err(Error::Config("Ollama model required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for OllamaClient {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::TokenSource(format!("ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenSource(format!("ollama error {status}: {body}")));
        }

        tracing::debug!(model = %self.model, "completion stream opened");
        Ok(fragments(Box::pin(response.bytes_stream())).boxed())
    }
}

/// Reassembles NDJSON lines from arbitrary byte chunks
struct LineDecoder<S> {
    inner: S,
    buf: Vec<u8>,
    ready: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> LineDecoder<S> {
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.parse(&line);
        }
    }

    fn parse(&mut self, line: &[u8]) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        match serde_json::from_slice::<GenerateLine>(line) {
            Ok(GenerateLine {
                error: Some(error), ..
            }) => self.fail(format!("ollama reported: {error}")),
            Ok(parsed) => {
                if !parsed.response.is_empty() {
                    self.ready.push_back(Ok(parsed.response));
                }
                if parsed.done {
                    self.finished = true;
                }
            }
            Err(e) => self.fail(format!("malformed stream line: {e}")),
        }
    }

    fn fail(&mut self, message: String) {
        self.ready.push_back(Err(Error::TokenSource(message)));
        self.finished = true;
    }
}

/// Decode a byte stream of NDJSON generate lines into text fragments
fn fragments<S, B, E>(inner: S) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let decoder = LineDecoder {
        inner,
        buf: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(item) = decoder.ready.pop_front() {
                return Some((item, decoder));
            }
            if decoder.finished {
                return None;
            }

            match decoder.inner.next().await {
                Some(Ok(bytes)) => {
                    decoder.buf.extend_from_slice(bytes.as_ref());
                    decoder.drain_lines();
                }
                Some(Err(e)) => decoder.fail(format!("ollama stream interrupted: {e}")),
                None => {
                    let rest = std::mem::take(&mut decoder.buf);
                    decoder.parse(&rest);
                    decoder.finished = true;
                }
            }
        }
    })
}
