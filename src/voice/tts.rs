//! Text-to-speech (TTS) conversion of chunks into audio clips

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{TtsConfig, TtsProviderKind};
use crate::text::Chunk;
use crate::{ConversionError, Error, Result};

/// Audio produced for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    sequence: u64,
    bytes: Vec<u8>,
}

impl AudioClip {
    #[must_use]
    pub const fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self { sequence, bytes }
    }

    /// Sequence number inherited from the source chunk
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True when conversion yielded no audio
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns a chunk of text into audio
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert one chunk; a single attempt, never retried
    ///
    /// # Errors
    ///
    /// Returns `ConversionError` carrying the chunk's sequence number
    async fn convert(&self, chunk: &Chunk) -> std::result::Result<AudioClip, ConversionError>;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug)]
enum TtsProvider {
    /// Coqui `tts-server`, `GET /api/tts`
    Coqui,
    /// OpenAI-compatible `POST /v1/audio/speech`
    OpenAI,
}

/// Synthesizes speech over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance for a Coqui server
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty
    pub fn new_coqui(base_url: &str, speaker_id: String) -> Result<Self> {
        Self::build(
            base_url,
            None,
            speaker_id,
            1.0,
            String::new(),
            TtsProvider::Coqui,
            None,
        )
    }

    /// Create a TTS instance for an OpenAI-compatible speech endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the base URL or API key is missing
    pub fn new_openai(
        base_url: &str,
        api_key: String,
        model: String,
        voice: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Self::build(
            base_url,
            Some(api_key),
            voice,
            speed,
            model,
            TtsProvider::OpenAI,
            None,
        )
    }

    /// Create a TTS instance from resolved configuration
    ///
    /// # Errors
    ///
    /// Returns error if required settings for the provider are missing
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let timeout = config.timeout_secs.map(Duration::from_secs);

        match config.provider {
            TtsProviderKind::Coqui => Self::build(
                &config.base_url,
                None,
                config.speaker_id.clone(),
                1.0,
                String::new(),
                TtsProvider::Coqui,
                timeout,
            ),
            TtsProviderKind::OpenAi => {
                let api_key = config.api_key.clone().unwrap_or_default();
                if api_key.is_empty() {
                    return Err(Error::Config("OpenAI API key required for TTS".to_string()));
                }
                Self::build(
                    &config.base_url,
                    Some(api_key),
                    config.voice.clone(),
                    config.speed,
                    config.model.clone(),
                    TtsProvider::OpenAI,
                    timeout,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        base_url: &str,
        api_key: Option<String>,
        voice: String,
        speed: f32,
        model: String,
        provider: TtsProvider,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Config("TTS base URL required".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            voice,
            speed,
            model,
            provider,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (WAV for Coqui, whatever format the endpoint returns otherwise)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails; `sequence` is carried into the error
    pub async fn synthesize(
        &self,
        sequence: u64,
        text: &str,
    ) -> std::result::Result<Vec<u8>, ConversionError> {
        if text.trim().is_empty() {
            return Err(ConversionError::other(sequence, "chunk text is empty"));
        }

        let request = match self.provider {
            TtsProvider::Coqui => self.coqui_request(text),
            TtsProvider::OpenAI => self.openai_request(text),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ConversionError::transport(sequence, &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::upstream(sequence, status.as_u16(), body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ConversionError::transport(sequence, &e))?;
        Ok(audio.to_vec())
    }

    /// Coqui takes everything in the query string
    fn coqui_request(&self, text: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/api/tts", self.base_url))
            .query(&[("text", text), ("speaker_id", self.voice.as_str())])
    }

    fn openai_request(&self, text: &str) -> reqwest::RequestBuilder {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "wav",
        };

        self.client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.as_deref().unwrap_or_default()),
            )
            .json(&request)
    }
}

#[async_trait]
impl Converter for TextToSpeech {
    async fn convert(&self, chunk: &Chunk) -> std::result::Result<AudioClip, ConversionError> {
        let audio = self.synthesize(chunk.sequence(), chunk.text()).await?;
        tracing::debug!(
            sequence = chunk.sequence(),
            bytes = audio.len(),
            "chunk converted"
        );
        Ok(AudioClip::new(chunk.sequence(), audio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_requires_key() {
        let result = TextToSpeech::new_openai(
            "https://api.openai.com",
            String::new(),
            "tts-1".to_string(),
            "alloy".to_string(),
            1.0,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_coqui_requires_url() {
        let result = TextToSpeech::new_coqui("  ", "p376".to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_coqui_request_encodes_query() {
        let tts = TextToSpeech::new_coqui("http://localhost:5003/", "p376".to_string()).unwrap();
        let request = tts.coqui_request("Hi & bye?").build().unwrap();
        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().path(), "/api/tts");
        assert_eq!(
            request.url().query(),
            Some("text=Hi+%26+bye%3F&speaker_id=p376")
        );
    }

    #[test]
    fn test_openai_request_shape() {
        let tts = TextToSpeech::new_openai(
            "http://localhost:8000",
            "sk-test".to_string(),
            "tts-1".to_string(),
            "alloy".to_string(),
            1.25,
        )
        .unwrap();
        let request = tts.openai_request("Hello.").build().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/v1/audio/speech");
        assert_eq!(
            request.headers()["authorization"].to_str().unwrap(),
            "Bearer sk-test"
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_request() {
        let tts = TextToSpeech::new_coqui("http://127.0.0.1:9", "p376".to_string()).unwrap();
        let err = tts.synthesize(4, "   ").await.unwrap_err();
        assert_eq!(err.sequence, 4);
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_empty_clip() {
        assert!(AudioClip::new(1, Vec::new()).is_empty());
        assert!(!AudioClip::new(1, vec![0]).is_empty());
    }
}
