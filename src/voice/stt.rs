//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{AudioSegment, Transcriber};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Default transcriptions endpoint
pub const DEFAULT_STT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Default transcription model
pub const DEFAULT_STT_MODEL: &str = "whisper-1";

/// Outcome of transcribing one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    /// Speech was recognized
    Recognized(String),
    /// The service answered but heard no words
    Unintelligible,
    /// The service could not be reached or refused the request
    Unreachable(String),
}

/// Response from the Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech through an OpenAI-compatible Whisper endpoint
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    language: String,
}

impl WhisperTranscriber {
    /// Create a transcriber from the voice configuration
    #[must_use]
    pub fn new(config: &VoiceConfig, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: config.stt_endpoint.clone(),
            model: config.stt_model.clone(),
            language: config.language.clone(),
        }
    }

    /// Send the segment and return the raw transcript
    async fn request(&self, segment: &AudioSegment) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("OpenAI API key required for Whisper".to_string()))?;

        let wav = segment.to_wav()?;
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        Ok(result.text)
    }
}

#[async_trait(?Send)]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, segment: &AudioSegment) -> Transcription {
        match self.request(segment).await {
            Ok(text) => {
                let text = clean_transcript(&text);
                if text.is_empty() {
                    tracing::debug!("empty transcript");
                    Transcription::Unintelligible
                } else {
                    tracing::info!(transcript = %text, "transcription complete");
                    Transcription::Recognized(text.to_string())
                }
            }
            Err(e) => Transcription::Unreachable(e.to_string()),
        }
    }
}

/// Trim whitespace and the closing full stop or ellipsis Whisper appends
///
/// Other punctuation is kept, so "Sortie." becomes "Sortie" but "sortie!"
/// is unchanged.
#[must_use]
pub fn clean_transcript(text: &str) -> &str {
    text.trim().trim_end_matches(['.', '…']).trim_end()
}
