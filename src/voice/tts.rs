//! Text-to-speech (TTS) processing

use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Google Translate speech endpoint (no key required)
const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// `OpenAI` speech endpoint
const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Longest text the Google endpoint accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    Google,
    OpenAI,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!(
                "unknown TTS provider '{other}', expected 'google' or 'openai'"
            ))),
        }
    }
}

/// Synthesizes speech from text as MP3 bytes
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
    base_url: String,
    api_key: Option<SecretString>,
    language: String,
    voice: String,
    model: String,
}

impl TextToSpeech {
    /// Create a TTS instance from the voice configuration
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` provider is selected without an API key
    pub fn new(config: &VoiceConfig, api_key: Option<SecretString>) -> Result<Self> {
        let base_url = match config.tts_provider {
            TtsProvider::Google => GOOGLE_TTS_URL,
            TtsProvider::OpenAI => {
                if api_key.is_none() {
                    return Err(Error::Config("OpenAI API key required for TTS".to_string()));
                }
                OPENAI_TTS_URL
            }
        };

        Ok(Self {
            client: reqwest::Client::new(),
            provider: config.tts_provider,
            base_url: base_url.to_string(),
            api_key,
            language: config.language.clone(),
            voice: config.tts_voice.clone(),
            model: config.tts_model.clone(),
        })
    }

    /// Point the provider at a different endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::Google => self.synthesize_google(text).await,
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
        }
    }

    /// Synthesize through Google Translate, one request per chunk
    ///
    /// MP3 frames are self-delimiting so the chunks are simply concatenated.
    async fn synthesize_google(&self, text: &str) -> Result<Vec<u8>> {
        let chunks = split_text(text, GOOGLE_MAX_CHARS);
        if chunks.is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let total = chunks.len();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let url = format!(
                "{}?ie=UTF-8&client=tw-ob&tl={}&q={}&total={total}&idx={idx}&textlen={}",
                self.base_url,
                urlencoding::encode(&self.language),
                urlencoding::encode(chunk),
                chunk.chars().count()
            );

            let response = self.client.get(&url).send().await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
            }

            audio.extend_from_slice(&response.bytes().await?);
        }

        tracing::debug!(chunks = total, bytes = audio.len(), "synthesized speech");
        Ok(audio)
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?;

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// Split text into chunks of at most `max_chars` characters
///
/// Breaks on whitespace; a single word longer than the limit is cut.
#[must_use]
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;

        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let cut = word
                .char_indices()
                .nth(max_chars)
                .map_or(word.len(), |(i, _)| i);
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }

        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };

        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
