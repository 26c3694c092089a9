//! Chat completion responder
//!
//! Sends one utterance to an OpenAI-compatible chat completions endpoint and
//! normalizes the reply out of either of the two envelope shapes the API has
//! been seen to return:
//!
//! ```text
//! {"choices":     [{"message": {"content": "..."}}]}
//! {"completions": [{"data":    {"text":    "..."}}]}
//! ```
//!
//! Anything else is written to the diagnostic sink between marker lines and
//! replaced by [`UNEXPECTED_FORMAT_REPLY`].

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::config::ChatConfig;

/// Default chat completions endpoint
pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo-0125";

/// System instruction sent with templated prompts
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are having a conversation with me in french. Just give your response as if talking naturally";

/// User message template, `{utterance}` is replaced by the transcript
pub const DEFAULT_TEMPLATE: &str = "If I said '{utterance}' how would you respond?";

/// Reply substituted when the envelope matches neither known shape
pub const UNEXPECTED_FORMAT_REPLY: &str = "Error: Unexpected response format from ChatGPT API";

/// Reply returned when no credential is configured
pub const MISSING_KEY_REPLY: &str = "Error: OPENAI_API_KEY is not set, cannot reach the chat API";

/// Line written before a raw unexpected payload
pub const DIAGNOSTIC_OPEN: &str = "<<<<<<<<<<<<<<<<<<<<";

/// Line written after a raw unexpected payload
pub const DIAGNOSTIC_CLOSE: &str = ">>>>>>>>>>>>>>>>>>>>";

/// Turns an utterance into a chat reply
#[async_trait(?Send)]
pub trait Responder {
    /// Produce a reply for the utterance
    ///
    /// Unexpected payloads and a missing credential are reported in-band as
    /// reply text; only transport failures are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be sent or the body not read
    async fn respond(&self, utterance: &str) -> Result<String>;
}

/// Template for the user message of a templated prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    /// Create a template; `{utterance}` marks where the transcript goes
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Substitute the utterance into the template
    #[must_use]
    pub fn render(&self, utterance: &str) -> String {
        self.0.replace("{utterance}", utterance)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

/// Shape of the messages sent for each utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStyle {
    /// System instruction plus the utterance wrapped in a question
    Templated {
        system_prompt: String,
        template: PromptTemplate,
    },
    /// The utterance alone, as the only user message
    Raw,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self::Templated {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            template: PromptTemplate::default(),
        }
    }
}

impl PromptStyle {
    /// Build the message list for one utterance
    #[must_use]
    pub fn messages(&self, utterance: &str) -> Vec<ChatMessage> {
        match self {
            Self::Templated {
                system_prompt,
                template,
            } => vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(template.render(utterance)),
            ],
            Self::Raw => vec![ChatMessage::user(utterance)],
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the chat completions endpoint
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
}

/// Pull the reply text out of a response envelope
///
/// `choices` takes precedence over `completions`. A list that is present but
/// empty or missing the nested field yields `None` rather than falling
/// through to the next shape.
#[must_use]
pub fn extract_reply(envelope: &Value) -> Option<String> {
    if let Some(choices) = envelope.get("choices").filter(|c| c.is_array()) {
        return choices
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(ToString::to_string);
    }

    if let Some(completions) = envelope.get("completions").filter(|c| c.is_array()) {
        return completions
            .get(0)?
            .get("data")?
            .get("text")?
            .as_str()
            .map(ToString::to_string);
    }

    None
}

/// Chat completions client
pub struct ChatClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    endpoint: String,
    model: String,
    prompt: PromptStyle,
    diagnostics: Mutex<Box<dyn Write + Send>>,
}

impl ChatClient {
    /// Create a client; a `None` key makes every call return [`MISSING_KEY_REPLY`]
    #[must_use]
    pub fn new(config: &ChatConfig, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            diagnostics: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Send unexpected payloads somewhere other than stderr
    #[must_use]
    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Mutex::new(Box::new(sink));
        self
    }

    /// Build the request body for an utterance
    #[must_use]
    pub fn request_for<'a>(&'a self, utterance: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: self.prompt.messages(utterance),
        }
    }

    /// Normalize a raw response body into a reply
    fn reply_from_body(&self, body: &str) -> String {
        let reply = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|envelope| extract_reply(&envelope));

        reply.unwrap_or_else(|| {
            tracing::warn!(payload = %body, "unexpected chat response format");
            self.report_unexpected(body.trim_end());
            UNEXPECTED_FORMAT_REPLY.to_string()
        })
    }

    /// Write a raw payload between the marker lines
    fn report_unexpected(&self, payload: &str) {
        if let Ok(mut sink) = self.diagnostics.lock() {
            let _ = writeln!(sink, "{DIAGNOSTIC_OPEN}\n{payload}\n{DIAGNOSTIC_CLOSE}");
            let _ = sink.flush();
        }
    }
}

#[async_trait(?Send)]
impl Responder for ChatClient {
    async fn respond(&self, utterance: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("no API key configured, skipping chat request");
            return Ok(MISSING_KEY_REPLY.to_string());
        };

        tracing::debug!(utterance, model = %self.model, "sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&self.request_for(utterance))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        let body = response.text().await?;
        let reply = self.reply_from_body(&body);

        tracing::debug!(reply_len = reply.len(), "chat reply ready");
        Ok(reply)
    }
}
