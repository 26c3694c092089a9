//! TOML configuration file loading
//!
//! Supports `~/.config/speaklang/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SpeaklangConfigFile {
    /// Chat completion settings
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech recognition and synthesis settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Audio artifact and player settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Conversation loop settings
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Chat completion configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Chat completions endpoint URL
    pub endpoint: Option<String>,

    /// Model identifier (e.g. "gpt-3.5-turbo-0125")
    pub model: Option<String>,

    /// "templated" or "raw"
    pub prompt_style: Option<String>,

    /// System instruction sent with templated prompts
    pub system_prompt: Option<String>,

    /// User message template, `{utterance}` is substituted
    pub template: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Language code for recognition and synthesis (e.g. "fr")
    pub language: Option<String>,

    /// Transcriptions endpoint URL
    pub stt_endpoint: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// "google" or "openai"
    pub tts_provider: Option<String>,

    /// TTS voice identifier (`OpenAI` only)
    pub tts_voice: Option<String>,

    /// TTS model (`OpenAI` only)
    pub tts_model: Option<String>,
}

/// Audio artifact configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Where the synthesized reply is written
    pub output_path: Option<String>,

    /// Player command, or "builtin"
    pub player: Option<String>,

    /// Extra arguments passed before the file path
    pub player_args: Option<Vec<String>>,
}

/// Conversation loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Word that ends the conversation
    pub exit_word: Option<String>,

    /// Delay after a failed remote call, in milliseconds
    pub retry_delay_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SpeaklangConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SpeaklangConfigFile {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => SpeaklangConfigFile::default(),
    }
}

/// Load a config file from an explicit path, falling back to defaults
///
/// A missing file is logged as a warning since the path was asked for.
pub fn load_config_from(path: &Path) -> SpeaklangConfigFile {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return SpeaklangConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SpeaklangConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SpeaklangConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/speaklang/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("speaklang").join("config.toml"))
}
