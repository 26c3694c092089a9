//! Configuration management for speaklang
//!
//! Values are resolved from the environment first, then the TOML config
//! file, then built-in defaults.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::chat::{
    DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, DEFAULT_SYSTEM_PROMPT, PromptStyle, PromptTemplate,
};
use crate::conversation::DEFAULT_EXIT_WORD;
use crate::voice::{DEFAULT_STT_ENDPOINT, DEFAULT_STT_MODEL, TtsProvider};
use crate::{Error, Result};

use self::file::SpeaklangConfigFile;

/// Default language for recognition and synthesis
pub const DEFAULT_LANGUAGE: &str = "fr";

/// Default path of the synthesized reply
pub const DEFAULT_OUTPUT_PATH: &str = "response.mp3";

/// Default delay after a failed remote call
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// speaklang configuration
#[derive(Debug)]
pub struct Config {
    /// Chat completion configuration
    pub chat: ChatConfig,

    /// Voice processing configuration
    pub voice: VoiceConfig,

    /// Audio artifact and player configuration
    pub audio: AudioConfig,

    /// Conversation loop configuration
    pub conversation: ConversationConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat completions endpoint URL
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Message shape sent for each utterance
    pub prompt: PromptStyle,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            prompt: PromptStyle::default(),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Language code (e.g. "fr")
    pub language: String,

    /// Transcriptions endpoint URL
    pub stt_endpoint: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS voice identifier (`OpenAI` only)
    pub tts_voice: String,

    /// TTS model (`OpenAI` only)
    pub tts_model: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            stt_endpoint: DEFAULT_STT_ENDPOINT.to_string(),
            stt_model: DEFAULT_STT_MODEL.to_string(),
            tts_provider: TtsProvider::Google,
            tts_voice: "alloy".to_string(),
            tts_model: "tts-1".to_string(),
        }
    }
}

/// How the synthesized reply is played
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Player {
    /// Shell out to a command with the artifact path as last argument
    Command { program: String, args: Vec<String> },
    /// Decode and play in-process through the default output device
    Builtin,
}

impl Default for Player {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Command {
                program: "afplay".to_string(),
                args: Vec::new(),
            }
        } else {
            Self::Command {
                program: "mpg123".to_string(),
                args: vec!["-q".to_string()],
            }
        }
    }
}

/// Audio artifact configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Fixed path the reply is written to, overwritten every turn
    pub output_path: PathBuf,

    /// Playback backend
    pub player: Player,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            player: Player::default(),
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Word that ends the conversation
    pub exit_word: String,

    /// Delay after a failed remote call
    pub retry_delay: Duration,

    /// Echo utterances and replies to the console
    pub debug: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            exit_word: DEFAULT_EXIT_WORD.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            debug: false,
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and optional TTS)
    pub openai: Option<SecretString>,
}

impl ApiKeys {
    /// Owned copy of the `OpenAI` key for handing to a client
    #[must_use]
    pub fn openai(&self) -> Option<SecretString> {
        self.openai
            .as_ref()
            .map(|k| SecretString::from(k.expose_secret().to_owned()))
    }
}

impl Config {
    /// Load configuration from the environment and a config file
    ///
    /// Uses `path` when given, otherwise `~/.config/speaklang/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns error if a value has an unknown variant
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.map_or_else(file::load_config_file, file::load_config_from);
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// Empty environment values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns error if a value has an unknown variant
    pub fn resolve(file: SpeaklangConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Chat
        let chat_defaults = ChatConfig::default();
        let prompt_style = lookup("SPEAKLANG_PROMPT_STYLE")
            .or(file.chat.prompt_style)
            .unwrap_or_else(|| "templated".to_string());
        let prompt = match prompt_style.to_lowercase().as_str() {
            "templated" => PromptStyle::Templated {
                system_prompt: file
                    .chat
                    .system_prompt
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
                template: file
                    .chat
                    .template
                    .map(PromptTemplate::new)
                    .unwrap_or_default(),
            },
            "raw" => PromptStyle::Raw,
            other => {
                return Err(Error::Config(format!(
                    "unknown prompt style '{other}', expected 'templated' or 'raw'"
                )));
            }
        };
        let chat = ChatConfig {
            endpoint: lookup("SPEAKLANG_CHAT_ENDPOINT")
                .or(file.chat.endpoint)
                .unwrap_or(chat_defaults.endpoint),
            model: lookup("SPEAKLANG_CHAT_MODEL")
                .or(file.chat.model)
                .unwrap_or(chat_defaults.model),
            prompt,
        };

        // Voice
        let voice_defaults = VoiceConfig::default();
        let tts_provider = match lookup("SPEAKLANG_TTS_PROVIDER").or(file.voice.tts_provider) {
            Some(name) => name.parse()?,
            None => voice_defaults.tts_provider,
        };
        let voice = VoiceConfig {
            language: lookup("SPEAKLANG_LANGUAGE")
                .or(file.voice.language)
                .unwrap_or(voice_defaults.language),
            stt_endpoint: lookup("SPEAKLANG_STT_ENDPOINT")
                .or(file.voice.stt_endpoint)
                .unwrap_or(voice_defaults.stt_endpoint),
            stt_model: lookup("SPEAKLANG_STT_MODEL")
                .or(file.voice.stt_model)
                .unwrap_or(voice_defaults.stt_model),
            tts_provider,
            tts_voice: file.voice.tts_voice.unwrap_or(voice_defaults.tts_voice),
            tts_model: file.voice.tts_model.unwrap_or(voice_defaults.tts_model),
        };

        // Audio
        let player = match lookup("SPEAKLANG_PLAYER").or(file.audio.player) {
            Some(name) if name.eq_ignore_ascii_case("builtin") => Player::Builtin,
            Some(program) => Player::Command {
                program,
                args: file.audio.player_args.unwrap_or_default(),
            },
            None => Player::default(),
        };
        let audio = AudioConfig {
            output_path: lookup("SPEAKLANG_AUDIO_PATH")
                .or(file.audio.output_path)
                .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH), PathBuf::from),
            player,
        };

        // Conversation
        let conversation = ConversationConfig {
            exit_word: lookup("SPEAKLANG_EXIT_WORD")
                .or(file.conversation.exit_word)
                .unwrap_or_else(|| DEFAULT_EXIT_WORD.to_string()),
            retry_delay: file
                .conversation
                .retry_delay_ms
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
            debug: false,
        };

        // Credential (the chat client never reads the environment itself)
        let api_keys = ApiKeys {
            openai: lookup("OPENAI_API_KEY")
                .or(file.api_keys.openai)
                .map(SecretString::from),
        };

        Ok(Self {
            chat,
            voice,
            audio,
            conversation,
            api_keys,
        })
    }
}
