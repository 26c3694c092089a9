//! speaklang - a spoken French conversation with a chat model
//!
//! Each turn of the conversation:
//!
//! ```text
//! microphone ──► Listener ──► Transcriber ──► Responder ──► Speaker ──► speakers
//!                 (cpal)       (Whisper)      (chat API)    (TTS + player)
//! ```
//!
//! The [`Conversation`] loop owns the four stages behind traits so each can
//! be swapped out; the binary wires in the microphone, Whisper, the chat
//! completions client and a file-backed speaker.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod voice;

pub use chat::{ChatClient, PromptStyle, PromptTemplate, Responder};
pub use config::Config;
pub use conversation::{Conversation, ExitSentinel, LoopExit, LoopState};
pub use error::{Error, Result};
