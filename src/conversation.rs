//! Conversation loop
//!
//! One turn runs `Listening → Transcribing → Responding → Speaking` and comes
//! back to `Listening`. Failed turns return early to `Listening`:
//!
//! - unintelligible speech: notice, no delay
//! - unreachable transcription service: notice with detail, retry delay
//! - chat request failure: notice with detail, retry delay
//! - speaker failure: logged and swallowed
//!
//! The loop ends when the utterance is the exit word or when the shutdown
//! future resolves.

use std::future::Future;
use std::io::Write;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::chat::Responder;
use crate::config::{ConversationConfig, DEFAULT_RETRY_DELAY};
use crate::voice::{Listener, Speaker, Transcriber, Transcription};

/// Default word that ends the conversation
pub const DEFAULT_EXIT_WORD: &str = "sortie";

/// Printed when speech could not be recognized
pub const UNINTELLIGIBLE_NOTICE: &str = "Could not understand audio";

/// Printed when the loop ends
pub const FAREWELL: &str = "Au revoir !";

/// Case-insensitive keyword that ends the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSentinel {
    word: String,
}

impl ExitSentinel {
    /// Create a sentinel for the given word
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into().to_lowercase(),
        }
    }

    /// Whether the whole utterance is the exit word, ignoring case
    #[must_use]
    pub fn matches(&self, utterance: &str) -> bool {
        utterance.to_lowercase() == self.word
    }

    /// The exit word, lowercased
    #[must_use]
    pub fn word(&self) -> &str {
        &self.word
    }
}

impl Default for ExitSentinel {
    fn default() -> Self {
        Self::new(DEFAULT_EXIT_WORD)
    }
}

/// Stage of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Listening,
    Transcribing,
    Responding,
    Speaking,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The exit word was spoken
    Sentinel,
    /// The shutdown future resolved
    Interrupted,
}

/// Drives listener, transcriber, responder and speaker in sequence
///
/// User-facing notices are written to `console`; diagnostics go through
/// `tracing`.
pub struct Conversation<L, T, R, S, W> {
    listener: L,
    transcriber: T,
    responder: R,
    speaker: S,
    console: W,
    sentinel: ExitSentinel,
    retry_delay: Duration,
    debug: bool,
    state: LoopState,
}

impl<L, T, R, S, W> Conversation<L, T, R, S, W>
where
    L: Listener,
    T: Transcriber,
    R: Responder,
    S: Speaker,
    W: Write,
{
    /// Create a conversation with the default exit word and retry delay
    pub fn new(listener: L, transcriber: T, responder: R, speaker: S, console: W) -> Self {
        Self {
            listener,
            transcriber,
            responder,
            speaker,
            console,
            sentinel: ExitSentinel::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            debug: false,
            state: LoopState::Listening,
        }
    }

    /// Apply exit word, retry delay and debug echo from configuration
    #[must_use]
    pub fn with_config(mut self, config: &ConversationConfig) -> Self {
        self.sentinel = ExitSentinel::new(&config.exit_word);
        self.retry_delay = config.retry_delay;
        self.debug = config.debug;
        self
    }

    /// Use a different exit word
    #[must_use]
    pub fn with_sentinel(mut self, sentinel: ExitSentinel) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Use a different delay after failed remote calls
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Echo utterances and replies to the console
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Current stage
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Console writer
    pub const fn console(&self) -> &W {
        &self.console
    }

    /// Run turns until the exit word is heard or `shutdown` resolves
    ///
    /// Shutdown is checked before every stage, and a stage in flight is
    /// dropped when it fires.
    pub async fn run_until<F>(&mut self, shutdown: F) -> LoopExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let banner = format!(
            "À l'écoute de l'entrée... (dire '{}' pour quitter)",
            self.sentinel.word()
        );
        self.say(&banner);

        loop {
            let exit = tokio::select! {
                biased;
                () = &mut shutdown => Some(LoopExit::Interrupted),
                flow = self.turn() => match flow {
                    ControlFlow::Break(()) => Some(LoopExit::Sentinel),
                    ControlFlow::Continue(()) => None,
                },
            };

            match exit {
                Some(LoopExit::Interrupted) => {
                    tracing::info!(state = ?self.state, "shutdown requested");
                    self.say(FAREWELL);
                    return LoopExit::Interrupted;
                }
                Some(LoopExit::Sentinel) => return LoopExit::Sentinel,
                None => {}
            }
        }
    }

    /// Run one turn; `Break` means the exit word was heard
    async fn turn(&mut self) -> ControlFlow<()> {
        self.enter(LoopState::Listening);
        let segment = match self.listener.listen().await {
            Ok(segment) => segment,
            Err(e) => {
                tracing::warn!(error = %e, "listening failed");
                tokio::time::sleep(self.retry_delay).await;
                return ControlFlow::Continue(());
            }
        };

        self.enter(LoopState::Transcribing);
        let utterance = match self.transcriber.transcribe(&segment).await {
            Transcription::Recognized(text) => text,
            Transcription::Unintelligible => {
                self.say(UNINTELLIGIBLE_NOTICE);
                return ControlFlow::Continue(());
            }
            Transcription::Unreachable(detail) => {
                tracing::warn!(error = %detail, "transcription service unreachable");
                self.say(&format!("Error fetching results; {detail}"));
                tokio::time::sleep(self.retry_delay).await;
                return ControlFlow::Continue(());
            }
        };

        tracing::debug!(utterance = %utterance, "recognized");
        if self.debug {
            self.say(&format!("User said: {utterance}"));
        }

        if self.sentinel.matches(&utterance) {
            tracing::info!("exit word heard");
            self.say(FAREWELL);
            return ControlFlow::Break(());
        }

        self.enter(LoopState::Responding);
        let reply = match self.responder.respond(&utterance).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                self.say(&format!("Error fetching chat reply; {e}"));
                tokio::time::sleep(self.retry_delay).await;
                return ControlFlow::Continue(());
            }
        };

        tracing::debug!(reply = %reply, "chat replied");
        if self.debug {
            self.say(&format!("ChatGPT responded: {reply}"));
        }

        self.enter(LoopState::Speaking);
        if let Err(e) = self.speaker.speak(&reply).await {
            tracing::warn!(error = %e, "speaking failed");
        }

        ControlFlow::Continue(())
    }

    fn enter(&mut self, state: LoopState) {
        tracing::trace!(from = ?self.state, to = ?state, "state change");
        self.state = state;
    }

    fn say(&mut self, line: &str) {
        let _ = writeln!(self.console, "{line}");
        let _ = self.console.flush();
    }
}
