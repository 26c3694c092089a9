//! Spoken replies through a fixed audio artifact
//!
//! Each reply is synthesized, written to the same path (replacing the
//! previous turn's file) and handed to the player. The file is left in place
//! after playback.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{AudioPlayback, CommandPlayer, Speaker, TextToSpeech};
use crate::Result;
use crate::config::{AudioConfig, Player};

/// Speaks replies by writing an MP3 file and playing it
pub struct AudioFileSpeaker {
    tts: TextToSpeech,
    output_path: PathBuf,
    player: Player,
}

impl AudioFileSpeaker {
    /// Create a speaker from a synthesizer and the audio configuration
    #[must_use]
    pub fn new(tts: TextToSpeech, config: &AudioConfig) -> Self {
        Self {
            tts,
            output_path: config.output_path.clone(),
            player: config.player.clone(),
        }
    }

    /// Path the reply audio is written to
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Synthesize the text and write it to the output path
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or writing fails
    pub async fn render(&self, text: &str) -> Result<&Path> {
        let audio = self.tts.synthesize(text).await?;
        tokio::fs::write(&self.output_path, &audio).await?;

        tracing::debug!(
            path = %self.output_path.display(),
            bytes = audio.len(),
            "wrote reply audio"
        );
        Ok(&self.output_path)
    }
}

#[async_trait(?Send)]
impl Speaker for AudioFileSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        tracing::debug!(text, "speaking");
        let path = self.render(text).await?;

        match &self.player {
            Player::Command { program, args } => {
                CommandPlayer::new(program.clone(), args.clone())
                    .play_file(path)
                    .await
            }
            Player::Builtin => AudioPlayback::play_file(path).await,
        }
    }
}
