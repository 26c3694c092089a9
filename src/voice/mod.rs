//! Voice processing module
//!
//! Handles microphone capture, speech segmentation, transcription, synthesis
//! and playback. The conversation loop only sees the three traits below.

mod capture;
mod playback;
mod segmenter;
mod speaker;
mod stt;
mod tts;

use async_trait::async_trait;

pub use capture::{AudioCapture, MicrophoneListener, SAMPLE_RATE};
pub use playback::{AudioPlayback, CommandPlayer, decode_mp3};
pub use segmenter::{SegmenterState, SpeechSegmenter, rms_energy};
pub use speaker::AudioFileSpeaker;
pub use stt::{
    DEFAULT_STT_ENDPOINT, DEFAULT_STT_MODEL, Transcription, WhisperTranscriber, clean_transcript,
};
pub use tts::{TextToSpeech, TtsProvider, split_text};

use crate::{Error, Result};

/// A span of mono audio bounded by silence
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    /// Wrap captured samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Encode as 16-bit PCM WAV for STT APIs
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

            for &sample in &self.samples {
                #[allow(clippy::cast_possible_truncation)]
                let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| Error::Audio(e.to_string()))?;
            }

            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Produces one speech segment per call
#[async_trait(?Send)]
pub trait Listener {
    /// Block until a complete segment has been captured
    ///
    /// # Errors
    ///
    /// Returns error if the input device fails
    async fn listen(&mut self) -> Result<AudioSegment>;
}

/// Converts a speech segment into text
#[async_trait(?Send)]
pub trait Transcriber {
    /// Transcribe a segment; failures are reported through the tag
    async fn transcribe(&self, segment: &AudioSegment) -> Transcription;
}

/// Renders text as audible speech
#[async_trait(?Send)]
pub trait Speaker {
    /// Synthesize and play the text
    ///
    /// # Errors
    ///
    /// Returns error if synthesis, writing or playback fails
    async fn speak(&mut self, text: &str) -> Result<()>;
}
