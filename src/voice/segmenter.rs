//! Speech segmentation
//!
//! Splits the microphone stream into utterances using RMS energy: a segment
//! starts on the first loud chunk and completes once enough speech has been
//! followed by enough silence.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum amount of loud audio in a segment (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating until silence
    Speaking,
}

/// Groups captured chunks into speech segments
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: SegmenterState,
    speech_buffer: Vec<f32>,
    speech_counter: usize,
    silence_counter: usize,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmenter {
    /// Create an idle segmenter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            speech_buffer: Vec::new(),
            speech_counter: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns true once a segment is complete; collect it with
    /// [`take_segment`](Self::take_segment).
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_counter = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            SegmenterState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_counter += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.is_complete() {
                    tracing::debug!(samples = self.speech_buffer.len(), "speech segment complete");
                    return true;
                }

                // Too much silence without enough speech: a click or a cough
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment too short, resetting");
                    self.reset();
                }
            }
        }

        false
    }

    /// Whether the buffered speech forms a complete segment
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, SegmenterState::Speaking)
            && self.silence_counter > SILENCE_SAMPLES
            && self.speech_counter > MIN_SPEECH_SAMPLES
    }

    /// Take the buffered samples and return to idle
    pub fn take_segment(&mut self) -> Vec<f32> {
        let samples = std::mem::take(&mut self.speech_buffer);
        self.reset();
        samples
    }

    /// Samples accumulated so far
    #[must_use]
    pub fn buffered(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Reset to idle, dropping any buffered speech
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.speech_buffer.clear();
        self.speech_counter = 0;
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);

        assert!(rms_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn test_silence_stays_idle() {
        let mut segmenter = SpeechSegmenter::new();
        assert!(!segmenter.process(&vec![0.0; 16000]));
        assert_eq!(segmenter.state(), SegmenterState::Idle);
        assert!(segmenter.buffered().is_empty());
    }

    #[test]
    fn test_short_blip_resets() {
        let mut segmenter = SpeechSegmenter::new();
        segmenter.process(&vec![0.5; 800]);
        assert_eq!(segmenter.state(), SegmenterState::Speaking);

        // 800 samples of speech never reaches the minimum, so a long pause drops it
        assert!(!segmenter.process(&vec![0.0; 17000]));
        assert_eq!(segmenter.state(), SegmenterState::Idle);
    }
}
