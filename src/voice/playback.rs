//! Audio playback
//!
//! Two backends: an external player command (the default) and in-process
//! playback through the default output device.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Plays an audio file by running an external program
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Create a player; the file path is appended after `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the player and wait for it to exit
    ///
    /// The exit status is logged, not checked.
    ///
    /// # Errors
    ///
    /// Returns error if the program cannot be started
    pub async fn play_file(&self, path: &Path) -> Result<()> {
        tracing::debug!(program = %self.program, path = %path.display(), "starting player");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Playback(format!("failed to run {}: {e}", self.program)))?;

        tracing::debug!(program = %self.program, status = %status, "player exited");
        Ok(())
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: cpal::Device,
    config: StreamConfig,
    sample_rate: u32,
}

impl AudioPlayback {
    /// Open the default output device at the given sample rate
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
        })
    }

    /// Decode an MP3 file and play it
    ///
    /// # Errors
    ///
    /// Returns error if reading, decoding or playback fails
    pub async fn play_file(path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let (samples, sample_rate) = decode_mp3(&data)?;
        Self::play_samples(samples, sample_rate).await
    }

    /// Play mono samples on a blocking thread, opening the device there
    ///
    /// Works on both the current-thread and multi-thread runtimes.
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or playback fails
    pub async fn play_samples(samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        tokio::task::spawn_blocking(move || {
            if samples.is_empty() {
                return Ok(());
            }
            Self::new(sample_rate)?.play_blocking(&samples)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }

    /// Play mono samples, blocking until they have been rendered
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_blocking(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let shared: Arc<[f32]> = Arc::from(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let shared = Arc::clone(&shared);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = shared.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < shared.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (shared.len() as u64 * 1000) / u64::from(self.sample_rate);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = shared.len(), "playback complete");

        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not valid MP3 or contains no audio
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 data contains no audio frames".to_string()));
    }

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_mp3(b"definitely not an mp3").is_err());
        assert!(decode_mp3(&[]).is_err());
    }

    #[tokio::test]
    async fn test_play_samples_on_current_thread_runtime() {
        // Nothing to render, so no output device is opened
        assert!(AudioPlayback::play_samples(Vec::new(), 24000).await.is_ok());
    }

    #[tokio::test]
    async fn test_play_file_rejects_non_mp3() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        let result = AudioPlayback::play_file(&path).await;
        assert!(matches!(result, Err(Error::Audio(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let player = CommandPlayer::new("speaklang-no-such-player", Vec::new());
        let result = player.play_file(Path::new("response.mp3")).await;
        assert!(matches!(result, Err(Error::Playback(_))));
    }
}
