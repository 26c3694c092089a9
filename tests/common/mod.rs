//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use speaklang::voice::{AudioSegment, Listener, Speaker, Transcriber, Transcription};
use speaklang::{Error, Responder, Result};

/// Cloneable in-memory writer
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Listener that returns an empty segment immediately and records when
#[derive(Clone, Default)]
pub struct InstantListener {
    pub calls: Rc<RefCell<Vec<Instant>>>,
}

#[async_trait(?Send)]
impl Listener for InstantListener {
    async fn listen(&mut self) -> Result<AudioSegment> {
        self.calls.borrow_mut().push(Instant::now());
        Ok(AudioSegment::new(Vec::new(), 16000))
    }
}

/// Listener that never hears anything
pub struct SilentListener;

#[async_trait(?Send)]
impl Listener for SilentListener {
    async fn listen(&mut self) -> Result<AudioSegment> {
        std::future::pending().await
    }
}

/// Transcriber that plays back a fixed script
///
/// Once the script runs out it hears "sortie" so a broken test still ends.
#[derive(Clone)]
pub struct ScriptedTranscriber {
    script: Rc<RefCell<VecDeque<Transcription>>>,
    pub calls: Rc<RefCell<Vec<Instant>>>,
}

impl ScriptedTranscriber {
    pub fn new(script: Vec<Transcription>) -> Self {
        Self {
            script: Rc::new(RefCell::new(script.into())),
            calls: Rc::default(),
        }
    }

    /// Script of recognized utterances
    pub fn saying(utterances: &[&str]) -> Self {
        Self::new(
            utterances
                .iter()
                .map(|u| Transcription::Recognized((*u).to_string()))
                .collect(),
        )
    }
}

#[async_trait(?Send)]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _segment: &AudioSegment) -> Transcription {
        self.calls.borrow_mut().push(Instant::now());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Transcription::Recognized("sortie".to_string()))
    }
}

/// Responder that echoes a canned reply and records the utterances it saw
#[derive(Clone, Default)]
pub struct RecordingResponder {
    pub utterances: Rc<RefCell<Vec<String>>>,
    pub fail: bool,
}

impl RecordingResponder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait(?Send)]
impl Responder for RecordingResponder {
    async fn respond(&self, utterance: &str) -> Result<String> {
        self.utterances.borrow_mut().push(utterance.to_string());
        if self.fail {
            return Err(Error::Io(std::io::Error::other("connection reset")));
        }
        Ok(format!("Réponse à {utterance}"))
    }
}

/// Speaker that records what it was asked to say
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    pub spoken: Rc<RefCell<Vec<String>>>,
    pub fail: bool,
}

#[async_trait(?Send)]
impl Speaker for RecordingSpeaker {
    async fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.borrow_mut().push(text.to_string());
        if self.fail {
            return Err(Error::Playback("no player".to_string()));
        }
        Ok(())
    }
}

/// Speaker that never finishes
pub struct HangingSpeaker;

#[async_trait(?Send)]
impl Speaker for HangingSpeaker {
    async fn speak(&mut self, _text: &str) -> Result<()> {
        std::future::pending().await
    }
}
