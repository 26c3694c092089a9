//! Conversation loop tests
//!
//! Drive the loop with scripted collaborators, no audio hardware or network

use std::time::{Duration, Instant};

use speaklang::chat::MISSING_KEY_REPLY;
use speaklang::config::ChatConfig;
use speaklang::voice::Transcription;
use speaklang::{ChatClient, Conversation, ExitSentinel, LoopExit, LoopState};

mod common;

use common::{
    HangingSpeaker, InstantListener, RecordingResponder, RecordingSpeaker, ScriptedTranscriber,
    SilentListener,
};

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

#[tokio::test]
async fn test_one_exchange_then_exit() {
    let transcriber = ScriptedTranscriber::saying(&["Bonjour", "sortie"]);
    let responder = RecordingResponder::default();
    let speaker = RecordingSpeaker::default();

    let mut conversation = Conversation::new(
        InstantListener::default(),
        transcriber,
        responder.clone(),
        speaker.clone(),
        Vec::new(),
    );

    let exit = conversation.run_until(never()).await;

    assert_eq!(exit, LoopExit::Sentinel);
    assert_eq!(*responder.utterances.borrow(), vec!["Bonjour"]);
    assert_eq!(*speaker.spoken.borrow(), vec!["Réponse à Bonjour"]);
    // The exit word is caught right after transcription
    assert_eq!(conversation.state(), LoopState::Transcribing);
}

#[tokio::test]
async fn test_exit_word_any_case() {
    for word in ["sortie", "Sortie", "SORTIE"] {
        let responder = RecordingResponder::default();
        let mut conversation = Conversation::new(
            InstantListener::default(),
            ScriptedTranscriber::saying(&[word]),
            responder.clone(),
            RecordingSpeaker::default(),
            Vec::new(),
        );

        assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
        assert!(responder.utterances.borrow().is_empty(), "{word} reached the responder");
    }
}

#[tokio::test]
async fn test_near_misses_do_not_exit() {
    let responder = RecordingResponder::default();
    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["sortied", "sortie!", "sortie"]),
        responder.clone(),
        RecordingSpeaker::default(),
        Vec::new(),
    );

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert_eq!(*responder.utterances.borrow(), vec!["sortied", "sortie!"]);
}

#[tokio::test]
async fn test_unintelligible_is_skipped() {
    let transcriber = ScriptedTranscriber::new(vec![
        Transcription::Unintelligible,
        Transcription::Recognized("sortie".to_string()),
    ]);
    let responder = RecordingResponder::default();
    let speaker = RecordingSpeaker::default();

    let mut conversation = Conversation::new(
        InstantListener::default(),
        transcriber,
        responder.clone(),
        speaker.clone(),
        Vec::new(),
    )
    .with_retry_delay(Duration::from_secs(30));

    let started = Instant::now();
    let exit = conversation.run_until(never()).await;

    assert_eq!(exit, LoopExit::Sentinel);
    assert!(responder.utterances.borrow().is_empty());
    assert!(speaker.spoken.borrow().is_empty());
    // No retry delay on this path
    assert!(started.elapsed() < Duration::from_secs(5));

    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.contains("Could not understand audio"));
}

#[tokio::test]
async fn test_unreachable_waits_before_listening_again() {
    let delay = Duration::from_millis(80);
    let listener = InstantListener::default();
    let transcriber = ScriptedTranscriber::new(vec![
        Transcription::Unreachable("recognition connection failed".to_string()),
        Transcription::Recognized("sortie".to_string()),
    ]);
    let responder = RecordingResponder::default();

    let mut conversation = Conversation::new(
        listener.clone(),
        transcriber.clone(),
        responder.clone(),
        RecordingSpeaker::default(),
        Vec::new(),
    )
    .with_retry_delay(delay);

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert!(responder.utterances.borrow().is_empty());

    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.contains("Error fetching results; recognition connection failed"));

    let listens = listener.calls.borrow();
    let transcribes = transcriber.calls.borrow();
    assert_eq!(listens.len(), 2);
    assert!(listens[1].duration_since(transcribes[0]) >= delay);
}

#[tokio::test]
async fn test_responder_error_skips_speaking() {
    let responder = RecordingResponder::failing();
    let speaker = RecordingSpeaker::default();

    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["Bonjour", "sortie"]),
        responder.clone(),
        speaker.clone(),
        Vec::new(),
    )
    .with_retry_delay(Duration::from_millis(1));

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert_eq!(*responder.utterances.borrow(), vec!["Bonjour"]);
    assert!(speaker.spoken.borrow().is_empty());

    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.contains("Error fetching chat reply; io error: connection reset"));
}

#[tokio::test]
async fn test_speaker_failure_is_swallowed() {
    let speaker = RecordingSpeaker {
        fail: true,
        ..RecordingSpeaker::default()
    };
    let responder = RecordingResponder::default();

    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["un", "deux", "sortie"]),
        responder.clone(),
        speaker.clone(),
        Vec::new(),
    );

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert_eq!(*responder.utterances.borrow(), vec!["un", "deux"]);
    assert_eq!(speaker.spoken.borrow().len(), 2);
}

#[tokio::test]
async fn test_interrupt_ends_loop() {
    let mut conversation = Conversation::new(
        SilentListener,
        ScriptedTranscriber::saying(&[]),
        RecordingResponder::default(),
        RecordingSpeaker::default(),
        Vec::new(),
    );

    let exit = conversation
        .run_until(tokio::time::sleep(Duration::from_millis(20)))
        .await;

    assert_eq!(exit, LoopExit::Interrupted);
    assert_eq!(conversation.state(), LoopState::Listening);
    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.contains("Au revoir"));
}

#[tokio::test]
async fn test_interrupt_while_speaking() {
    let responder = RecordingResponder::default();
    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["Bonjour"]),
        responder.clone(),
        HangingSpeaker,
        Vec::new(),
    );

    assert_eq!(conversation.state(), LoopState::Listening);

    let exit = conversation
        .run_until(tokio::time::sleep(Duration::from_millis(20)))
        .await;

    assert_eq!(exit, LoopExit::Interrupted);
    assert_eq!(conversation.state(), LoopState::Speaking);
    assert_eq!(*responder.utterances.borrow(), vec!["Bonjour"]);
}

#[tokio::test]
async fn test_interrupt_before_first_turn() {
    let listener = InstantListener::default();
    let mut conversation = Conversation::new(
        listener.clone(),
        ScriptedTranscriber::saying(&["Bonjour"]),
        RecordingResponder::default(),
        RecordingSpeaker::default(),
        Vec::new(),
    );

    let exit = conversation.run_until(std::future::ready(())).await;

    assert_eq!(exit, LoopExit::Interrupted);
    assert!(listener.calls.borrow().is_empty());
}

#[tokio::test]
async fn test_debug_echoes_utterance_and_reply() {
    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["Bonjour", "sortie"]),
        RecordingResponder::default(),
        RecordingSpeaker::default(),
        Vec::new(),
    )
    .with_debug(true);

    conversation.run_until(never()).await;

    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.contains("User said: Bonjour"));
    assert!(console.contains("ChatGPT responded: Réponse à Bonjour"));
}

#[tokio::test]
async fn test_quiet_without_debug() {
    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["Bonjour", "sortie"]),
        RecordingResponder::default(),
        RecordingSpeaker::default(),
        Vec::new(),
    );

    conversation.run_until(never()).await;

    let console = String::from_utf8(conversation.console().clone()).unwrap();
    assert!(console.starts_with("À l'écoute de l'entrée... (dire 'sortie' pour quitter)"));
    assert!(!console.contains("User said"));
    assert!(!console.contains("ChatGPT responded"));
}

#[tokio::test]
async fn test_custom_exit_word() {
    let responder = RecordingResponder::default();
    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["sortie", "Exit"]),
        responder.clone(),
        RecordingSpeaker::default(),
        Vec::new(),
    )
    .with_sentinel(ExitSentinel::new("exit"));

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert_eq!(*responder.utterances.borrow(), vec!["sortie"]);
}

#[tokio::test]
async fn test_missing_key_reply_is_spoken() {
    let speaker = RecordingSpeaker::default();
    let responder = ChatClient::new(&ChatConfig::default(), None);

    let mut conversation = Conversation::new(
        InstantListener::default(),
        ScriptedTranscriber::saying(&["Bonjour", "sortie"]),
        responder,
        speaker.clone(),
        Vec::new(),
    );

    assert_eq!(conversation.run_until(never()).await, LoopExit::Sentinel);
    assert_eq!(*speaker.spoken.borrow(), vec![MISSING_KEY_REPLY]);
}
