use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use speaklang::voice::{
    AudioCapture, AudioFileSpeaker, MicrophoneListener, SAMPLE_RATE, TextToSpeech,
    WhisperTranscriber, rms_energy,
};
use speaklang::{ChatClient, Config, Conversation, LoopExit, Responder};

/// speaklang - talk to a chat model in French
#[derive(Parser)]
#[command(name = "speaklang", version, about)]
struct Cli {
    /// Echo recognized utterances and chat replies
    #[arg(short, long, env = "SPEAKLANG_DEBUG")]
    debug: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to ~/.config/speaklang/config.toml)
    #[arg(short, long, env = "SPEAKLANG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Synthesize and play a sentence
    TestTts {
        /// Text to speak
        #[arg(default_value = "Bonjour ! Ceci est un test de la synthèse vocale.")]
        text: String,
    },
    /// Send one utterance to the chat API and print the reply
    Ask {
        /// What you would have said
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.debug) {
        (0, false) => "warn,speaklang=info",
        (0 | 1, _) => "info,speaklang=debug",
        (2, _) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.conversation.debug = cli.debug;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::Ask { text } => ask(&config, &text).await,
        };
    }

    if config.api_keys.openai.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set, transcription and chat will fail");
    }

    let listener = MicrophoneListener::open()?;
    let transcriber = WhisperTranscriber::new(&config.voice, config.api_keys.openai());
    let responder = ChatClient::new(&config.chat, config.api_keys.openai());
    let tts = TextToSpeech::new(&config.voice, config.api_keys.openai())?;
    let speaker = AudioFileSpeaker::new(tts, &config.audio);

    let mut conversation = Conversation::new(
        listener,
        transcriber,
        responder,
        speaker,
        std::io::stdout(),
    )
    .with_config(&config.conversation);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler: never interrupt
            std::future::pending::<()>().await;
        }
    };

    match conversation.run_until(shutdown).await {
        LoopExit::Sentinel => tracing::info!("conversation ended by exit word"),
        LoopExit::Interrupted => tracing::info!("conversation interrupted"),
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("Speech above RMS 0.03 starts an utterance.");

    Ok(())
}

/// Synthesize and play a sentence through the configured speaker
#[allow(clippy::future_not_send)]
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    use speaklang::voice::Speaker;

    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::new(&config.voice, config.api_keys.openai())?;
    let mut speaker = AudioFileSpeaker::new(tts, &config.audio);
    speaker.speak(text).await?;

    println!("Wrote {}", speaker.output_path().display());
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// One round trip to the chat API
#[allow(clippy::future_not_send)]
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = ChatClient::new(&config.chat, config.api_keys.openai());
    let reply = client.respond(text).await?;
    println!("{reply}");
    Ok(())
}
