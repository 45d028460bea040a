mod api;
mod audio;
mod config;
mod dispatch;
mod intent;
mod recognize;
mod session;
mod speech;
mod state;
mod transcribe;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::warn;

use api::{ApiClient, ProductivityApi};
use config::Config;
use dispatch::CommandDispatcher;
use intent::VoiceIntent;
use session::{probe_capture, SessionCommand, SessionEvent, VoiceSession};
use speech::{SpeechEngine, SynthCommand};
use state::{RuntimeState, SharedState};
use transcribe::ServerTranscriber;

#[derive(Parser)]
#[command(name = "voxtask")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Probe capture capabilities and exit
    Probe,
    /// Dispatch a single typed utterance and exit
    Text { utterance: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("voxtask=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config);

    match cli.command {
        Some(Command::Probe) => run_probe(&config).await,
        Some(Command::Text { utterance }) => run_text(&config, utterance).await,
        None => run_interactive(config).await,
    }
}

async fn run_probe(config: &Config) -> anyhow::Result<()> {
    let setup = probe_capture(&config.recognizer).await;
    println!("capture mode: {}", setup.mode);
    for notice in &setup.notices {
        println!("note: {}", notice);
    }
    Ok(())
}

async fn run_text(config: &Config, utterance: String) -> anyhow::Result<()> {
    let api: Arc<dyn ProductivityApi> = Arc::new(ApiClient::new(&config.server));
    let speech: Arc<dyn SpeechEngine> = Arc::new(SynthCommand::new(&config.speech));
    let dispatcher = CommandDispatcher::new(api, speech);
    dispatcher.dispatch(VoiceIntent::parse(&utterance)).await;
    Ok(())
}

enum DriverInput {
    Toggle,
    Line(String),
    Quit,
}

async fn run_interactive(config: Config) -> anyhow::Result<()> {
    let state = RuntimeState::new();
    let api: Arc<dyn ProductivityApi> = Arc::new(ApiClient::new(&config.server));
    let speech: Arc<dyn SpeechEngine> = Arc::new(SynthCommand::new(&config.speech));
    let dispatcher =
        CommandDispatcher::new(api, speech).with_refresh_hook(|| ui::tasks_refreshed());
    let transcriber = Arc::new(ServerTranscriber::new(&config.server));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = flume::unbounded::<SessionCommand>();

    // capability probe runs on the session task; toggles sent before it
    // completes queue in the command channel
    let recognizer_cfg = config.recognizer.clone();
    let session_state = Arc::clone(&state);
    let session_task = tokio::spawn(async move {
        let setup = probe_capture(&recognizer_cfg).await;
        let session = VoiceSession::new(setup, transcriber, dispatcher, session_state, event_tx);
        session.run(cmd_rx).await;
    });

    ui::banner(&config.server.base_url);
    crossterm::terminal::enable_raw_mode().context("failed to enter raw mode")?;

    let (input_tx, input_rx) = flume::unbounded::<DriverInput>();
    let input_state = Arc::clone(&state);
    std::thread::spawn(move || input_loop(input_tx, input_state));

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(event) => render(event),
                None => break,
            },
            input = input_rx.recv_async() => match input {
                Ok(DriverInput::Toggle) => {
                    let _ = cmd_tx.send(SessionCommand::Toggle);
                }
                Ok(DriverInput::Line(text)) => {
                    let _ = cmd_tx.send(SessionCommand::Text(text));
                }
                Ok(DriverInput::Quit) | Err(_) => {
                    let _ = cmd_tx.send(SessionCommand::Shutdown);
                    break;
                }
            },
        }
    }

    if let Err(e) = session_task.await {
        warn!("session task failed: {}", e);
    }
    crossterm::terminal::disable_raw_mode().ok();
    println!();
    Ok(())
}

fn render(event: SessionEvent) {
    match event {
        SessionEvent::ModeSelected(mode) => ui::mode_line(mode),
        SessionEvent::Notice(msg) => ui::notice(&msg),
        SessionEvent::Listening(true) => ui::listening_on(),
        SessionEvent::Listening(false) => ui::listening_off(),
        SessionEvent::Interim(text) => ui::show_interim(&text),
        SessionEvent::FinalTranscript(text) => ui::show_final(&text),
        SessionEvent::ErrorShown(msg) => ui::show_error(&msg),
        SessionEvent::ErrorCleared => ui::clear_error(),
        SessionEvent::FallbackEnabled => ui::fallback_prompt(),
    }
}

/// Blocking key loop on its own thread. Space toggles listening; once the
/// text fallback is active, keystrokes build the typed utterance instead.
fn input_loop(tx: flume::Sender<DriverInput>, state: SharedState) {
    use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};

    let mut line = String::new();
    loop {
        let event = match read() {
            Ok(event) => event,
            Err(_) => {
                let _ = tx.send(DriverInput::Quit);
                return;
            }
        };
        let Event::Key(key) = event else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let _ = tx.send(DriverInput::Quit);
                return;
            }
            KeyCode::Esc => {
                let _ = tx.send(DriverInput::Quit);
                return;
            }
            KeyCode::Enter if state.fallback_active() => {
                let text = std::mem::take(&mut line);
                print!("\r\n");
                if !text.trim().is_empty() {
                    let _ = tx.send(DriverInput::Line(text.trim().to_string()));
                }
            }
            KeyCode::Backspace if state.fallback_active() => {
                if line.pop().is_some() {
                    ui::erase_char();
                }
            }
            KeyCode::Char(c) if state.fallback_active() => {
                line.push(c);
                ui::echo_char(c);
            }
            KeyCode::Char(' ') => {
                let _ = tx.send(DriverInput::Toggle);
            }
            KeyCode::Char('q') => {
                let _ = tx.send(DriverInput::Quit);
                return;
            }
            _ => {}
        }
    }
}
