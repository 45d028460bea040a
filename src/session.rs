//! Voice command session - one per process
//!
//! Owns backend selection, the listen/record/transcribe/dispatch/respond
//! lifecycle, and the failure-recovery paths between the two capture
//! backends. Commands arrive on a channel; anything sent while the probe
//! is still running simply queues, and toggles that land mid-exchange are
//! rejected without touching the active capture.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioClip, AudioInput, MicError, Microphone, CLIP_RATE};
use crate::config::RecognizerConfig;
use crate::dispatch::CommandDispatcher;
use crate::intent::VoiceIntent;
use crate::recognize::{CommandRecognizer, Recognizer, TranscriptEvent};
use crate::state::{CaptureMode, SessionState, SharedState};
use crate::transcribe::{Transcribe, TranscribeError};

const TRANSCRIBE_RETRY_MSG: &str = "Speech recognition failed. Please try again.";
const TRANSCRIBE_GIVE_UP_MSG: &str =
    "Speech recognition failed. Please try again or use text input.";
const UNSUPPORTED_MSG: &str = "Speech capture is not supported on this system.";

/// Driver -> session
pub enum SessionCommand {
    /// Start or stop listening
    Toggle,
    /// A typed utterance (the text-entry affordance)
    Text(String),
    Shutdown,
}

/// Session -> driver, rendered onto the terminal surfaces
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ModeSelected(CaptureMode),
    /// Probe degradation notice
    Notice(String),
    /// Listening indicator on/off
    Listening(bool),
    Interim(String),
    FinalTranscript(String),
    ErrorShown(String),
    ErrorCleared,
    /// The text-entry affordance became active
    FallbackEnabled,
}

// ============================================================================
// Capability probe
// ============================================================================

/// Probe result: the selected mode, whichever backends are usable, and the
/// notices explaining any degradation.
pub struct CaptureSetup {
    pub mode: CaptureMode,
    pub mic: Option<Box<dyn AudioInput>>,
    pub recognizer: Option<Box<dyn Recognizer>>,
    pub notices: Vec<String>,
}

fn mic_failure_notice(e: &MicError) -> String {
    match e {
        MicError::AccessDenied => {
            "Microphone access denied. Please grant microphone access.".into()
        }
        MicError::NotFound => "No microphone found.".into(),
        other => format!("Microphone unavailable: {}", other),
    }
}

/// Determine, once, which capture backend is usable. Microphone first (the
/// stream is kept for the life of the process), then the native
/// recognizer, then the text-entry fallback.
pub async fn probe_capture(recognizer_cfg: &RecognizerConfig) -> CaptureSetup {
    let recognizer: Option<Box<dyn Recognizer>> = if recognizer_cfg.is_configured() {
        Some(Box::new(CommandRecognizer::new(recognizer_cfg)))
    } else {
        None
    };

    let mic_result = tokio::task::spawn_blocking(Microphone::open)
        .await
        .unwrap_or_else(|e| Err(MicError::Device(e.to_string())));

    match mic_result {
        Ok(mic) => {
            info!(mode = %CaptureMode::ServerTranscription, "capture backend selected");
            CaptureSetup {
                mode: CaptureMode::ServerTranscription,
                mic: Some(Box::new(mic)),
                recognizer,
                notices: Vec::new(),
            }
        }
        Err(e) => {
            warn!("microphone probe failed: {}", e);
            let mut notices = vec![mic_failure_notice(&e)];
            if recognizer.is_some() {
                info!(mode = %CaptureMode::NativeRecognition, "capture backend selected");
                CaptureSetup {
                    mode: CaptureMode::NativeRecognition,
                    mic: None,
                    recognizer,
                    notices,
                }
            } else {
                info!(mode = %CaptureMode::TextFallback, "capture backend selected");
                notices.push("Voice capture is unavailable. Falling back to text input.".into());
                CaptureSetup {
                    mode: CaptureMode::TextFallback,
                    mic: None,
                    recognizer: None,
                    notices,
                }
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct VoiceSession {
    mode: CaptureMode,
    mic: Option<Box<dyn AudioInput>>,
    recognizer: Option<Box<dyn Recognizer>>,
    transcriber: Arc<dyn Transcribe>,
    dispatcher: CommandDispatcher,
    state: SharedState,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: bool,
}

impl VoiceSession {
    pub fn new(
        setup: CaptureSetup,
        transcriber: Arc<dyn Transcribe>,
        dispatcher: CommandDispatcher,
        state: SharedState,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let _ = events.send(SessionEvent::ModeSelected(setup.mode));
        for notice in &setup.notices {
            let _ = events.send(SessionEvent::Notice(notice.clone()));
        }
        let session = Self {
            mode: setup.mode,
            mic: setup.mic,
            recognizer: setup.recognizer,
            transcriber,
            dispatcher,
            state,
            events,
            shutdown: false,
        };
        if session.mode == CaptureMode::TextFallback {
            session.state.enable_fallback();
            let _ = session.events.send(SessionEvent::FallbackEnabled);
        }
        session
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Process commands until shutdown. Runs as the single session task.
    pub async fn run(mut self, commands: flume::Receiver<SessionCommand>) {
        loop {
            if self.shutdown {
                break;
            }
            match commands.recv_async().await {
                Ok(SessionCommand::Toggle) => self.handle_toggle(&commands).await,
                Ok(SessionCommand::Text(text)) => self.handle_text(&commands, text).await,
                Ok(SessionCommand::Shutdown) | Err(_) => break,
            }
        }
        info!("voice session stopped");
    }

    async fn handle_toggle(&mut self, commands: &flume::Receiver<SessionCommand>) {
        if self.mode == CaptureMode::TextFallback {
            self.dispatcher.speak_notice(UNSUPPORTED_MSG);
            return;
        }
        // exclusive capture lock; a toggle mid-exchange changes nothing
        if !self.state.try_begin_listening() {
            return;
        }
        self.emit(SessionEvent::ErrorCleared);
        self.emit(SessionEvent::Listening(true));

        match self.mode {
            CaptureMode::ServerTranscription => self.listen_recorded(commands).await,
            CaptureMode::NativeRecognition => self.listen_recognized(commands).await,
            CaptureMode::TextFallback => {}
        }

        self.state.set_state(SessionState::Idle);
    }

    async fn handle_text(&mut self, commands: &flume::Receiver<SessionCommand>, text: String) {
        if !self.state.try_begin_listening() {
            debug!("text input rejected, session busy");
            return;
        }
        self.complete_exchange(commands, text).await;
        self.state.set_state(SessionState::Idle);
    }

    // ------------------------------------------------------------------
    // ServerTranscription path
    // ------------------------------------------------------------------

    async fn listen_recorded(&mut self, commands: &flume::Receiver<SessionCommand>) {
        if let Err(e) = match self.mic.as_mut() {
            Some(mic) => mic.begin(),
            None => Err(MicError::NotFound),
        } {
            self.emit(SessionEvent::Listening(false));
            self.capture_failure(e);
            return;
        }

        // recording until the next toggle
        loop {
            match commands.recv_async().await {
                Ok(SessionCommand::Toggle) => break,
                Ok(SessionCommand::Text(_)) => debug!("text input ignored while recording"),
                Ok(SessionCommand::Shutdown) | Err(_) => {
                    if let Some(mic) = self.mic.as_mut() {
                        mic.cancel();
                    }
                    self.emit(SessionEvent::Listening(false));
                    self.shutdown = true;
                    return;
                }
            }
        }

        self.emit(SessionEvent::Listening(false));
        self.state.set_state(SessionState::Processing);

        let samples = match self.mic.as_mut() {
            Some(mic) => mic.end(),
            None => Err(MicError::NotFound),
        };
        let clip = match samples.and_then(|s| AudioClip::from_samples(&s, CLIP_RATE)) {
            Ok(clip) => clip,
            Err(e) => {
                self.capture_failure(e);
                return;
            }
        };

        let pending = self.transcriber.transcribe(clip);
        let result = reject_while_busy(commands, &mut self.shutdown, pending)
            .await
            .unwrap_or(Err(TranscribeError::Dropped));

        match result {
            Ok(text) if !text.trim().is_empty() => {
                self.complete_exchange(commands, text).await;
            }
            Ok(_) => self.transcription_failure(commands, TranscribeError::Empty).await,
            Err(e) => self.transcription_failure(commands, e).await,
        }
    }

    /// One fallback attempt on the alternate backend, then give up
    /// gracefully. The session lands in Idle either way.
    async fn transcription_failure(
        &mut self,
        commands: &flume::Receiver<SessionCommand>,
        e: TranscribeError,
    ) {
        warn!("transcription failed: {}", e);
        self.emit(SessionEvent::ErrorShown(TRANSCRIBE_RETRY_MSG.into()));

        if self.recognizer.is_some() {
            info!("retrying this exchange on the native recognizer");
            self.listen_recognized(commands).await;
        } else {
            self.enable_text_fallback();
            self.dispatcher.speak_notice(TRANSCRIBE_GIVE_UP_MSG);
        }
    }

    /// Recorder failure: the one-time runtime downgrade
    /// ServerTranscription -> NativeRecognition -> TextFallback.
    fn capture_failure(&mut self, e: MicError) {
        warn!("capture failed: {}", e);
        self.state.set_state(SessionState::Error);
        self.emit(SessionEvent::ErrorShown(mic_failure_notice(&e)));

        self.mic = None;
        if self.recognizer.is_some() {
            self.mode = CaptureMode::NativeRecognition;
            self.emit(SessionEvent::ModeSelected(self.mode));
        } else {
            self.enable_text_fallback();
        }
        self.state.set_state(SessionState::Idle);
    }

    fn enable_text_fallback(&mut self) {
        self.mode = CaptureMode::TextFallback;
        self.state.enable_fallback();
        self.emit(SessionEvent::ModeSelected(self.mode));
        self.emit(SessionEvent::FallbackEnabled);
    }

    // ------------------------------------------------------------------
    // NativeRecognition path
    // ------------------------------------------------------------------

    async fn listen_recognized(&mut self, commands: &flume::Receiver<SessionCommand>) {
        self.state.set_state(SessionState::Listening);

        let events = match self.recognizer.as_mut() {
            Some(recognizer) => recognizer.start(),
            None => Err(crate::recognize::RecognizerError::Other(
                "recognizer unavailable".into(),
            )),
        };
        let events = match events {
            Ok(rx) => rx,
            Err(e) => {
                warn!("recognizer start failed: {}", e);
                self.emit(SessionEvent::Listening(false));
                self.enable_text_fallback();
                self.dispatcher.speak_notice(TRANSCRIBE_GIVE_UP_MSG);
                return;
            }
        };

        let mut commands_closed = false;
        loop {
            tokio::select! {
                cmd = commands.recv_async(), if !commands_closed => match cmd {
                    Ok(SessionCommand::Toggle) => {
                        // user stop; the recognizer winds down and still
                        // terminates the stream with End
                        if let Some(recognizer) = self.recognizer.as_mut() {
                            recognizer.stop();
                        }
                    }
                    Ok(SessionCommand::Text(_)) => debug!("text input ignored while listening"),
                    Ok(SessionCommand::Shutdown) => {
                        self.shutdown = true;
                        if let Some(recognizer) = self.recognizer.as_mut() {
                            recognizer.stop();
                        }
                    }
                    Err(_) => {
                        commands_closed = true;
                        self.shutdown = true;
                        if let Some(recognizer) = self.recognizer.as_mut() {
                            recognizer.stop();
                        }
                    }
                },
                event = events.recv_async() => match event {
                    Ok(TranscriptEvent::Interim(text)) => {
                        // interim transcripts update the display, never dispatch
                        self.emit(SessionEvent::Interim(text));
                    }
                    Ok(TranscriptEvent::Final(text)) => {
                        self.complete_exchange(commands, text).await;
                        break;
                    }
                    Ok(TranscriptEvent::Error(e)) => {
                        warn!("recognition error: {}", e);
                        self.state.set_state(SessionState::Error);
                        self.emit(SessionEvent::ErrorShown(format!(
                            "Speech recognition error: {}",
                            e
                        )));
                        break;
                    }
                    Ok(TranscriptEvent::End) | Err(_) => break,
                }
            }
        }

        // the listening indicator clears when the exchange ends, error or not
        self.emit(SessionEvent::Listening(false));
        self.state.set_state(SessionState::Idle);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn complete_exchange(&mut self, commands: &flume::Receiver<SessionCommand>, text: String) {
        self.state.set_state(SessionState::Processing);
        self.emit(SessionEvent::FinalTranscript(text.clone()));

        let intent = VoiceIntent::parse(&text);
        debug!(?intent, "dispatching");
        reject_while_busy(commands, &mut self.shutdown, self.dispatcher.dispatch(intent)).await;

        // synthesis is fire-and-forget: pass through Speaking and land in
        // Idle so a missing completion event can never wedge the session
        self.state.set_state(SessionState::Speaking);
    }
}

/// Await `fut` while draining the command channel: toggles and text that
/// arrive mid-exchange are rejected, never queued into a second capture.
async fn reject_while_busy<T>(
    commands: &flume::Receiver<SessionCommand>,
    shutdown: &mut bool,
    fut: impl Future<Output = T>,
) -> T {
    tokio::pin!(fut);
    let mut commands_closed = false;
    loop {
        tokio::select! {
            out = &mut fut => return out,
            cmd = commands.recv_async(), if !commands_closed => match cmd {
                Ok(SessionCommand::Shutdown) => *shutdown = true,
                Ok(_) => debug!("command rejected, session busy"),
                Err(_) => commands_closed = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;
    use crate::api::ProductivityApi;
    use crate::recognize::testing::ScriptedRecognizer;
    use crate::speech::testing::RecordingSpeech;
    use crate::speech::SpeechEngine;
    use crate::state::RuntimeState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    struct FakeMic {
        begins: Arc<AtomicUsize>,
        fail_begin: bool,
        samples: Vec<f32>,
    }

    impl FakeMic {
        fn new(begins: Arc<AtomicUsize>) -> Self {
            Self {
                begins,
                fail_begin: false,
                samples: vec![0.0; 1600],
            }
        }

        fn broken(begins: Arc<AtomicUsize>) -> Self {
            Self {
                fail_begin: true,
                ..Self::new(begins)
            }
        }
    }

    impl AudioInput for FakeMic {
        fn begin(&mut self) -> Result<(), MicError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            if self.fail_begin {
                Err(MicError::NotFound)
            } else {
                Ok(())
            }
        }

        fn end(&mut self) -> Result<Vec<f32>, MicError> {
            Ok(self.samples.clone())
        }

        fn cancel(&mut self) {}
    }

    /// Resolves every request immediately with the fixed transcript
    struct FixedTranscriber(String);

    impl Transcribe for FixedTranscriber {
        fn transcribe(
            &self,
            _clip: AudioClip,
        ) -> oneshot::Receiver<Result<String, TranscribeError>> {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Ok(self.0.clone()));
            rx
        }
    }

    /// Fails every request with an HTTP 500
    struct FailingTranscriber;

    impl Transcribe for FailingTranscriber {
        fn transcribe(
            &self,
            _clip: AudioClip,
        ) -> oneshot::Receiver<Result<String, TranscribeError>> {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(TranscribeError::Status(500)));
            rx
        }
    }

    /// Hands each request's responder to the test so it controls when the
    /// transcription resolves
    struct ManualTranscriber {
        requests: flume::Sender<oneshot::Sender<Result<String, TranscribeError>>>,
    }

    impl Transcribe for ManualTranscriber {
        fn transcribe(
            &self,
            _clip: AudioClip,
        ) -> oneshot::Receiver<Result<String, TranscribeError>> {
            let (tx, rx) = oneshot::channel();
            let _ = self.requests.send(tx);
            rx
        }
    }

    // ------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------

    struct Harness {
        commands: flume::Sender<SessionCommand>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        state: SharedState,
        api: Arc<FakeApi>,
        speech: Arc<RecordingSpeech>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn spawn(setup: CaptureSetup, transcriber: Arc<dyn Transcribe>, api: FakeApi) -> Self {
            let state = RuntimeState::new();
            let api = Arc::new(api);
            let speech = Arc::new(RecordingSpeech::new());
            let dispatcher = CommandDispatcher::new(
                Arc::clone(&api) as Arc<dyn ProductivityApi>,
                Arc::clone(&speech) as Arc<dyn SpeechEngine>,
            );
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (cmd_tx, cmd_rx) = flume::unbounded();
            let session = VoiceSession::new(
                setup,
                transcriber,
                dispatcher,
                Arc::clone(&state),
                event_tx,
            );
            let task = tokio::spawn(session.run(cmd_rx));
            Self {
                commands: cmd_tx,
                events: event_rx,
                state,
                api,
                speech,
                task,
            }
        }

        fn send(&self, cmd: SessionCommand) {
            self.commands.send(cmd).unwrap();
        }

        async fn finish(mut self) -> (Vec<SessionEvent>, Arc<FakeApi>, Arc<RecordingSpeech>, SharedState) {
            self.task.await.unwrap();
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            (events, self.api, self.speech, self.state)
        }
    }

    fn recorded_setup(mic: FakeMic, recognizer: Option<Box<dyn Recognizer>>) -> CaptureSetup {
        CaptureSetup {
            mode: CaptureMode::ServerTranscription,
            mic: Some(Box::new(mic)),
            recognizer,
            notices: Vec::new(),
        }
    }

    fn recognized_setup(recognizer: ScriptedRecognizer) -> CaptureSetup {
        CaptureSetup {
            mode: CaptureMode::NativeRecognition,
            mic: None,
            recognizer: Some(Box::new(recognizer)),
            notices: Vec::new(),
        }
    }

    fn text_setup() -> CaptureSetup {
        CaptureSetup {
            mode: CaptureMode::TextFallback,
            mic: None,
            recognizer: None,
            notices: Vec::new(),
        }
    }

    fn final_transcripts(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::FinalTranscript(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_recorded_exchange_dispatches_task() {
        let begins = Arc::new(AtomicUsize::new(0));
        let harness = Harness::spawn(
            recorded_setup(FakeMic::new(Arc::clone(&begins)), None),
            Arc::new(FixedTranscriber("add task buy milk".into())),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (events, api, _, state) = harness.finish().await;

        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].title, "buy milk");
        assert_eq!(begins.load(Ordering::SeqCst), 1);
        assert_eq!(state.state(), SessionState::Idle);
        assert_eq!(final_transcripts(&events), vec!["add task buy milk"]);
    }

    #[tokio::test]
    async fn test_toggle_rejected_while_processing() {
        let begins = Arc::new(AtomicUsize::new(0));
        let (req_tx, req_rx) = flume::unbounded();
        let harness = Harness::spawn(
            recorded_setup(FakeMic::new(Arc::clone(&begins)), None),
            Arc::new(ManualTranscriber { requests: req_tx }),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Toggle);

        // session is now in Processing, holding the pending transcription
        let responder = req_rx.recv_async().await.unwrap();
        assert_eq!(harness.state.state(), SessionState::Processing);

        // this toggle must be rejected, not start a second capture
        harness.send(SessionCommand::Toggle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        responder.send(Ok("add task buy milk".into())).unwrap();
        harness.send(SessionCommand::Shutdown);
        let (_, api, _, state) = harness.finish().await;

        assert_eq!(begins.load(Ordering::SeqCst), 1);
        assert_eq!(api.created.lock().unwrap().len(), 1);
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_interim_results_never_dispatch() {
        let recognizer = ScriptedRecognizer::with_script(vec![
            TranscriptEvent::Interim("show".into()),
            TranscriptEvent::Interim("show ta".into()),
            TranscriptEvent::Final("show tasks".into()),
            TranscriptEvent::End,
        ]);
        let harness = Harness::spawn(
            recognized_setup(recognizer),
            Arc::new(FailingTranscriber),
            FakeApi::with_tasks(vec![
                crate::api::Task {
                    id: 1,
                    title: "A".into(),
                    completed: false,
                },
                crate::api::Task {
                    id: 2,
                    title: "B".into(),
                    completed: true,
                },
            ]),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (events, api, speech, _) = harness.finish().await;

        // two interim previews, exactly one dispatch, from the final text
        let interims = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Interim(_)))
            .count();
        assert_eq!(interims, 2);
        assert_eq!(final_transcripts(&events), vec!["show tasks"]);
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(speech.lines(), vec!["Here are your tasks: A"]);
    }

    #[tokio::test]
    async fn test_stop_without_final_dispatches_nothing() {
        let harness = Harness::spawn(
            recognized_setup(ScriptedRecognizer::manual()),
            Arc::new(FailingTranscriber),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (events, api, speech, state) = harness.finish().await;

        assert!(final_transcripts(&events).is_empty());
        assert!(api.created.lock().unwrap().is_empty());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 0);
        assert!(speech.lines().is_empty());
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_transcription_failure_falls_back_to_recognizer() {
        let begins = Arc::new(AtomicUsize::new(0));
        let recognizer = ScriptedRecognizer::with_script(vec![
            TranscriptEvent::Final("add task buy milk".into()),
            TranscriptEvent::End,
        ]);
        let starts = recognizer.starts_handle();
        let harness = Harness::spawn(
            recorded_setup(FakeMic::new(Arc::clone(&begins)), Some(Box::new(recognizer))),
            Arc::new(FailingTranscriber),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (events, api, speech, state) = harness.finish().await;

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].title, "buy milk");
        assert!(speech
            .lines()
            .contains(&"Creating new task: buy milk".to_string()));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ErrorShown(m) if m == TRANSCRIBE_RETRY_MSG)));
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_transcription_failure_without_recognizer_enables_text_fallback() {
        let begins = Arc::new(AtomicUsize::new(0));
        let harness = Harness::spawn(
            recorded_setup(FakeMic::new(Arc::clone(&begins)), None),
            Arc::new(FailingTranscriber),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Toggle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // fallback mode is live; a typed command now dispatches
        assert!(harness.state.fallback_active());
        harness.send(SessionCommand::Text(
            "create journal feeling productive today".into(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.send(SessionCommand::Shutdown);
        let (events, api, speech, state) = harness.finish().await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::FallbackEnabled)));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ErrorShown(m) if m == TRANSCRIBE_RETRY_MSG)));
        assert!(speech.lines().contains(&TRANSCRIBE_GIVE_UP_MSG.to_string()));

        let notes = api.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].transcription, "feeling productive today");
        assert_eq!(notes[0].note_type, "journal");
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_text_mode_toggle_speaks_unsupported() {
        let harness = Harness::spawn(text_setup(), Arc::new(FailingTranscriber), FakeApi::new());

        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (_, api, speech, state) = harness.finish().await;

        assert_eq!(speech.lines(), vec![UNSUPPORTED_MSG]);
        assert!(api.created.lock().unwrap().is_empty());
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_text_command_dispatches_journal() {
        let harness = Harness::spawn(text_setup(), Arc::new(FailingTranscriber), FakeApi::new());

        harness.send(SessionCommand::Text(
            "create journal feeling productive today".into(),
        ));
        harness.send(SessionCommand::Shutdown);
        let (_, api, _, _) = harness.finish().await;

        let notes = api.notes.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].transcription, "feeling productive today");
    }

    #[tokio::test]
    async fn test_capture_failure_downgrades_to_text_fallback() {
        let begins = Arc::new(AtomicUsize::new(0));
        let harness = Harness::spawn(
            recorded_setup(FakeMic::broken(Arc::clone(&begins)), None),
            Arc::new(FixedTranscriber("unused".into())),
            FakeApi::new(),
        );

        harness.send(SessionCommand::Toggle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        // downgraded; the next toggle is the unsupported-capture path
        harness.send(SessionCommand::Toggle);
        harness.send(SessionCommand::Shutdown);
        let (events, _, speech, state) = harness.finish().await;

        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::ErrorShown(m) if m == "No microphone found.")));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::FallbackEnabled)));
        assert!(state.fallback_active());
        assert_eq!(speech.lines(), vec![UNSUPPORTED_MSG]);
        assert_eq!(state.state(), SessionState::Idle);
    }

    #[test]
    fn test_mic_failure_notices() {
        assert_eq!(
            mic_failure_notice(&MicError::AccessDenied),
            "Microphone access denied. Please grant microphone access."
        );
        assert_eq!(mic_failure_notice(&MicError::NotFound), "No microphone found.");
        assert!(mic_failure_notice(&MicError::Device("x".into())).contains("Microphone unavailable"));
    }
}
