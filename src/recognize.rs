//! Native speech recognizer - streams interim transcripts, one final
//!
//! Wraps the host's recognizer command: hypotheses arrive on stdout one
//! per line, each superseding the last; the last line before exit is the
//! final transcript. Interim lines are display-only. Stopping kills the
//! process; whatever it already produced still becomes the final.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::RecognizerConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecognizerError {
    #[error("no-speech")]
    NoSpeech,

    #[error("not-allowed")]
    NotAllowed,

    #[error("network")]
    Network,

    #[error("{0}")]
    Other(String),
}

/// Events emitted over one recognizer exchange: zero or more interim
/// transcripts, then at most one final or one error, then End.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    Interim(String),
    Final(String),
    Error(RecognizerError),
    End,
}

pub trait Recognizer: Send {
    /// Begin one recognition exchange; the receiver yields its events.
    fn start(&mut self) -> Result<flume::Receiver<TranscriptEvent>, RecognizerError>;

    /// Stop the exchange. The event stream still terminates with End.
    fn stop(&mut self);
}

// ============================================================================
// Recognizer command backend
// ============================================================================

pub struct CommandRecognizer {
    command: Vec<String>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl CommandRecognizer {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            command: config.command.clone(),
            stop_tx: None,
        }
    }
}

impl Recognizer for CommandRecognizer {
    fn start(&mut self) -> Result<flume::Receiver<TranscriptEvent>, RecognizerError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| RecognizerError::Other("no recognizer command configured".into()))?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => RecognizerError::NotAllowed,
                _ => RecognizerError::Other(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecognizerError::Other("recognizer stdout unavailable".into()))?;

        let (tx, rx) = flume::unbounded();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut last: Option<String> = None;
            let mut stopped = false;

            loop {
                tokio::select! {
                    _ = &mut stop_rx, if !stopped => {
                        stopped = true;
                        debug!("recognizer stop requested, killing child");
                        let _ = child.start_kill();
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let hypothesis = line.trim();
                            if !hypothesis.is_empty() {
                                let _ = tx.send(TranscriptEvent::Interim(hypothesis.to_string()));
                                last = Some(hypothesis.to_string());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("recognizer read failed: {}", e);
                            let _ = tx.send(TranscriptEvent::Error(RecognizerError::Other(
                                e.to_string(),
                            )));
                            let _ = tx.send(TranscriptEvent::End);
                            let _ = child.wait().await;
                            return;
                        }
                    }
                }
            }

            let _ = child.wait().await;
            match last {
                Some(text) => {
                    let _ = tx.send(TranscriptEvent::Final(text));
                }
                None => {
                    let _ = tx.send(TranscriptEvent::Error(RecognizerError::NoSpeech));
                }
            }
            let _ = tx.send(TranscriptEvent::End);
        });

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Test double
// ============================================================================
