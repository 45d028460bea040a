//! Speech output - renders responses through the platform synthesizer
//!
//! One spawned synthesis process per utterance, fire-and-forget; the
//! platform serializes or overlaps playback as it sees fit. A synthesis
//! failure is logged and never aborts the command that produced it.

use tracing::{debug, warn};

use crate::config::SpeechConfig;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no synthesis command configured")]
    NotConfigured,

    #[error("failed to start synthesis: {0}")]
    Spawn(#[from] std::io::Error),
}

pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Spawns the configured synthesis command with the text as the final
/// argument. The child is reaped in the background so playback never
/// blocks the session.
pub struct SynthCommand {
    command: Vec<String>,
    enabled: bool,
}

impl SynthCommand {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            command: config.command.clone(),
            enabled: config.enabled,
        }
    }
}

impl SpeechEngine for SynthCommand {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if !self.enabled {
            debug!(text, "speech disabled, skipping synthesis");
            return Ok(());
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or(SpeechError::NotConfigured)?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .arg(text)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(false)
            .spawn()?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(%status, "speech synthesis exited with failure");
                }
                Err(e) => warn!("speech synthesis wait failed: {}", e),
                _ => {}
            }
        });
        Ok(())
    }
}

/// Convenience wrapper: speak and swallow the failure (logged), per the
/// contract that synthesis errors never propagate into command handling.
pub fn speak_best_effort(engine: &dyn SpeechEngine, text: &str) {
    if let Err(e) = engine.speak(text) {
        warn!("speech synthesis failed: {}", e);
    }
}

/// Test double shared by the dispatcher and session tests
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    pub struct RecordingSpeech {
        pub spoken: Mutex<Vec<String>>,
    }

    impl RecordingSpeech {
        pub fn new() -> Self {
            Self {
                spoken: Mutex::new(Vec::new()),
            }
        }

        pub fn lines(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl SpeechEngine for RecordingSpeech {
        fn speak(&self, text: &str) -> Result<(), SpeechError> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }
}
