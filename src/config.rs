use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

// ============================================================================
// Server Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the productivity server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bound on the transcription round-trip; expiry counts as a failed
    /// transcription
    #[serde(default = "default_transcribe_timeout")]
    pub transcribe_timeout_secs: u64,

    /// Timeout for task/note requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            transcribe_timeout_secs: default_transcribe_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".into()
}

fn default_transcribe_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    10
}

// ============================================================================
// Recognizer Config
// ============================================================================

/// Native speech recognizer, used when the microphone recorder is
/// unavailable or as the per-exchange fallback after a failed
/// transcription. The command streams transcript hypotheses to stdout one
/// per line; the last line before exit is the final transcript.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RecognizerConfig {
    /// Recognizer program and arguments, e.g. ["whisper-stream", "--once"].
    /// Empty = no native recognizer on this system.
    #[serde(default)]
    pub command: Vec<String>,
}

impl RecognizerConfig {
    pub fn is_configured(&self) -> bool {
        !self.command.is_empty()
    }
}

// ============================================================================
// Speech Config
// ============================================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    /// Speech synthesis enabled
    #[serde(default = "default_speech_enabled")]
    pub enabled: bool,

    /// Synthesis program and arguments; the text to speak is appended as
    /// the final argument
    #[serde(default = "default_speech_command")]
    pub command: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: default_speech_enabled(),
            command: default_speech_command(),
        }
    }
}

fn default_speech_enabled() -> bool {
    true
}

#[cfg(target_os = "macos")]
fn default_speech_command() -> Vec<String> {
    vec!["say".into()]
}

#[cfg(not(target_os = "macos"))]
fn default_speech_command() -> Vec<String> {
    vec!["espeak".into()]
}

impl Config {
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            fs::read_to_string(path)
                .ok()
                .and_then(|s| toml::from_str(&s).ok())
                .unwrap_or_default()
        } else {
            Config::default()
        }
    }
}
