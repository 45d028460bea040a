//! Server-side transcription - uploads a recorded clip, returns the text
//!
//! The clip goes up as a single multipart file field; the round-trip is
//! bounded by the configured timeout so the session can never hang in
//! Processing. Empty text counts as a failure, same as transport errors.

use serde::Deserialize;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::audio::AudioClip;
use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("transcription returned no text")]
    Empty,

    #[error("transcription endpoint returned {0}")]
    Status(u16),

    #[error("transcription rejected: {0}")]
    Server(String),

    #[error("transcription request failed: {0}")]
    Transport(String),

    #[error("transcription timed out")]
    Timeout,

    #[error("transcription request was dropped")]
    Dropped,
}

/// Transcription backend seam. The call spawns the upload; the receiver
/// yields the terminal result.
pub trait Transcribe: Send + Sync {
    fn transcribe(&self, clip: AudioClip) -> oneshot::Receiver<Result<String, TranscribeError>>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn parse_body(body: &str) -> Result<String, TranscribeError> {
    let parsed: TranscribeResponse =
        serde_json::from_str(body).map_err(|e| TranscribeError::Transport(e.to_string()))?;
    if let Some(err) = parsed.error {
        return Err(TranscribeError::Server(err));
    }
    match parsed.text {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(TranscribeError::Empty),
    }
}

fn map_reqwest(e: reqwest::Error) -> TranscribeError {
    if e.is_timeout() {
        TranscribeError::Timeout
    } else {
        TranscribeError::Transport(e.to_string())
    }
}

#[derive(Clone)]
pub struct ServerTranscriber {
    client: reqwest::Client,
    url: String,
}

impl ServerTranscriber {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(server.transcribe_timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: format!(
                "{}/api/transcribe",
                server.base_url.trim_end_matches('/')
            ),
        }
    }
}

async fn upload(
    client: reqwest::Client,
    url: String,
    clip: AudioClip,
) -> Result<String, TranscribeError> {
    let part = reqwest::multipart::Part::bytes(clip.wav)
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|e| TranscribeError::Transport(e.to_string()))?;
    let form = reqwest::multipart::Form::new().part("audio", part);

    let resp = client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(map_reqwest)?;

    if !resp.status().is_success() {
        return Err(TranscribeError::Status(resp.status().as_u16()));
    }
    let body = resp.text().await.map_err(map_reqwest)?;
    parse_body(&body)
}

impl Transcribe for ServerTranscriber {
    fn transcribe(&self, clip: AudioClip) -> oneshot::Receiver<Result<String, TranscribeError>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let _ = tx.send(upload(client, url, clip).await);
        });
        rx
    }
}
