//! Productivity server client - task and voice-note endpoints
//!
//! Requests are spawned and report their terminal result over a oneshot
//! channel, so callers hold no reference to the HTTP machinery while
//! awaiting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::ServerConfig;

/// Description stamped on every task created by voice
pub const VOICE_TASK_DESCRIPTION: &str = "Created via voice command";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("server returned {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request was dropped before completing")]
    Dropped,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub due_date: String,
}

impl NewTask {
    /// Voice-created task: fixed description and priority, due today
    pub fn from_voice(title: impl Into<String>) -> Self {
        Self::with_due_date(title, chrono::Local::now().date_naive())
    }

    pub fn with_due_date(title: impl Into<String>, due: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: VOICE_TASK_DESCRIPTION.into(),
            priority: "normal".into(),
            due_date: due.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewVoiceNote {
    pub transcription: String,
    pub note_type: String,
}

impl NewVoiceNote {
    pub fn journal(text: impl Into<String>) -> Self {
        Self {
            transcription: text.into(),
            note_type: "journal".into(),
        }
    }
}

/// Task as returned by the server; unknown fields are ignored
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Task {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

// ============================================================================
// Client
// ============================================================================

/// Server operations the dispatcher depends on. Each call spawns the
/// request; the receiver yields the terminal result.
pub trait ProductivityApi: Send + Sync {
    fn create_task(&self, task: NewTask) -> oneshot::Receiver<Result<(), ApiError>>;
    fn save_voice_note(&self, note: NewVoiceNote) -> oneshot::Receiver<Result<(), ApiError>>;
    fn fetch_tasks(&self) -> oneshot::Receiver<Result<Vec<Task>, ApiError>>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(server.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: server.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(ApiError::Status(resp.status().as_u16()))
    }
}

impl ProductivityApi for ApiClient {
    fn create_task(&self, task: NewTask) -> oneshot::Receiver<Result<(), ApiError>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url("/api/tasks");
        tokio::spawn(async move {
            let result = async {
                let resp = client
                    .post(&url)
                    .json(&task)
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;
                check_status(resp).map(|_| ())
            }
            .await;
            let _ = tx.send(result);
        });
        rx
    }

    fn save_voice_note(&self, note: NewVoiceNote) -> oneshot::Receiver<Result<(), ApiError>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url("/api/voice-notes");
        tokio::spawn(async move {
            let result = async {
                let resp = client
                    .post(&url)
                    .json(&note)
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;
                check_status(resp).map(|_| ())
            }
            .await;
            let _ = tx.send(result);
        });
        rx
    }

    fn fetch_tasks(&self) -> oneshot::Receiver<Result<Vec<Task>, ApiError>> {
        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url("/api/tasks");
        tokio::spawn(async move {
            let result = async {
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;
                check_status(resp)?
                    .json::<Vec<Task>>()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))
            }
            .await;
            let _ = tx.send(result);
        });
        rx
    }
}
