//! Intent dispatch - executes one VoiceIntent against the server
//!
//! Each branch is independent and individually fallible: failures produce a
//! spoken apology, never a retry and never a propagated error. Exactly one
//! branch runs per utterance.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiError, NewTask, NewVoiceNote, ProductivityApi, Task};
use crate::intent::VoiceIntent;
use crate::speech::{speak_best_effort, SpeechEngine};

const HELP_REPLY: &str =
    "I didn't understand that command. Try saying 'add task', 'create journal', or 'list tasks'.";
const NO_TASKS_REPLY: &str = "You have no tasks.";
const TASK_APOLOGY: &str = "Sorry, there was an error creating the task.";
const NOTE_APOLOGY: &str = "Sorry, there was an error saving your voice note.";
const LIST_APOLOGY: &str = "Sorry, I could not retrieve your tasks.";

/// Spoken reply for a fetched task list. Empty collection gets the fixed
/// no-tasks message; otherwise incomplete titles are enumerated (the
/// emptiness check precedes the filter).
pub fn task_list_reply(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return NO_TASKS_REPLY.to_string();
    }
    let titles: Vec<&str> = tasks
        .iter()
        .filter(|t| !t.completed)
        .map(|t| t.title.as_str())
        .collect();
    format!("Here are your tasks: {}", titles.join(", "))
}

pub struct CommandDispatcher {
    api: Arc<dyn ProductivityApi>,
    speech: Arc<dyn SpeechEngine>,
    /// Externally-owned task-list refresh hook; absence is not an error
    refresh_tasks: Option<Box<dyn Fn() + Send + Sync>>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn ProductivityApi>, speech: Arc<dyn SpeechEngine>) -> Self {
        Self {
            api,
            speech,
            refresh_tasks: None,
        }
    }

    pub fn with_refresh_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.refresh_tasks = Some(Box::new(hook));
        self
    }

    fn speak(&self, text: &str) {
        speak_best_effort(&*self.speech, text);
    }

    /// Session-level notices share the dispatcher's voice
    pub fn speak_notice(&self, text: &str) {
        self.speak(text);
    }

    /// Execute the intent's effect. Never returns an error: every failure
    /// ends in a logged warning and a spoken apology.
    pub async fn dispatch(&self, intent: VoiceIntent) {
        match intent {
            VoiceIntent::CreateTask { title } => self.create_task(title).await,
            VoiceIntent::CreateJournalNote { text } => self.save_journal_note(text).await,
            VoiceIntent::ListTasks => self.list_tasks().await,
            VoiceIntent::Unrecognized => self.speak(HELP_REPLY),
        }
    }

    async fn create_task(&self, title: String) {
        if title.is_empty() {
            // trigger phrase with no payload; nothing is sent or spoken
            debug!("task command with empty title, ignoring");
            return;
        }
        self.speak(&format!("Creating new task: {}", title));

        let rx = self.api.create_task(NewTask::from_voice(title));
        match rx.await.unwrap_or(Err(ApiError::Dropped)) {
            Ok(()) => {
                if let Some(refresh) = &self.refresh_tasks {
                    refresh();
                }
            }
            Err(e) => {
                warn!("task creation failed: {}", e);
                self.speak(TASK_APOLOGY);
            }
        }
    }

    async fn save_journal_note(&self, text: String) {
        if text.is_empty() {
            debug!("journal command with empty text, ignoring");
            return;
        }
        self.speak("Journal entry saved");

        let rx = self.api.save_voice_note(NewVoiceNote::journal(text));
        if let Err(e) = rx.await.unwrap_or(Err(ApiError::Dropped)) {
            warn!("voice note save failed: {}", e);
            self.speak(NOTE_APOLOGY);
        }
    }

    async fn list_tasks(&self) {
        let rx = self.api.fetch_tasks();
        match rx.await.unwrap_or(Err(ApiError::Dropped)) {
            Ok(tasks) => self.speak(&task_list_reply(&tasks)),
            Err(e) => {
                warn!("task fetch failed: {}", e);
                self.speak(LIST_APOLOGY);
            }
        }
    }
}
