//! Voice intent parsing - maps a final transcript to one command
//!
//! Substring matching over fixed trigger phrases, checked in priority
//! order: task creation, journal note, task listing, else unrecognized.
//! The order is a literal contract; an utterance matching several phrase
//! sets takes the earliest-checked intent. Matching runs on the lowercased
//! transcript and the matched phrase is stripped to yield the payload.

const TASK_TRIGGERS: [&str; 2] = ["add task", "create task"];
const JOURNAL_TRIGGERS: [&str; 2] = ["add journal", "create journal"];
const LIST_TRIGGERS: [&str; 2] = ["list tasks", "show tasks"];

/// Structured command derived from one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceIntent {
    /// Create a task titled with the text after the trigger phrase
    CreateTask { title: String },
    /// Save a journal note with the text after the trigger phrase
    CreateJournalNote { text: String },
    /// Speak the titles of incomplete tasks
    ListTasks,
    /// No trigger phrase matched
    Unrecognized,
}

impl VoiceIntent {
    /// Parse a final transcript. Exactly one intent per utterance.
    pub fn parse(transcript: &str) -> VoiceIntent {
        let text = transcript.to_lowercase();

        if let Some(title) = strip_trigger(&text, &TASK_TRIGGERS) {
            return VoiceIntent::CreateTask { title };
        }
        if let Some(note) = strip_trigger(&text, &JOURNAL_TRIGGERS) {
            return VoiceIntent::CreateJournalNote { text: note };
        }
        if LIST_TRIGGERS.iter().any(|t| text.contains(t)) {
            return VoiceIntent::ListTasks;
        }
        VoiceIntent::Unrecognized
    }
}

/// Remove the earliest occurrence of any trigger phrase and trim the rest.
/// None when no phrase occurs.
fn strip_trigger(text: &str, triggers: &[&str]) -> Option<String> {
    let (pos, phrase) = triggers
        .iter()
        .filter_map(|t| text.find(t).map(|i| (i, *t)))
        .min_by_key(|(i, _)| *i)?;

    let mut stripped = String::with_capacity(text.len() - phrase.len());
    stripped.push_str(&text[..pos]);
    stripped.push_str(&text[pos + phrase.len()..]);
    Some(stripped.trim().to_string())
}
