use crate::api::HistoryEntry;
use crate::{AyurError, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ExchangeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

/// Encoded audio ready for playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `audio/mp3`
    pub format: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            bytes,
            format: format.into(),
        }
    }

    pub fn from_base64(data: &str, format: impl Into<String>) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(data.trim())
            .map_err(|e| AyurError::Decode(format!("Invalid base64 audio: {}", e)))?;
        Ok(Self::new(bytes, format))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    Pending,
    Succeeded,
    Failed,
}

impl ExchangeState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ExchangeState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

/// One question and its answer, with its own lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub question: String,
    /// Final answer text, or the user-visible error message when `is_error`
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: ExchangeState,
    /// Stage labels revealed while pending, frozen once terminal
    pub progress: Vec<String>,
    pub audio: Option<AudioClip>,
    pub is_error: bool,
    /// Steps the service reported with its answer. Kept as data only.
    #[serde(default)]
    pub reported_steps: Vec<String>,
}

impl Exchange {
    pub fn pending(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: None,
            created_at: Utc::now(),
            state: ExchangeState::Pending,
            progress: Vec::new(),
            audio: None,
            is_error: false,
            reported_steps: Vec::new(),
        }
    }

    /// Terminal exchange rebuilt from a stored history entry
    pub fn from_history(entry: &HistoryEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: entry.question.clone(),
            answer: Some(entry.answer.clone()),
            created_at: entry.timestamp,
            state: ExchangeState::Succeeded,
            progress: Vec::new(),
            audio: None,
            is_error: false,
            reported_steps: Vec::new(),
        }
    }

    /// Append a stage label; ignored once the exchange is terminal
    pub fn push_stage(&mut self, label: impl Into<String>) -> bool {
        if !self.state.is_pending() {
            return false;
        }
        self.progress.push(label.into());
        true
    }

    pub fn succeed(&mut self, answer: String, audio: Option<AudioClip>) {
        self.state = ExchangeState::Succeeded;
        self.answer = Some(answer);
        self.audio = audio;
        self.is_error = false;
    }

    pub fn fail(&mut self, message: String) {
        self.state = ExchangeState::Failed;
        self.answer = Some(message);
        self.audio = None;
        self.is_error = true;
    }
}

/// A rendered line of the conversation as the UI shows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub exchange_id: ExchangeId,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_error: bool,
    pub audio: Option<AudioClip>,
}

impl ChatMessage {
    /// Whether the message gets a "listen" affordance
    pub fn is_playable(&self) -> bool {
        matches!(self.sender, Sender::Assistant) && !self.is_error
    }
}
