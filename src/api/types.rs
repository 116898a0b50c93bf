//! Wire types exchanged with the answering service

use crate::messages::AudioClip;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the signed-in user as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserIdentity,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserResponse {
    pub user: UserIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub question: String,
    pub enable_tts: bool,
}

/// Raw `/chat/` body; audio is still base64 here
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub processing_steps: Option<Vec<String>>,
    #[serde(default)]
    pub chat_id: Option<i64>,
}

/// Decoded answer to one question
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReply {
    pub answer: Option<String>,
    pub audio: Option<AudioClip>,
    pub processing_steps: Option<Vec<String>>,
    pub chat_id: Option<i64>,
}

impl ChatReply {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            answer: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, steps: &[&str]) -> Self {
        self.processing_steps = Some(steps.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_audio(mut self, clip: AudioClip) -> Self {
        self.audio = Some(clip);
        self
    }
}

/// A past exchange as stored by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpeechResponse {
    pub audio: String,
    #[serde(default)]
    pub content_type: Option<String>,
}
