//! Contract with the remote answering and authentication service
//!
//! Every component talks to the service through [`AnswerService`] so the
//! lifecycle logic can be exercised against an in-process implementation.
//! Authenticated calls take the token explicitly; callers read it from the
//! session at call time.

pub mod http;
pub mod types;

pub use http::HttpAnswerService;
pub use types::{
    AuthResponse, ChatReply, ChatRequest, HistoryEntry, LoginRequest, RegisterRequest,
    SpeechRequest, UserIdentity,
};

use crate::messages::AudioClip;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AnswerService: Send + Sync {
    /// `POST /login/`
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;

    /// `POST /register/`
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse>;

    /// `GET /user/`
    async fn current_user(&self, token: &str) -> Result<UserIdentity>;

    /// `POST /chat/`
    async fn ask(&self, token: &str, request: &ChatRequest) -> Result<ChatReply>;

    /// `GET /chat-history/`
    async fn history(&self, token: &str) -> Result<Vec<HistoryEntry>>;

    /// `DELETE /chat-history/{id}/`
    async fn delete_history(&self, token: &str, id: i64) -> Result<()>;

    /// `POST /text-to-speech/`
    async fn synthesize(&self, token: &str, request: &SpeechRequest) -> Result<AudioClip>;
}
