//! In-process doubles for the service and the audio device
//!
//! [`ScriptedService`] answers every [`AnswerService`] call from a script and
//! records what it was asked. Scripted latency uses `tokio::time::sleep`, so
//! tests running on a paused clock stay deterministic.
//! [`RecordingAudioBackend`] counts playback handles so tests can check that
//! each one is released exactly once.

use crate::api::{
    AnswerService, AuthResponse, ChatReply, ChatRequest, HistoryEntry, LoginRequest,
    RegisterRequest, SpeechRequest, UserIdentity,
};
use crate::audio::{AudioBackend, FinishedCallback, PlaybackHandle};
use crate::messages::AudioClip;
use crate::{AyurError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// A request as the scripted service saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Login { email: String },
    Register { username: String },
    CurrentUser { token: String },
    Ask { token: String, question: String, enable_tts: bool },
    History { token: String },
    Delete { token: String, id: i64 },
    Synthesize { token: String, text: String, language: String },
}

#[derive(Debug, Clone)]
struct Scripted<T> {
    delay: Duration,
    result: Result<T>,
}

impl<T> Scripted<T> {
    fn now(result: Result<T>) -> Self {
        Self {
            delay: Duration::ZERO,
            result,
        }
    }

    fn after(delay: Duration, result: Result<T>) -> Self {
        Self { delay, result }
    }

    async fn settle(self) -> Result<T> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result
    }
}

#[derive(Default)]
pub struct ScriptedService {
    auth: Mutex<Option<Result<AuthResponse>>>,
    tokens: Mutex<HashMap<String, UserIdentity>>,
    replies: Mutex<VecDeque<Scripted<ChatReply>>>,
    history: Mutex<Option<Scripted<Vec<HistoryEntry>>>>,
    deletes: Mutex<HashMap<i64, Scripted<()>>>,
    speech: Mutex<VecDeque<Scripted<AudioClip>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login and registration both succeed with this token. The token is
    /// also accepted by `current_user`.
    pub fn accept_login(&self, token: &str, user: UserIdentity) {
        self.accept_token(token, user.clone());
        *self.auth.lock() = Some(Ok(AuthResponse {
            token: token.to_string(),
            user,
        }));
    }

    /// Login and registration both fail with `error`
    pub fn reject_login(&self, error: AyurError) {
        *self.auth.lock() = Some(Err(error));
    }

    /// `current_user` succeeds for `token`; unknown tokens are rejected
    pub fn accept_token(&self, token: &str, user: UserIdentity) {
        self.tokens.lock().insert(token.to_string(), user);
    }

    /// Queue an answer returned immediately
    pub fn reply(&self, reply: ChatReply) {
        self.replies.lock().push_back(Scripted::now(Ok(reply)));
    }

    /// Queue an answer returned after `delay`
    pub fn reply_after(&self, delay: Duration, reply: ChatReply) {
        self.replies.lock().push_back(Scripted::after(delay, Ok(reply)));
    }

    /// Queue a failed answer returned after `delay`
    pub fn fail_chat_after(&self, delay: Duration, error: AyurError) {
        self.replies.lock().push_back(Scripted::after(delay, Err(error)));
    }

    pub fn fail_chat(&self, error: AyurError) {
        self.fail_chat_after(Duration::ZERO, error);
    }

    /// History returned by every listing until changed
    pub fn set_history(&self, entries: Vec<HistoryEntry>) {
        *self.history.lock() = Some(Scripted::now(Ok(entries)));
    }

    pub fn fail_history(&self, error: AyurError) {
        *self.history.lock() = Some(Scripted::now(Err(error)));
    }

    /// Outcome of deleting `id`. Unscripted ids are deleted immediately.
    pub fn delete_after(&self, id: i64, delay: Duration, result: Result<()>) {
        self.deletes.lock().insert(id, Scripted::after(delay, result));
    }

    pub fn speak(&self, clip: AudioClip) {
        self.speak_after(Duration::ZERO, clip);
    }

    /// Queue synthesized audio returned after `delay`
    pub fn speak_after(&self, delay: Duration, clip: AudioClip) {
        self.speech.lock().push_back(Scripted::after(delay, Ok(clip)));
    }

    pub fn fail_speech(&self, error: AyurError) {
        self.speech.lock().push_back(Scripted::now(Err(error)));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of requests received, of any kind
    pub fn request_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Questions received, in order
    pub fn questions(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Ask { question, .. } => Some(question.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }

    fn auth_outcome(&self) -> Result<AuthResponse> {
        self.auth
            .lock()
            .clone()
            .unwrap_or_else(|| Err(AyurError::service("No scripted login")))
    }
}

#[async_trait]
impl AnswerService for ScriptedService {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        self.record(RecordedCall::Login {
            email: request.email.clone(),
        });
        self.auth_outcome()
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        self.record(RecordedCall::Register {
            username: request.username.clone(),
        });
        self.auth_outcome()
    }

    async fn current_user(&self, token: &str) -> Result<UserIdentity> {
        self.record(RecordedCall::CurrentUser {
            token: token.to_string(),
        });
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| AyurError::Auth("Invalid token.".to_string()))
    }

    async fn ask(&self, token: &str, request: &ChatRequest) -> Result<ChatReply> {
        self.record(RecordedCall::Ask {
            token: token.to_string(),
            question: request.question.clone(),
            enable_tts: request.enable_tts,
        });
        let scripted = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Scripted::now(Err(AyurError::service("No scripted reply"))));
        scripted.settle().await
    }

    async fn history(&self, token: &str) -> Result<Vec<HistoryEntry>> {
        self.record(RecordedCall::History {
            token: token.to_string(),
        });
        let scripted = self
            .history
            .lock()
            .clone()
            .unwrap_or_else(|| Scripted::now(Ok(Vec::new())));
        scripted.settle().await
    }

    async fn delete_history(&self, token: &str, id: i64) -> Result<()> {
        self.record(RecordedCall::Delete {
            token: token.to_string(),
            id,
        });
        let scripted = self
            .deletes
            .lock()
            .remove(&id)
            .unwrap_or_else(|| Scripted::now(Ok(())));
        scripted.settle().await
    }

    async fn synthesize(&self, token: &str, request: &SpeechRequest) -> Result<AudioClip> {
        self.record(RecordedCall::Synthesize {
            token: token.to_string(),
            text: request.text.clone(),
            language: request.language.clone(),
        });
        let scripted = self
            .speech
            .lock()
            .pop_front()
            .unwrap_or_else(|| Scripted::now(Err(AyurError::service("No scripted audio"))));
        scripted.settle().await
    }
}

#[derive(Default)]
struct RecordingState {
    started: usize,
    released: usize,
    played: Vec<AudioClip>,
    finishers: Vec<FinishedCallback>,
    fail_next: Option<AyurError>,
}

/// Audio backend that plays nothing and counts handles
#[derive(Clone, Default)]
pub struct RecordingAudioBackend {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles handed out so far
    pub fn started(&self) -> usize {
        self.state.lock().started
    }

    /// Handles stopped so far
    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    /// Handles not yet released
    pub fn active(&self) -> usize {
        let state = self.state.lock();
        state.started - state.released
    }

    pub fn played(&self) -> Vec<AudioClip> {
        self.state.lock().played.clone()
    }

    /// The next `play` call fails with `error`
    pub fn fail_next(&self, error: AyurError) {
        self.state.lock().fail_next = Some(error);
    }

    /// Let every clip started so far reach its natural end
    pub fn finish_all(&self) {
        let finishers = std::mem::take(&mut self.state.lock().finishers);
        for finished in finishers {
            finished();
        }
    }
}

struct RecordingHandle {
    state: Arc<Mutex<RecordingState>>,
}

impl PlaybackHandle for RecordingHandle {
    fn stop(self: Box<Self>) {
        self.state.lock().released += 1;
    }
}

impl AudioBackend for RecordingAudioBackend {
    fn play(&self, clip: &AudioClip, on_finished: FinishedCallback) -> Result<Box<dyn PlaybackHandle>> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.started += 1;
        state.played.push(clip.clone());
        state.finishers.push(on_finished);
        Ok(Box::new(RecordingHandle {
            state: self.state.clone(),
        }))
    }
}
