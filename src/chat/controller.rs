//! Exchange lifecycle controller
//!
//! Owns the transcript and drives each exchange from `Pending` to a terminal
//! state. Background work (the answer request, stage reveals, status and
//! redirect timers) reports back over one channel; every message is tagged
//! so that updates for an exchange that is no longer active are dropped.

use super::progress::{ProgressNotifier, StagePlan, StageReveal};
use crate::api::{AnswerService, ChatReply, ChatRequest, HistoryEntry};
use crate::integration::ClientConfig;
use crate::messages::{ChatMessage, Exchange, ExchangeId, ExchangeState, Transcript};
use crate::session::SessionHandle;
use crate::{AyurError, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to get a response. Please try again.";
pub const EMPTY_ANSWER_MESSAGE: &str = "I couldn't generate a response at this time.";

const STATUS_INITIATING: &str = "Initiating request...";
const STATUS_RECEIVED: &str = "Response received. Rendering content...";
const STATUS_ERROR: &str = "Error encountered during processing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank question; nothing changed
    Empty,
    /// Another exchange is still pending
    Busy(ExchangeId),
    /// No session; a failed exchange was appended without a request
    Failed(ExchangeId),
    Pending(ExchangeId),
}

/// What the UI needs to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StageRevealed {
        exchange_id: ExchangeId,
        label: String,
    },
    Resolved {
        exchange_id: ExchangeId,
        state: ExchangeState,
    },
    StatusCleared,
    RedirectToLogin,
}

enum Update {
    Stage(StageReveal),
    Resolved {
        exchange_id: ExchangeId,
        result: Result<ChatReply>,
    },
    ClearStatus {
        generation: u64,
    },
    Redirect,
}

pub struct ExchangeController {
    service: Arc<dyn AnswerService>,
    session: SessionHandle,
    config: ClientConfig,
    transcript: Transcript,
    notifier: ProgressNotifier,

    /// The exchange currently pending, if any
    active: Option<ExchangeId>,
    processing_status: Option<String>,
    /// Bumped on every status change; a scheduled clear only applies to the
    /// status it was scheduled for
    status_generation: u64,
    last_error: Option<String>,

    status_timer: Option<JoinHandle<()>>,
    redirect_timer: Option<JoinHandle<()>>,
    updates_tx: UnboundedSender<Update>,
    updates_rx: UnboundedReceiver<Update>,
}

impl ExchangeController {
    pub fn new(service: Arc<dyn AnswerService>, session: SessionHandle, config: ClientConfig) -> Self {
        let (updates_tx, updates_rx) = unbounded_channel();
        Self {
            service,
            session,
            config,
            transcript: Transcript::new(),
            notifier: ProgressNotifier::new(),
            active: None,
            processing_status: None,
            status_generation: 0,
            last_error: None,
            status_timer: None,
            redirect_timer: None,
            updates_tx,
            updates_rx,
        }
    }

    pub fn submit(&mut self, question: &str) -> SubmitOutcome {
        let question = question.trim();
        if question.is_empty() {
            return SubmitOutcome::Empty;
        }
        if let Some(active) = self.active {
            debug!("Rejecting question while {} is pending", active);
            return SubmitOutcome::Busy(active);
        }

        let mut exchange = Exchange::pending(question);
        let exchange_id = exchange.id;
        self.last_error = None;

        if self.session.require_token().is_err() {
            warn!("Question asked without a session");
            exchange.fail(SESSION_EXPIRED_MESSAGE.to_string());
            self.transcript.add(exchange);
            self.session.sign_out();
            self.schedule_redirect();
            self.set_status(STATUS_ERROR);
            self.schedule_status_clear();
            return SubmitOutcome::Failed(exchange_id);
        }

        info!("Submitting question {}", exchange_id);
        self.transcript.add(exchange);
        self.active = Some(exchange_id);
        self.set_status(STATUS_INITIATING);

        let plan = StagePlan::fallback(&self.config);
        let updates = self.updates_tx.clone();
        self.notifier.start(exchange_id, plan, move |reveal| {
            updates.send(Update::Stage(reveal)).is_ok()
        });
        self.spawn_request(exchange_id, question.to_string());

        SubmitOutcome::Pending(exchange_id)
    }

    /// Start an empty conversation, abandoning anything pending
    pub fn start_new(&mut self) {
        self.reset();
        info!("Started a new conversation");
    }

    /// Show a stored exchange as the whole conversation
    pub fn replace_with_history(&mut self, entry: &HistoryEntry) {
        self.reset();
        self.transcript.replace(vec![Exchange::from_history(entry)]);
        info!("Opened history entry {}", entry.id);
    }

    /// Apply every update that is ready without waiting
    pub fn poll_events(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(update) = self.updates_rx.try_recv() {
            if let Some(event) = self.apply(update) {
                events.push(event);
            }
        }
        events
    }

    /// Wait for the next event. Returns `None` once nothing is outstanding.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        while self.has_outstanding() {
            let update = self.updates_rx.recv().await?;
            if let Some(event) = self.apply(update) {
                return Some(event);
            }
        }
        None
    }

    /// Wait until nothing is outstanding, collecting every event
    pub async fn settle(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript.messages()
    }

    pub fn active_exchange(&self) -> Option<&Exchange> {
        self.active.and_then(|id| self.transcript.get(id))
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn processing_status(&self) -> Option<&str> {
        self.processing_status.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn spawn_request(&self, exchange_id: ExchangeId, question: String) {
        let session = self.session.clone();
        let service = self.service.clone();
        let limit = self.config.answer_timeout;
        let request = ChatRequest {
            question,
            enable_tts: self.config.enable_tts,
        };
        let updates = self.updates_tx.clone();

        tokio::spawn(async move {
            let result = session
                .authorized(|token| async move {
                    match tokio::time::timeout(limit, service.ask(&token, &request)).await {
                        Ok(result) => result,
                        Err(_) => Err(AyurError::Timeout(limit)),
                    }
                })
                .await;
            if updates.send(Update::Resolved { exchange_id, result }).is_err() {
                debug!("Controller dropped before {} resolved", exchange_id);
            }
        });
    }

    fn apply(&mut self, update: Update) -> Option<ChatEvent> {
        match update {
            Update::Stage(reveal) => self.apply_stage(reveal),
            Update::Resolved { exchange_id, result } => self.resolve(exchange_id, result),
            Update::ClearStatus { generation } => {
                if generation != self.status_generation || self.processing_status.is_none() {
                    return None;
                }
                self.processing_status = None;
                Some(ChatEvent::StatusCleared)
            }
            Update::Redirect => {
                info!("Redirecting to login");
                Some(ChatEvent::RedirectToLogin)
            }
        }
    }

    fn apply_stage(&mut self, reveal: StageReveal) -> Option<ChatEvent> {
        if self.active != Some(reveal.exchange_id) {
            debug!("Dropping stale stage '{}' for {}", reveal.label, reveal.exchange_id);
            return None;
        }
        let exchange = self.transcript.get_mut(reveal.exchange_id)?;
        if !exchange.push_stage(reveal.label.clone()) {
            return None;
        }
        self.set_status(reveal.label.clone());
        Some(ChatEvent::StageRevealed {
            exchange_id: reveal.exchange_id,
            label: reveal.label,
        })
    }

    fn resolve(&mut self, exchange_id: ExchangeId, result: Result<ChatReply>) -> Option<ChatEvent> {
        if self.active != Some(exchange_id) {
            debug!("Discarding stale completion for {}", exchange_id);
            return None;
        }
        self.notifier.cancel();
        self.active = None;

        let state = match result {
            Ok(reply) => {
                let steps = reply.processing_steps.unwrap_or_default();
                if !steps.is_empty() {
                    debug!("Service reported {} processing steps", steps.len());
                }
                let answer = reply
                    .answer
                    .filter(|answer| !answer.trim().is_empty())
                    .unwrap_or_else(|| EMPTY_ANSWER_MESSAGE.to_string());
                if let Some(exchange) = self.transcript.get_mut(exchange_id) {
                    exchange.succeed(answer, reply.audio);
                    exchange.reported_steps = steps;
                }
                info!("Exchange {} answered", exchange_id);
                self.set_status(STATUS_RECEIVED);
                ExchangeState::Succeeded
            }
            Err(e) if e.is_auth() => {
                warn!("Exchange {} rejected, session expired: {}", exchange_id, e);
                if let Some(exchange) = self.transcript.get_mut(exchange_id) {
                    exchange.fail(SESSION_EXPIRED_MESSAGE.to_string());
                }
                self.schedule_redirect();
                self.set_status(STATUS_ERROR);
                ExchangeState::Failed
            }
            Err(e) => {
                warn!("Exchange {} failed: {}", exchange_id, e);
                let message = match e {
                    AyurError::Service { message, .. } => message,
                    _ => GENERIC_FAILURE_MESSAGE.to_string(),
                };
                if let Some(exchange) = self.transcript.get_mut(exchange_id) {
                    exchange.fail(format!("Error: {}", message));
                }
                self.last_error = Some(message);
                self.set_status(STATUS_ERROR);
                ExchangeState::Failed
            }
        };

        self.schedule_status_clear();
        Some(ChatEvent::Resolved { exchange_id, state })
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.processing_status = Some(status.into());
        self.status_generation += 1;
    }

    fn schedule_status_clear(&mut self) {
        if let Some(timer) = self.status_timer.take() {
            timer.abort();
        }
        let generation = self.status_generation;
        let delay = self.config.status_clear_delay;
        let updates = self.updates_tx.clone();
        self.status_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = updates.send(Update::ClearStatus { generation });
        }));
    }

    fn schedule_redirect(&mut self) {
        if is_running(&self.redirect_timer) {
            return;
        }
        let grace = self.config.redirect_grace;
        let updates = self.updates_tx.clone();
        self.redirect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = updates.send(Update::Redirect);
        }));
    }

    fn reset(&mut self) {
        self.notifier.cancel();
        if let Some(id) = self.active.take() {
            info!("Abandoning pending exchange {}", id);
        }
        if let Some(timer) = self.status_timer.take() {
            timer.abort();
        }
        self.transcript.clear();
        self.processing_status = None;
        self.status_generation += 1;
        self.last_error = None;
    }

    fn has_outstanding(&self) -> bool {
        self.active.is_some()
            || !self.updates_rx.is_empty()
            || is_running(&self.status_timer)
            || is_running(&self.redirect_timer)
    }
}

impl Drop for ExchangeController {
    fn drop(&mut self) {
        for timer in [self.status_timer.take(), self.redirect_timer.take()].into_iter().flatten() {
            timer.abort();
        }
    }
}

fn is_running(timer: &Option<JoinHandle<()>>) -> bool {
    timer.as_ref().is_some_and(|timer| !timer.is_finished())
}
