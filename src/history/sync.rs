//! Stored conversations
//!
//! The service is the record of truth: the local list only changes after the
//! service acknowledged a listing or a deletion. State sits behind a lock
//! that is never held across a request, so deletes of different entries can
//! run concurrently.

use crate::api::{AnswerService, HistoryEntry};
use crate::chat::ExchangeController;
use crate::session::SessionHandle;
use crate::{AyurError, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const HISTORY_LOAD_FAILED_MESSAGE: &str =
    "Failed to load chat history. Please try again later.";
pub const DELETE_CONFIRM_PROMPT: &str = "Are you sure you want to delete this conversation?";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete the conversation. Please try again.";
pub const EMPTY_HISTORY_NOTICE: &str = "No chat history yet. Start a new conversation!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The service acknowledged the deletion
    Deleted,
    /// A deletion of the same entry is still waiting for the service
    AlreadyInProgress,
}

/// Asks the user before a destructive action
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Default)]
struct HistoryState {
    entries: Vec<HistoryEntry>,
    loading: bool,
    error: Option<String>,
    deleting: HashSet<i64>,
    alert: Option<String>,
}

pub struct HistorySync {
    service: Arc<dyn AnswerService>,
    session: SessionHandle,
    state: Mutex<HistoryState>,
}

impl HistorySync {
    pub fn new(service: Arc<dyn AnswerService>, session: SessionHandle) -> Self {
        Self {
            service,
            session,
            state: Mutex::new(HistoryState::default()),
        }
    }

    /// Reload the list from the service. Failures are recorded in `error`,
    /// never returned.
    pub async fn refresh(&self) {
        if !self.session.is_authenticated() {
            debug!("Not signed in, history cleared");
            let mut state = self.state.lock();
            state.entries.clear();
            state.error = None;
            return;
        }

        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let service = &self.service;
        let result = self
            .session
            .authorized(|token| async move { service.history(&token).await })
            .await;

        let mut state = self.state.lock();
        state.loading = false;
        match result {
            Ok(entries) => {
                info!("Loaded {} history entries", entries.len());
                state.entries = entries;
            }
            Err(e) => {
                warn!("Failed to load chat history: {}", e);
                state.error = Some(HISTORY_LOAD_FAILED_MESSAGE.to_string());
            }
        }
    }

    /// Delete one stored conversation after confirmation. The entry leaves
    /// the list only once the service acknowledged the deletion.
    pub async fn remove(&self, id: i64, gate: &dyn ConfirmationGate) -> Result<RemoveOutcome> {
        if !gate.confirm(DELETE_CONFIRM_PROMPT) {
            debug!("Deletion of {} declined", id);
            return Err(AyurError::ConfirmationDeclined);
        }

        if !self.state.lock().deleting.insert(id) {
            debug!("Deletion of {} already in progress", id);
            return Ok(RemoveOutcome::AlreadyInProgress);
        }

        let service = &self.service;
        let result = self
            .session
            .authorized(|token| async move { service.delete_history(&token, id).await })
            .await;

        let mut state = self.state.lock();
        state.deleting.remove(&id);
        match result {
            Ok(()) => {
                state.entries.retain(|entry| entry.id != id);
                info!("Deleted history entry {}", id);
                Ok(RemoveOutcome::Deleted)
            }
            Err(e) => {
                warn!("Failed to delete history entry {}: {}", id, e);
                state.alert = Some(DELETE_FAILED_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// Open a stored conversation in the controller
    pub fn select(&self, id: i64, controller: &mut ExchangeController) -> bool {
        let Some(entry) = self.get(id) else {
            warn!("No history entry {}", id);
            return false;
        };
        controller.replace_with_history(&entry);
        true
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.state.lock().entries.clone()
    }

    pub fn get(&self, id: i64) -> Option<HistoryEntry> {
        self.state.lock().entries.iter().find(|entry| entry.id == id).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn is_deleting(&self, id: i64) -> bool {
        self.state.lock().deleting.contains(&id)
    }

    /// Alert raised by the last failed deletion
    pub fn take_alert(&self) -> Option<String> {
        self.state.lock().alert.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UserIdentity;
    use crate::integration::ClientConfig;
    use crate::session::{MemoryCredentialStore, SessionGuard, SessionStatus};
    use crate::testing::{RecordedCall, ScriptedService};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn entry(id: i64, question: &str) -> HistoryEntry {
        HistoryEntry {
            id,
            question: question.into(),
            answer: format!("Answer to {}", question),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap(),
        }
    }

    async fn setup(entries: Vec<HistoryEntry>) -> (Arc<ScriptedService>, SessionHandle, HistorySync) {
        let service = Arc::new(ScriptedService::new());
        service.accept_login(
            "tok-1",
            UserIdentity {
                id: 1,
                username: "charaka".into(),
                email: "charaka@example.com".into(),
            },
        );
        service.set_history(entries);
        let guard = SessionGuard::new(service.clone(), Arc::new(MemoryCredentialStore::new()));
        guard.sign_in("charaka@example.com", "pw").await.unwrap();
        let history = HistorySync::new(service.clone(), guard.handle());
        history.refresh().await;
        (service, guard.handle(), history)
    }

    fn ids(history: &HistorySync) -> Vec<i64> {
        history.entries().iter().map(|entry| entry.id).collect()
    }

    #[tokio::test]
    async fn test_refresh_loads_entries() {
        let (_service, _session, history) =
            setup(vec![entry(2, "What is Prakriti?"), entry(1, "What is Vata?")]).await;

        assert_eq!(ids(&history), vec![2, 1]);
        assert!(history.error().is_none());
        assert!(!history.is_loading());
    }

    #[tokio::test]
    async fn test_refresh_failure_records_error() {
        let (service, _session, history) = setup(vec![entry(1, "q")]).await;
        service.fail_history(AyurError::service("boom"));

        history.refresh().await;

        assert_eq!(history.error().as_deref(), Some(HISTORY_LOAD_FAILED_MESSAGE));
        assert_eq!(ids(&history), vec![1]);
    }

    #[tokio::test]
    async fn test_refresh_rejected_token_signs_out() {
        let (service, session, history) = setup(vec![]).await;
        service.fail_history(AyurError::Auth("Invalid token.".into()));

        history.refresh().await;

        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert!(history.error().is_some());
    }

    #[tokio::test]
    async fn test_declined_removal_changes_nothing() {
        let (service, _session, history) = setup(vec![entry(1, "a"), entry(2, "b")]).await;
        let before = service.request_count();

        let result = history.remove(1, &|_: &str| false).await;

        assert_eq!(result, Err(AyurError::ConfirmationDeclined));
        assert_eq!(ids(&history), vec![1, 2]);
        assert_eq!(service.request_count(), before);
    }

    #[tokio::test]
    async fn test_accepted_removal_removes_exactly_one() {
        let (service, _session, history) =
            setup(vec![entry(3, "a"), entry(2, "b"), entry(1, "c")]).await;
        let prompts = Mutex::new(Vec::new());
        let gate = |prompt: &str| {
            prompts.lock().push(prompt.to_string());
            true
        };

        assert_eq!(history.remove(2, &gate).await, Ok(RemoveOutcome::Deleted));

        assert_eq!(ids(&history), vec![3, 1]);
        assert_eq!(*prompts.lock(), vec![DELETE_CONFIRM_PROMPT.to_string()]);
        assert!(service.calls().contains(&RecordedCall::Delete {
            token: "tok-1".into(),
            id: 2,
        }));
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_entry_and_alerts() {
        let (service, _session, history) = setup(vec![entry(1, "a"), entry(2, "b")]).await;
        service.delete_after(
            1,
            Duration::ZERO,
            Err(AyurError::Service {
                status: Some(404),
                message: "Chat not found".into(),
            }),
        );

        assert!(history.remove(1, &|_: &str| true).await.is_err());

        assert_eq!(ids(&history), vec![1, 2]);
        assert_eq!(history.take_alert().as_deref(), Some(DELETE_FAILED_MESSAGE));
        assert!(!history.is_deleting(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_removals_do_not_interfere() {
        let (service, _session, history) =
            setup(vec![entry(1, "a"), entry(2, "b"), entry(3, "c")]).await;
        service.delete_after(1, Duration::from_millis(300), Ok(()));
        service.delete_after(
            3,
            Duration::from_millis(100),
            Err(AyurError::service("Failed to delete chat")),
        );

        let yes = |_: &str| true;
        let watch = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            (history.is_deleting(1), history.is_deleting(2), history.is_deleting(3))
        };
        let (first, third, flags) =
            tokio::join!(history.remove(1, &yes), history.remove(3, &yes), watch);

        assert_eq!(flags, (true, false, true));
        assert!(first.is_ok());
        assert!(third.is_err());
        assert_eq!(ids(&history), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_removal_waits_for_acknowledgment() {
        let (service, _session, history) = setup(vec![entry(1, "a"), entry(2, "b")]).await;
        service.delete_after(1, Duration::from_millis(200), Ok(()));

        let yes = |_: &str| true;
        let repeat = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let outcome = history.remove(1, &yes).await;
            (outcome, ids(&history))
        };
        let (first, (second, listed)) = tokio::join!(history.remove(1, &yes), repeat);

        assert_eq!(second, Ok(RemoveOutcome::AlreadyInProgress));
        assert_eq!(listed, vec![1, 2]);
        assert_eq!(first, Ok(RemoveOutcome::Deleted));
        assert_eq!(ids(&history), vec![2]);
    }

    #[tokio::test]
    async fn test_select_opens_entry_in_controller() {
        let (service, session, history) = setup(vec![entry(5, "What is dinacharya?")]).await;
        let mut chat = ExchangeController::new(service.clone(), session, ClientConfig::default());

        assert!(history.select(5, &mut chat));
        assert!(!history.select(99, &mut chat));

        let messages = chat.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "What is dinacharya?");
        assert_eq!(messages[1].text, "Answer to What is dinacharya?");
    }

    #[tokio::test]
    async fn test_refresh_when_signed_out_sends_nothing() {
        let (service, session, history) = setup(vec![entry(1, "a")]).await;
        session.sign_out();
        let before = service.request_count();

        history.refresh().await;

        assert!(history.entries().is_empty());
        assert_eq!(service.request_count(), before);
    }
}
