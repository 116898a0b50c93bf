//! End-to-end flows over HTTP: sign in, ask, browse history, and the
//! expired-session path.

use ayur::api::{AnswerService, HttpAnswerService};
use ayur::chat::{ChatEvent, ExchangeController, SubmitOutcome, SESSION_EXPIRED_MESSAGE};
use ayur::history::HistorySync;
use ayur::integration::ClientConfig;
use ayur::messages::{format_answer, render_html, ExchangeState, Segment};
use ayur::session::{
    CredentialStore, FileCredentialStore, SessionGuard, SessionNotice, SessionStatus,
    StoredCredentials, SESSION_EXPIRED_NOTICE,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOSHAS_ANSWER: &str =
    "The three *doshas* are Vata, Pitta and Kapha.\nEach governs different functions.";

struct Harness {
    _dir: TempDir,
    store: Arc<FileCredentialStore>,
    service: Arc<dyn AnswerService>,
    config: ClientConfig,
}

fn harness(server: &MockServer) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ClientConfig::new(format!("{}/api", server.uri()))
        .with_credentials_path(dir.path().join("credentials.json"));
    // Keep timers short but far apart from the mocked response delays
    config.fallback_first_delay = Duration::from_millis(50);
    config.fallback_stage_spacing = Duration::from_millis(1000);
    config.status_clear_delay = Duration::from_millis(100);
    config.redirect_grace = Duration::from_millis(100);

    let store = Arc::new(FileCredentialStore::new(&config.credentials_path));
    let service: Arc<dyn AnswerService> = Arc::new(HttpAnswerService::new(&config).unwrap());
    Harness {
        _dir: dir,
        store,
        service,
        config,
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/login/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-live",
            "user": {"id": 1, "username": "charaka", "email": "charaka@example.com"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_doshas_question_end_to_end() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(header("Authorization", "Token tok-live"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "answer": DOSHAS_ANSWER,
                    "audio": "SUQz",
                    "content_type": "audio/mp3",
                    "processing_steps": ["Vectorizing your query", "Generating response"]
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat-history/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 1,
            "question": "What are the three doshas?",
            "answer": DOSHAS_ANSWER,
            "timestamp": "2025-03-01T10:15:30Z"
        }])))
        .mount(&server)
        .await;

    let h = harness(&server);
    let guard = SessionGuard::new(h.service.clone(), h.store.clone());
    guard.sign_in("charaka@example.com", "pw").await.unwrap();
    assert_eq!(
        h.store.load().unwrap().map(|c| c.token),
        Some("tok-live".to_string())
    );

    let mut chat = ExchangeController::new(h.service.clone(), guard.handle(), h.config.clone());
    let SubmitOutcome::Pending(id) = chat.submit("What are the three doshas?") else {
        panic!("question was not sent");
    };
    let events = chat.settle().await;

    assert!(events.contains(&ChatEvent::Resolved {
        exchange_id: id,
        state: ExchangeState::Succeeded
    }));
    let exchange = chat.transcript().get(id).unwrap();
    assert_eq!(exchange.progress, vec![h.config.fallback_stages[0].clone()]);
    assert_eq!(exchange.audio.as_ref().map(|a| a.bytes.clone()), Some(b"ID3".to_vec()));
    assert!(chat.processing_status().is_none());

    let segments = format_answer(exchange.answer.as_deref().unwrap());
    assert_eq!(segments[1], Segment::Emphasis("doshas".into()));
    let html = render_html(&segments);
    assert!(html.contains("<strong class=\"highlighted-text\">doshas</strong>"));
    assert!(html.contains("Kapha.<br />Each"));

    let history = HistorySync::new(h.service.clone(), guard.handle());
    history.refresh().await;
    assert!(history.select(1, &mut chat));
    let messages = chat.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "What are the three doshas?");
    assert_eq!(messages[1].text, DOSHAS_ANSWER);
}

#[tokio::test]
async fn test_rejected_token_ends_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let guard = SessionGuard::new(h.service.clone(), h.store.clone());
    guard.sign_in("charaka@example.com", "pw").await.unwrap();
    let mut chat = ExchangeController::new(h.service.clone(), guard.handle(), h.config.clone());

    let SubmitOutcome::Pending(id) = chat.submit("What is Prakriti?") else {
        panic!("question was not sent");
    };
    let events = chat.settle().await;

    assert!(events.contains(&ChatEvent::RedirectToLogin));
    let exchange = chat.transcript().get(id).unwrap();
    assert_eq!(exchange.state, ExchangeState::Failed);
    assert_eq!(exchange.answer.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
    assert_eq!(guard.session().status, SessionStatus::Unauthenticated);
    assert_eq!(h.store.load().unwrap(), None);

    // No second request goes out once the session is gone
    assert!(matches!(chat.submit("Still there?"), SubmitOutcome::Failed(_)));
    assert_eq!(guard.session().status, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn test_resubmit_before_redirect_finds_session_gone() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness(&server);
    h.config.redirect_grace = Duration::from_secs(3);
    let guard = SessionGuard::new(h.service.clone(), h.store.clone());
    guard.sign_in("charaka@example.com", "pw").await.unwrap();
    let mut chat = ExchangeController::new(h.service.clone(), guard.handle(), h.config.clone());

    let SubmitOutcome::Pending(id) = chat.submit("What is Prakriti?") else {
        panic!("question was not sent");
    };
    let mut resolved = false;
    while let Some(event) = chat.next_event().await {
        assert_ne!(event, ChatEvent::RedirectToLogin);
        if event
            == (ChatEvent::Resolved {
                exchange_id: id,
                state: ExchangeState::Failed,
            })
        {
            resolved = true;
            break;
        }
    }
    assert!(resolved);

    assert!(matches!(chat.submit("Still there?"), SubmitOutcome::Failed(_)));
    assert_eq!(guard.session().status, SessionStatus::Unauthenticated);
    assert!(!chat.poll_events().contains(&ChatEvent::RedirectToLogin));
}

#[tokio::test]
async fn test_startup_probe_clears_stale_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user/"))
        .and(header("Authorization", "Token tok-stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    h.store
        .save(&StoredCredentials {
            token: "tok-stale".into(),
            user: None,
        })
        .unwrap();
    let guard = SessionGuard::new(h.service.clone(), h.store.clone());

    let notice = guard.probe().await;

    assert_eq!(notice, SessionNotice::Expired(SESSION_EXPIRED_NOTICE.into()));
    assert_eq!(h.store.load().unwrap(), None);
    assert!(!guard.handle().is_authenticated());
}
