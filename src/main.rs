use anyhow::{Context, Result};
use ayur::api::{AnswerService, HttpAnswerService};
use ayur::audio::{AudioBackend, AudioSource, PlaybackController, PlaybackEvent};
use ayur::chat::{ChatEvent, ExchangeController, SubmitOutcome, EXPLORE_TOPICS, SUGGESTED_QUESTIONS};
use ayur::history::{HistorySync, RemoveOutcome, DELETE_CONFIRM_PROMPT, EMPTY_HISTORY_NOTICE};
use ayur::integration::ClientConfig;
use ayur::messages::{format_answer, render_ansi, ExchangeId, ExchangeState};
use ayur::session::{FileCredentialStore, SessionGuard, SessionNotice, SignUpProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  /login <email> <password>
  /signup <username> <email> <password> <confirm>
  /logout
  /new                 start a new conversation
  /history             list stored conversations
  /open <id>           open a stored conversation
  /delete <id>         delete a stored conversation
  /listen              play or stop the last answer
  /suggest [n]         show or ask a suggested question
  /quit
Anything else is sent as a question.";

struct Repl {
    guard: SessionGuard,
    chat: ExchangeController,
    history: HistorySync,
    service: Arc<dyn AnswerService>,
    audio: Option<Arc<dyn AudioBackend>>,
    players: HashMap<ExchangeId, PlaybackController>,
    config: ClientConfig,
    input: Lines<BufReader<Stdin>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ayur=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Ayur client");

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    let service: Arc<dyn AnswerService> = Arc::new(HttpAnswerService::new(&config)?);
    let store = Arc::new(FileCredentialStore::new(&config.credentials_path));
    let guard = SessionGuard::new(service.clone(), store);

    match guard.probe().await {
        SessionNotice::Restored(user) => println!("Welcome back, {}.", user.username),
        SessionNotice::SignedOut => println!("Please /login or /signup to start."),
        SessionNotice::Expired(notice) => println!("{}", notice),
    }

    let session = guard.handle();
    let mut repl = Repl {
        chat: ExchangeController::new(service.clone(), session.clone(), config.clone()),
        history: HistorySync::new(service.clone(), session),
        guard,
        service,
        audio: open_audio(),
        players: HashMap::new(),
        config,
        input: BufReader::new(tokio::io::stdin()).lines(),
    };

    println!("Ask about Ayurvedic medicine and principles. Type /help for commands.");
    repl.run().await
}

impl Repl {
    async fn run(&mut self) -> Result<()> {
        loop {
            self.drain_background();
            let Some(line) = self.input.next_line().await? else {
                break;
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let command = parts.next().unwrap_or_default();
            let args: Vec<&str> = parts.collect();

            match command {
                "/quit" | "/exit" => break,
                "/help" => println!("{}", HELP),
                "/login" => self.login(&args).await,
                "/signup" => self.signup(&args).await,
                "/logout" => {
                    self.guard.sign_out();
                    self.chat.start_new();
                    self.players.clear();
                    println!("Signed out.");
                }
                "/new" => {
                    self.chat.start_new();
                    self.players.clear();
                    println!("Started a new conversation.");
                }
                "/history" => self.list_history().await,
                "/open" => self.open(&args),
                "/delete" => self.delete(&args).await?,
                "/listen" => self.listen(),
                "/suggest" => self.suggest(&args).await,
                _ if command.starts_with('/') => println!("Unknown command. Type /help."),
                _ => self.ask(&line).await,
            }
        }

        info!("Exiting");
        Ok(())
    }

    async fn login(&mut self, args: &[&str]) {
        let [email, password] = args else {
            println!("Usage: /login <email> <password>");
            return;
        };
        match self.guard.sign_in(email, password).await {
            Ok(user) => println!("Signed in as {}.", user.username),
            Err(e) => println!("{}", e.user_message()),
        }
    }

    async fn signup(&mut self, args: &[&str]) {
        let [username, email, password, confirm] = args else {
            println!("Usage: /signup <username> <email> <password> <confirm>");
            return;
        };
        let profile = SignUpProfile {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        };
        match self.guard.sign_up(profile).await {
            Ok(user) => println!("Welcome, {}.", user.username),
            Err(e) => println!("{}", e.user_message()),
        }
    }

    async fn ask(&mut self, question: &str) {
        let id = match self.chat.submit(question) {
            SubmitOutcome::Pending(id) => id,
            SubmitOutcome::Failed(id) => {
                self.print_answer(id);
                return;
            }
            SubmitOutcome::Busy(_) => {
                println!("Still waiting for the previous answer.");
                return;
            }
            SubmitOutcome::Empty => return,
        };

        if let Some(status) = self.chat.processing_status() {
            println!("  {}", status);
        }
        while let Some(event) = self.chat.next_event().await {
            match event {
                ChatEvent::StageRevealed { label, .. } => println!("  {}", label),
                ChatEvent::Resolved { exchange_id, .. } if exchange_id == id => {
                    self.print_answer(id);
                    break;
                }
                ChatEvent::RedirectToLogin => println!("Please /login again."),
                _ => {}
            }
        }
    }

    fn print_answer(&self, id: ExchangeId) {
        let Some(exchange) = self.chat.transcript().get(id) else {
            return;
        };
        let answer = exchange.answer.as_deref().unwrap_or_default();
        match exchange.state {
            ExchangeState::Failed => println!("\n{}\n", answer),
            _ => println!("\n{}\n", render_ansi(&format_answer(answer))),
        }
    }

    async fn list_history(&mut self) {
        self.history.refresh().await;
        if let Some(error) = self.history.error() {
            println!("{}", error);
            return;
        }
        let entries = self.history.entries();
        if entries.is_empty() {
            println!("{}", EMPTY_HISTORY_NOTICE);
            return;
        }
        println!("Recent Conversations");
        for entry in entries {
            println!(
                "  [{}] {}  ({})",
                entry.id,
                entry.question,
                entry.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }

    fn open(&mut self, args: &[&str]) {
        let Some(id) = args.first().and_then(|arg| arg.parse::<i64>().ok()) else {
            println!("Usage: /open <id>");
            return;
        };
        if !self.history.select(id, &mut self.chat) {
            println!("No conversation {}. Try /history first.", id);
            return;
        }
        self.players.clear();
        for message in self.chat.messages() {
            println!("{}", render_ansi(&format_answer(&message.text)));
        }
    }

    async fn delete(&mut self, args: &[&str]) -> Result<()> {
        let Some(id) = args.first().and_then(|arg| arg.parse::<i64>().ok()) else {
            println!("Usage: /delete <id>");
            return Ok(());
        };
        println!("{} [y/N]", DELETE_CONFIRM_PROMPT);
        let answer = self.input.next_line().await?.unwrap_or_default();
        let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");

        match self.history.remove(id, &move |_: &str| confirmed).await {
            Ok(RemoveOutcome::Deleted) => println!("Deleted."),
            Ok(RemoveOutcome::AlreadyInProgress) => println!("Already deleting {}.", id),
            Err(ayur::AyurError::ConfirmationDeclined) => {}
            Err(_) => {
                if let Some(alert) = self.history.take_alert() {
                    println!("{}", alert);
                }
            }
        }
        Ok(())
    }

    fn listen(&mut self) {
        let Some(audio) = self.audio.clone() else {
            println!("Audio output is not available.");
            return;
        };
        let Some(message) = self.chat.messages().into_iter().rev().find(|m| m.is_playable()) else {
            println!("Nothing to play yet.");
            return;
        };
        let Some(source) = AudioSource::for_message(&message) else {
            return;
        };

        let player = self.players.entry(message.exchange_id).or_insert_with(|| {
            PlaybackController::new(
                audio,
                self.service.clone(),
                self.guard.handle(),
                &self.config,
            )
        });
        let outcome = player.toggle(source);
        if let Some(alert) = player.take_alert() {
            println!("{}", alert);
        } else {
            println!("{:?}", outcome);
        }
    }

    async fn suggest(&mut self, args: &[&str]) {
        match args.first().and_then(|arg| arg.parse::<usize>().ok()) {
            Some(n) if (1..=SUGGESTED_QUESTIONS.len()).contains(&n) => {
                self.ask(SUGGESTED_QUESTIONS[n - 1]).await;
            }
            _ => {
                for (i, question) in SUGGESTED_QUESTIONS.iter().enumerate() {
                    println!("  {}. {}", i + 1, question);
                }
                println!("Explore:");
                for (title, question) in EXPLORE_TOPICS {
                    println!("  {}: {}", title, question);
                }
            }
        }
    }

    /// Report events that arrived while waiting for input
    fn drain_background(&mut self) {
        for event in self.chat.poll_events() {
            if event == ChatEvent::RedirectToLogin {
                println!("Your session has ended. Please /login again.");
            }
        }
        for player in self.players.values_mut() {
            for event in player.poll_events() {
                match event {
                    PlaybackEvent::Started => println!("Playing."),
                    PlaybackEvent::Finished => println!("Playback finished."),
                    PlaybackEvent::Failed(alert) => println!("{}", alert),
                }
            }
        }
    }
}

#[cfg(feature = "audio-io")]
fn open_audio() -> Option<Arc<dyn AudioBackend>> {
    match ayur::audio::RodioBackend::new() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!("Audio output unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "audio-io"))]
fn open_audio() -> Option<Arc<dyn AudioBackend>> {
    warn!("Built without audio output");
    None
}
