//! Listen control for one answer
//!
//! Toggle semantics: while playing, a toggle stops; while synthesizing, a
//! toggle abandons the synthesis; otherwise it starts. Stop, natural
//! completion and drop all go through `release`, so a handle is stopped
//! exactly once.

use super::{AudioBackend, FinishedCallback, PlaybackHandle};
use crate::api::{AnswerService, SpeechRequest};
use crate::integration::ClientConfig;
use crate::messages::{AudioClip, ChatMessage};
use crate::session::SessionHandle;
use crate::{AyurError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const PLAYBACK_FAILED_MESSAGE: &str = "Could not play audio. Please try again.";

/// What to play: text still to be synthesized, or ready audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Text(String),
    Clip(AudioClip),
}

impl AudioSource {
    /// Source for a message's listen control. Prefers audio delivered with
    /// the answer; error and user messages have none.
    pub fn for_message(message: &ChatMessage) -> Option<Self> {
        if !message.is_playable() {
            return None;
        }
        Some(match &message.audio {
            Some(clip) if !clip.is_empty() => AudioSource::Clip(clip.clone()),
            _ => AudioSource::Text(message.text.clone()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Synthesizing,
    Stopped,
    /// A synthesis in flight was abandoned
    Abandoned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Finished,
    Failed(String),
}

enum Phase {
    Idle,
    Synthesizing { task: JoinHandle<()> },
    Playing { handle: Box<dyn PlaybackHandle> },
}

enum Update {
    Synthesized {
        generation: u64,
        result: Result<AudioClip>,
    },
    Finished {
        generation: u64,
    },
}

pub struct PlaybackController {
    backend: Arc<dyn AudioBackend>,
    service: Arc<dyn AnswerService>,
    session: SessionHandle,
    language: String,
    speech_timeout: Duration,
    phase: Phase,
    /// Bumped on every release; updates from an earlier phase are ignored
    generation: u64,
    alert: Option<String>,
    updates_tx: UnboundedSender<Update>,
    updates_rx: UnboundedReceiver<Update>,
}

impl PlaybackController {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        service: Arc<dyn AnswerService>,
        session: SessionHandle,
        config: &ClientConfig,
    ) -> Self {
        let (updates_tx, updates_rx) = unbounded_channel();
        Self {
            backend,
            service,
            session,
            language: config.speech_language.clone(),
            speech_timeout: config.speech_timeout,
            phase: Phase::Idle,
            generation: 0,
            alert: None,
            updates_tx,
            updates_rx,
        }
    }

    pub fn toggle(&mut self, source: AudioSource) -> ToggleOutcome {
        match self.phase {
            Phase::Playing { .. } => {
                self.release();
                info!("Stopped playback");
                return ToggleOutcome::Stopped;
            }
            Phase::Synthesizing { .. } => {
                self.release();
                info!("Abandoned speech synthesis");
                return ToggleOutcome::Abandoned;
            }
            Phase::Idle => {}
        }

        self.alert = None;
        match source {
            AudioSource::Clip(clip) => self.play(clip),
            AudioSource::Text(text) => {
                self.synthesize(text);
                ToggleOutcome::Synthesizing
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.phase, Phase::Playing { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Synthesizing { .. })
    }

    /// Alert to show for the last failed attempt
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(update) = self.updates_rx.try_recv() {
            if let Some(event) = self.apply(update) {
                events.push(event);
            }
        }
        events
    }

    /// Wait for the next event; `None` when idle with nothing queued
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        while !matches!(self.phase, Phase::Idle) || !self.updates_rx.is_empty() {
            let update = self.updates_rx.recv().await?;
            if let Some(event) = self.apply(update) {
                return Some(event);
            }
        }
        None
    }

    fn play(&mut self, clip: AudioClip) -> ToggleOutcome {
        if clip.is_empty() {
            warn!("Refusing to play an empty clip");
            self.alert = Some(PLAYBACK_FAILED_MESSAGE.to_string());
            return ToggleOutcome::Failed;
        }

        let generation = self.generation;
        let updates = self.updates_tx.clone();
        let on_finished: FinishedCallback = Box::new(move || {
            let _ = updates.send(Update::Finished { generation });
        });

        match self.backend.play(&clip, on_finished) {
            Ok(handle) => {
                info!("Playing {} clip", clip.format);
                self.phase = Phase::Playing { handle };
                ToggleOutcome::Started
            }
            Err(e) => {
                error!("Failed to start playback: {}", e);
                self.alert = Some(PLAYBACK_FAILED_MESSAGE.to_string());
                ToggleOutcome::Failed
            }
        }
    }

    fn synthesize(&mut self, text: String) {
        let generation = self.generation;
        let session = self.session.clone();
        let service = self.service.clone();
        let limit = self.speech_timeout;
        let request = SpeechRequest {
            text,
            language: self.language.clone(),
        };
        let updates = self.updates_tx.clone();

        debug!("Requesting speech for {} characters", request.text.len());
        let task = tokio::spawn(async move {
            let result = session
                .authorized(|token| async move {
                    match tokio::time::timeout(limit, service.synthesize(&token, &request)).await {
                        Ok(result) => result,
                        Err(_) => Err(AyurError::Timeout(limit)),
                    }
                })
                .await;
            let _ = updates.send(Update::Synthesized { generation, result });
        });
        self.phase = Phase::Synthesizing { task };
    }

    fn apply(&mut self, update: Update) -> Option<PlaybackEvent> {
        match update {
            Update::Synthesized { generation, result } => {
                if generation != self.generation || !self.is_loading() {
                    debug!("Ignoring abandoned synthesis");
                    return None;
                }
                self.phase = Phase::Idle;
                match result {
                    Ok(clip) => match self.play(clip) {
                        ToggleOutcome::Started => Some(PlaybackEvent::Started),
                        _ => Some(PlaybackEvent::Failed(PLAYBACK_FAILED_MESSAGE.to_string())),
                    },
                    Err(e) => {
                        warn!("Speech synthesis failed: {}", e);
                        self.alert = Some(PLAYBACK_FAILED_MESSAGE.to_string());
                        Some(PlaybackEvent::Failed(PLAYBACK_FAILED_MESSAGE.to_string()))
                    }
                }
            }
            Update::Finished { generation } => {
                if generation != self.generation || !self.is_playing() {
                    return None;
                }
                self.release();
                info!("Playback finished");
                Some(PlaybackEvent::Finished)
            }
        }
    }

    fn release(&mut self) {
        self.generation += 1;
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Synthesizing { task } => task.abort(),
            Phase::Playing { handle } => {
                handle.stop();
                debug!("Released playback handle");
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}
