use super::{AudioBackend, FinishedCallback, PlaybackHandle};
use crate::messages::AudioClip;
use crate::{AyurError, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;
use std::sync::{mpsc, Arc};
use tracing::{debug, info};

/// Plays clips on the default output device
pub struct RodioBackend {
    handle: OutputStreamHandle,
    // Dropping this ends the thread that owns the output stream
    _shutdown: mpsc::Sender<()>,
}

impl RodioBackend {
    /// Open the default output device
    pub fn new() -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        // OutputStream is not Send, so it stays on the thread that opened it
        std::thread::Builder::new()
            .name("ayur-audio-out".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Closed audio output");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(AyurError::AudioDevice(format!(
                        "No output device available: {}",
                        e
                    ))));
                }
            })
            .map_err(|e| AyurError::AudioDevice(format!("Failed to start audio thread: {}", e)))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| AyurError::AudioDevice("Audio thread exited early".into()))??;

        info!("Opened default audio output");
        Ok(Self {
            handle,
            _shutdown: shutdown_tx,
        })
    }
}

impl AudioBackend for RodioBackend {
    fn play(&self, clip: &AudioClip, on_finished: FinishedCallback) -> Result<Box<dyn PlaybackHandle>> {
        let source = Decoder::new(Cursor::new(clip.bytes.clone()))
            .map_err(|e| AyurError::Decode(format!("Unsupported {} audio: {}", clip.format, e)))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| AyurError::AudioDevice(format!("Failed to open sink: {}", e)))?;
        sink.append(source);

        let sink = Arc::new(sink);
        let watcher = Arc::clone(&sink);
        std::thread::spawn(move || {
            watcher.sleep_until_end();
            on_finished();
        });

        debug!("Playing {} bytes of {}", clip.bytes.len(), clip.format);
        Ok(Box::new(RodioPlayback { sink }))
    }
}

struct RodioPlayback {
    sink: Arc<Sink>,
}

impl PlaybackHandle for RodioPlayback {
    fn stop(self: Box<Self>) {
        self.sink.stop();
    }
}
