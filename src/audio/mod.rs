//! Spoken answers
//!
//! [`PlaybackController`] drives one "listen" control. Actual output goes
//! through an [`AudioBackend`]; the rodio device backend is compiled with the
//! `audio-io` feature.

#[cfg(feature = "audio-io")]
pub mod output;
pub mod playback;

#[cfg(feature = "audio-io")]
pub use output::RodioBackend;
pub use playback::{
    AudioSource, PlaybackController, PlaybackEvent, ToggleOutcome, PLAYBACK_FAILED_MESSAGE,
};

use crate::messages::AudioClip;
use crate::Result;

/// Called once when a clip plays to its end
pub type FinishedCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait AudioBackend: Send + Sync {
    /// Start playing `clip`. `on_finished` runs when playback ends, whether
    /// the clip completed or the handle was stopped.
    fn play(&self, clip: &AudioClip, on_finished: FinishedCallback) -> Result<Box<dyn PlaybackHandle>>;
}

/// Exclusive ownership of one playing clip
pub trait PlaybackHandle: Send {
    /// Halt output and release the device resources
    fn stop(self: Box<Self>);
}
