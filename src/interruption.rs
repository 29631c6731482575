//! Reacts to audio interruptions and output-route changes reported by the
//! host platform.
//!
//! Phone calls, alarms and other apps taking audio focus arrive as
//! [`AudioSignal::InterruptionBegan`] / [`AudioSignal::InterruptionEnded`].
//! Unplugging headphones arrives as a route change with
//! [`RouteChangeReason::OldDeviceUnavailable`].  Both pause a playing engine.
//! Only a pause caused by an interruption is resumed automatically, and only
//! when the platform hints that resuming is appropriate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{PauseReason, PlaybackEngine, PlaybackState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteChangeReason {
    /// The device audio was playing on went away (headphones unplugged,
    /// Bluetooth disconnected).
    OldDeviceUnavailable,
    NewDeviceAvailable,
    CategoryChange,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioSignal {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    RouteChanged { reason: RouteChangeReason },
}

#[derive(Debug, Default)]
pub struct InterruptionCoordinator {
    interrupted: bool,
}

impl InterruptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` between an interruption's begin and end.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Apply one platform signal to the engine.  Signals are accepted in any
    /// state; irrelevant ones are no-ops.
    pub fn handle(&mut self, signal: AudioSignal, engine: &mut PlaybackEngine) {
        debug!(?signal, state = ?engine.state(), "audio signal");
        match signal {
            AudioSignal::InterruptionBegan => {
                self.interrupted = true;
                engine.pause_for(PauseReason::Interruption);
            }
            AudioSignal::InterruptionEnded { should_resume } => {
                self.interrupted = false;
                if should_resume
                    && engine.state() == PlaybackState::Paused
                    && engine.pause_reason() == Some(PauseReason::Interruption)
                {
                    engine.resume();
                }
            }
            AudioSignal::RouteChanged { reason: RouteChangeReason::OldDeviceUnavailable } => {
                engine.pause_for(PauseReason::RouteChange);
            }
            AudioSignal::RouteChanged { .. } => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
