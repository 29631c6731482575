//! The speech backend capability consumed by the playback engine.
//!
//! The engine only ever talks to a [`SpeechBackend`]: "speak this sentence",
//! "pause", "resume", "cancel".  Every speak request carries a [`RequestId`];
//! the backend reports how it ended through an [`EventSink`] as a
//! [`SpeechEvent`] tagged with that id, so the engine can tell a natural
//! completion from the late echo of a request it already superseded.
//!
//! ## Strategies
//! | Strategy                   | Module     | Notes                                        |
//! |----------------------------|------------|----------------------------------------------|
//! | Device synthesiser         | [`local`]  | native pause/resume, immediate cancel        |
//! | Remote clips + prefetch    | [`remote`] | falls back to the device voice per sentence  |

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;
use crate::settings::{Speed, VoiceId};

pub mod cache;
pub mod local;
pub mod remote;

pub use local::LocalSpeech;
pub use remote::RemoteSpeech;

// ─────────────────────────────────────────────────────────────────────────────
// Requests and events
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of one speak request.  Monotonic per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

/// "Speak sentence `index`" with the settings in force when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    pub id: RequestId,
    pub index: usize,
    pub text: String,
    pub voice: VoiceId,
    pub speed: Speed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    Finished,
    Failed(String),
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechEvent {
    pub request: RequestId,
    pub outcome: SpeechOutcome,
}

/// Sending half of the completion channel handed to backends.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<SpeechEvent>);

impl EventSink {
    pub fn send(&self, request: RequestId, outcome: SpeechOutcome) {
        trace!(?request, ?outcome, "speech event");
        // The reader may already be gone during teardown.
        let _ = self.0.send(SpeechEvent { request, outcome });
    }

    /// Completion handle for `request`.
    pub fn completion(&self, request: RequestId) -> Completion {
        Completion { request, sink: self.clone() }
    }
}

/// Create the completion channel: the sink goes to the backend, the
/// receiver to the reader that owns the engine.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<SpeechEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink(tx), rx)
}

/// One-shot report for a single utterance or clip.  Consumed on use so a
/// request can only end once.
#[must_use = "a dropped completion means the engine never hears how the request ended"]
#[derive(Debug)]
pub struct Completion {
    request: RequestId,
    sink: EventSink,
}

impl Completion {
    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn finished(self) {
        self.sink.send(self.request, SpeechOutcome::Finished);
    }

    pub fn failed(self, reason: impl Into<String>) {
        self.sink.send(self.request, SpeechOutcome::Failed(reason.into()));
    }

    pub fn canceled(self) {
        self.sink.send(self.request, SpeechOutcome::Canceled);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// What the engine drives.  Calls never block; outcomes arrive later through
/// the [`EventSink`] the backend was built with.
pub trait SpeechBackend: Send {
    /// New text was loaded.  Drop everything tied to the previous one.
    fn load(&mut self, _sentences: Arc<[String]>) {}

    fn speak(&mut self, request: SpeakRequest);

    /// Pause mid-utterance (not cancel).
    fn pause_current(&mut self);

    fn resume_current(&mut self);

    fn cancel_current(&mut self);

    /// Voice or speed changed; anything rendered with the old ones is stale.
    fn settings_changed(&mut self) {}

    /// `true` while running in reduced-quality fallback mode.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Text handed to a device synthesiser.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: VoiceId,
    pub speed: Speed,
}

impl Utterance {
    /// Rate on the native 0.0–1.0 synthesiser scale.
    pub fn native_rate(&self) -> f32 {
        self.speed.native_rate()
    }
}

impl From<&SpeakRequest> for Utterance {
    fn from(r: &SpeakRequest) -> Self {
        Self { text: r.text.clone(), voice: r.voice.clone(), speed: r.speed }
    }
}

/// The platform's on-device voice (AVSpeechSynthesizer, Android
/// TextToSpeech, Web Speech…).  One utterance at a time.
pub trait Synthesizer: Send + Sync {
    fn speak(&self, utterance: Utterance, done: Completion);
    fn pause(&self);
    fn resume(&self);
    /// Stop immediately.  The pending completion may still fire; the engine
    /// ignores it.
    fn stop(&self);
}

/// Plays a pre-rendered audio clip (opaque bytes, e.g. MP3).
pub trait ClipPlayer: Send + Sync {
    fn play(&self, clip: Bytes, done: Completion);
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
}

/// Lowest / highest speaking rate the remote synthesiser accepts.
pub const REMOTE_SPEED_RANGE: (f32, f32) = (0.25, 4.0);

/// Wire body of a remote synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

impl ClipRequest {
    /// Out-of-range speeds are clamped, not rejected.
    pub fn new(text: impl Into<String>, voice: &VoiceId, speed: f32) -> Self {
        let (lo, hi) = REMOTE_SPEED_RANGE;
        Self { text: text.into(), voice: voice.as_str().to_string(), speed: speed.clamp(lo, hi) }
    }
}

/// Fetches one rendered clip from the remote synthesis service.
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    async fn fetch(&self, request: &ClipRequest) -> Result<Bytes>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_reports_once() {
        let (sink, mut rx) = event_channel();
        sink.completion(RequestId(7)).finished();
        sink.completion(RequestId(8)).failed("boom");
        assert_eq!(
            rx.try_recv().unwrap(),
            SpeechEvent { request: RequestId(7), outcome: SpeechOutcome::Finished }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SpeechEvent { request: RequestId(8), outcome: SpeechOutcome::Failed("boom".into()) }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (sink, rx) = event_channel();
        drop(rx);
        sink.completion(RequestId(1)).canceled();
    }

    #[test]
    fn test_clip_request_clamps_speed() {
        let v = VoiceId::new("v");
        assert_eq!(ClipRequest::new("t", &v, 9.0).speed, 4.0);
        assert_eq!(ClipRequest::new("t", &v, 0.1).speed, 0.25);
        assert_eq!(ClipRequest::new("t", &v, 1.5).speed, 1.5);
    }

    #[test]
    fn test_utterance_rate() {
        let r = SpeakRequest {
            id: RequestId(1),
            index: 0,
            text: "Hi.".into(),
            voice: VoiceId::new("v"),
            speed: Speed::X2_0,
        };
        assert_eq!(Utterance::from(&r).native_rate(), 0.59);
    }
}
