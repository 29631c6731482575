//! Sentence-by-sentence playback state machine.
//!
//! ```text
//! Idle ──play──▶ Playing ◀──resume/pause──▶ Paused
//!                   │ last sentence finished
//!                   ▼
//!                Finished ──play──▶ Playing      (stop: any → Idle)
//! ```
//!
//! The engine is synchronous and owns no tasks.  It issues speak requests to
//! a [`SpeechBackend`] and learns how they ended through
//! [`PlaybackEngine::on_speech_event`].  Each request carries a fresh
//! [`RequestId`]; only the completion of the outstanding request may advance
//! playback, so a late "finished" from a request that a skip, jump, or
//! settings change already replaced is dropped.
//!
//! Out-of-state calls (`skip_forward` while idle, `jump_to` past the end…) are
//! no-ops.  Nothing here returns an error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::backend::{RequestId, SpeakRequest, SpeechBackend, SpeechEvent, SpeechOutcome};
use crate::segment::{estimate_remaining, DEFAULT_WORDS_PER_MINUTE};
use crate::settings::{Speed, SpeechSettings, VoiceId};

/// How far `skip5_forward` jumps.
pub const SKIP_STRIDE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

/// Why playback is paused.  Only [`PauseReason::Interruption`] may be
/// auto-resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    User,
    Interruption,
    RouteChange,
}

/// Everything a UI needs to render the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub current_index: Option<usize>,
    pub total: usize,
    pub current_sentence: Option<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    #[serde(rename = "remaining_secs", serialize_with = "as_secs")]
    pub remaining: Duration,
    pub speed: Speed,
    pub voice: VoiceId,
    pub pause_reason: Option<PauseReason>,
    pub degraded: bool,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

pub struct PlaybackEngine {
    backend: Box<dyn SpeechBackend>,
    sentences: Arc<[String]>,
    state: PlaybackState,
    current: Option<usize>,
    elapsed: Duration,
    settings: SpeechSettings,
    pause_reason: Option<PauseReason>,
    outstanding: Option<RequestId>,
    next_id: u64,
    words_per_minute: f64,
}

impl PlaybackEngine {
    pub fn new(backend: Box<dyn SpeechBackend>, settings: SpeechSettings) -> Self {
        Self {
            backend,
            sentences: Arc::from(Vec::new()),
            state: PlaybackState::Idle,
            current: None,
            elapsed: Duration::ZERO,
            settings,
            pause_reason: None,
            outstanding: None,
            next_id: 1,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }

    pub fn with_words_per_minute(mut self, wpm: f64) -> Self {
        self.words_per_minute = wpm;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// `None` while `Idle` or `Finished`.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn current_sentence(&self) -> Option<&str> {
        self.current.and_then(|i| self.sentences.get(i)).map(String::as_str)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Estimated time left for the sentences not yet spoken, at the current
    /// speed.  Before playback starts this covers the whole text.
    pub fn remaining(&self) -> Duration {
        if self.state == PlaybackState::Finished {
            return Duration::ZERO;
        }
        estimate_remaining(
            &self.sentences,
            self.current.unwrap_or(0),
            self.words_per_minute,
            self.settings.speed.multiplier(),
        )
    }

    pub fn settings(&self) -> &SpeechSettings {
        &self.settings
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    pub fn is_degraded(&self) -> bool {
        self.backend.is_degraded()
    }

    pub fn outstanding_request(&self) -> Option<RequestId> {
        self.outstanding
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            current_index: self.current,
            total: self.sentences.len(),
            current_sentence: self.current_sentence().map(str::to_string),
            elapsed: self.elapsed,
            remaining: self.remaining(),
            speed: self.settings.speed,
            voice: self.settings.voice.clone(),
            pause_reason: self.pause_reason,
            degraded: self.is_degraded(),
        }
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Replace the sentence list and reset the session to `Idle`.  Returns
    /// `false` (and changes nothing) when the same list is loaded again while
    /// idle.
    pub fn load_text(&mut self, sentences: Vec<String>) -> bool {
        if self.state == PlaybackState::Idle && *self.sentences == *sentences {
            return false;
        }
        self.cancel_outstanding();
        self.sentences = Arc::from(sentences);
        self.backend.load(self.sentences.clone());
        self.reset(PlaybackState::Idle);
        info!(sentences = self.sentences.len(), "text loaded");
        true
    }

    // ── Transport ───────────────────────────────────────────────────────────

    pub fn play(&mut self) {
        if self.sentences.is_empty() {
            return;
        }
        if self.state == PlaybackState::Paused {
            self.resume();
            return;
        }
        self.state = PlaybackState::Playing;
        self.elapsed = Duration::ZERO;
        self.pause_reason = None;
        self.speak_at(0);
    }

    /// User pause.
    pub fn pause(&mut self) {
        // A user pause during an interruption must not be auto-resumed later.
        if self.state == PlaybackState::Paused && self.pause_reason == Some(PauseReason::Interruption) {
            self.pause_reason = Some(PauseReason::User);
            return;
        }
        self.pause_for(PauseReason::User);
    }

    pub fn pause_for(&mut self, reason: PauseReason) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if self.outstanding.is_some() {
            self.backend.pause_current();
        }
        self.state = PlaybackState::Paused;
        self.pause_reason = Some(reason);
        debug!(?reason, index = ?self.current, "paused");
    }

    pub fn resume(&mut self) {
        if self.state != PlaybackState::Paused {
            return;
        }
        self.state = PlaybackState::Playing;
        self.pause_reason = None;
        match (self.outstanding, self.current) {
            (Some(_), _) => self.backend.resume_current(),
            // The sentence ended while paused; start the next one fresh.
            (None, Some(index)) => self.speak_at(index),
            (None, None) => {}
        }
        debug!(index = ?self.current, "resumed");
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Idle | PlaybackState::Finished => self.play(),
        }
    }

    pub fn stop(&mut self) {
        if self.state == PlaybackState::Idle {
            return;
        }
        self.cancel_outstanding();
        self.reset(PlaybackState::Idle);
        debug!("stopped");
    }

    // ── Navigation (only while playing) ─────────────────────────────────────

    pub fn skip_forward(&mut self) {
        if let Some(i) = self.playing_index() {
            if i + 1 < self.sentences.len() {
                self.speak_at(i + 1);
            }
        }
    }

    pub fn skip_back(&mut self) {
        if let Some(i) = self.playing_index() {
            if i > 0 {
                self.speak_at(i - 1);
            }
        }
    }

    pub fn skip5_forward(&mut self) {
        if let Some(i) = self.playing_index() {
            let target = (i + SKIP_STRIDE).min(self.sentences.len() - 1);
            if target != i {
                self.speak_at(target);
            }
        }
    }

    pub fn jump_to(&mut self, index: usize) {
        if self.playing_index().is_some() && index < self.sentences.len() {
            self.speak_at(index);
        }
    }

    // ── Settings ────────────────────────────────────────────────────────────

    pub fn change_speed(&mut self, speed: Speed) {
        self.settings.speed = speed;
        self.settings_changed();
    }

    pub fn change_voice(&mut self, voice: VoiceId) {
        self.settings.voice = voice;
        self.settings_changed();
    }

    fn settings_changed(&mut self) {
        self.backend.settings_changed();
        if let Some(i) = self.playing_index() {
            self.speak_at(i);
        }
    }

    // ── Backend events and time ─────────────────────────────────────────────

    pub fn on_speech_event(&mut self, event: SpeechEvent) {
        if self.outstanding != Some(event.request) {
            debug!(request = ?event.request, outcome = ?event.outcome, "ignoring superseded completion");
            return;
        }
        self.outstanding = None;
        match event.outcome {
            SpeechOutcome::Finished => self.advance(),
            SpeechOutcome::Failed(reason) => {
                warn!(index = ?self.current, "sentence failed, skipping: {reason}");
                self.advance();
            }
            // The backend dropped the live sentence on its own.  Hold the
            // position as a user pause; `resume` speaks it again.
            SpeechOutcome::Canceled => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                    self.pause_reason = Some(PauseReason::User);
                    debug!(index = ?self.current, "live sentence canceled by backend, paused");
                }
            }
        }
    }

    /// Accumulate elapsed time; ignored unless playing.
    pub fn tick(&mut self, dt: Duration) {
        if self.state == PlaybackState::Playing {
            self.elapsed += dt;
        }
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn playing_index(&self) -> Option<usize> {
        match self.state {
            PlaybackState::Playing => self.current,
            _ => None,
        }
    }

    fn advance(&mut self) {
        let Some(i) = self.current else { return };
        let next = i + 1;
        if next >= self.sentences.len() {
            info!("reached end of text");
            self.reset(PlaybackState::Finished);
            return;
        }
        match self.state {
            PlaybackState::Playing => self.speak_at(next),
            // Picked up by resume().
            PlaybackState::Paused => self.current = Some(next),
            PlaybackState::Idle | PlaybackState::Finished => {}
        }
    }

    /// Supersede whatever is in flight and speak sentence `index`.
    fn speak_at(&mut self, index: usize) {
        self.cancel_outstanding();
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.current = Some(index);
        self.outstanding = Some(id);
        debug!(?id, index, "speak");
        self.backend.speak(SpeakRequest {
            id,
            index,
            text: self.sentences[index].clone(),
            voice: self.settings.voice.clone(),
            speed: self.settings.speed,
        });
    }

    fn cancel_outstanding(&mut self) {
        if let Some(id) = self.outstanding.take() {
            debug!(?id, "cancel");
            self.backend.cancel_current();
        }
    }

    fn reset(&mut self, state: PlaybackState) {
        self.state = state;
        self.current = None;
        self.elapsed = Duration::ZERO;
        self.pause_reason = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
