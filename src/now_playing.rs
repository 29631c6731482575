//! Lock-screen / media-centre integration.
//!
//! [`NowPlaying`] mirrors the engine into the host's media session (title,
//! position, playing flag) and routes hardware and lock-screen buttons back
//! into engine calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{PlaybackEngine, PlaybackState, Snapshot};
use crate::segment::generate_title;

pub const ARTIST: &str = "Voice Reader";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    /// 0-based index of the sentence being read.
    pub index: usize,
    pub total: usize,
    pub is_playing: bool,
}

impl NowPlayingInfo {
    /// `None` when no sentence is active (idle or finished).
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let index = snapshot.current_index?;
        let sentence = snapshot.current_sentence.as_deref()?;
        Some(Self {
            title: generate_title(sentence),
            artist: ARTIST.to_string(),
            index,
            total: snapshot.total,
            is_playing: snapshot.state == PlaybackState::Playing,
        })
    }

    /// `"3 of 12"`.
    pub fn position_label(&self) -> String {
        format!("{} of {}", self.index + 1, self.total)
    }
}

/// The platform media session (MPNowPlayingInfoCenter, MediaSession, SMTC…).
pub trait MediaSession: Send {
    fn publish(&mut self, info: &NowPlayingInfo);
    fn clear(&mut self);
}

/// Session that shows nothing, for hosts without a media centre.
#[derive(Debug, Default)]
pub struct NoMediaSession;

impl MediaSession for NoMediaSession {
    fn publish(&mut self, _info: &NowPlayingInfo) {}
    fn clear(&mut self) {}
}

/// Buttons the media session can send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    NextTrack,
    PreviousTrack,
}

pub struct NowPlaying {
    session: Box<dyn MediaSession>,
    published: bool,
}

impl NowPlaying {
    pub fn new(session: Box<dyn MediaSession>) -> Self {
        Self { session, published: false }
    }

    /// Publish the current sentence, or clear the session when nothing is
    /// active.  Called after every transport change.
    pub fn sync(&mut self, snapshot: &Snapshot) {
        match NowPlayingInfo::from_snapshot(snapshot) {
            Some(info) => {
                self.session.publish(&info);
                self.published = true;
            }
            None if self.published => {
                debug!("clearing now-playing info");
                self.session.clear();
                self.published = false;
            }
            None => {}
        }
    }

    pub fn clear(&mut self) {
        self.session.clear();
        self.published = false;
    }

    /// `Play` never restarts a reading in progress: it resumes a paused one
    /// and only starts from the top when nothing is playing.
    pub fn dispatch(command: RemoteCommand, engine: &mut PlaybackEngine) {
        debug!(?command, "remote command");
        match command {
            RemoteCommand::Play => match engine.state() {
                PlaybackState::Playing => {}
                PlaybackState::Paused => engine.resume(),
                PlaybackState::Idle | PlaybackState::Finished => engine.play(),
            },
            RemoteCommand::Pause => engine.pause(),
            RemoteCommand::TogglePlayPause => engine.toggle_play_pause(),
            RemoteCommand::NextTrack => engine.skip_forward(),
            RemoteCommand::PreviousTrack => engine.skip_back(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
