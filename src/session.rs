//! Host audio-session lifecycle and the background keep-alive clip.
//!
//! Mobile hosts must hold an active playback audio session while reading,
//! and release it when playback ends.  [`SessionLifecycle`] turns engine
//! state changes into exactly one `activate` / `deactivate` per playback run.

use std::io::Cursor;
use std::time::Duration;

use tracing::debug;

use crate::engine::PlaybackState;
use crate::error::Result;

pub trait AudioSession: Send {
    fn activate(&mut self);
    fn deactivate(&mut self);
}

/// For hosts that manage the audio session themselves.
#[derive(Debug, Default)]
pub struct NoAudioSession;

impl AudioSession for NoAudioSession {
    fn activate(&mut self) {}
    fn deactivate(&mut self) {}
}

pub struct SessionLifecycle {
    session: Box<dyn AudioSession>,
    active: bool,
}

impl SessionLifecycle {
    pub fn new(session: Box<dyn AudioSession>) -> Self {
        Self { session, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Follow the engine: active while playing or paused, released once
    /// idle or finished.
    pub fn sync(&mut self, state: PlaybackState) {
        let want = matches!(state, PlaybackState::Playing | PlaybackState::Paused);
        if want == self.active {
            return;
        }
        if want {
            debug!("activating audio session");
            self.session.activate();
        } else {
            debug!("deactivating audio session");
            self.session.deactivate();
        }
        self.active = want;
    }
}

/// A silent 16-bit mono PCM WAV held in memory.  Looped by hosts to keep
/// the app alive in the background between sentences.
pub fn silent_wav(duration: Duration, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let samples = (duration.as_secs_f64() * f64::from(sample_rate)).round() as u64;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub(crate) struct CountingSession {
        pub log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl AudioSession for CountingSession {
        fn activate(&mut self) {
            self.log.lock().push("activate");
        }
        fn deactivate(&mut self) {
            self.log.lock().push("deactivate");
        }
    }

    #[test]
    fn test_lifecycle_one_call_per_run() {
        let s = CountingSession::default();
        let mut l = SessionLifecycle::new(Box::new(s.clone()));
        l.sync(PlaybackState::Idle);
        l.sync(PlaybackState::Playing);
        l.sync(PlaybackState::Paused);
        l.sync(PlaybackState::Playing);
        assert!(l.is_active());
        l.sync(PlaybackState::Finished);
        l.sync(PlaybackState::Idle);
        assert_eq!(*s.log.lock(), vec!["activate", "deactivate"]);
    }

    #[test]
    fn test_silent_wav() {
        let bytes = silent_wav(Duration::from_millis(500), 8000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.len(), 4000);
        assert!(reader.into_samples::<i16>().all(|s| s.unwrap() == 0));
    }
}
