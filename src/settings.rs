//! Speech settings — the voice and the speed multiplier — and their
//! persistence across sessions.
//!
//! These are the only two user settings.  They live in a small JSON file;
//! a missing or unreadable file falls back to defaults rather than failing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReaderError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Speed
// ─────────────────────────────────────────────────────────────────────────────

/// Playback speed, restricted to the fixed set offered by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum Speed {
    X0_75,
    #[default]
    X1_0,
    X1_25,
    X1_5,
    X1_75,
    X2_0,
}

/// `(speed, multiplier, native synthesiser rate)`.
///
/// Platform synthesiser rates are non-linear: the perceptual "1x" sits at
/// 0.50 on the 0.0–1.0 native scale and doubling speed is only ~0.59.
const RATE_TABLE: [(Speed, f32, f32); 6] = [
    (Speed::X0_75, 0.75, 0.42),
    (Speed::X1_0, 1.0, 0.50),
    (Speed::X1_25, 1.25, 0.52),
    (Speed::X1_5, 1.5, 0.545),
    (Speed::X1_75, 1.75, 0.565),
    (Speed::X2_0, 2.0, 0.59),
];

impl Speed {
    pub const ALL: [Speed; 6] = [
        Speed::X0_75,
        Speed::X1_0,
        Speed::X1_25,
        Speed::X1_5,
        Speed::X1_75,
        Speed::X2_0,
    ];

    fn row(self) -> (Speed, f32, f32) {
        RATE_TABLE[self as usize]
    }

    pub fn multiplier(self) -> f32 {
        self.row().1
    }

    /// Rate on the native synthesiser's 0.0–1.0 scale.
    pub fn native_rate(self) -> f32 {
        self.row().2
    }

    pub fn from_multiplier(multiplier: f32) -> Option<Speed> {
        RATE_TABLE
            .iter()
            .find(|(_, m, _)| (m - multiplier).abs() < 1e-3)
            .map(|(s, _, _)| *s)
    }

    pub fn label(self) -> String {
        format!("{}x", self.multiplier())
    }
}

impl TryFrom<f32> for Speed {
    type Error = ReaderError;

    fn try_from(value: f32) -> Result<Self> {
        Speed::from_multiplier(value).ok_or(ReaderError::InvalidSpeed(value))
    }
}

impl From<Speed> for f32 {
    fn from(speed: Speed) -> f32 {
        speed.multiplier()
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice identifier
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque voice identifier, resolved by whichever backend speaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SpeechSettings + store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSettings {
    pub voice: VoiceId,
    #[serde(default)]
    pub speed: Speed,
}

impl SpeechSettings {
    pub fn new(voice: VoiceId, speed: Speed) -> Self {
        Self { voice, speed }
    }
}

/// JSON-file persistence for [`SpeechSettings`].
pub struct SettingsStore {
    path: PathBuf,
    default_voice: VoiceId,
}

impl SettingsStore {
    /// `default_voice` is used when nothing has been persisted yet; pick it
    /// with [`crate::voices::best_default`] or the remote catalogue default.
    pub fn new(path: impl Into<PathBuf>, default_voice: VoiceId) -> Self {
        Self { path: path.into(), default_voice }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> SpeechSettings {
        SpeechSettings::new(self.default_voice.clone(), Speed::default())
    }

    /// Load persisted settings, or defaults when absent or unreadable.
    pub fn load(&self) -> SpeechSettings {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.defaults(),
            Err(e) => {
                warn!("cannot read settings {}: {e}", self.path.display());
                return self.defaults();
            }
        };
        match serde_json::from_slice::<SpeechSettings>(&bytes) {
            Ok(mut s) => {
                if s.voice.as_str().is_empty() {
                    s.voice = self.default_voice.clone();
                }
                s
            }
            Err(e) => {
                warn!("ignoring malformed settings {}: {e}", self.path.display());
                self.defaults()
            }
        }
    }

    pub fn save(&self, settings: &SpeechSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(settings)?;
        std::fs::write(&self.path, json)?;
        debug!(voice = %settings.voice, speed = %settings.speed, "settings saved");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
