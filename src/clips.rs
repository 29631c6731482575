//! Saved clips — texts the user kept for later listening.
//!
//! Records are `{id, title, text, created_at}` and list newest first.
//! [`ClipStore`] keeps them in one JSON file next to the settings.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::segment::{generate_title, split_sentences};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Clip {
    /// New clip stamped now.  Without an explicit title, one is derived from
    /// the first sentence.
    pub fn new(title: Option<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_title(&text));
        Self { id: Uuid::new_v4(), title, text, created_at: Utc::now() }
    }
}

fn default_title(text: &str) -> String {
    split_sentences(text)
        .first()
        .map(|s| generate_title(s))
        .unwrap_or_else(|| "Untitled".to_string())
}

/// File-backed clip list.  The whole list is rewritten on every change,
/// which is fine for the handful of clips a reader keeps.
pub struct ClipStore {
    path: PathBuf,
    clips: Mutex<Vec<Clip>>,
}

impl ClipStore {
    /// Open (or start) the store at `path`.  A malformed file is logged and
    /// treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let clips = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("ignoring malformed clip file {}: {e}", path.display());
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, clips: Mutex::new(clips) })
    }

    pub fn create(&self, title: Option<String>, text: &str) -> Result<Clip> {
        let clip = Clip::new(title, text);
        let mut clips = self.clips.lock();
        clips.push(clip.clone());
        self.persist(&clips)?;
        debug!(id = %clip.id, title = %clip.title, "clip saved");
        Ok(clip)
    }

    /// All clips, newest first.
    pub fn list(&self) -> Vec<Clip> {
        let mut out = self.clips.lock().clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn get(&self, id: Uuid) -> Option<Clip> {
        self.clips.lock().iter().find(|c| c.id == id).cloned()
    }

    /// Returns `false` when no clip had that id.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let mut clips = self.clips.lock();
        let before = clips.len();
        clips.retain(|c| c.id != id);
        if clips.len() == before {
            return Ok(false);
        }
        self.persist(&clips)?;
        Ok(true)
    }

    fn persist(&self, clips: &[Clip]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(clips)?)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
