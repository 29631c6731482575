//! Voice catalogue: the remote synthesiser's fixed voice list and the
//! "best available" policy for on-device voices.

use serde::{Deserialize, Serialize};

use crate::settings::VoiceId;

// ─── Remote voices ───────────────────────────────────────────────────────────

/// `(id, label)` for every voice the remote synthesiser offers.
pub const REMOTE_VOICES: [(&str, &str); 7] = [
    ("en-US-Neural2-F", "Aria (F)"),
    ("en-US-Neural2-C", "Bella (F)"),
    ("en-US-Neural2-H", "Clara (F)"),
    ("en-US-Neural2-D", "David (M)"),
    ("en-US-Neural2-A", "Adam (M)"),
    ("en-US-Neural2-J", "James (M)"),
    ("en-US-Neural2-I", "Ian (M)"),
];

pub const DEFAULT_REMOTE_VOICE: &str = "en-US-Neural2-F";

pub fn default_remote_voice() -> VoiceId {
    VoiceId::new(DEFAULT_REMOTE_VOICE)
}

pub fn remote_label(id: &VoiceId) -> Option<&'static str> {
    REMOTE_VOICES
        .iter()
        .find(|(v, _)| *v == id.as_str())
        .map(|(_, label)| *label)
}

// ─── Device voices ───────────────────────────────────────────────────────────

/// Quality tier reported by the platform synthesiser.  Ordered low → high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceQuality {
    Default,
    Enhanced,
    Premium,
}

impl VoiceQuality {
    pub fn label(self) -> &'static str {
        match self {
            VoiceQuality::Default => "Default",
            VoiceQuality::Enhanced => "Enhanced",
            VoiceQuality::Premium => "Premium",
        }
    }
}

/// An on-device voice as reported by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: VoiceId,
    pub name: String,
    /// BCP-47 tag, e.g. `en-US`.
    pub language: String,
    pub quality: VoiceQuality,
}

/// English voices, best quality first, then by name.
pub fn english_voices(voices: &[VoiceInfo]) -> Vec<VoiceInfo> {
    let mut out: Vec<VoiceInfo> = voices
        .iter()
        .filter(|v| v.language.starts_with("en"))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.quality.cmp(&a.quality).then_with(|| a.name.cmp(&b.name)));
    out
}

/// Highest-quality `en-US` voice, else any English voice.
pub fn best_default(voices: &[VoiceInfo]) -> Option<VoiceId> {
    let ranked = english_voices(voices);
    ranked
        .iter()
        .find(|v| v.language.starts_with("en-US"))
        .or_else(|| ranked.first())
        .map(|v| v.id.clone())
}

/// Whether an enhanced or premium English voice is installed.
pub fn has_premium_voices(voices: &[VoiceInfo]) -> bool {
    voices
        .iter()
        .any(|v| v.language.starts_with("en") && v.quality >= VoiceQuality::Enhanced)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, name: &str, lang: &str, quality: VoiceQuality) -> VoiceInfo {
        VoiceInfo { id: VoiceId::new(id), name: name.into(), language: lang.into(), quality }
    }

    fn catalogue() -> Vec<VoiceInfo> {
        vec![
            voice("fr", "Amelie", "fr-FR", VoiceQuality::Premium),
            voice("gb", "Daniel", "en-GB", VoiceQuality::Premium),
            voice("us1", "Zoe", "en-US", VoiceQuality::Enhanced),
            voice("us2", "Alex", "en-US", VoiceQuality::Enhanced),
            voice("us3", "Fred", "en-US", VoiceQuality::Default),
        ]
    }

    #[test]
    fn test_english_voices_sorted() {
        let ids: Vec<String> = english_voices(&catalogue()).into_iter().map(|v| v.id.0).collect();
        assert_eq!(ids, vec!["gb", "us2", "us1", "us3"]);
    }

    #[test]
    fn test_best_default_prefers_us() {
        assert_eq!(best_default(&catalogue()), Some(VoiceId::new("us2")));
    }

    #[test]
    fn test_best_default_falls_back_to_any_english() {
        let v = vec![voice("au", "Karen", "en-AU", VoiceQuality::Default)];
        assert_eq!(best_default(&v), Some(VoiceId::new("au")));
        assert_eq!(best_default(&[]), None);
    }

    #[test]
    fn test_has_premium() {
        assert!(has_premium_voices(&catalogue()));
        assert!(!has_premium_voices(&[voice("x", "X", "en-US", VoiceQuality::Default)]));
    }

    #[test]
    fn test_remote_catalogue() {
        assert_eq!(remote_label(&default_remote_voice()), Some("Aria (F)"));
        assert_eq!(remote_label(&VoiceId::new("nope")), None);
    }
}
