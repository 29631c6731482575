//! Runtime configuration.
//!
//! [`ReaderConfig`] tunes the reader and points it at the remote services;
//! every field has a default, so an empty JSON object is a valid config.
//! [`ServerConfig`] is the proxy binary's command line (feature `server`).

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::backend::remote::DEFAULT_PREFETCH_WINDOW;
use crate::segment::DEFAULT_WORDS_PER_MINUTE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Sentences fetched ahead of the one being played (remote clips only).
    pub prefetch_window: usize,
    pub tick_interval_ms: u64,
    pub words_per_minute: f64,
    /// `POST {text, voice, speed}` → audio bytes.  Enables remote clips.
    pub tts_endpoint: Option<String>,
    /// `POST {tables}` → `{conversions}`.  Enables table rewriting.
    pub preprocess_endpoint: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
            tick_interval_ms: 500,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            tts_endpoint: None,
            preprocess_endpoint: None,
        }
    }
}

impl ReaderConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(feature = "server")]
pub use server_config::ServerConfig;

#[cfg(feature = "server")]
mod server_config {
    use clap::Parser;

    pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
    pub const GEMINI_URL: &str =
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

    #[derive(Debug, Clone, Parser)]
    #[command(name = "voicereader-server", about = "Speech synthesis and table rewrite proxy", version)]
    pub struct ServerConfig {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        pub host: String,

        #[arg(short, long, env = "PORT", default_value_t = 3000)]
        pub port: u16,

        #[arg(long, env = "GOOGLE_CLOUD_API_KEY", hide_env_values = true)]
        pub google_api_key: Option<String>,

        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        pub gemini_api_key: Option<String>,

        #[arg(long, env = "GOOGLE_TTS_URL", default_value = GOOGLE_TTS_URL)]
        pub tts_url: String,

        #[arg(long, env = "GEMINI_URL", default_value = GEMINI_URL)]
        pub gemini_url: String,
    }

    impl ServerConfig {
        pub fn bind_addr(&self) -> String {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ReaderConfig::default();
        assert_eq!(c.prefetch_window, 3);
        assert_eq!(c.tick_interval(), Duration::from_millis(500));
        assert_eq!(c.words_per_minute, 160.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.json");
        std::fs::write(&path, r#"{"prefetch_window": 5, "tts_endpoint": "http://x/api/tts"}"#).unwrap();
        let c = ReaderConfig::from_file(&path).unwrap();
        assert_eq!(c.prefetch_window, 5);
        assert_eq!(c.tick_interval_ms, 500);
        assert_eq!(c.tts_endpoint.as_deref(), Some("http://x/api/tts"));
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(ReaderConfig::from_file(Path::new("/nonexistent/reader.json")).is_err());
    }
}
