//! # voicereader
//!
//! Sentence-by-sentence text-to-speech reader: the playback sequencing
//! engine behind a "read this to me" app on iOS, Android, and the web.
//!
//! Text is split into sentences and spoken one at a time through a pluggable
//! [`SpeechBackend`].  The engine tracks the current sentence, handles
//! transport (play / pause / resume / stop / skip / jump), restarts the
//! sentence on speed or voice changes, and estimates elapsed and remaining
//! time.  The [`Reader`] actor wraps it with a ticker, audio-interruption
//! handling, lock-screen metadata, and settings persistence.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use voicereader::backend::{event_channel, Completion, LocalSpeech, Synthesizer, Utterance};
//! use voicereader::{Reader, ReaderConfig, ReaderParts, Speed, SpeechSettings, VoiceId};
//!
//! struct Console;
//!
//! impl Synthesizer for Console {
//!     fn speak(&self, utterance: Utterance, done: Completion) {
//!         println!("{}", utterance.text);
//!         done.finished();
//!     }
//!     fn pause(&self) {}
//!     fn resume(&self) {}
//!     fn stop(&self) {}
//! }
//!
//! # #[tokio::main] async fn main() {
//! let (sink, events) = event_channel();
//! let backend = LocalSpeech::new(Arc::new(Console), sink);
//! let settings = SpeechSettings::new(VoiceId::new("en-US"), Speed::X1_25);
//! let parts = ReaderParts::new(Box::new(backend), events, settings);
//! let (reader, task) = Reader::spawn(&ReaderConfig::default(), parts);
//!
//! reader.load_text("First sentence. Second sentence!", true);
//! reader.shutdown();
//! task.await.ok();
//! # }
//! ```
//!
//! ## Speech strategies
//! | Backend                       | Audio source                          | Prefetch |
//! |-------------------------------|---------------------------------------|----------|
//! | [`LocalSpeech`](backend::LocalSpeech)   | on-device synthesiser         | —        |
//! | [`RemoteSpeech`](backend::RemoteSpeech) | `POST /api/tts` clips, local fallback | current + 3 |
//!
//! ## Mobile (iOS / Android)
//!
//! The `staticlib` exposes a C API ([`ffi`]) driven by host callbacks: the
//! host supplies the synthesiser, clip player, media session, and audio
//! session, and reports utterance completion back by request id.
//!
//! ## Server
//!
//! With the `server` feature the crate also builds `voicereader-server`, the
//! proxy that holds the cloud API keys ([`server`]).

pub mod backend;
pub mod clips;
pub mod config;
pub mod engine;
pub mod error;

// C FFI for iOS / Android: voicereader_reader_new / load / play / … / free.
pub mod ffi;

pub mod http;
pub mod interruption;
pub mod now_playing;
pub mod reader;
pub mod segment;
pub mod session;
pub mod settings;
pub mod tables;
pub mod voices;

#[cfg(feature = "server")]
pub mod server;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use backend::{SpeechBackend, SpeechEvent, SpeechOutcome};
pub use config::ReaderConfig;
pub use engine::{PauseReason, PlaybackEngine, PlaybackState, Snapshot};
pub use error::{ReaderError, Result};
pub use reader::{LoadRequest, Reader, ReaderHandle, ReaderParts};
pub use segment::split_sentences;
pub use settings::{Speed, SpeechSettings, VoiceId};
