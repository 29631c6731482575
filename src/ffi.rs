//! C FFI — lets iOS / Android hosts embed the reader.
//!
//! Functions are `#[no_mangle] extern "C"` so Swift / Kotlin can call them
//! through a thin bridging header.  The host supplies its platform pieces
//! (device synthesiser, clip player, media centre, audio session) as a
//! [`VoiceReaderCallbacks`] table; the reader calls back into them from its
//! own worker thread, so every callback must be thread-safe.
//!
//! Speech completions travel the other way: when the host's synthesiser or
//! player finishes the request it was given, it reports the request id with
//! [`voicereader_utterance_finished`] / [`voicereader_utterance_failed`].
//!
//! ## Memory contract
//!
//! | Function                           | Caller frees with             |
//! |------------------------------------|-------------------------------|
//! | [`voicereader_reader_new`]         | [`voicereader_reader_free`]   |
//! | [`voicereader_reader_snapshot`]    | [`voicereader_free_string`]   |
//! | [`voicereader_split_sentences`]    | [`voicereader_free_string`]   |
//! | [`voicereader_silent_wav`]         | [`voicereader_free_bytes`]    |
//! | [`voicereader_remote_voices`]      | [`voicereader_free_string`]   |
//! | [`voicereader_english_voices`]     | [`voicereader_free_string`]   |
//! | [`voicereader_best_voice`]         | [`voicereader_free_string`]   |
//! | [`voicereader_clips_open`]         | [`voicereader_clips_free`]    |
//! | `voicereader_clips_create/list/get`| [`voicereader_free_string`]   |

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Runtime;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{
    event_channel, ClipPlayer, Completion, LocalSpeech, RemoteSpeech, RequestId,
    SpeechBackend, SpeechOutcome, Synthesizer, Utterance,
};
use crate::clips::ClipStore;
use crate::config::ReaderConfig;
use crate::engine::Snapshot;
use crate::http::{HttpClipFetcher, HttpTableRewriter};
use crate::interruption::{AudioSignal, RouteChangeReason};
use crate::now_playing::{MediaSession, NowPlayingInfo, RemoteCommand};
use crate::reader::{LoadRequest, Reader, ReaderHandle, ReaderParts};
use crate::segment::{format_clock, split_sentences};
use crate::session::{silent_wav, AudioSession};
use crate::settings::{SettingsStore, Speed, SpeechSettings, VoiceId};
use crate::voices::{best_default, english_voices, has_premium_voices, remote_label, VoiceInfo, REMOTE_VOICES};

// ─────────────────────────────────────────────────────────────────────────────
// Host callbacks
// ─────────────────────────────────────────────────────────────────────────────

pub type VoidFn = unsafe extern "C" fn(context: *mut c_void);

/// Speak `text` with `voice` at `rate` (native 0.0–1.0 scale) and report
/// `request` when done.
pub type SpeakFn = unsafe extern "C" fn(
    context: *mut c_void,
    request: u64,
    text: *const c_char,
    voice: *const c_char,
    rate: f32,
);

/// Play `len` bytes of encoded audio and report `request` when done.  The
/// buffer is only valid for the duration of the call.
pub type PlayClipFn =
    unsafe extern "C" fn(context: *mut c_void, request: u64, data: *const u8, len: usize);

/// Publish now-playing JSON, or clear the media centre when `json` is `NULL`.
pub type PublishFn = unsafe extern "C" fn(context: *mut c_void, json: *const c_char);

/// Host implementation table.  Any entry may be `NULL`; the matching action
/// is then skipped.  Supplying `play_clip` together with a `tts_endpoint`
/// in the config selects remote clips with device-voice fallback.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VoiceReaderCallbacks {
    pub context: *mut c_void,
    pub speak: Option<SpeakFn>,
    pub pause: Option<VoidFn>,
    pub resume: Option<VoidFn>,
    pub stop: Option<VoidFn>,
    pub play_clip: Option<PlayClipFn>,
    pub pause_clip: Option<VoidFn>,
    pub resume_clip: Option<VoidFn>,
    pub stop_clip: Option<VoidFn>,
    pub publish: Option<PublishFn>,
    pub activate: Option<VoidFn>,
    pub deactivate: Option<VoidFn>,
}

// SAFETY: the host promises its callbacks and `context` may be used from any
// thread (documented on `voicereader_reader_new`).
unsafe impl Send for VoiceReaderCallbacks {}
unsafe impl Sync for VoiceReaderCallbacks {}

impl VoiceReaderCallbacks {
    fn call(&self, f: Option<VoidFn>) {
        if let Some(f) = f {
            unsafe { f(self.context) };
        }
    }
}

/// Requests handed to the host and not yet reported back.
struct Host {
    callbacks: VoiceReaderCallbacks,
    pending: Mutex<HashMap<RequestId, Completion>>,
}

impl Host {
    /// Only one request is ever live; older unreported ones are dropped.
    fn park(&self, done: Completion) -> u64 {
        let id = done.request();
        let mut pending = self.pending.lock();
        pending.clear();
        pending.insert(id, done);
        id.0
    }

    fn report(&self, request: u64, outcome: SpeechOutcome) {
        let Some(done) = self.pending.lock().remove(&RequestId(request)) else {
            return;
        };
        match outcome {
            SpeechOutcome::Finished => done.finished(),
            SpeechOutcome::Failed(reason) => done.failed(reason),
            SpeechOutcome::Canceled => done.canceled(),
        }
    }
}

struct HostSynth(Arc<Host>);

impl Synthesizer for HostSynth {
    fn speak(&self, utterance: Utterance, done: Completion) {
        let Some(speak) = self.0.callbacks.speak else {
            done.failed("host has no speech synthesiser");
            return;
        };
        let (Ok(text), Ok(voice)) =
            (CString::new(utterance.text.as_str()), CString::new(utterance.voice.as_str()))
        else {
            done.failed("text contains a nul byte");
            return;
        };
        let request = self.0.park(done);
        unsafe {
            speak(self.0.callbacks.context, request, text.as_ptr(), voice.as_ptr(), utterance.native_rate())
        };
    }

    fn pause(&self) {
        self.0.callbacks.call(self.0.callbacks.pause);
    }

    fn resume(&self) {
        self.0.callbacks.call(self.0.callbacks.resume);
    }

    fn stop(&self) {
        self.0.callbacks.call(self.0.callbacks.stop);
    }
}

struct HostPlayer(Arc<Host>);

impl ClipPlayer for HostPlayer {
    fn play(&self, clip: Bytes, done: Completion) {
        let Some(play) = self.0.callbacks.play_clip else {
            done.failed("host has no clip player");
            return;
        };
        let request = self.0.park(done);
        unsafe { play(self.0.callbacks.context, request, clip.as_ptr(), clip.len()) };
    }

    fn pause(&self) {
        self.0.callbacks.call(self.0.callbacks.pause_clip);
    }

    fn resume(&self) {
        self.0.callbacks.call(self.0.callbacks.resume_clip);
    }

    fn stop(&self) {
        self.0.callbacks.call(self.0.callbacks.stop_clip);
    }
}

struct HostMedia(Arc<Host>);

impl MediaSession for HostMedia {
    fn publish(&mut self, info: &NowPlayingInfo) {
        let Some(publish) = self.0.callbacks.publish else { return };
        let Ok(json) = serde_json::to_string(info) else { return };
        if let Ok(json) = CString::new(json) {
            unsafe { publish(self.0.callbacks.context, json.as_ptr()) };
        }
    }

    fn clear(&mut self) {
        if let Some(publish) = self.0.callbacks.publish {
            unsafe { publish(self.0.callbacks.context, std::ptr::null()) };
        }
    }
}

struct HostSession(Arc<Host>);

impl AudioSession for HostSession {
    fn activate(&mut self) {
        self.0.callbacks.call(self.0.callbacks.activate);
    }

    fn deactivate(&mut self) {
        self.0.callbacks.call(self.0.callbacks.deactivate);
    }
}

// ─────────────────────────────────────────────────────────────────────────────

/// Opaque handle to a running reader.
pub struct VoiceReaderHandle {
    runtime: Runtime,
    reader: ReaderHandle,
    task: Option<JoinHandle<()>>,
    host: Arc<Host>,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a non-null `*const c_char` to an owned `String` (lossy UTF-8).
/// Returns `None` if `ptr` is null.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string.  Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

/// Serialize to a heap C string, `NULL` on failure.
fn to_json_c_str<T: Serialize + ?Sized>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_c_str(&json),
        Err(e) => {
            eprintln!("[voicereader] json error: {e}");
            std::ptr::null()
        }
    }
}

unsafe fn handle<'a>(ptr: *const VoiceReaderHandle) -> Option<&'a VoiceReaderHandle> {
    unsafe { ptr.as_ref() }
}

fn build_reader(
    callbacks: VoiceReaderCallbacks,
    config: ReaderConfig,
    store: Option<SettingsStore>,
    default_voice: VoiceId,
) -> anyhow::Result<VoiceReaderHandle> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("voicereader")
        .enable_all()
        .build()
        .context("Cannot start reader runtime")?;
    let guard = runtime.enter();

    let host = Arc::new(Host { callbacks, pending: Mutex::new(HashMap::new()) });
    let (sink, events) = event_channel();
    let synth: Arc<dyn Synthesizer> = Arc::new(HostSynth(host.clone()));

    let backend: Box<dyn SpeechBackend> = match (&config.tts_endpoint, callbacks.play_clip) {
        (Some(endpoint), Some(_)) => {
            let fetcher = HttpClipFetcher::new(endpoint.clone()).context("Cannot build TTS client")?;
            Box::new(
                RemoteSpeech::new(
                    Arc::new(fetcher),
                    Arc::new(HostPlayer(host.clone())),
                    synth,
                    sink,
                    runtime.handle().clone(),
                )
                .with_prefetch_window(config.prefetch_window),
            )
        }
        _ => Box::new(LocalSpeech::new(synth, sink)),
    };

    let mut parts = ReaderParts::new(backend, events, SpeechSettings::new(default_voice, Speed::default()))
        .with_media_session(Box::new(HostMedia(host.clone())))
        .with_audio_session(Box::new(HostSession(host.clone())));
    if let Some(store) = store {
        parts = parts.with_settings_store(store);
    }
    if let Some(endpoint) = &config.preprocess_endpoint {
        let rewriter = HttpTableRewriter::new(endpoint.clone()).context("Cannot build preprocess client")?;
        parts = parts.with_table_rewriter(Arc::new(rewriter));
    }

    let (reader, task) = Reader::spawn(&config, parts);
    drop(guard);
    Ok(VoiceReaderHandle { runtime, reader, task: Some(task), host })
}

// ─── Text utilities ──────────────────────────────────────────────────────────

/// Split `text` into sentences.
///
/// @return  Heap-allocated JSON array of strings, e.g. `["Hi.","Bye."]`, or
///          `NULL` if `text` is null.  Free with [`voicereader_free_string`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_split_sentences(text: *const c_char) -> *const c_char {
    let Some(text) = (unsafe { cstr_to_string(text) }) else {
        return std::ptr::null();
    };
    match serde_json::to_string(&split_sentences(&text)) {
        Ok(json) => to_c_str(&json),
        Err(_) => std::ptr::null(),
    }
}

/// Silent 16-bit mono WAV for background keep-alive playback.
///
/// @param seconds      Clip length.
/// @param sample_rate  e.g. 22050.
/// @param out_len      Receives the byte length.
/// @return             WAV bytes, or `NULL` on failure.  Free with
///                     [`voicereader_free_bytes`] passing the same length.
#[no_mangle]
pub unsafe extern "C" fn voicereader_silent_wav(
    seconds: f32,
    sample_rate: u32,
    out_len: *mut usize,
) -> *mut u8 {
    if out_len.is_null() || !seconds.is_finite() || seconds < 0.0 || sample_rate == 0 {
        return std::ptr::null_mut();
    }
    match silent_wav(Duration::from_secs_f32(seconds), sample_rate) {
        Ok(bytes) => {
            let bytes = bytes.into_boxed_slice();
            unsafe { *out_len = bytes.len() };
            Box::into_raw(bytes) as *mut u8
        }
        Err(e) => {
            eprintln!("[voicereader] silent wav error: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Free bytes returned by [`voicereader_silent_wav`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_free_bytes(ptr: *mut u8, len: usize) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}

/// Free a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn voicereader_free_string(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}

// ─── Reader lifecycle ────────────────────────────────────────────────────────

/// Start a reader.
///
/// @param callbacks      Host implementation table (copied).  Callbacks are
///                       invoked from reader worker threads.
/// @param config_json    `ReaderConfig` JSON, or `NULL` for defaults.
/// @param settings_path  File where voice/speed persist, or `NULL` to keep
///                       them in memory only.
/// @param default_voice  Voice used until the user picks one.
/// @return               Reader handle, or `NULL` on failure (details to
///                       stderr).  Free with [`voicereader_reader_free`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_new(
    callbacks: *const VoiceReaderCallbacks,
    config_json: *const c_char,
    settings_path: *const c_char,
    default_voice: *const c_char,
) -> *mut VoiceReaderHandle {
    let (Some(callbacks), Some(voice)) =
        (unsafe { callbacks.as_ref() }.copied(), unsafe { cstr_to_string(default_voice) })
    else {
        eprintln!("[voicereader] voicereader_reader_new: null argument");
        return std::ptr::null_mut();
    };
    let config = match unsafe { cstr_to_string(config_json) } {
        Some(json) => match serde_json::from_str::<ReaderConfig>(&json) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("[voicereader] invalid config: {e}");
                return std::ptr::null_mut();
            }
        },
        None => ReaderConfig::default(),
    };
    let voice = VoiceId::new(voice);
    let store = unsafe { cstr_to_string(settings_path) }
        .map(|path| SettingsStore::new(path, voice.clone()));

    match build_reader(callbacks, config, store, voice) {
        Ok(h) => Box::into_raw(Box::new(h)),
        Err(e) => {
            eprintln!("[voicereader] start error: {e:#}");
            std::ptr::null_mut()
        }
    }
}

/// Stop playback, release the host session and destroy the reader.
#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_free(reader: *mut VoiceReaderHandle) {
    if reader.is_null() {
        return;
    }
    let mut h = unsafe { Box::from_raw(reader) };
    h.reader.shutdown();
    if let Some(task) = h.task.take() {
        let _ = h.runtime.block_on(task);
    }
    h.host.pending.lock().clear();
}

/// Current player state as JSON (see `Snapshot`).
///
/// @return  Heap-allocated UTF-8 JSON, or `NULL` on a null handle.  Free
///          with [`voicereader_free_string`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_snapshot(reader: *const VoiceReaderHandle) -> *const c_char {
    let Some(h) = (unsafe { handle(reader) }) else {
        return std::ptr::null();
    };
    let snapshot = h.reader.snapshot();
    to_json_c_str(&SnapshotView::new(&snapshot))
}

/// Snapshot plus the display strings a player screen shows.
#[derive(Serialize)]
struct SnapshotView<'a> {
    #[serde(flatten)]
    snapshot: &'a Snapshot,
    elapsed_label: String,
    remaining_label: String,
    /// Friendly name when the voice is one of the remote voices.
    voice_label: Option<&'static str>,
}

impl<'a> SnapshotView<'a> {
    fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            elapsed_label: format_clock(snapshot.elapsed),
            remaining_label: format_clock(snapshot.remaining),
            voice_label: remote_label(&snapshot.voice),
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Load `text` (tables rewritten first when a preprocess endpoint is
/// configured) and optionally start reading.  Returns immediately; commands
/// issued afterwards apply to the new text.
#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_load(
    reader: *const VoiceReaderHandle,
    text: *const c_char,
    auto_play: bool,
) {
    let (Some(h), Some(text)) = (unsafe { handle(reader) }, unsafe { cstr_to_string(text) }) else {
        return;
    };
    h.reader.open(LoadRequest { text, auto_play });
}

macro_rules! command_fn {
    ($(#[$doc:meta])* $name:ident => $method:ident) => {
        $(#[$doc])*
        #[no_mangle]
        pub unsafe extern "C" fn $name(reader: *const VoiceReaderHandle) {
            if let Some(h) = unsafe { handle(reader) } {
                h.reader.$method();
            }
        }
    };
}

command_fn!(voicereader_reader_play => play);
command_fn!(voicereader_reader_pause => pause);
command_fn!(voicereader_reader_resume => resume);
command_fn!(voicereader_reader_toggle => toggle_play_pause);
command_fn!(voicereader_reader_stop => stop);
command_fn!(voicereader_reader_skip_forward => skip_forward);
command_fn!(voicereader_reader_skip_back => skip_back);
command_fn!(
    /// Jump five sentences ahead (clamped to the last one).
    voicereader_reader_skip5_forward => skip5_forward
);

#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_jump_to(reader: *const VoiceReaderHandle, index: usize) {
    if let Some(h) = unsafe { handle(reader) } {
        h.reader.jump_to(index);
    }
}

/// @param multiplier  One of 0.75, 1, 1.25, 1.5, 1.75, 2.
/// @return            `false` for any other value.
#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_set_speed(
    reader: *const VoiceReaderHandle,
    multiplier: f32,
) -> bool {
    let (Some(h), Some(speed)) = (unsafe { handle(reader) }, Speed::from_multiplier(multiplier)) else {
        return false;
    };
    h.reader.change_speed(speed);
    true
}

#[no_mangle]
pub unsafe extern "C" fn voicereader_reader_set_voice(
    reader: *const VoiceReaderHandle,
    voice: *const c_char,
) {
    if let (Some(h), Some(voice)) = (unsafe { handle(reader) }, unsafe { cstr_to_string(voice) }) {
        h.reader.change_voice(VoiceId::new(voice));
    }
}

// ─── Platform signals ────────────────────────────────────────────────────────

/// Phone call, alarm, or another app took audio focus.
#[no_mangle]
pub unsafe extern "C" fn voicereader_interruption_began(reader: *const VoiceReaderHandle) {
    if let Some(h) = unsafe { handle(reader) } {
        h.reader.signal(AudioSignal::InterruptionBegan);
    }
}

#[no_mangle]
pub unsafe extern "C" fn voicereader_interruption_ended(
    reader: *const VoiceReaderHandle,
    should_resume: bool,
) {
    if let Some(h) = unsafe { handle(reader) } {
        h.reader.signal(AudioSignal::InterruptionEnded { should_resume });
    }
}

/// @param reason  0 old device unavailable, 1 new device available,
///                2 category change, anything else "other".
#[no_mangle]
pub unsafe extern "C" fn voicereader_route_changed(reader: *const VoiceReaderHandle, reason: i32) {
    let reason = match reason {
        0 => RouteChangeReason::OldDeviceUnavailable,
        1 => RouteChangeReason::NewDeviceAvailable,
        2 => RouteChangeReason::CategoryChange,
        _ => RouteChangeReason::Other,
    };
    if let Some(h) = unsafe { handle(reader) } {
        h.reader.signal(AudioSignal::RouteChanged { reason });
    }
}

/// @param command  0 play, 1 pause, 2 toggle, 3 next, 4 previous.
/// @return         `false` for an unknown command.
#[no_mangle]
pub unsafe extern "C" fn voicereader_remote_command(reader: *const VoiceReaderHandle, command: i32) -> bool {
    let command = match command {
        0 => RemoteCommand::Play,
        1 => RemoteCommand::Pause,
        2 => RemoteCommand::TogglePlayPause,
        3 => RemoteCommand::NextTrack,
        4 => RemoteCommand::PreviousTrack,
        _ => return false,
    };
    let Some(h) = (unsafe { handle(reader) }) else {
        return false;
    };
    h.reader.remote(command);
    true
}

// ─── Completion reports ──────────────────────────────────────────────────────

/// The utterance or clip for `request` finished playing.
#[no_mangle]
pub unsafe extern "C" fn voicereader_utterance_finished(reader: *const VoiceReaderHandle, request: u64) {
    if let Some(h) = unsafe { handle(reader) } {
        h.host.report(request, SpeechOutcome::Finished);
    }
}

/// The utterance or clip for `request` could not be played.
#[no_mangle]
pub unsafe extern "C" fn voicereader_utterance_failed(
    reader: *const VoiceReaderHandle,
    request: u64,
    reason: *const c_char,
) {
    if let Some(h) = unsafe { handle(reader) } {
        let reason = unsafe { cstr_to_string(reason) }.unwrap_or_else(|| "unknown".to_string());
        h.host.report(request, SpeechOutcome::Failed(reason));
    }
}

/// The host gave up on `request` without playing it to the end.
#[no_mangle]
pub unsafe extern "C" fn voicereader_utterance_canceled(reader: *const VoiceReaderHandle, request: u64) {
    if let Some(h) = unsafe { handle(reader) } {
        h.host.report(request, SpeechOutcome::Canceled);
    }
}

// ─── Voices ──────────────────────────────────────────────────────────────────
//
// `voices_json` is the host's installed voice list:
// `[{"id":"...","name":"...","language":"en-US","quality":"premium"}, …]`
// with `quality` one of `default`, `enhanced`, `premium`.

unsafe fn parse_voices(voices_json: *const c_char) -> Option<Vec<VoiceInfo>> {
    let json = unsafe { cstr_to_string(voices_json) }?;
    match serde_json::from_str(&json) {
        Ok(voices) => Some(voices),
        Err(e) => {
            eprintln!("[voicereader] invalid voice list: {e}");
            None
        }
    }
}

#[derive(Serialize)]
struct RemoteVoice {
    id: &'static str,
    label: &'static str,
}

/// Voices offered by the remote synthesiser as `[{"id","label"}]`.
/// Free with [`voicereader_free_string`].
#[no_mangle]
pub extern "C" fn voicereader_remote_voices() -> *const c_char {
    let voices: Vec<RemoteVoice> =
        REMOTE_VOICES.iter().map(|&(id, label)| RemoteVoice { id, label }).collect();
    to_json_c_str(&voices)
}

/// English voices from `voices_json`, best quality first.
/// Free with [`voicereader_free_string`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_english_voices(voices_json: *const c_char) -> *const c_char {
    match unsafe { parse_voices(voices_json) } {
        Some(voices) => to_json_c_str(&english_voices(&voices)),
        None => std::ptr::null(),
    }
}

/// Id of the voice to use when the user has not picked one, or `NULL` when
/// no English voice is installed.  Free with [`voicereader_free_string`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_best_voice(voices_json: *const c_char) -> *const c_char {
    match unsafe { parse_voices(voices_json) }.as_deref().and_then(best_default) {
        Some(id) => to_c_str(id.as_str()),
        None => std::ptr::null(),
    }
}

/// Whether an enhanced or premium English voice is installed.
#[no_mangle]
pub unsafe extern "C" fn voicereader_has_premium_voices(voices_json: *const c_char) -> bool {
    unsafe { parse_voices(voices_json) }.is_some_and(|v| has_premium_voices(&v))
}

// ─── Clips ───────────────────────────────────────────────────────────────────

/// Saved-clip library.  Clip JSON is `{"id","title","text","created_at"}`.
pub struct VoiceReaderClips(ClipStore);

unsafe fn clips<'a>(ptr: *const VoiceReaderClips) -> Option<&'a ClipStore> {
    unsafe { ptr.as_ref() }.map(|c| &c.0)
}

/// Open the clip file at `path` (created on first save).
///
/// @return  Store handle, or `NULL` on failure.  Free with
///          [`voicereader_clips_free`].
#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_open(path: *const c_char) -> *mut VoiceReaderClips {
    let Some(path) = (unsafe { cstr_to_string(path) }) else {
        return std::ptr::null_mut();
    };
    match ClipStore::open(path) {
        Ok(store) => Box::into_raw(Box::new(VoiceReaderClips(store))),
        Err(e) => {
            eprintln!("[voicereader] clip store error: {e}");
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_free(store: *mut VoiceReaderClips) {
    if !store.is_null() {
        drop(unsafe { Box::from_raw(store) });
    }
}

/// Save `text` as a new clip.  `title` may be `NULL` to derive one from the
/// first sentence.
///
/// @return  The new clip as JSON, or `NULL` on failure.
#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_create(
    store: *const VoiceReaderClips,
    title: *const c_char,
    text: *const c_char,
) -> *const c_char {
    let (Some(store), Some(text)) = (unsafe { clips(store) }, unsafe { cstr_to_string(text) }) else {
        return std::ptr::null();
    };
    match store.create(unsafe { cstr_to_string(title) }, &text) {
        Ok(clip) => to_json_c_str(&clip),
        Err(e) => {
            eprintln!("[voicereader] clip save error: {e}");
            std::ptr::null()
        }
    }
}

/// All clips, newest first, as a JSON array.
#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_list(store: *const VoiceReaderClips) -> *const c_char {
    match unsafe { clips(store) } {
        Some(store) => to_json_c_str(&store.list()),
        None => std::ptr::null(),
    }
}

/// One clip as JSON, or `NULL` when `id` is unknown.
#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_get(store: *const VoiceReaderClips, id: *const c_char) -> *const c_char {
    let (Some(store), Some(id)) = (unsafe { clips(store) }, unsafe { cstr_to_string(id) }) else {
        return std::ptr::null();
    };
    match Uuid::parse_str(&id).ok().and_then(|id| store.get(id)) {
        Some(clip) => to_json_c_str(&clip),
        None => std::ptr::null(),
    }
}

/// @return  `true` when a clip was removed.
#[no_mangle]
pub unsafe extern "C" fn voicereader_clips_delete(store: *const VoiceReaderClips, id: *const c_char) -> bool {
    let (Some(store), Some(id)) = (unsafe { clips(store) }, unsafe { cstr_to_string(id) }) else {
        return false;
    };
    let Ok(id) = Uuid::parse_str(&id) else {
        return false;
    };
    match store.delete(id) {
        Ok(removed) => removed,
        Err(e) => {
            eprintln!("[voicereader] clip delete error: {e}");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
