//! The reader actor: one tokio task that owns the [`PlaybackEngine`] and
//! applies everything that can change it, one message at a time.
//!
//! ```text
//!  ReaderHandle ──Command──┐
//!  backend ──SpeechEvent───┤        ┌── watch<Snapshot>
//!  ticker (while playing) ─┴─▶ actor ┼── MediaSession publish/clear
//!                                   └── AudioSession activate/deactivate
//! ```
//!
//! Commands, backend completions, platform signals and remote-control
//! buttons all land in the same `select!` loop, so no two engine transitions
//! ever overlap.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

use crate::backend::{SpeechBackend, SpeechEvent};
use crate::config::ReaderConfig;
use crate::engine::{PlaybackEngine, PlaybackState, Snapshot};
use crate::interruption::{AudioSignal, InterruptionCoordinator};
use crate::now_playing::{MediaSession, NoMediaSession, NowPlaying, RemoteCommand};
use crate::segment::split_sentences;
use crate::session::{AudioSession, NoAudioSession, SessionLifecycle};
use crate::settings::{SettingsStore, Speed, SpeechSettings, VoiceId};
use crate::tables::{preprocess, Preprocessed, TableRewriter};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load { sentences: Vec<String>, auto_play: bool },
    /// Raw text that still goes through table rewriting.  Commands queued
    /// behind it wait until it has loaded.
    Open(LoadRequest),
    Play,
    Pause,
    Resume,
    TogglePlayPause,
    Stop,
    SkipForward,
    SkipBack,
    Skip5Forward,
    JumpTo(usize),
    ChangeSpeed(Speed),
    ChangeVoice(VoiceId),
    Signal(AudioSignal),
    Remote(RemoteCommand),
    Shutdown,
}

/// Inbound "read this" event, e.g. from a share sheet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadRequest {
    pub text: String,
    #[serde(default, alias = "autoPlay")]
    pub auto_play: bool,
}

/// Everything the actor needs besides the config.
pub struct ReaderParts {
    backend: Box<dyn SpeechBackend>,
    events: mpsc::UnboundedReceiver<SpeechEvent>,
    settings: SpeechSettings,
    store: Option<SettingsStore>,
    media: Box<dyn MediaSession>,
    session: Box<dyn AudioSession>,
    rewriter: Option<Arc<dyn TableRewriter>>,
}

impl ReaderParts {
    /// `events` is the receiver paired with the sink the backend reports to.
    pub fn new(
        backend: Box<dyn SpeechBackend>,
        events: mpsc::UnboundedReceiver<SpeechEvent>,
        settings: SpeechSettings,
    ) -> Self {
        Self {
            backend,
            events,
            settings,
            store: None,
            media: Box::new(NoMediaSession),
            session: Box::new(NoAudioSession),
            rewriter: None,
        }
    }

    /// Start from the persisted settings and save every change back.
    pub fn with_settings_store(mut self, store: SettingsStore) -> Self {
        self.settings = store.load();
        self.store = Some(store);
        self
    }

    pub fn with_media_session(mut self, media: Box<dyn MediaSession>) -> Self {
        self.media = media;
        self
    }

    pub fn with_audio_session(mut self, session: Box<dyn AudioSession>) -> Self {
        self.session = session;
        self
    }

    pub fn with_table_rewriter(mut self, rewriter: Arc<dyn TableRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }
}

pub struct Reader;

impl Reader {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(config: &ReaderConfig, parts: ReaderParts) -> (ReaderHandle, JoinHandle<()>) {
        let ReaderParts { backend, events, settings, store, media, session, rewriter } = parts;
        let engine =
            PlaybackEngine::new(backend, settings).with_words_per_minute(config.words_per_minute);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            engine,
            coordinator: InterruptionCoordinator::new(),
            now_playing: NowPlaying::new(media),
            lifecycle: SessionLifecycle::new(session),
            store,
            rewriter,
            snapshot: snapshot_tx,
            tick: config.tick_interval(),
        };
        let task = tokio::spawn(actor.run(command_rx, events));
        info!("reader started");
        (ReaderHandle { commands: command_tx, snapshot: snapshot_rx }, task)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheap, cloneable front door to a running reader.  Sends never block; a
/// command sent after shutdown is dropped.
#[derive(Clone)]
pub struct ReaderHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
}

impl ReaderHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("reader is gone, command dropped");
        }
    }

    /// Split `text` and load it as-is.
    pub fn load_text(&self, text: &str, auto_play: bool) {
        self.send(Command::Load { sentences: split_sentences(text), auto_play });
    }

    /// Full inbound path: rewrite tables (when a rewriter is configured),
    /// split, load, and optionally start playing.  Commands sent after this
    /// one apply to the new text.
    pub fn open(&self, request: LoadRequest) {
        self.send(Command::Open(request));
    }

    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    pub fn toggle_play_pause(&self) {
        self.send(Command::TogglePlayPause);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn skip_forward(&self) {
        self.send(Command::SkipForward);
    }

    pub fn skip_back(&self) {
        self.send(Command::SkipBack);
    }

    pub fn skip5_forward(&self) {
        self.send(Command::Skip5Forward);
    }

    pub fn jump_to(&self, index: usize) {
        self.send(Command::JumpTo(index));
    }

    pub fn change_speed(&self, speed: Speed) {
        self.send(Command::ChangeSpeed(speed));
    }

    pub fn change_voice(&self, voice: VoiceId) {
        self.send(Command::ChangeVoice(voice));
    }

    pub fn signal(&self, signal: AudioSignal) {
        self.send(Command::Signal(signal));
    }

    pub fn remote(&self, command: RemoteCommand) {
        self.send(Command::Remote(command));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct Actor {
    engine: PlaybackEngine,
    coordinator: InterruptionCoordinator,
    now_playing: NowPlaying,
    lifecycle: SessionLifecycle,
    store: Option<SettingsStore>,
    rewriter: Option<Arc<dyn TableRewriter>>,
    snapshot: watch::Sender<Snapshot>,
    tick: Duration,
}

/// An [`Command::Open`] whose tables are still being rewritten.
struct Loading {
    prepared: BoxFuture<'static, Preprocessed>,
    auto_play: bool,
}

/// Next tick of the elapsed timer, or never when it is disarmed.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_loaded(loading: &mut Option<Loading>) -> (Preprocessed, bool) {
    match loading {
        Some(l) => ((&mut l.prepared).await, l.auto_play),
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<SpeechEvent>,
    ) {
        let mut ticker: Option<Interval> = None;
        let mut loading: Option<Loading> = None;
        loop {
            self.arm_ticker(&mut ticker);
            tokio::select! {
                command = commands.recv(), if loading.is_none() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => loading = self.apply(command),
                },
                (prepared, auto_play) = next_loaded(&mut loading) => {
                    loading = None;
                    info!(tables = prepared.tables_converted, "text opened");
                    self.load(&prepared.text, auto_play);
                }
                Some(event) = events.recv() => self.engine.on_speech_event(event),
                _ = next_tick(&mut ticker) => {
                    self.engine.tick(self.tick);
                    self.snapshot.send_replace(self.engine.snapshot());
                    continue;
                }
            }
            self.publish();
        }
        self.teardown();
    }

    /// Ticker runs only while playing; re-armed from scratch on each entry
    /// into `Playing`.
    fn arm_ticker(&self, ticker: &mut Option<Interval>) {
        match (self.engine.state(), ticker.is_some()) {
            (PlaybackState::Playing, false) => {
                // Missed ticks burst, so a stalled loop still counts them.
                *ticker = Some(interval_at(Instant::now() + self.tick, self.tick));
            }
            (PlaybackState::Playing, true) => {}
            (_, true) => *ticker = None,
            (_, false) => {}
        }
    }

    /// Returns the pending load when the command has to wait on a rewrite.
    fn apply(&mut self, command: Command) -> Option<Loading> {
        debug!(?command, "command");
        let engine = &mut self.engine;
        match command {
            Command::Load { sentences, auto_play } => {
                engine.load_text(sentences);
                if auto_play {
                    engine.play();
                }
            }
            Command::Open(request) => return self.open(request),
            Command::Play => engine.play(),
            Command::Pause => engine.pause(),
            Command::Resume => engine.resume(),
            Command::TogglePlayPause => engine.toggle_play_pause(),
            Command::Stop => engine.stop(),
            Command::SkipForward => engine.skip_forward(),
            Command::SkipBack => engine.skip_back(),
            Command::Skip5Forward => engine.skip5_forward(),
            Command::JumpTo(index) => engine.jump_to(index),
            Command::ChangeSpeed(speed) => {
                engine.change_speed(speed);
                self.persist_settings();
            }
            Command::ChangeVoice(voice) => {
                engine.change_voice(voice);
                self.persist_settings();
            }
            Command::Signal(signal) => self.coordinator.handle(signal, engine),
            Command::Remote(remote) => NowPlaying::dispatch(remote, engine),
            Command::Shutdown => {}
        }
        None
    }

    fn open(&mut self, request: LoadRequest) -> Option<Loading> {
        let LoadRequest { text, auto_play } = request;
        let Some(rewriter) = self.rewriter.clone() else {
            self.load(&text, auto_play);
            return None;
        };
        let prepared = async move { preprocess(&text, rewriter.as_ref()).await }.boxed();
        Some(Loading { prepared, auto_play })
    }

    fn load(&mut self, text: &str, auto_play: bool) {
        self.engine.load_text(split_sentences(text));
        if auto_play {
            self.engine.play();
        }
    }

    fn persist_settings(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(self.engine.settings()) {
                warn!("cannot persist settings: {e}");
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = self.engine.snapshot();
        self.lifecycle.sync(snapshot.state);
        self.now_playing.sync(&snapshot);
        self.snapshot.send_replace(snapshot);
    }

    fn teardown(&mut self) {
        self.engine.stop();
        self.now_playing.clear();
        self.lifecycle.sync(self.engine.state());
        self.snapshot.send_replace(self.engine.snapshot());
        info!("reader stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
