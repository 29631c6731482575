//! Remote-synthesis strategy: sentences are rendered by a network service and
//! played as audio clips, with a small look-ahead prefetch.
//!
//! When a sentence starts, the clips for the next few sentences are fetched
//! in the background through the shared [`AudioCache`].  If the current
//! sentence's clip cannot be fetched, that sentence is spoken by the device
//! synthesiser instead and the backend reports itself as degraded; playback
//! never stops on a network failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use super::cache::{AudioCache, ClipKey, ClipResult};
use super::{
    ClipFetcher, ClipPlayer, EventSink, RequestId, SpeakRequest, SpeechBackend, Synthesizer,
    Utterance,
};

pub const DEFAULT_PREFETCH_WINDOW: usize = 3;

/// Where the active request's audio is coming from.
enum Route {
    /// Clip not back yet.
    Fetching,
    /// Clip arrived while paused; starts on resume.
    Parked(Bytes),
    /// Fetch failed while paused; the device voice starts on resume.
    ParkedFallback,
    Clip,
    Fallback,
}

struct Active {
    request: SpeakRequest,
    route: Route,
    paused: bool,
}

/// State shared with the delivery tasks.  Every output call happens under
/// the `active` lock so a cancel can never race a clip that is starting.
struct Outputs {
    player: Arc<dyn ClipPlayer>,
    fallback: Arc<dyn Synthesizer>,
    sink: EventSink,
    active: Mutex<Option<Active>>,
    degraded: AtomicBool,
}

impl Outputs {
    fn deliver(&self, id: RequestId, result: ClipResult) {
        let mut guard = self.active.lock();
        let Some(active) = guard.as_mut().filter(|a| a.request.id == id) else {
            trace!(?id, "clip for a superseded request");
            return;
        };
        active.route = match result {
            Ok(bytes) if active.paused => Route::Parked(bytes),
            Ok(bytes) => {
                self.player.play(bytes, self.sink.completion(id));
                Route::Clip
            }
            Err(e) => {
                warn!(
                    index = active.request.index,
                    "remote synthesis failed, using device voice: {e}"
                );
                self.degraded.store(true, Ordering::Relaxed);
                if active.paused {
                    Route::ParkedFallback
                } else {
                    self.fallback.speak(Utterance::from(&active.request), self.sink.completion(id));
                    Route::Fallback
                }
            }
        };
    }
}

pub struct RemoteSpeech {
    cache: Arc<AudioCache>,
    outputs: Arc<Outputs>,
    runtime: Handle,
    window: usize,
    sentences: Arc<[String]>,
}

impl RemoteSpeech {
    /// `runtime` runs the fetch and prefetch tasks.
    pub fn new(
        fetcher: Arc<dyn ClipFetcher>,
        player: Arc<dyn ClipPlayer>,
        fallback: Arc<dyn Synthesizer>,
        sink: EventSink,
        runtime: Handle,
    ) -> Self {
        Self {
            cache: Arc::new(AudioCache::new(fetcher)),
            outputs: Arc::new(Outputs {
                player,
                fallback,
                sink,
                active: Mutex::new(None),
                degraded: AtomicBool::new(false),
            }),
            runtime,
            window: DEFAULT_PREFETCH_WINDOW,
            sentences: Arc::from(Vec::new()),
        }
    }

    pub fn with_prefetch_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    fn prefetch_after(&self, request: &SpeakRequest) {
        let first = request.index + 1;
        let last = (request.index + self.window).min(self.sentences.len().saturating_sub(1));
        for index in first..=last {
            let key = ClipKey { index, voice: request.voice.clone(), speed: request.speed };
            let clip = self.cache.clip(key, &self.sentences[index]);
            self.runtime.spawn(async move {
                if let Err(e) = clip.await {
                    debug!(index, "prefetch failed, will refetch on demand: {e}");
                }
            });
        }
    }
}

impl SpeechBackend for RemoteSpeech {
    fn load(&mut self, sentences: Arc<[String]>) {
        self.cancel_current();
        self.cache.clear();
        self.sentences = sentences;
        self.outputs.degraded.store(false, Ordering::Relaxed);
    }

    fn speak(&mut self, request: SpeakRequest) {
        debug!(id = ?request.id, index = request.index, "remote speak");
        let key = ClipKey {
            index: request.index,
            voice: request.voice.clone(),
            speed: request.speed,
        };
        self.cache.forget_failed(request.index);
        let clip = self.cache.clip(key, &request.text);
        self.cache.retain_window(request.index, self.window);
        self.prefetch_after(&request);

        let id = request.id;
        *self.outputs.active.lock() = Some(Active { request, route: Route::Fetching, paused: false });

        let outputs = self.outputs.clone();
        self.runtime.spawn(async move {
            let result = clip.await;
            outputs.deliver(id, result);
        });
    }

    fn pause_current(&mut self) {
        let mut guard = self.outputs.active.lock();
        let Some(active) = guard.as_mut() else { return };
        if active.paused {
            return;
        }
        active.paused = true;
        match active.route {
            Route::Clip => self.outputs.player.pause(),
            Route::Fallback => self.outputs.fallback.pause(),
            _ => {}
        }
    }

    fn resume_current(&mut self) {
        let outputs = &self.outputs;
        let mut guard = outputs.active.lock();
        let Some(active) = guard.as_mut() else { return };
        if !active.paused {
            return;
        }
        active.paused = false;
        let id = active.request.id;
        active.route = match std::mem::replace(&mut active.route, Route::Fetching) {
            Route::Clip => {
                outputs.player.resume();
                Route::Clip
            }
            Route::Fallback => {
                outputs.fallback.resume();
                Route::Fallback
            }
            Route::Parked(bytes) => {
                outputs.player.play(bytes, outputs.sink.completion(id));
                Route::Clip
            }
            Route::ParkedFallback => {
                outputs.fallback.speak(Utterance::from(&active.request), outputs.sink.completion(id));
                Route::Fallback
            }
            Route::Fetching => Route::Fetching,
        };
    }

    fn cancel_current(&mut self) {
        let mut guard = self.outputs.active.lock();
        let Some(active) = guard.take() else { return };
        debug!(id = ?active.request.id, "remote cancel");
        match active.route {
            Route::Clip => self.outputs.player.stop(),
            Route::Fallback => self.outputs.fallback.stop(),
            _ => {}
        }
    }

    fn settings_changed(&mut self) {
        self.cache.clear();
    }

    fn is_degraded(&self) -> bool {
        self.outputs.degraded.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cache::tests::FakeFetcher;
    use crate::backend::cache::EntryStatus;
    use crate::backend::local::tests::RecordingSynth;
    use crate::backend::{event_channel, Completion, SpeechEvent, SpeechOutcome};
    use crate::settings::{Speed, VoiceId};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPlayer {
        plays: Mutex<Vec<(Bytes, Completion)>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ClipPlayer for RecordingPlayer {
        fn play(&self, clip: Bytes, done: Completion) {
            self.calls.lock().push("play");
            self.plays.lock().push((clip, done));
        }
        fn pause(&self) {
            self.calls.lock().push("pause");
        }
        fn resume(&self) {
            self.calls.lock().push("resume");
        }
        fn stop(&self) {
            self.calls.lock().push("stop");
        }
    }

    struct Rig {
        remote: RemoteSpeech,
        fetcher: Arc<FakeFetcher>,
        player: Arc<RecordingPlayer>,
        synth: Arc<RecordingSynth>,
        events: tokio::sync::mpsc::UnboundedReceiver<SpeechEvent>,
    }

    fn rig(n: usize) -> Rig {
        let fetcher = Arc::new(FakeFetcher::default());
        let player = Arc::new(RecordingPlayer::default());
        let synth = Arc::new(RecordingSynth::default());
        let (sink, events) = event_channel();
        let mut remote =
            RemoteSpeech::new(fetcher.clone(), player.clone(), synth.clone(), sink, Handle::current());
        let sentences: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
        remote.load(Arc::from(sentences));
        Rig { remote, fetcher, player, synth, events }
    }

    fn request(id: u64, index: usize) -> SpeakRequest {
        SpeakRequest {
            id: RequestId(id),
            index,
            text: format!("s{index}"),
            voice: VoiceId::new("v"),
            speed: Speed::X1_0,
        }
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition never became true");
    }

    fn fetched_texts(fetcher: &FakeFetcher) -> Vec<String> {
        let mut t: Vec<String> = fetcher.calls.lock().iter().map(|r| r.text.clone()).collect();
        t.sort();
        t
    }

    #[tokio::test]
    async fn test_plays_clip_and_prefetches_window() {
        let mut r = rig(6);
        r.remote.speak(request(1, 0));

        eventually(|| r.player.plays.lock().len() == 1).await;
        eventually(|| r.fetcher.calls.lock().len() == 4).await;
        assert_eq!(fetched_texts(&r.fetcher), vec!["s0", "s1", "s2", "s3"]);

        let (bytes, done) = r.player.plays.lock().pop().unwrap();
        assert_eq!(bytes, Bytes::from("s0"));
        done.finished();
        assert_eq!(
            r.events.recv().await.unwrap(),
            SpeechEvent { request: RequestId(1), outcome: SpeechOutcome::Finished }
        );
    }

    #[tokio::test]
    async fn test_next_sentence_uses_prefetched_clip() {
        let mut r = rig(6);
        r.remote.speak(request(1, 0));
        eventually(|| r.player.plays.lock().len() == 1).await;
        eventually(|| r.remote.cache().status(1) == Some(EntryStatus::Ready)).await;

        r.remote.cancel_current();
        r.remote.speak(request(2, 1));
        eventually(|| r.player.plays.lock().len() == 2).await;
        eventually(|| r.fetcher.calls.lock().len() == 5).await;

        let texts = fetched_texts(&r.fetcher);
        assert_eq!(texts.iter().filter(|t| *t == "s1").count(), 1);
        assert!(texts.contains(&"s4".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_failure_falls_back_to_device_voice() {
        let mut r = rig(2);
        r.fetcher.fail.store(true, Ordering::SeqCst);
        r.remote.speak(request(1, 0));

        eventually(|| r.synth.spoken.lock().len() == 1).await;
        assert_eq!(r.synth.spoken.lock()[0].text, "s0");
        assert!(r.remote.is_degraded());
        assert!(r.player.plays.lock().is_empty());

        r.synth.finish_last();
        assert_eq!(r.events.recv().await.unwrap().outcome, SpeechOutcome::Finished);

        r.remote.load(Arc::from(vec!["new".to_string()]));
        assert!(!r.remote.is_degraded());
    }

    #[tokio::test]
    async fn test_superseded_clip_is_not_played() {
        let mut r = rig(4);
        r.remote.speak(request(1, 0));
        r.remote.cancel_current();
        r.remote.speak(request(2, 2));

        eventually(|| r.player.plays.lock().len() == 1).await;
        // Give the first delivery a chance to run too.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let plays = r.player.plays.lock();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].0, Bytes::from("s2"));
        assert_eq!(plays[0].1.request(), RequestId(2));
    }

    #[tokio::test]
    async fn test_pause_while_fetching_parks_clip() {
        let mut r = rig(1);
        r.remote.speak(request(1, 0));
        r.remote.pause_current();

        eventually(|| r.remote.cache().status(0) == Some(EntryStatus::Ready)).await;
        assert!(r.player.plays.lock().is_empty());

        r.remote.resume_current();
        assert_eq!(r.player.plays.lock().len(), 1);

        r.remote.pause_current();
        r.remote.resume_current();
        r.remote.cancel_current();
        assert_eq!(*r.player.calls.lock(), vec!["play", "pause", "resume", "stop"]);
    }

    #[tokio::test]
    async fn test_settings_change_clears_cache() {
        let mut r = rig(3);
        r.remote.speak(request(1, 0));
        eventually(|| r.remote.cache().status(2) == Some(EntryStatus::Ready)).await;
        assert!(!r.remote.cache().is_empty());

        r.remote.settings_changed();
        assert!(r.remote.cache().is_empty());
    }
}
