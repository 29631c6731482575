//! Per-sentence clip cache with in-flight de-duplication.
//!
//! An entry is keyed by sentence index and remembers the voice/speed it was
//! rendered with.  Concurrent requests for the same key share one fetch.
//! [`AudioCache::clear`] bumps a generation counter so fetches that land
//! after a voice or speed change are discarded instead of repopulating the
//! cache with stale audio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{ClipFetcher, ClipRequest};
use crate::error::ReaderError;
use crate::settings::{Speed, VoiceId};

pub type ClipResult = std::result::Result<Bytes, Arc<ReaderError>>;
pub type SharedClip = Shared<BoxFuture<'static, ClipResult>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipKey {
    pub index: usize,
    pub voice: VoiceId,
    pub speed: Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Ready,
    Failed,
}

enum Slot {
    Pending(SharedClip),
    Ready(Bytes),
    Failed,
}

struct Entry {
    key: ClipKey,
    slot: Slot,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    entries: HashMap<usize, Entry>,
}

pub struct AudioCache {
    fetcher: Arc<dyn ClipFetcher>,
    inner: Arc<Mutex<Inner>>,
    fetches: Arc<AtomicU64>,
}

impl AudioCache {
    pub fn new(fetcher: Arc<dyn ClipFetcher>) -> Self {
        Self {
            fetcher,
            inner: Arc::new(Mutex::new(Inner::default())),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The clip for `key`: cached bytes, the fetch already in flight, or a
    /// fresh fetch.  A failed entry is retried.  The returned future is lazy;
    /// it makes progress once someone polls it.
    pub fn clip(&self, key: ClipKey, text: &str) -> SharedClip {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(&key.index) {
            if entry.key == key {
                match &entry.slot {
                    Slot::Ready(bytes) => {
                        trace!(index = key.index, "clip cache hit");
                        let hit: ClipResult = Ok(bytes.clone());
                        return futures::future::ready(hit).boxed().shared();
                    }
                    Slot::Pending(fut) => return fut.clone(),
                    Slot::Failed => {}
                }
            }
        }

        let generation = inner.generation;
        let fut = self.start_fetch(generation, key.clone(), text);
        inner.entries.insert(key.index, Entry { key, slot: Slot::Pending(fut.clone()) });
        fut
    }

    fn start_fetch(&self, generation: u64, key: ClipKey, text: &str) -> SharedClip {
        let fetcher = self.fetcher.clone();
        let inner = self.inner.clone();
        let fetches = self.fetches.clone();
        let request = ClipRequest::new(text, &key.voice, key.speed.multiplier());
        async move {
            fetches.fetch_add(1, Ordering::Relaxed);
            debug!(index = key.index, voice = %key.voice, speed = %key.speed, "fetching clip");
            let result = fetcher.fetch(&request).await.map_err(Arc::new);
            {
                let mut inner = inner.lock();
                if inner.generation == generation {
                    if let Some(entry) = inner.entries.get_mut(&key.index) {
                        if entry.key == key {
                            entry.slot = match &result {
                                Ok(bytes) => Slot::Ready(bytes.clone()),
                                Err(_) => Slot::Failed,
                            };
                        }
                    }
                } else {
                    trace!(index = key.index, "discarding clip from an older generation");
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    pub fn status(&self, index: usize) -> Option<EntryStatus> {
        self.inner.lock().entries.get(&index).map(|e| match e.slot {
            Slot::Pending(_) => EntryStatus::Pending,
            Slot::Ready(_) => EntryStatus::Ready,
            Slot::Failed => EntryStatus::Failed,
        })
    }

    /// Drop a failed entry so the next request refetches it.
    pub fn forget_failed(&self, index: usize) {
        let mut inner = self.inner.lock();
        if matches!(inner.entries.get(&index), Some(Entry { slot: Slot::Failed, .. })) {
            inner.entries.remove(&index);
        }
    }

    /// Keep only the entries around the playback position: one behind and
    /// `ahead` in front of `current`.
    pub fn retain_window(&self, current: usize, ahead: usize) {
        let lo = current.saturating_sub(1);
        let hi = current.saturating_add(ahead);
        self.inner.lock().entries.retain(|&i, _| (lo..=hi).contains(&i));
    }

    /// Invalidate everything, including fetches still in flight.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches actually issued to the fetcher.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Answers with the request text as bytes after a short delay.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub calls: Mutex<Vec<ClipRequest>>,
        pub fail: AtomicBool,
    }

    #[async_trait]
    impl ClipFetcher for FakeFetcher {
        async fn fetch(&self, request: &ClipRequest) -> Result<Bytes> {
            self.calls.lock().push(request.clone());
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReaderError::Status { status: 503 });
            }
            Ok(Bytes::from(request.text.clone()))
        }
    }

    fn key(index: usize) -> ClipKey {
        ClipKey { index, voice: VoiceId::new("v"), speed: Speed::X1_0 }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = AudioCache::new(fetcher.clone());

        let a = cache.clip(key(0), "zero");
        let b = cache.clip(key(0), "zero");
        assert_eq!(cache.status(0), Some(EntryStatus::Pending));
        let (a, b) = futures::join!(a, b);

        assert_eq!(a.unwrap(), Bytes::from("zero"));
        assert_eq!(b.unwrap(), Bytes::from("zero"));
        assert_eq!(fetcher.calls.lock().len(), 1);
        assert_eq!(cache.status(0), Some(EntryStatus::Ready));

        // Cached now; no new fetch.
        assert_eq!(cache.clip(key(0), "zero").await.unwrap(), Bytes::from("zero"));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_key_change_refetches() {
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = AudioCache::new(fetcher.clone());
        cache.clip(key(0), "zero").await.unwrap();

        let faster = ClipKey { speed: Speed::X2_0, ..key(0) };
        cache.clip(faster, "zero").await.unwrap();
        assert_eq!(fetcher.calls.lock().len(), 2);
        assert_eq!(fetcher.calls.lock()[1].speed, 2.0);
    }

    #[tokio::test]
    async fn test_clear_discards_in_flight() {
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = AudioCache::new(fetcher.clone());

        let pending = cache.clip(key(1), "one");
        cache.clear();
        assert!(cache.is_empty());

        // The caller still gets its bytes, but the cache stays empty.
        assert!(pending.await.is_ok());
        assert_eq!(cache.status(1), None);
    }

    #[tokio::test]
    async fn test_failed_entry_is_retried() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.fail.store(true, Ordering::SeqCst);
        let cache = AudioCache::new(fetcher.clone());

        assert!(cache.clip(key(2), "two").await.is_err());
        assert_eq!(cache.status(2), Some(EntryStatus::Failed));

        fetcher.fail.store(false, Ordering::SeqCst);
        assert!(cache.clip(key(2), "two").await.is_ok());
        assert_eq!(fetcher.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_retain_window() {
        let fetcher = Arc::new(FakeFetcher::default());
        let cache = AudioCache::new(fetcher);
        for i in 0..8 {
            let _ = cache.clip(key(i), "x");
        }
        cache.retain_window(3, 3);
        let mut kept: Vec<usize> = (0..8).filter(|i| cache.status(*i).is_some()).collect();
        kept.sort();
        assert_eq!(kept, vec![2, 3, 4, 5, 6]);
    }
}
