//! **Announcement Cache**: decoded announcement clips keyed by step index.
//!
//! Index `steps.len()` is the completion clip. Entries are write-once and live for one run;
//! [`AnnouncementCache::close`] drops them on exit and refuses further inserts.

use crate::error::SequenceError;
use crate::step::Step;
use cadence_voice::{AudioBuffer, AudioOutput, SpeechService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Default)]
struct CacheState {
    ready: HashMap<usize, AudioBuffer>,
    /// Fetches in progress; the flag flips to `true` when the owner finishes either way.
    in_flight: HashMap<usize, watch::Sender<bool>>,
    closed: bool,
}

enum Slot {
    Ready(AudioBuffer),
    Pending(watch::Receiver<bool>),
    Claimed,
    Closed,
}

/// Releases an in-flight claim and wakes joiners, even if the owning future is dropped.
struct FlightGuard<'a> {
    cache: &'a AnnouncementCache,
    index: usize,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(done) = self.cache.lock().in_flight.remove(&self.index) {
            done.send_replace(true);
        }
    }
}

struct Inner {
    steps: Arc<[Step]>,
    speech: Arc<dyn SpeechService>,
    audio: Arc<dyn AudioOutput>,
    state: Mutex<CacheState>,
}

/// Shared handle; clones see the same entries.
#[derive(Clone)]
pub struct AnnouncementCache {
    inner: Arc<Inner>,
}

impl AnnouncementCache {
    pub fn new(
        steps: Arc<[Step]>,
        speech: Arc<dyn SpeechService>,
        audio: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                steps,
                speech,
                audio,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sentinel index of the completion clip.
    pub fn completion_index(&self) -> usize {
        self.inner.steps.len()
    }

    pub fn get(&self, index: usize) -> Option<AudioBuffer> {
        self.lock().ready.get(&index).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `buffer` unless the key is already set or the cache is closed.
    pub fn insert(&self, index: usize, buffer: AudioBuffer) -> bool {
        let mut state = self.lock();
        if state.closed || state.ready.contains_key(&index) {
            return false;
        }
        state.ready.insert(index, buffer);
        true
    }

    /// Synthesize and decode the clip for `index` without touching the cache.
    pub async fn fetch(&self, index: usize) -> Result<AudioBuffer, SequenceError> {
        let bytes = match self.inner.steps.get(index) {
            Some(step) => {
                self.inner
                    .speech
                    .synthesize_step_announcement(&step.name, step.duration_seconds)
                    .await?
            }
            None => self.inner.speech.synthesize_completion_announcement().await?,
        };
        Ok(self.inner.audio.decode(&bytes)?)
    }

    fn claim(&self, index: usize) -> Slot {
        let mut state = self.lock();
        if let Some(buffer) = state.ready.get(&index) {
            return Slot::Ready(buffer.clone());
        }
        if state.closed {
            return Slot::Closed;
        }
        if let Some(done) = state.in_flight.get(&index) {
            return Slot::Pending(done.subscribe());
        }
        let (done, _) = watch::channel(false);
        state.in_flight.insert(index, done);
        Slot::Claimed
    }

    /// Fetch under a claim taken by [`claim`](Self::claim) and store the result.
    async fn load(&self, index: usize) -> Result<AudioBuffer, SequenceError> {
        let _flight = FlightGuard { cache: self, index };
        let buffer = self.fetch(index).await?;
        self.insert(index, buffer.clone());
        Ok(buffer)
    }

    /// Cached clip, else join a fetch already in flight, else fetch now.
    ///
    /// When the joined fetch fails, one fetch of our own follows.
    pub async fn get_or_fetch(&self, index: usize) -> Result<AudioBuffer, SequenceError> {
        let mut joined = false;
        loop {
            match self.claim(index) {
                Slot::Ready(buffer) => {
                    debug!(index, "announcement cache hit");
                    return Ok(buffer);
                }
                Slot::Claimed => return self.load(index).await,
                Slot::Pending(mut done) if !joined => {
                    debug!(index, "waiting on in-flight announcement");
                    // A closed channel means the owner went away; either way, look again.
                    let _ = done.wait_for(|finished| *finished).await;
                    joined = true;
                }
                Slot::Pending(_) => return self.fetch(index).await,
                Slot::Closed => return Err(SequenceError::Exited),
            }
        }
    }

    /// Populate `index` if it is neither cached nor already being fetched.
    ///
    /// Best-effort: failures are logged and dropped, never retried here.
    pub async fn ensure(&self, index: usize) {
        if index > self.completion_index() {
            return;
        }
        if !matches!(self.claim(index), Slot::Claimed) {
            return;
        }
        match self.load(index).await {
            Ok(_) => debug!(index, "announcement prefetched"),
            Err(e) => warn!(index, error = %e, "announcement prefetch failed"),
        }
    }

    /// Run [`ensure`](Self::ensure) in the background.
    pub fn spawn_ensure(&self, index: usize) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move { cache.ensure(index).await })
    }

    /// Drop every entry and refuse further inserts.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.ready.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
