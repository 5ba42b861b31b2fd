//! Bounded cache of decoded images keyed by path.
//!
//! Each path moves through `Pending -> Ready | Failed`. At most one decode is in
//! flight per path, decodes run concurrently on the blocking pool, and once a
//! decode settles the cache evicts the least recently accessed `Ready` entries
//! until no more than `max_cached_images` remain. Evicted entries are removed
//! outright, so a later request decodes again.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::decode::{ImageSource, Texture};
use crate::error::{Error, LoadError};
use crate::events::LoadOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed,
}

/// What `request` did for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Already decoded; access time refreshed.
    Ready,
    /// A decode is already in flight; nothing new was started.
    Pending,
    /// A fresh decode was started (new, evicted, or previously failed path).
    Started,
    /// The cache has been disposed.
    Disposed,
}

enum Slot<T> {
    Pending,
    Ready(T),
    Failed(LoadError),
}

struct ImageEntry<T> {
    slot: Slot<T>,
    last_accessed: Instant,
    // Insertion order. Breaks `last_accessed` ties and tags the in-flight decode.
    seq: u64,
}

struct Decoded<T> {
    path: String,
    seq: u64,
    result: Result<T, LoadError>,
}

pub struct ImageCache<S: ImageSource> {
    source: Arc<S>,
    max_cached_images: usize,
    entries: HashMap<String, ImageEntry<S::Output>>,
    in_flight: JoinSet<Decoded<S::Output>>,
    next_seq: u64,
    disposed: bool,
}

impl<S: ImageSource> ImageCache<S> {
    pub fn new(source: S, max_cached_images: usize) -> Self {
        Self {
            source: Arc::new(source),
            max_cached_images: max_cached_images.max(1),
            entries: HashMap::new(),
            in_flight: JoinSet::new(),
            next_seq: 0,
            disposed: false,
        }
    }

    /// Ensure `path` is decoded or decoding, without waiting.
    ///
    /// Must be called from within a Tokio runtime: new decodes are spawned.
    pub fn request(&mut self, path: &str) -> RequestStatus {
        if self.disposed {
            trace!(path, "request on disposed cache ignored");
            return RequestStatus::Disposed;
        }
        let now = Instant::now();
        if let Some(entry) = self.entries.get_mut(path) {
            match entry.slot {
                Slot::Ready(_) => {
                    entry.last_accessed = now;
                    return RequestStatus::Ready;
                }
                Slot::Pending => {
                    entry.last_accessed = now;
                    return RequestStatus::Pending;
                }
                Slot::Failed(_) => debug!(path, "retrying failed image"),
            }
        }
        self.start_load(path, now);
        RequestStatus::Started
    }

    fn start_load(&mut self, path: &str, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            path.to_owned(),
            ImageEntry {
                slot: Slot::Pending,
                last_accessed: now,
                seq,
            },
        );

        let source = Arc::clone(&self.source);
        let key = path.to_owned();
        self.in_flight.spawn(async move {
            let job_key = key.clone();
            let joined = tokio::task::spawn_blocking(move || source.load(&job_key)).await;
            let result = match joined {
                Ok(Ok(texture)) => Ok(texture),
                Ok(Err(err)) => Err(LoadError::new(&key, format!("{err:#}"))),
                Err(join_err) => Err(LoadError::new(&key, join_err)),
            };
            Decoded {
                path: key,
                seq,
                result,
            }
        });
        debug!(path, in_flight = self.in_flight.len(), "image load started");
    }

    /// Wait for the next in-flight decode to settle and apply it.
    ///
    /// Returns `None` once nothing is in flight. Cancel safe, so it can sit in a
    /// `select!` next to frame ticks.
    pub async fn next_completion(&mut self) -> Option<LoadOutcome> {
        loop {
            let decoded = match self.in_flight.join_next().await? {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!("image load task failed: {err}");
                    continue;
                }
            };
            if let Some(outcome) = self.settle(decoded) {
                return Some(outcome);
            }
        }
    }

    fn settle(&mut self, decoded: Decoded<S::Output>) -> Option<LoadOutcome> {
        let Decoded { path, seq, result } = decoded;
        let entry = match self.entries.get_mut(&path) {
            Some(entry) if entry.seq == seq && matches!(entry.slot, Slot::Pending) => entry,
            _ => {
                debug!(path = %path, "discarding stale decode");
                if let Ok(mut texture) = result {
                    texture.release();
                }
                return None;
            }
        };

        entry.last_accessed = Instant::now();
        let outcome = match result {
            Ok(texture) => {
                let (width, height) = texture.dimensions();
                info!(path = %path, width, height, "image ready");
                entry.slot = Slot::Ready(texture);
                LoadOutcome {
                    path,
                    result: Ok((width, height)),
                }
            }
            Err(err) => {
                warn!(path = %path, reason = %err.reason, "image load failed");
                entry.slot = Slot::Failed(err.clone());
                LoadOutcome {
                    path,
                    result: Err(err),
                }
            }
        };
        self.evict_if_over_capacity();
        Some(outcome)
    }

    /// Request `path` and wait until it is `Ready` or `Failed`.
    pub async fn load(&mut self, path: &str) -> Result<&S::Output, Error> {
        if self.request(path) == RequestStatus::Disposed {
            return Err(Error::Disposed);
        }
        loop {
            match self.state(path) {
                Some(LoadState::Ready) => break,
                Some(LoadState::Failed) => {
                    let err = self
                        .error(path)
                        .cloned()
                        .unwrap_or_else(|| LoadError::new(path, "load failed"));
                    return Err(err.into());
                }
                Some(LoadState::Pending) => {
                    if self.next_completion().await.is_none() {
                        return Err(LoadError::new(path, "load abandoned").into());
                    }
                }
                None if self.disposed => return Err(Error::Disposed),
                None => return Err(LoadError::new(path, "evicted before use").into()),
            }
        }
        self.current_resource(path)
            .ok_or_else(|| LoadError::new(path, "evicted before use").into())
    }

    /// Evict least recently accessed `Ready` entries until within capacity.
    ///
    /// Ties on access time go to the entry inserted first. Returns evicted paths.
    pub fn evict_if_over_capacity(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.ready_count() > self.max_cached_images {
            let Some(victim) = self
                .entries
                .iter()
                .filter(|(_, e)| matches!(e.slot, Slot::Ready(_)))
                .min_by_key(|(_, e)| (e.last_accessed, e.seq))
                .map(|(path, _)| path.clone())
            else {
                break;
            };
            if let Some(ImageEntry {
                slot: Slot::Ready(mut texture),
                ..
            }) = self.entries.remove(&victim)
            {
                texture.release();
            }
            debug!(path = %victim, "evicted least recently used image");
            evicted.push(victim);
        }
        evicted
    }

    /// Non-blocking lookup that counts as an access.
    pub fn current_resource(&mut self, path: &str) -> Option<&S::Output> {
        match self.entries.get_mut(path) {
            Some(ImageEntry {
                slot: Slot::Ready(texture),
                last_accessed,
                ..
            }) => {
                *last_accessed = Instant::now();
                Some(&*texture)
            }
            _ => None,
        }
    }

    pub fn state(&self, path: &str) -> Option<LoadState> {
        self.entries.get(path).map(|e| match e.slot {
            Slot::Pending => LoadState::Pending,
            Slot::Ready(_) => LoadState::Ready,
            Slot::Failed(_) => LoadState::Failed,
        })
    }

    pub fn error(&self, path: &str) -> Option<&LoadError> {
        match self.entries.get(path) {
            Some(ImageEntry {
                slot: Slot::Failed(err),
                ..
            }) => Some(err),
            _ => None,
        }
    }

    /// Every failed entry, sorted by path.
    pub fn errors(&self) -> Vec<(String, LoadError)> {
        let mut out: Vec<(String, LoadError)> = self
            .entries
            .iter()
            .filter_map(|(path, e)| match &e.slot {
                Slot::Failed(err) => Some((path.clone(), err.clone())),
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// `(pending, total)` entry counts.
    pub fn loading_status(&self) -> (usize, usize) {
        let pending = self
            .entries
            .values()
            .filter(|e| matches!(e.slot, Slot::Pending))
            .count();
        (pending, self.entries.len())
    }

    pub fn ready_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e.slot, Slot::Ready(_)))
            .count()
    }

    pub fn has_pending(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn max_cached_images(&self) -> usize {
        self.max_cached_images
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Release every held image and forget all entries. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        // Decodes already on the blocking pool run to completion; their output is dropped.
        self.in_flight.abort_all();
        self.in_flight = JoinSet::new();
        let mut released = 0usize;
        for (_, entry) in self.entries.drain() {
            if let Slot::Ready(mut texture) = entry.slot {
                texture.release();
                released += 1;
            }
        }
        info!(released, "image cache disposed");
    }
}

impl<S: ImageSource> Drop for ImageCache<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeTexture {
        dims: (u32, u32),
        released: Arc<AtomicUsize>,
    }

    impl Texture for FakeTexture {
        fn dimensions(&self) -> (u32, u32) {
            self.dims
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        failing: Arc<HashSet<String>>,
        loads: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn failing(paths: &[&str]) -> Self {
            Self {
                failing: Arc::new(paths.iter().map(|p| p.to_string()).collect()),
                ..Self::default()
            }
        }
    }

    impl ImageSource for FakeSource {
        type Output = FakeTexture;

        fn load(&self, path: &str) -> anyhow::Result<FakeTexture> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(!self.failing.contains(path), "corrupt file");
            Ok(FakeTexture {
                dims: (800, 600),
                released: Arc::clone(&self.released),
            })
        }
    }

    #[tokio::test]
    async fn ready_hit_does_not_refetch() {
        let source = FakeSource::default();
        let loads = Arc::clone(&source.loads);
        let mut cache = ImageCache::new(source, 4);

        assert_eq!(cache.load("a").await.unwrap().dimensions(), (800, 600));
        assert_eq!(cache.request("a"), RequestStatus::Ready);
        cache.load("a").await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_request_joins_in_flight_decode() {
        let source = FakeSource::default();
        let loads = Arc::clone(&source.loads);
        let mut cache = ImageCache::new(source, 4);

        assert_eq!(cache.request("a"), RequestStatus::Started);
        assert_eq!(cache.request("a"), RequestStatus::Pending);
        assert_eq!(cache.state("a"), Some(LoadState::Pending));
        assert!(cache.current_resource("a").is_none());

        let outcome = cache.next_completion().await.unwrap();
        assert_eq!(outcome.path, "a");
        assert!(outcome.is_ready());
        assert!(cache.next_completion().await.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ready_entries_never_exceed_capacity() {
        let source = FakeSource::default();
        let released = Arc::clone(&source.released);
        let mut cache = ImageCache::new(source, 2);

        for path in ["a", "b", "c", "d"] {
            cache.load(path).await.unwrap();
            assert!(cache.ready_count() <= 2);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(cache.state("a"), None);
        assert_eq!(cache.state("b"), None);
        assert_eq!(cache.state("c"), Some(LoadState::Ready));
        assert_eq!(cache.state("d"), Some(LoadState::Ready));
        assert_eq!(released.load(Ordering::SeqCst), 2);

        // Evicted entries are gone, so asking again decodes afresh.
        assert_eq!(cache.request("a"), RequestStatus::Started);
    }

    #[tokio::test]
    async fn evicts_smallest_access_time_first() {
        let mut cache = ImageCache::new(FakeSource::default(), 3);
        for path in ["a", "b", "c"] {
            cache.load(path).await.unwrap();
        }
        let base = Instant::now();
        for (path, offset) in [("a", 10), ("b", 20), ("c", 5)] {
            cache.entries.get_mut(path).unwrap().last_accessed =
                base + Duration::from_millis(offset);
        }
        cache.max_cached_images = 2;

        assert_eq!(cache.evict_if_over_capacity(), vec!["c".to_string()]);
        assert_eq!(cache.ready_count(), 2);
    }

    #[tokio::test]
    async fn access_time_ties_evict_oldest_insertion() {
        let mut cache = ImageCache::new(FakeSource::default(), 3);
        for path in ["a", "b", "c"] {
            cache.load(path).await.unwrap();
        }
        let same = Instant::now();
        for entry in cache.entries.values_mut() {
            entry.last_accessed = same;
        }
        cache.max_cached_images = 1;

        assert_eq!(
            cache.evict_if_over_capacity(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn reading_protects_from_eviction() {
        let mut cache = ImageCache::new(FakeSource::default(), 2);
        cache.load("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.load("b").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(cache.current_resource("a").is_some());
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.load("c").await.unwrap();

        assert_eq!(cache.state("a"), Some(LoadState::Ready));
        assert_eq!(cache.state("b"), None);
    }

    #[tokio::test]
    async fn failure_is_recorded_and_retried_only_on_request() {
        let source = FakeSource::failing(&["bad"]);
        let loads = Arc::clone(&source.loads);
        let mut cache = ImageCache::new(source, 4);

        cache.request("good");
        cache.request("bad");
        while cache.next_completion().await.is_some() {}

        assert_eq!(cache.state("good"), Some(LoadState::Ready));
        assert_eq!(cache.state("bad"), Some(LoadState::Failed));
        assert!(cache.current_resource("bad").is_none());
        let err = cache.error("bad").unwrap();
        assert_eq!(err.path, "bad");
        assert!(err.reason.contains("corrupt file"));
        assert_eq!(cache.errors().len(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        assert_eq!(cache.request("bad"), RequestStatus::Started);
        assert_eq!(cache.state("bad"), Some(LoadState::Pending));
        assert!(matches!(cache.load("bad").await, Err(Error::Load(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_entries_are_not_eviction_candidates() {
        let mut cache = ImageCache::new(FakeSource::failing(&["bad"]), 1);
        let _ = cache.load("bad").await;
        cache.load("a").await.unwrap();
        cache.load("b").await.unwrap();

        assert_eq!(cache.state("bad"), Some(LoadState::Failed));
        assert_eq!(cache.ready_count(), 1);
        assert_eq!(cache.loading_status(), (0, 2));
    }

    #[tokio::test]
    async fn pending_entries_are_not_eviction_candidates() {
        let mut cache = ImageCache::new(FakeSource::default(), 2);
        cache.load("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.load("b").await.unwrap();
        // Not driven yet, so "c" stays Pending.
        assert_eq!(cache.request("c"), RequestStatus::Started);
        cache.max_cached_images = 1;

        assert_eq!(cache.evict_if_over_capacity(), vec!["a".to_string()]);
        assert_eq!(cache.state("c"), Some(LoadState::Pending));
        assert_eq!(cache.ready_count(), 1);

        // Settling "c" pushes the oldest Ready entry out instead.
        let outcome = cache.next_completion().await.unwrap();
        assert_eq!(outcome.path, "c");
        assert_eq!(cache.state("b"), None);
        assert_eq!(cache.state("c"), Some(LoadState::Ready));
        assert_eq!(cache.ready_count(), 1);
    }

    #[tokio::test]
    async fn dispose_releases_everything_once() {
        let source = FakeSource::default();
        let released = Arc::clone(&source.released);
        let mut cache = ImageCache::new(source, 4);
        cache.load("a").await.unwrap();
        cache.load("b").await.unwrap();
        cache.request("c");

        cache.dispose();
        cache.dispose();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(cache.loading_status(), (0, 0));
        assert!(cache.is_disposed());
        assert_eq!(cache.request("a"), RequestStatus::Disposed);
        assert!(matches!(cache.load("a").await, Err(Error::Disposed)));
        assert!(cache.next_completion().await.is_none());

        drop(cache);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
