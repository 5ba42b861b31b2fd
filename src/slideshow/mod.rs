//! The slideshow controller: which image is current, and how visible it is.
//!
//! `advance` is the only event that moves the show; `tick(now)` is sampled
//! once per frame and returns the opacity the host should apply. The
//! controller never keeps a texture handle of its own, it re-reads the cache
//! every time one is asked for.

pub mod phase;
pub mod timer;

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::cache::{ImageCache, LoadState, RequestStatus};
use crate::config::SlideshowOptions;
use crate::decode::ImageSource;
use crate::events::{LoadOutcome, LoadingStatus};

pub use phase::{FadeTimings, Phase, Timeline};
pub use timer::{ArmedTimer, TimerKind};

pub type LoadingCallback = Box<dyn FnMut(&LoadingStatus) + Send>;

pub struct SlideshowController<S: ImageSource> {
    cache: ImageCache<S>,
    options: SlideshowOptions,
    ordered_paths: Vec<String>,
    current_index: Option<usize>,
    timeline: Timeline,
    // Set once the first image has been revealed or an advance happened.
    started: bool,
    batch: LoadBatch,
    on_loading: Option<LoadingCallback>,
    disposed: bool,
}

impl<S: ImageSource> SlideshowController<S> {
    pub fn new(source: S, options: SlideshowOptions) -> Self {
        let cache = ImageCache::new(source, options.max_cached_images);
        let timeline = Timeline::new(FadeTimings::from(&options), Instant::now());
        Self {
            cache,
            options,
            ordered_paths: Vec::new(),
            current_index: None,
            timeline,
            started: false,
            batch: LoadBatch::default(),
            on_loading: None,
            disposed: false,
        }
    }

    /// Register the receiver of loading-progress reports.
    pub fn set_loading_callback(&mut self, callback: impl FnMut(&LoadingStatus) + Send + 'static) {
        self.on_loading = Some(Box::new(callback));
    }

    /// Replace the display order and request every path at once.
    ///
    /// A sequence that is already showing keeps its index (wrapped into the
    /// new length). Must be called from within a Tokio runtime.
    pub fn set_sequence<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        if self.disposed {
            trace!("set_sequence on disposed slideshow ignored");
            return;
        }
        let now = Instant::now();
        self.ordered_paths = paths.into_iter().map(Into::into).collect();
        let len = self.ordered_paths.len();
        info!(images = len, "slideshow sequence set");

        if len == 0 {
            self.current_index = None;
            // A refilled sequence reveals its first image again.
            self.started = false;
            self.timeline.hide(now);
            self.emit(None);
            return;
        }
        if let Some(idx) = self.current_index {
            self.current_index = Some(idx % len);
        }

        for path in &self.ordered_paths {
            self.batch.track(&mut self.cache, path);
        }
        self.reveal_first(now);
        self.emit(None);
    }

    /// Wait for the next decode to settle and fold it into the show.
    ///
    /// Returns `None` when nothing is loading. Cancel safe.
    pub async fn next_load(&mut self) -> Option<LoadOutcome> {
        if self.disposed {
            return None;
        }
        let outcome = self.cache.next_completion().await?;
        if self.batch.settle(&outcome.path) {
            let item = match &outcome.result {
                Ok(_) => outcome.path.clone(),
                Err(_) => format!("Error loading: {}", outcome.path),
            };
            self.emit(Some(item));
        }
        if self.ordered_paths.contains(&outcome.path) {
            self.reveal_first(Instant::now());
        }
        Some(outcome)
    }

    /// Drive loads until nothing is in flight.
    pub async fn wait_until_loaded(&mut self) {
        while self.next_load().await.is_some() {}
    }

    /// Position of the image to open the show with, once it is known.
    ///
    /// Failed paths are skipped. A path still loading ahead of the first
    /// Ready one holds the reveal back, so the show opens on the earliest
    /// image that can actually be displayed.
    fn first_showable(&self) -> Option<usize> {
        for (idx, path) in self.ordered_paths.iter().enumerate() {
            match self.cache.state(path) {
                Some(LoadState::Ready) => return Some(idx),
                Some(LoadState::Failed) => continue,
                Some(LoadState::Pending) | None => return None,
            }
        }
        None
    }

    fn reveal_first(&mut self, now: Instant) {
        if self.started {
            return;
        }
        let Some(idx) = self.first_showable() else {
            return;
        };
        self.started = true;
        self.current_index = Some(idx);
        if self.options.reveal_on_load {
            self.timeline.show(now);
            debug!(index = idx, "revealing first image");
        } else {
            debug!(index = idx, "first image ready; waiting for an advance to reveal");
        }
    }

    /// Step forward one image, wrapping past the end.
    pub fn advance(&mut self) {
        self.advance_at(Instant::now());
    }

    pub fn advance_at(&mut self, now: Instant) {
        self.step(now, true);
    }

    /// Step back one image, wrapping before the start.
    pub fn retreat(&mut self) {
        self.retreat_at(Instant::now());
    }

    pub fn retreat_at(&mut self, now: Instant) {
        self.step(now, false);
    }

    fn step(&mut self, now: Instant, forward: bool) {
        if self.disposed {
            trace!("advance on disposed slideshow ignored");
            return;
        }
        let len = self.ordered_paths.len();
        if len == 0 {
            debug!("advance on empty sequence ignored");
            return;
        }
        // An unset index behaves as 0.
        let current = self.current_index.unwrap_or(0);
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        self.current_index = Some(next);
        self.started = true;
        self.timeline.show(now);

        let path = &self.ordered_paths[next];
        if self.cache.state(path).is_none() {
            debug!(path = %path, "current image not cached; reloading");
            self.batch.track(&mut self.cache, path);
            self.emit(None);
        }
        info!(index = next, path = %self.ordered_paths[next], "slideshow advanced");
    }

    /// Opacity for the frame at `now`. Timestamps must not go backwards.
    pub fn tick(&mut self, now: Instant) -> f32 {
        if self.disposed || self.ordered_paths.is_empty() {
            return 0.0;
        }
        self.timeline.sample(now)
    }

    /// Re-request every path of the sequence whose load failed.
    pub fn retry_failed(&mut self) {
        if self.disposed {
            return;
        }
        let mut retried = 0usize;
        for path in &self.ordered_paths {
            if self.cache.state(path) == Some(LoadState::Failed) {
                self.batch.track(&mut self.cache, path);
                retried += 1;
            }
        }
        if retried > 0 {
            info!(retried, "retrying failed images");
            self.emit(None);
        }
    }

    /// Texture for the current index, if it is decoded.
    pub fn current_resource(&mut self) -> Option<&S::Output> {
        self.current_entry().map(|(_, texture)| texture)
    }

    /// Current path together with its texture, if decoded.
    pub fn current_entry(&mut self) -> Option<(&str, &S::Output)> {
        if self.disposed {
            return None;
        }
        let path = self.ordered_paths.get(self.current_index?)?;
        let texture = self.cache.current_resource(path)?;
        Some((path.as_str(), texture))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_path(&self) -> Option<&str> {
        self.ordered_paths
            .get(self.current_index?)
            .map(String::as_str)
    }

    pub fn phase(&self) -> Phase {
        self.timeline.phase()
    }

    /// When the next phase transition is due, for hosts that sleep between frames.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.disposed {
            return None;
        }
        self.timeline.next_deadline()
    }

    pub fn sequence(&self) -> &[String] {
        &self.ordered_paths
    }

    pub fn cache(&self) -> &ImageCache<S> {
        &self.cache
    }

    pub fn options(&self) -> &SlideshowOptions {
        &self.options
    }

    pub fn has_pending_loads(&self) -> bool {
        !self.disposed && self.cache.has_pending()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Cancel the armed timer, release every cached image, and go inert.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.timeline.hide(Instant::now());
        self.cache.dispose();
        self.ordered_paths.clear();
        self.current_index = None;
        self.batch = LoadBatch::default();
        self.on_loading = None;
        info!("slideshow disposed");
    }

    fn emit(&mut self, current_item: Option<String>) {
        let status = LoadingStatus {
            is_loading: self.batch.is_loading(),
            progress: self.batch.progress(),
            current_item,
        };
        debug!(
            loading = status.is_loading,
            progress = status.progress,
            item = status.current_item.as_deref(),
            "loading status"
        );
        if let Some(callback) = self.on_loading.as_mut() {
            callback(&status);
        }
        self.batch.finish_if_done();
    }
}

/// Paths requested since the last time loading went idle.
#[derive(Debug, Default)]
struct LoadBatch {
    tracked: HashSet<String>,
    waiting: HashSet<String>,
}

impl LoadBatch {
    fn track<S: ImageSource>(&mut self, cache: &mut ImageCache<S>, path: &str) {
        match cache.request(path) {
            RequestStatus::Started | RequestStatus::Pending => {
                self.tracked.insert(path.to_owned());
                self.waiting.insert(path.to_owned());
            }
            RequestStatus::Ready => {
                self.tracked.insert(path.to_owned());
            }
            RequestStatus::Disposed => {}
        }
    }

    fn settle(&mut self, path: &str) -> bool {
        self.waiting.remove(path)
    }

    fn is_loading(&self) -> bool {
        !self.waiting.is_empty()
    }

    fn progress(&self) -> f32 {
        if self.tracked.is_empty() {
            return 100.0;
        }
        let settled = self.tracked.len() - self.waiting.len();
        settled as f32 / self.tracked.len() as f32 * 100.0
    }

    fn finish_if_done(&mut self) {
        if self.waiting.is_empty() {
            self.tracked.clear();
        }
    }
}
