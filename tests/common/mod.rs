#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rust_snow_globe::config::SlideshowOptions;
use rust_snow_globe::decode::{ImageSource, Texture};

pub struct FakeTexture {
    pub path: String,
    pub dims: (u32, u32),
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

/// In-memory image source. Every path decodes to 800x600 unless listed as
/// failing or given explicit dimensions.
#[derive(Clone, Default)]
pub struct FakeSource {
    failing: Arc<HashSet<String>>,
    dims: Arc<HashMap<String, (u32, u32)>>,
    delays: Arc<HashMap<String, Duration>>,
    pub loads: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn failing(paths: &[&str]) -> Self {
        Self {
            failing: Arc::new(paths.iter().map(|p| p.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_dims(dims: &[(&str, (u32, u32))]) -> Self {
        Self {
            dims: Arc::new(dims.iter().map(|(p, d)| (p.to_string(), *d)).collect()),
            ..Self::default()
        }
    }

    /// Decoding `path` blocks for `delay` before succeeding.
    pub fn slow(path: &str, delay: Duration) -> Self {
        Self {
            delays: Arc::new(HashMap::from([(path.to_string(), delay)])),
            ..Self::default()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ImageSource for FakeSource {
    type Output = FakeTexture;

    fn load(&self, path: &str) -> anyhow::Result<FakeTexture> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(path) {
            std::thread::sleep(*delay);
        }
        anyhow::ensure!(!self.failing.contains(path), "not an image");
        Ok(FakeTexture {
            path: path.to_owned(),
            dims: self.dims.get(path).copied().unwrap_or((800, 600)),
            released: Arc::clone(&self.released),
        })
    }
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

pub fn fast_options() -> SlideshowOptions {
    SlideshowOptions {
        display_duration: ms(100),
        fade_out_duration: ms(100),
        ..SlideshowOptions::default()
    }
}
