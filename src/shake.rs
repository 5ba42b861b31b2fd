//! Shake gesture: a short window of decaying random jitter that advances the
//! slideshow once, partway through.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ShakeOptions;

/// Perturbation for one frame, applied by the host to its own transform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShakeFrame {
    pub offset: [f32; 2],
    /// Rotation about the x and z axes, in radians.
    pub rotation: [f32; 2],
    /// True on exactly one frame per shake window.
    pub advance: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy)]
struct ShakeWindow {
    started: Instant,
    advanced: bool,
}

#[derive(Debug)]
pub struct ShakeGesture {
    options: ShakeOptions,
    window: Option<ShakeWindow>,
    rng: StdRng,
}

impl ShakeGesture {
    pub fn new(options: ShakeOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            options,
            window: None,
            rng,
        }
    }

    /// Start a shake window. Returns `false` if one is already running.
    pub fn trigger(&mut self, now: Instant) -> bool {
        if self.window.is_some() {
            trace!("shake ignored; already shaking");
            return false;
        }
        debug!("shake started");
        self.window = Some(ShakeWindow {
            started: now,
            advanced: false,
        });
        true
    }

    pub fn is_shaking(&self) -> bool {
        self.window.is_some()
    }

    /// Perturbation for the frame at `now`.
    pub fn update(&mut self, now: Instant) -> ShakeFrame {
        let Some(window) = self.window.as_mut() else {
            return ShakeFrame::default();
        };
        let elapsed = now.saturating_duration_since(window.started);

        // A late frame may skip straight past the delay; still advance exactly once.
        let advance = !window.advanced && elapsed >= self.options.advance_delay;
        if advance {
            window.advanced = true;
        }

        if elapsed >= self.options.duration {
            self.window = None;
            debug!("shake finished");
            return ShakeFrame {
                advance,
                ..ShakeFrame::default()
            };
        }

        let progress = elapsed.as_secs_f32() / self.options.duration.as_secs_f32();
        let intensity = self.options.intensity * (1.0 - progress);
        let tilt = intensity * self.options.rotation_factor;
        ShakeFrame {
            offset: [self.jitter(intensity), self.jitter(intensity)],
            rotation: [self.jitter(tilt), self.jitter(tilt)],
            advance,
            active: true,
        }
    }

    fn jitter(&mut self, magnitude: f32) -> f32 {
        (self.rng.random::<f32>() - 0.5) * magnitude
    }
}
