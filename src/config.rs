use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Upper bound for any configured phase or shake duration.
const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Easing curve applied to normalized fade progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    #[default]
    CubicOut,
}

impl Easing {
    /// Maps progress in `[0, 1]` onto `[0, 1]`; `apply(0) == 0`, `apply(1) == 1`,
    /// monotonic non-decreasing. Out-of-range input is clamped.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::CubicOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv * inv
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SlideshowOptions {
    /// Upper bound on decoded images held at once.
    pub max_cached_images: usize,
    /// Longer edge, in pixels, that decoded images are downsized to.
    pub max_texture_size: u32,
    /// Time an image stays fully visible before the fade-out starts.
    #[serde(with = "humantime_serde")]
    pub display_duration: Duration,
    /// Fade-in after an advance. Zero shows the image at full opacity at once.
    #[serde(with = "humantime_serde")]
    pub fade_in_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub fade_out_duration: Duration,
    pub easing: Easing,
    /// Show the first image as soon as it decodes instead of waiting for an advance.
    pub reveal_on_load: bool,
    /// Base scale for aspect fitting.
    pub scale: f32,
    pub position: [f32; 3],
}

impl SlideshowOptions {
    const fn default_max_cached_images() -> usize {
        10
    }

    const fn default_max_texture_size() -> u32 {
        2048
    }

    const fn default_display_duration() -> Duration {
        Duration::from_millis(5000)
    }

    const fn default_fade_out_duration() -> Duration {
        Duration::from_millis(2000)
    }

    // 60% of the 4.5-unit globe radius.
    const fn default_scale() -> f32 {
        2.7
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.max_cached_images >= 1,
            "slideshow.max-cached-images must be >= 1"
        );
        ensure!(
            self.max_texture_size >= 1,
            "slideshow.max-texture-size must be >= 1"
        );
        ensure!(
            self.display_duration > Duration::ZERO,
            "slideshow.display-duration must be positive"
        );
        ensure!(
            [
                self.display_duration,
                self.fade_in_duration,
                self.fade_out_duration
            ]
            .iter()
            .all(|d| *d <= MAX_DURATION),
            "slideshow durations must be at most 24h"
        );
        ensure!(
            self.scale.is_finite() && self.scale > 0.0,
            "slideshow.scale must be positive"
        );
        Ok(())
    }
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            max_cached_images: Self::default_max_cached_images(),
            max_texture_size: Self::default_max_texture_size(),
            display_duration: Self::default_display_duration(),
            fade_in_duration: Duration::ZERO,
            fade_out_duration: Self::default_fade_out_duration(),
            easing: Easing::default(),
            reveal_on_load: true,
            scale: Self::default_scale(),
            position: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ShakeOptions {
    /// Length of one shake window.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Peak positional offset; decays linearly to zero over the window.
    pub intensity: f32,
    /// Rotation jitter relative to the positional intensity.
    pub rotation_factor: f32,
    /// Delay from trigger to the slideshow advance.
    #[serde(with = "humantime_serde")]
    pub advance_delay: Duration,
    /// Deterministic seed for the perturbation RNG.
    pub seed: Option<u64>,
}

impl ShakeOptions {
    const fn default_duration() -> Duration {
        Duration::from_millis(1000)
    }

    const fn default_intensity() -> f32 {
        0.2
    }

    const fn default_rotation_factor() -> f32 {
        0.02
    }

    const fn default_advance_delay() -> Duration {
        Duration::from_millis(200)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.duration > Duration::ZERO,
            "shake.duration must be positive"
        );
        ensure!(
            self.duration <= MAX_DURATION,
            "shake.duration must be at most 24h"
        );
        ensure!(
            self.advance_delay < self.duration,
            "shake.advance-delay must be shorter than shake.duration"
        );
        ensure!(
            self.intensity >= 0.0 && self.rotation_factor >= 0.0,
            "shake.intensity and shake.rotation-factor must be non-negative"
        );
        Ok(())
    }
}

impl Default for ShakeOptions {
    fn default() -> Self {
        Self {
            duration: Self::default_duration(),
            intensity: Self::default_intensity(),
            rotation_factor: Self::default_rotation_factor(),
            advance_delay: Self::default_advance_delay(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Ordered display sequence.
    pub images: Vec<String>,
    /// Directory whose images are appended to `images`, sorted by path.
    pub image_library_path: Option<PathBuf>,
    /// Host frame rate in frames per second.
    pub frame_rate: u32,
    pub slideshow: SlideshowOptions,
    pub shake: ShakeOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.frame_rate > 0, "frame-rate must be greater than zero");
        self.slideshow
            .validate()
            .context("invalid slideshow configuration")?;
        self.shake.validate().context("invalid shake configuration")?;
        Ok(self)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            image_library_path: None,
            frame_rate: 60,
            slideshow: SlideshowOptions::default(),
            shake: ShakeOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_endpoints_are_fixed() {
        for easing in [Easing::Linear, Easing::CubicOut] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
            assert_eq!(easing.apply(-3.0), 0.0);
            assert_eq!(easing.apply(7.0), 1.0);
        }
    }

    #[test]
    fn cubic_out_is_monotonic() {
        let mut prev = 0.0;
        for step in 0..=100 {
            let v = Easing::CubicOut.apply(step as f32 / 100.0);
            assert!(v >= prev, "easing decreased at step {step}");
            prev = v;
        }
    }

    #[test]
    fn frame_interval_follows_rate() {
        let cfg = Configuration {
            frame_rate: 50,
            ..Configuration::default()
        };
        assert_eq!(cfg.frame_interval(), Duration::from_millis(20));
    }
}
