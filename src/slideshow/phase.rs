use std::time::Duration;

use tokio::time::Instant;
use tracing::{trace, warn};

use super::timer::{ArmedTimer, TimerKind};
use crate::config::{Easing, SlideshowOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hidden,
    FadingIn,
    Held,
    FadingOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeTimings {
    pub fade_in: Duration,
    pub display: Duration,
    pub fade_out: Duration,
    pub easing: Easing,
}

impl From<&SlideshowOptions> for FadeTimings {
    fn from(opts: &SlideshowOptions) -> Self {
        Self {
            fade_in: opts.fade_in_duration,
            display: opts.display_duration,
            fade_out: opts.fade_out_duration,
            easing: opts.easing,
        }
    }
}

/// Visibility timeline of the current image: hold, then fade out.
///
/// Opacity is sampled, never pushed: `sample(now)` fires whichever timer is
/// due and derives opacity from the phase and its start time alone.
#[derive(Debug, Clone)]
pub struct Timeline {
    timings: FadeTimings,
    phase: Phase,
    phase_start: Instant,
    timer: Option<ArmedTimer>,
}

impl Timeline {
    pub fn new(timings: FadeTimings, now: Instant) -> Self {
        Self {
            timings,
            phase: Phase::Hidden,
            phase_start: now,
            timer: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_start(&self) -> Instant {
        self.phase_start
    }

    pub fn timer(&self) -> Option<ArmedTimer> {
        self.timer
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    /// Restart visibility, replacing any armed timer.
    pub fn show(&mut self, now: Instant) {
        if self.timings.fade_in.is_zero() {
            self.enter(Phase::Held, now);
        } else {
            self.enter(Phase::FadingIn, now);
        }
    }

    pub fn hide(&mut self, now: Instant) {
        self.enter(Phase::Hidden, now);
    }

    fn enter(&mut self, phase: Phase, now: Instant) {
        let (kind, after) = match phase {
            Phase::Hidden => return self.settle_in(phase, None, now),
            Phase::FadingIn => (TimerKind::FadeInEnd, self.timings.fade_in),
            Phase::Held => (TimerKind::HoldExpiry, self.timings.display),
            Phase::FadingOut => (TimerKind::FadeOutEnd, self.timings.fade_out),
        };
        let timer = ArmedTimer::arm(kind, now, after);
        if timer.is_none() {
            warn!(?phase, ?after, "phase duration out of range; staying in phase");
        }
        self.settle_in(phase, timer, now);
    }

    fn settle_in(&mut self, phase: Phase, timer: Option<ArmedTimer>, now: Instant) {
        self.timer = timer;
        trace!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        self.phase_start = now;
    }

    /// Fire due timers, then report opacity at `now`.
    ///
    /// Calling again with the same `now` yields the same value.
    pub fn sample(&mut self, now: Instant) -> f32 {
        // Chains end at Hidden, which has no timer, so this terminates.
        while let Some(timer) = self.timer.filter(|t| t.is_due(now)) {
            let next = match timer.kind {
                TimerKind::FadeInEnd => Phase::Held,
                TimerKind::HoldExpiry => Phase::FadingOut,
                TimerKind::FadeOutEnd => Phase::Hidden,
            };
            self.enter(next, now);
        }
        self.opacity_at(now)
    }

    fn opacity_at(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.phase_start);
        match self.phase {
            Phase::Hidden => 0.0,
            Phase::Held => 1.0,
            Phase::FadingIn => self
                .timings
                .easing
                .apply(progress(elapsed, self.timings.fade_in)),
            Phase::FadingOut => {
                1.0 - self
                    .timings
                    .easing
                    .apply(progress(elapsed, self.timings.fade_out))
            }
        }
    }
}

fn progress(elapsed: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / total.as_secs_f32()).min(1.0)
}
