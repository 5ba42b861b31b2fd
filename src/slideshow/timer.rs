use std::time::Duration;

use tokio::time::Instant;

/// Transition performed when an armed timer comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    FadeInEnd,
    HoldExpiry,
    FadeOutEnd,
}

/// The single pending phase transition of a timeline.
///
/// Held by value in an `Option`; re-arming overwrites it and disarming drops
/// it, so a superseded timer can never fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    pub deadline: Instant,
}

impl ArmedTimer {
    /// Returns `None` when the deadline is beyond what `Instant` can represent.
    pub fn arm(kind: TimerKind, start: Instant, after: Duration) -> Option<Self> {
        let deadline = start.checked_add(after)?;
        Some(Self { kind, deadline })
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
