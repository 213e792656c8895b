//! Eased edit transitions
//!
//! A transition sweeps a transitionable action's eased parameter from 0
//! to 1 over a fixed duration. The sweep is driven entirely by an
//! external clock: the system holds at most one `Transition` and feeds
//! it timestamps via `tick`; there are no internal timers.

use std::time::{Duration, Instant};

use crate::actions::EditAction;

/// An in-flight eased application of one action
pub struct Transition {
    action: Box<dyn EditAction>,
    started: Instant,
    duration: Duration,
}

impl Transition {
    /// Start easing `action` at time `now` over `duration`
    pub fn new(action: Box<dyn EditAction>, now: Instant, duration: Duration) -> Self {
        Self {
            action,
            started: now,
            duration,
        }
    }

    /// The action being eased in
    pub fn action(&self) -> &dyn EditAction {
        self.action.as_ref()
    }

    /// Linear progress in `[0, 1]` at time `now`
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Eased progress at time `now` (quadratic in-out)
    pub fn eased(&self, now: Instant) -> f64 {
        ease_in_out(self.progress(now))
    }

    /// `true` once the full duration has elapsed
    pub fn is_complete(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::MoveNode;

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let t0 = Instant::now();
        let tr = Transition::new(
            Box::new(MoveNode::new("n1", [1.0, 1.0])),
            t0,
            Duration::from_millis(150),
        );
        assert_eq!(tr.progress(t0), 0.0);
        assert!((tr.progress(t0 + Duration::from_millis(75)) - 0.5).abs() < 1e-9);
        assert_eq!(tr.progress(t0 + Duration::from_millis(150)), 1.0);
        assert_eq!(tr.progress(t0 + Duration::from_secs(5)), 1.0);
        assert!(tr.is_complete(t0 + Duration::from_millis(150)));
        assert!(!tr.is_complete(t0 + Duration::from_millis(149)));
    }

    #[test]
    fn easing_fixes_endpoints() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert_eq!(ease_in_out(0.5), 0.5);
        assert!(ease_in_out(0.25) < 0.25);
        assert!(ease_in_out(0.75) > 0.75);
    }
}
