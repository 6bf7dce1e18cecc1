use crate::domain::codec::SINGLE_ROTATION_VALUE;
use std::time::Instant;

/// Default cap on rotation notifications
pub const MAX_ROTATION_EVENTS_PER_SEC: u32 = 10;

/// Accumulates fractional rotation input and rate-limits emitted values.
///
/// The rate check compares against the time of the last successful emission
/// only. Input arriving faster than the cap is folded into the pending value
/// instead of being queued.
pub struct RotationThrottle {
    pending: f32,
    last_emitted_at: Option<Instant>,
    max_events_per_sec: u32,
}

impl RotationThrottle {
    pub fn new(max_events_per_sec: u32) -> Self {
        Self {
            pending: 0.0,
            last_emitted_at: None,
            max_events_per_sec: max_events_per_sec.max(1),
        }
    }

    /// Add `delta` (in full turns) and return the value to notify, if any
    pub fn accumulate(&mut self, delta: f32, now: Instant) -> Option<i16> {
        if !delta.is_finite() {
            return None;
        }
        self.pending += delta;

        if self.pending == 0.0 {
            return None;
        }

        if let Some(last) = self.last_emitted_at {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if 1.0 / elapsed > self.max_events_per_sec as f64 {
                return None;
            }
        }

        let scaled = (self.pending * SINGLE_ROTATION_VALUE as f32).round();
        Some(scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16)
    }

    /// Record a successful notification of the pending value
    pub fn commit(&mut self, now: Instant) {
        self.pending = 0.0;
        self.last_emitted_at = Some(now);
    }

    /// Drop any pending rotation
    pub fn reset(&mut self) {
        self.pending = 0.0;
    }

    pub fn pending(&self) -> f32 {
        self.pending
    }
}

impl Default for RotationThrottle {
    fn default() -> Self {
        Self::new(MAX_ROTATION_EVENTS_PER_SEC)
    }
}
