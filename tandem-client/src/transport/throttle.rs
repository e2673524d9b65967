//! Interval gate for the transform stream

use std::time::{Duration, Instant};

/// Rate limiter for transform emission
///
/// The caller ticks at whatever rate it likes; `allow` passes at most once
/// per interval. The first call always passes. Gesture emission does NOT go
/// through this gate: gestures are rare symbolic events and ride out every
/// tick unthrottled.
#[derive(Debug)]
pub struct EmitThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl EmitThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Gate against the current time
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Gate against an explicit clock reading
    pub fn allow_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
