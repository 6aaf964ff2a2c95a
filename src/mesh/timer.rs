//! Countdown timer on a wrapping `u32` millisecond clock.

/// Countdown measured against the millisecond clock passed in by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    start_time: u32,
    duration: u32,
}

impl Timer {
    /// Create a timer that counts from time zero.
    #[must_use]
    pub const fn new(duration: u32) -> Self {
        Self {
            start_time: 0,
            duration,
        }
    }

    /// Create a timer already started at `start_time`.
    #[must_use]
    pub const fn started(duration: u32, start_time: u32) -> Self {
        Self {
            start_time,
            duration,
        }
    }

    /// Restart the timer at `now`.
    pub fn start(&mut self, now: u32) -> Self {
        self.start_time = now;
        *self
    }

    /// `true` once strictly more than `duration` milliseconds have elapsed.
    #[must_use]
    pub const fn expired(&self, now: u32) -> bool {
        Self::elapsed(self.start_time, now) > self.duration
    }

    /// Configured duration.
    #[must_use]
    pub const fn duration(&self) -> u32 {
        self.duration
    }

    /// Time between `start` and `now`, tolerating one wrap of the clock.
    #[must_use]
    pub const fn elapsed(start: u32, now: u32) -> u32 {
        if start > now {
            (u32::MAX - start) + now
        } else {
            now - start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_without_wrap() {
        assert_eq!(Timer::elapsed(100, 250), 150);
        assert_eq!(Timer::elapsed(7, 7), 0);
    }

    #[test]
    fn elapsed_across_wrap() {
        assert_eq!(Timer::elapsed(0xFFFF_FFF0, 5), 20);
    }

    #[test]
    fn expiry_is_strict() {
        let timer = Timer::started(100, 1_000);
        assert!(!timer.expired(1_000));
        assert!(!timer.expired(1_100));
        assert!(timer.expired(1_101));
    }

    #[test]
    fn restart_moves_start() {
        let mut timer = Timer::new(10);
        assert!(timer.expired(11));
        let copy = timer.start(500);
        assert_eq!(copy, timer);
        assert!(!timer.expired(510));
        assert!(timer.expired(511));
    }

    #[test]
    fn expiry_across_wrap() {
        let timer = Timer::started(30, u32::MAX - 10);
        assert!(!timer.expired(5));
        assert!(timer.expired(25));
    }
}
