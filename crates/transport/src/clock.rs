use std::sync::Mutex;
use std::time::Instant;

/// Playback position clock.
///
/// Tracks elapsed playback time as a frozen offset plus the wall-clock time
/// since the last resume. This is the single source of truth for "where are
/// we in the track": the transport controller drives it and the analysis
/// worker samples it.
///
/// The offset and resume instant live behind one mutex and every operation
/// takes the lock exactly once, so a reader can never observe a mixed
/// pre/post-update combination of the two fields.
#[derive(Debug)]
pub struct PositionClock {
    inner: Mutex<ClockState>,
    duration_ms: u64,
}

#[derive(Debug)]
struct ClockState {
    offset_ms: u64,
    /// Some while the clock is running, None while frozen.
    resume_at: Option<Instant>,
}

impl ClockState {
    fn position_ms(&self, duration_ms: u64) -> u64 {
        let elapsed = self
            .resume_at
            .map_or(0, |at| at.elapsed().as_millis() as u64);
        (self.offset_ms + elapsed).min(duration_ms)
    }
}

impl PositionClock {
    /// Create a frozen clock at offset 0 for a track of `duration_ms`.
    pub fn new(duration_ms: u64) -> Self {
        Self {
            inner: Mutex::new(ClockState {
                offset_ms: 0,
                resume_at: None,
            }),
            duration_ms,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Start (or restart) the clock running from `at_offset_ms`.
    pub fn start(&self, at_offset_ms: u64) {
        let mut state = self.inner.lock().unwrap();
        state.offset_ms = at_offset_ms.min(self.duration_ms);
        state.resume_at = Some(Instant::now());
    }

    /// Freeze the clock at the current position and return it.
    ///
    /// Subsequent `position_ms()` reads return the frozen value no matter how
    /// much real time passes, until the next `start`.
    pub fn pause(&self) -> u64 {
        let mut state = self.inner.lock().unwrap();
        let frozen = state.position_ms(self.duration_ms);
        state.offset_ms = frozen;
        state.resume_at = None;
        frozen
    }

    /// Freeze the clock and rewind it to offset 0.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.offset_ms = 0;
        state.resume_at = None;
    }

    /// Jump to `ms`, clamped into [0, duration]. Returns the clamped target.
    ///
    /// If the clock is running it keeps running: the offset and resume
    /// instant are re-based together so `position_ms()` is continuous from
    /// the new target.
    pub fn seek(&self, ms: u64) -> u64 {
        let mut state = self.inner.lock().unwrap();
        state.offset_ms = ms.min(self.duration_ms);
        if state.resume_at.is_some() {
            state.resume_at = Some(Instant::now());
        }
        state.offset_ms
    }

    /// Current playback position in milliseconds, as one atomic snapshot.
    ///
    /// Monotonic nondecreasing while running (capped at the track duration),
    /// constant while frozen.
    pub fn position_ms(&self) -> u64 {
        let state = self.inner.lock().unwrap();
        state.position_ms(self.duration_ms)
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().resume_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_new_clock_is_frozen_at_zero() {
        let clock = PositionClock::new(10_000);
        assert_eq!(clock.position_ms(), 0);
        assert!(!clock.is_running());
        sleep(Duration::from_millis(20));
        assert_eq!(clock.position_ms(), 0);
    }

    #[test]
    fn test_position_advances_while_running() {
        let clock = PositionClock::new(10_000);
        clock.start(0);
        assert!(clock.is_running());
        sleep(Duration::from_millis(50));
        let pos = clock.position_ms();
        assert!(pos >= 40, "expected ≥40 ms elapsed, got {pos}");
    }

    #[test]
    fn test_position_is_nondecreasing() {
        let clock = PositionClock::new(10_000);
        clock.start(0);
        let mut last = 0;
        for _ in 0..100 {
            let pos = clock.position_ms();
            assert!(pos >= last, "position went backwards: {last} -> {pos}");
            last = pos;
        }
    }

    #[test]
    fn test_pause_freezes_position() {
        let clock = PositionClock::new(10_000);
        clock.start(300);
        let frozen = clock.pause();
        assert!(frozen >= 300);
        sleep(Duration::from_millis(50));
        assert_eq!(clock.position_ms(), frozen);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_start_resumes_from_offset() {
        let clock = PositionClock::new(10_000);
        clock.start(5000);
        let pos = clock.position_ms();
        assert!(pos >= 5000 && pos < 5100, "got {pos}");
    }

    #[test]
    fn test_seek_clamps_into_duration() {
        let clock = PositionClock::new(10_000);
        assert_eq!(clock.seek(20_000), 10_000);
        assert_eq!(clock.position_ms(), 10_000);
        assert_eq!(clock.seek(5000), 5000);
        assert_eq!(clock.position_ms(), 5000);
    }

    #[test]
    fn test_seek_while_running_is_continuous() {
        let clock = PositionClock::new(10_000);
        clock.start(0);
        clock.seek(4000);
        assert!(clock.is_running());
        let pos = clock.position_ms();
        assert!(pos >= 4000 && pos < 4100, "got {pos}");
    }

    #[test]
    fn test_position_capped_at_duration() {
        let clock = PositionClock::new(30);
        clock.start(0);
        sleep(Duration::from_millis(60));
        assert_eq!(clock.position_ms(), 30);
    }

    #[test]
    fn test_reset_rewinds_and_freezes() {
        let clock = PositionClock::new(10_000);
        clock.start(2000);
        clock.reset();
        assert_eq!(clock.position_ms(), 0);
        assert!(!clock.is_running());
    }
}
