//! Tick clock and timeouts
//!
//! Delays, wait timeouts and round-robin quanta all count timer ticks.
//!
//! Author: Tern-RTOS contributors

/// Absolute tick count
pub type Tick = u64;

/// How long a blocking call may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Poll: fail immediately instead of blocking
    NonBlocking,
    /// Block for at most this many ticks
    Ticks(u64),
    /// Block until satisfied
    Infinite,
}

impl Timeout {
    /// Absolute deadline for a wait starting at `now`, `None` if unbounded
    pub fn deadline(self, now: Tick) -> Option<Tick> {
        match self {
            Timeout::NonBlocking => Some(now),
            Timeout::Ticks(n) => Some(now.saturating_add(n)),
            Timeout::Infinite => None,
        }
    }

    /// True if the caller must not be blocked
    pub fn is_non_blocking(self) -> bool {
        matches!(self, Timeout::NonBlocking | Timeout::Ticks(0))
    }
}

impl From<u64> for Timeout {
    fn from(ticks: u64) -> Self {
        if ticks == 0 {
            Timeout::NonBlocking
        } else {
            Timeout::Ticks(ticks)
        }
    }
}

/// Monotonic tick counter advanced by the tick interrupt
pub struct TickClock {
    /// Ticks since the clock was created
    ticks: Tick,
    /// Tick interrupt frequency
    tick_hz: u32,
}

impl TickClock {
    pub const fn new(tick_hz: u32) -> Self {
        Self { ticks: 0, tick_hz }
    }

    /// Advance by one tick, returning the new count
    pub fn advance(&mut self) -> Tick {
        self.ticks = self.ticks.wrapping_add(1);
        self.ticks
    }

    pub fn now(&self) -> Tick {
        self.ticks
    }

    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }

    /// Convert milliseconds to ticks, rounding up so short delays still block
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        let hz = self.tick_hz as u64;
        (ms.saturating_mul(hz)).div_ceil(1000)
    }

    /// Milliseconds since start
    pub fn now_ms(&self) -> u64 {
        self.ticks.saturating_mul(1000) / self.tick_hz as u64
    }

    /// Ticks elapsed since a reference point
    pub fn elapsed_since(&self, reference: Tick) -> u64 {
        self.ticks.wrapping_sub(reference)
    }
}
