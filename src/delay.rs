//! Microsecond-accurate delays for the single-wire protocol.
//!
//! The bus slots are 1-15us wide, which is below what many platform delay
//! implementations can hit once their scheduler gets involved.
//! [`PrecisionDelay`] keeps short waits on a busy poll of a monotonic counter
//! and only hands longer waits to the platform delay.

use embedded_hal::delay::DelayNs;

/// Monotonic microsecond counter with a cooperative yield hint.
///
/// Implement this per platform (e.g. from a hardware timer or a
/// cycles-since-boot register). The counter may wrap; elapsed time is
/// computed with wrapping arithmetic, so a wrap in the middle of a wait is
/// harmless.
pub trait MonotonicClock {
    /// Microseconds since some fixed point, typically boot.
    fn now_us(&mut self) -> u32;

    /// Hint that other work may run now.
    ///
    /// Called only from waits wide enough to tolerate the interruption.
    /// Defaults to doing nothing, which is correct on bare-metal targets.
    fn yield_now(&mut self) {}
}

// Below this width the wait must not yield: a preempted poll would blow
// through the 1-15us signal windows.
const YIELD_MIN_US: u32 = 50;
// From this width on, the wrapped platform delay is accurate enough.
const COARSE_MIN_US: u32 = 200;
// Polls between cooperative yields in the middle band.
const POLLS_PER_YIELD: u32 = 100;

/// Tiered [`DelayNs`] provider built from a [`MonotonicClock`] and a coarse
/// platform delay.
///
/// * below 50us: busy poll of the counter, never yields
/// * 50us up to 200us: busy poll, yielding once every 100 polls, never
///   sleeping past the deadline
/// * 200us and above (and all millisecond waits): delegated to the wrapped
///   delay
///
/// Every wait blocks for at least the requested duration.
pub struct PrecisionDelay<C, D> {
    clock: C,
    coarse: D,
}

impl<C, D> PrecisionDelay<C, D>
where
    C: MonotonicClock,
    D: DelayNs,
{
    /// Creates a tiered delay from a microsecond counter and the platform
    /// delay used for long waits.
    pub fn new(clock: C, coarse: D) -> Self {
        PrecisionDelay { clock, coarse }
    }

    fn spin(&mut self, us: u32, allow_yield: bool) {
        let start = self.clock.now_us();
        let mut polls: u32 = 0;
        while self.clock.now_us().wrapping_sub(start) < us {
            if allow_yield {
                polls += 1;
                if polls >= POLLS_PER_YIELD {
                    self.clock.yield_now();
                    polls = 0;
                }
            }
        }
    }
}

impl<C, D> DelayNs for PrecisionDelay<C, D>
where
    C: MonotonicClock,
    D: DelayNs,
{
    fn delay_ns(&mut self, ns: u32) {
        // The counter resolves whole microseconds; round up to keep the
        // at-least guarantee.
        self.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        if us >= COARSE_MIN_US {
            self.coarse.delay_us(us);
        } else {
            self.spin(us, us >= YIELD_MIN_US);
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.coarse.delay_ms(ms);
    }
}
