//! Hardware timer boundary and microsecond to tick conversion.
//!
//! Each output channel owns a 16-bit compare register on a free-running
//! counter. The scheduler only ever talks to it through [`HardwareTimer`],
//! which a board support crate implements once per channel and tests
//! replace with a fake.
//!
//! Contains:
//! - [`HardwareTimer`]: counter read, compare write, interrupt enable/disable
//! - [`TickRate`]: the integer microsecond to tick conversion of each target
//! - `global_engine_*` and the ISR macros: interrupt-context wrappers around a
//!   global [`Engine`](crate::engine::Engine) (feature `timer-isr`)
//!
//! Supported tick rates:
//!
//! | TARGET           | TICK          | CONVERSION         | Max period   |
//! |------------------|---------------|--------------------|--------------|
//! | AVR, /64 @ 16MHz | 4 µs          | `us >> 2`          | 262 140 µs   |
//! | ARM, 0.46875 MHz | 2.133 µs      | `(us * 15) >> 5`   | 139 808 µs   |

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;

/// A compare-match channel on a free-running 16-bit counter.
pub trait HardwareTimer {
    /// Current value of the free-running counter.
    fn read_counter(&mut self) -> u16;
    /// Programs the compare register. The interrupt fires when the counter reaches `value`.
    fn write_compare(&mut self, value: u16);
    /// Enables this channel's compare interrupt.
    fn enable(&mut self);
    /// Disables this channel's compare interrupt.
    fn disable(&mut self);
}

/// Counter rate of the target's scheduling timers.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TickRate {
    /// 16 MHz clock with a /64 prescaler: one tick every 4 µs.
    #[default]
    FourMicros,
    /// 15 ticks per 32 µs, as used on the ARM targets.
    FifteenThirtySeconds,
}

impl TickRate {
    /// Longest delay, in microseconds, the 16-bit compare can reach.
    pub const fn max_period_us(self) -> u32 {
        match self {
            TickRate::FourMicros => 262_140,
            TickRate::FifteenThirtySeconds => 139_808,
        }
    }

    /// Converts microseconds to counter ticks.
    ///
    /// # Arguments
    /// - `us`: delay in microseconds
    ///
    /// # Returns
    /// - The tick count, truncated. Delays at or past
    ///   [`max_period_us`](Self::max_period_us) are clamped to one microsecond
    ///   below it so the compare value never wraps past the counter.
    pub const fn us_to_ticks(self, us: u32) -> u16 {
        let us = if us >= self.max_period_us() {
            self.max_period_us() - 1
        } else {
            us
        };
        match self {
            TickRate::FourMicros => (us >> 2) as u16,
            TickRate::FifteenThirtySeconds => ((us * 15) >> 5) as u16,
        }
    }

    /// Clamps a pulse length to what one compare period can hold.
    pub const fn clamp_period(self, us: u32) -> u32 {
        if us >= self.max_period_us() {
            self.max_period_us() - 1
        } else {
            us
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::HardwareTimer;

    /// Timer double recording what the scheduler programmed.
    #[derive(Debug, Default)]
    pub(crate) struct FakeTimer {
        pub(crate) counter: u16,
        pub(crate) compare: u16,
        pub(crate) enabled: bool,
        pub(crate) writes: usize,
    }

    impl HardwareTimer for FakeTimer {
        fn read_counter(&mut self) -> u16 {
            self.counter
        }
        fn write_compare(&mut self, value: u16) {
            self.compare = value;
            self.writes += 1;
        }
        fn enable(&mut self) {
            self.enabled = true;
        }
        fn disable(&mut self) {
            self.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avr_tick_conversion() {
        let rate = TickRate::FourMicros;
        assert_eq!(rate.us_to_ticks(4800), 1200);
        assert_eq!(rate.us_to_ticks(803), 200);
        assert_eq!(rate.us_to_ticks(262_139), 65_534);
        assert_eq!(rate.us_to_ticks(262_140), 65_534);
        assert_eq!(rate.us_to_ticks(u32::MAX), 65_534);
    }

    #[test]
    fn test_arm_tick_conversion() {
        let rate = TickRate::FifteenThirtySeconds;
        assert_eq!(rate.us_to_ticks(32), 15);
        assert_eq!(rate.us_to_ticks(4800), 2250);
        assert_eq!(rate.us_to_ticks(139_808), 65_534);
        assert_eq!(rate.us_to_ticks(1_000_000), 65_534);
    }

    #[test]
    fn test_clamp_period() {
        assert_eq!(TickRate::FourMicros.clamp_period(300_000), 262_139);
        assert_eq!(TickRate::FourMicros.clamp_period(1_000), 1_000);
    }
}
