//! Coil dwell selection and overdwell protection.
//!
//! [`DwellGuard::check`] is meant to run from a 1 ms tick. Any coil found
//! charging for longer than the configured limit is switched off on the
//! spot, whatever its programmed end compare says. The late compare match
//! that follows then lands on an `Off` channel and only disables the timer.

use crate::config::DwellConfig;
use crate::scheduler::{IgnitionSchedule, ScheduleStatus, Scheduler};
use crate::timer::HardwareTimer;
use embedded_hal::digital::OutputPin;

/// Watchdog cutting off coils that charge for too long.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DwellGuard {
    /// Dwell settings.
    pub config: DwellConfig,
    /// Coils forced off since start-up, wrapping.
    pub trips: u16,
}

impl DwellGuard {
    /// Creates a guard with no trips recorded.
    pub fn new(config: DwellConfig) -> Self {
        Self { config, trips: 0 }
    }

    /// Whether the overdwell limit applies at this speed.
    ///
    /// With fixed cranking timing the cranking dwell is allowed to run past
    /// the limit, so the guard stays out of the way until the engine is above
    /// cranking speed.
    pub fn is_active(&self, rpm: u16, crank_rpm: u16) -> bool {
        if !self.config.use_dwell_limit {
            return false;
        }
        if self.config.fixed_cranking_override {
            rpm >= crank_rpm
        } else {
            true
        }
    }

    /// Target dwell in microseconds.
    ///
    /// # Arguments
    /// - `cranking`: the engine is below cranking speed
    /// - `map_dwell`: dwell from the tune's dwell table, in tenths of a ms, if used
    pub fn compute_dwell(&self, cranking: bool, map_dwell: Option<u8>) -> u32 {
        let tenths = if cranking {
            self.config.cranking_dwell
        } else {
            map_dwell.unwrap_or(self.config.running_dwell)
        };
        u32::from(tenths) * 100
    }

    /// Forces every overdwelling coil off.
    ///
    /// # Arguments
    /// - `scheduler`: owner of the coil channels
    /// - `now`: the microsecond clock
    /// - `rpm`, `crank_rpm`: current and cranking speed
    ///
    /// # Returns
    /// - The number of coils switched off by this call
    pub fn check<T, P, const INJ: usize, const IGN: usize>(
        &mut self,
        scheduler: &mut Scheduler<T, P, INJ, IGN>,
        now: u32,
        rpm: u16,
        crank_rpm: u16,
    ) -> usize
    where
        T: HardwareTimer,
        P: OutputPin,
    {
        if !self.is_active(rpm, crank_rpm) {
            return 0;
        }
        let limit = self.config.limit_us();
        let mut tripped = 0;
        for (channel, coil) in scheduler.ignition.iter_mut().enumerate() {
            if protect_channel(coil, now, limit) {
                warn!("coil {} overdwell, forced off", channel);
                tripped += 1;
            }
        }
        self.trips = self.trips.wrapping_add(u16::try_from(tripped).unwrap_or(u16::MAX));
        tripped
    }
}

/// Ends one coil's dwell if it has been charging for more than `limit` µs.
///
/// # Returns
/// - `true` if the coil was switched off
pub fn protect_channel<T, P>(coil: &mut IgnitionSchedule<T, P>, now: u32, limit: u32) -> bool
where
    T: HardwareTimer,
    P: OutputPin,
{
    if coil.status() == ScheduleStatus::Running && now.wrapping_sub(coil.start_time) > limit {
        coil.schedule.force_end();
        coil.end_set_by_decoder = false;
        true
    } else {
        false
    }
}
