//! Fuel and ignition event scheduler.
//!
//! Every output channel runs the same three-state machine:
//!
//! ```text
//!        arm()            start match          end match
//!  OFF ─────────▶ PENDING ───────────▶ RUNNING ─────────▶ OFF
//!                    ▲                               │
//!                    └──────── queued pulse ─────────┘
//! ```
//!
//! Arming a busy channel never touches the pulse in flight; the request is
//! parked in the channel's queued slot and promoted the moment the current
//! pulse ends. At most one physical pulse is ever in flight per channel.
//!
//! Ignition channels additionally record when the coil started charging so
//! the [`DwellGuard`](crate::dwell::DwellGuard) can cut it off, and may have
//! their end compare supplied by the decoder's per-tooth path instead of
//! counted from the dwell duration.

mod calcs;
mod channel;

pub use calcs::*;
pub use channel::*;

use crate::config::ConfigError;
use crate::consts::INJECTOR_PRIMING_DELAY_US;
use crate::timer::{HardwareTimer, TickRate};
use embedded_hal::digital::OutputPin;

/// Lifecycle of an output channel.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ScheduleStatus {
    /// Idle. The timer interrupt is disabled.
    #[default]
    Off,
    /// Armed. The output turns on at the start compare.
    Pending,
    /// Output on. It turns off at the end compare.
    Running,
}

/// All injector and coil channels of the engine.
///
/// # Type Parameters
/// - `T`: the per-channel compare-match timer
/// - `P`: the injector/coil output pin
/// - `INJ`: number of fuel channels
/// - `IGN`: number of ignition channels
#[derive(Debug)]
pub struct Scheduler<T, P, const INJ: usize, const IGN: usize>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Injector channels.
    pub fuel: [FuelSchedule<T, P>; INJ],
    /// Coil channels.
    pub ignition: [IgnitionSchedule<T, P>; IGN],
    /// Sparks fired since start-up, wrapping.
    pub ignition_count: u16,
    /// Smoothed measured dwell in microseconds.
    pub actual_dwell: u32,
}

impl<T, P, const INJ: usize, const IGN: usize> Scheduler<T, P, INJ, IGN>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Builds the scheduler from one timer and one output per channel.
    ///
    /// # Arguments
    /// - `fuel`: `(timer, injector pin)` for each fuel channel
    /// - `ignition`: `(timer, coil pin)` for each ignition channel
    /// - `rate`: tick rate shared by all channel timers
    /// - `inverted_coils`: coil drivers are active low
    ///
    /// # Returns
    /// A scheduler with every channel `Off` and every output inactive.
    pub fn new(
        fuel: [(T, P); INJ],
        ignition: [(T, P); IGN],
        rate: TickRate,
        inverted_coils: bool,
    ) -> Self {
        Self {
            fuel: fuel.map(|(timer, pin)| Schedule::new(timer, pin, rate, false)),
            ignition: ignition
                .map(|(timer, pin)| IgnitionSchedule::new(timer, pin, rate, inverted_coils)),
            ignition_count: 0,
            actual_dwell: 0,
        }
    }

    /// Requests an injector pulse.
    ///
    /// # Arguments
    /// - `channel`: fuel channel index
    /// - `timeout`: microseconds until the injector opens
    /// - `duration`: pulse width in microseconds
    pub fn arm_fuel(
        &mut self,
        channel: usize,
        timeout: u32,
        duration: u32,
    ) -> Result<(), ConfigError> {
        let schedule = self
            .fuel
            .get_mut(channel)
            .ok_or(ConfigError::InvalidChannel { index: channel })?;
        if schedule.status != ScheduleStatus::Off {
            trace!("fuel {} busy, queueing pulse", channel);
        }
        schedule.arm(timeout, duration);
        Ok(())
    }

    /// Requests a coil charge.
    ///
    /// # Arguments
    /// - `channel`: ignition channel index
    /// - `timeout`: microseconds until the coil starts charging
    /// - `duration`: dwell in microseconds
    pub fn arm_ignition(
        &mut self,
        channel: usize,
        timeout: u32,
        duration: u32,
    ) -> Result<(), ConfigError> {
        let coil = self
            .ignition
            .get_mut(channel)
            .ok_or(ConfigError::InvalidChannel { index: channel })?;
        if coil.status() != ScheduleStatus::Off {
            trace!("ignition {} busy, queueing dwell", channel);
        }
        coil.schedule.arm(timeout, duration);
        Ok(())
    }

    /// Compare-match interrupt of a fuel channel.
    pub fn on_fuel_compare(&mut self, channel: usize) {
        if let Some(schedule) = self.fuel.get_mut(channel) {
            schedule.on_compare();
        }
    }

    /// Compare-match interrupt of an ignition channel.
    ///
    /// When the match fires the spark, the spark counter and the smoothed
    /// dwell are updated.
    pub fn on_ignition_compare(&mut self, channel: usize, now: u32) {
        if let Some(coil) = self.ignition.get_mut(channel) {
            if let Some(dwell) = coil.on_compare(now) {
                self.ignition_count = self.ignition_count.wrapping_add(1);
                self.actual_dwell = dwell_average(dwell, self.actual_dwell);
            }
        }
    }

    /// Cancels a fuel pulse that has not started.
    pub fn disable_pending_fuel(&mut self, channel: usize) {
        if let Some(schedule) = self.fuel.get_mut(channel) {
            schedule.disable_pending();
        }
    }

    /// Cancels a coil charge that has not started.
    pub fn disable_pending_ignition(&mut self, channel: usize) {
        if let Some(coil) = self.ignition.get_mut(channel) {
            coil.schedule.disable_pending();
        }
    }

    /// Brings a running coil's spark forward to `time_to_end` µs from now.
    ///
    /// Only a running channel whose dwell would otherwise end later is
    /// touched, so a refresh can never lengthen the dwell.
    pub fn refresh_ignition(&mut self, channel: usize, time_to_end: u32) {
        if let Some(coil) = self.ignition.get_mut(channel) {
            if coil.status() == ScheduleStatus::Running && time_to_end < coil.schedule.duration {
                coil.schedule.move_end(time_to_end);
            }
        }
    }

    /// Sets a coil's spark `time_to_end` µs from now on behalf of the tooth interrupt.
    ///
    /// A running coil is reprogrammed immediately. A pending coil, when
    /// `latch_pending` allows it, keeps the value and is flagged so its start
    /// match programs that end instead of counting out the dwell.
    pub fn set_ignition_end_from_decoder(
        &mut self,
        channel: usize,
        time_to_end: u32,
        latch_pending: bool,
    ) {
        if let Some(coil) = self.ignition.get_mut(channel) {
            match coil.status() {
                ScheduleStatus::Running => coil.schedule.move_end(time_to_end),
                ScheduleStatus::Pending if latch_pending => {
                    coil.schedule.latch_end(time_to_end);
                    coil.end_set_by_decoder = true;
                }
                _ => {}
            }
        }
    }

    /// Switches a coil off immediately, leaving its schedule to run out.
    pub fn fire_coil_now(&mut self, channel: usize) {
        if let Some(coil) = self.ignition.get_mut(channel) {
            coil.schedule.release_output();
        }
    }

    /// Fires a priming pulse on the first `channels` injectors.
    ///
    /// Each channel opens [`INJECTOR_PRIMING_DELAY_US`] after the call and
    /// stays open for `pulse_width` µs. A zero width primes nothing.
    pub fn begin_injector_priming(&mut self, channels: usize, pulse_width: u32) {
        if pulse_width == 0 {
            return;
        }
        debug!("priming {} injectors for {} us", channels, pulse_width);
        for schedule in self.fuel.iter_mut().take(channels) {
            schedule.arm(INJECTOR_PRIMING_DELAY_US, pulse_width);
        }
    }

    /// Status of a fuel channel, for telemetry.
    pub fn fuel_status(&self, channel: usize) -> Option<ScheduleStatus> {
        self.fuel.get(channel).map(|s| s.status)
    }

    /// Status of an ignition channel, for telemetry.
    pub fn ignition_status(&self, channel: usize) -> Option<ScheduleStatus> {
        self.ignition.get(channel).map(|c| c.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::fake::FakeTimer;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    fn pin(extra: &[PinTransaction]) -> PinMock {
        let mut transactions = std::vec![PinTransaction::set(PinState::Low)];
        transactions.extend_from_slice(extra);
        PinMock::new(&transactions)
    }

    fn scheduler(
        fuel: [&[PinTransaction]; 2],
        ign: [&[PinTransaction]; 2],
    ) -> Scheduler<FakeTimer, PinMock, 2, 2> {
        Scheduler::new(
            fuel.map(|t| (FakeTimer::default(), pin(t))),
            ign.map(|t| (FakeTimer::default(), pin(t))),
            TickRate::FourMicros,
            false,
        )
    }

    fn done(mut s: Scheduler<FakeTimer, PinMock, 2, 2>) {
        for ch in s.fuel.iter_mut() {
            ch.output.done();
        }
        for coil in s.ignition.iter_mut() {
            coil.schedule.output.done();
        }
    }

    #[test]
    fn test_arm_fuel_pending_running_off() {
        let on_off = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut s = scheduler([&on_off, &[]], [&[], &[]]);
        s.arm_fuel(0, 4800, 800).unwrap();
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Pending));
        assert_eq!(s.fuel[0].timer.compare, 1200);

        s.fuel[0].timer.counter = 1200;
        s.on_fuel_compare(0);
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Running));
        assert_eq!(s.fuel[0].timer.compare, 1400);

        s.fuel[0].timer.counter = 1400;
        s.on_fuel_compare(0);
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Off));
        assert_eq!(s.fuel_status(1), Some(ScheduleStatus::Off));
        done(s);
    }

    #[test]
    fn test_invalid_channel() {
        let mut s = scheduler([&[], &[]], [&[], &[]]);
        assert_eq!(
            s.arm_fuel(2, 100, 100),
            Err(ConfigError::InvalidChannel { index: 2 })
        );
        assert_eq!(
            s.arm_ignition(5, 100, 100),
            Err(ConfigError::InvalidChannel { index: 5 })
        );
        s.on_fuel_compare(9);
        assert_eq!(s.ignition_status(9), None);
        done(s);
    }

    #[test]
    fn test_queued_pulse_promoted_once() {
        let two_pulses = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut s = scheduler([&two_pulses, &[]], [&[], &[]]);
        s.arm_fuel(0, 400, 400).unwrap();
        s.on_fuel_compare(0);
        s.arm_fuel(0, 800, 400).unwrap();
        s.arm_fuel(0, 1200, 400).unwrap();
        assert_eq!(s.fuel[0].start_compare, 100);
        assert_eq!(s.fuel[0].next.map(|n| n.start_compare), Some(300));

        s.on_fuel_compare(0);
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Pending));
        s.on_fuel_compare(0);
        s.on_fuel_compare(0);
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Off));
        assert!(!s.fuel[0].timer.enabled);
        done(s);
    }

    #[test]
    fn test_disable_pending() {
        let mut s = scheduler([&[], &[]], [&[], &[]]);
        s.arm_fuel(1, 1000, 1000).unwrap();
        s.arm_ignition(0, 1000, 1000).unwrap();
        s.disable_pending_fuel(1);
        s.disable_pending_ignition(0);
        assert_eq!(s.fuel_status(1), Some(ScheduleStatus::Off));
        assert_eq!(s.ignition_status(0), Some(ScheduleStatus::Off));
        done(s);
    }

    #[test]
    fn test_spark_counts_and_dwell_average() {
        let on_off = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut s = scheduler([&[], &[]], [&on_off, &[]]);
        s.arm_ignition(0, 1000, 3000).unwrap();
        s.on_ignition_compare(0, 5_000);
        s.on_ignition_compare(0, 8_000);
        assert_eq!(s.ignition_count, 1);
        assert_eq!(s.actual_dwell, 2_648);
        done(s);
    }

    #[test]
    fn test_refresh_only_shortens() {
        let on = [PinTransaction::set(PinState::High)];
        let mut s = scheduler([&[], &[]], [&on, &[]]);
        s.arm_ignition(0, 0, 4000).unwrap();
        s.on_ignition_compare(0, 0);
        assert_eq!(s.ignition[0].schedule.timer.compare, 1000);

        s.refresh_ignition(0, 8000);
        assert_eq!(s.ignition[0].schedule.timer.compare, 1000);
        s.refresh_ignition(0, 2000);
        assert_eq!(s.ignition[0].schedule.timer.compare, 500);
        done(s);
    }

    #[test]
    fn test_decoder_end_on_pending_coil() {
        let on = [PinTransaction::set(PinState::High)];
        let mut s = scheduler([&[], &[]], [&on, &[]]);
        s.arm_ignition(0, 400, 4000).unwrap();
        s.set_ignition_end_from_decoder(0, 2000, false);
        assert!(!s.ignition[0].end_set_by_decoder);
        s.set_ignition_end_from_decoder(0, 2000, true);
        assert!(s.ignition[0].end_set_by_decoder);

        s.ignition[0].schedule.timer.counter = 100;
        s.on_ignition_compare(0, 400);
        assert_eq!(s.ignition[0].schedule.timer.compare, 500);
        done(s);
    }

    #[test]
    fn test_decoder_end_on_running_coil() {
        let on_off = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ];
        let mut s = scheduler([&[], &[]], [&on_off, &[]]);
        s.arm_ignition(0, 0, 4000).unwrap();
        s.on_ignition_compare(0, 0);
        s.ignition[0].schedule.timer.counter = 200;
        s.set_ignition_end_from_decoder(0, 400, true);
        assert_eq!(s.ignition[0].schedule.timer.compare, 300);
        assert!(!s.ignition[0].end_set_by_decoder);

        // coil is switched off but stays running until its end match
        s.fire_coil_now(0);
        assert_eq!(s.ignition_status(0), Some(ScheduleStatus::Running));
        done(s);
    }

    #[test]
    fn test_injector_priming() {
        let on = [PinTransaction::set(PinState::High)];
        let mut s = scheduler([&on, &[]], [&[], &[]]);
        s.begin_injector_priming(1, 5000);
        assert_eq!(s.fuel_status(0), Some(ScheduleStatus::Pending));
        assert_eq!(s.fuel_status(1), Some(ScheduleStatus::Off));
        assert_eq!(s.fuel[0].timer.compare, 25);
        s.on_fuel_compare(0);
        assert_eq!(s.fuel[0].duration, 5000);
        s.begin_injector_priming(2, 0);
        assert_eq!(s.fuel_status(1), Some(ScheduleStatus::Off));
        done(s);
    }
}
