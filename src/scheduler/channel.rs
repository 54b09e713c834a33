//! A single output channel's compare-match state machine.

use super::ScheduleStatus;
use crate::consts::DWELL_AVERAGE_ALPHA;
use crate::timer::{HardwareTimer, TickRate};
use embedded_hal::digital::OutputPin;

/// A pulse requested while the channel was busy, started as soon as the current one ends.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct QueuedSchedule {
    /// Compare value at which the queued pulse starts.
    pub start_compare: u16,
    /// Compare value at which the queued pulse would end if started on time.
    pub end_compare: u16,
    /// Queued pulse width in microseconds.
    pub duration: u32,
}

/// One output channel: its timer, its output pin and the OFF/PENDING/RUNNING machine.
///
/// `arm` runs in the main loop and `on_compare` runs in the channel's
/// compare interrupt. Callers must hold the channel's interrupt masked
/// around `arm`; the `global_engine_*` helpers do so with a critical section.
#[derive(Debug)]
pub struct Schedule<T, P>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Where the channel is in its cycle.
    pub status: ScheduleStatus,
    /// Width of the active pulse in microseconds, already clamped.
    pub duration: u32,
    /// Compare value the active pulse starts at.
    pub start_compare: u16,
    /// Compare value the active pulse ends at.
    pub end_compare: u16,
    /// The pulse waiting for this one to finish.
    pub next: Option<QueuedSchedule>,
    /// Compare-match channel.
    pub timer: T,
    /// Injector or coil driver.
    pub output: P,
    inverted: bool,
    rate: TickRate,
}

impl<T, P> Schedule<T, P>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Creates an idle channel and drives its output to the inactive level.
    ///
    /// # Arguments
    /// - `timer`: the channel's compare-match timer
    /// - `output`: the injector or coil driver pin
    /// - `rate`: the timer's tick rate
    /// - `inverted`: drive the pin low when the output is active
    pub fn new(timer: T, output: P, rate: TickRate, inverted: bool) -> Self {
        let mut schedule = Self {
            status: ScheduleStatus::Off,
            duration: 0,
            start_compare: 0,
            end_compare: 0,
            next: None,
            timer,
            output,
            inverted,
            rate,
        };
        schedule.drive(false);
        schedule
    }

    fn drive(&mut self, active: bool) {
        if active != self.inverted {
            let _ = self.output.set_high();
        } else {
            let _ = self.output.set_low();
        }
    }

    fn ticks(&self, us: u32) -> u16 {
        self.rate.us_to_ticks(us)
    }

    /// Requests a pulse `timeout` µs from now lasting `duration` µs.
    ///
    /// An idle channel is armed immediately. A pending or running channel is
    /// left alone and the request goes into the queued slot, replacing any
    /// earlier queued request. Both times are clamped to the timer's range.
    pub fn arm(&mut self, timeout: u32, duration: u32) {
        let duration = self.rate.clamp_period(duration);
        let start = self.timer.read_counter().wrapping_add(self.ticks(timeout));
        let end = start.wrapping_add(self.ticks(duration));

        if self.status == ScheduleStatus::Off {
            self.duration = duration;
            self.start_compare = start;
            self.end_compare = end;
            self.status = ScheduleStatus::Pending;
            self.timer.write_compare(start);
            self.timer.enable();
        } else {
            self.next = Some(QueuedSchedule {
                start_compare: start,
                end_compare: end,
                duration,
            });
        }
    }

    /// Turns the output on and programs the end compare.
    ///
    /// `end` is the compare value to use, or `None` to count `duration` from now.
    fn begin(&mut self, end: Option<u16>) {
        self.drive(true);
        self.status = ScheduleStatus::Running;
        self.end_compare = match end {
            Some(end) => end,
            None => self
                .timer
                .read_counter()
                .wrapping_add(self.ticks(self.duration)),
        };
        self.timer.write_compare(self.end_compare);
    }

    /// Turns the output off and promotes the queued pulse, if any.
    fn finish(&mut self) {
        self.drive(false);
        self.status = ScheduleStatus::Off;
        match self.next.take() {
            Some(next) => {
                self.start_compare = next.start_compare;
                self.end_compare = next.end_compare;
                self.duration = next.duration;
                self.status = ScheduleStatus::Pending;
                self.timer.write_compare(next.start_compare);
            }
            None => self.timer.disable(),
        }
    }

    /// Compare-match handler for a fuel channel.
    pub fn on_compare(&mut self) {
        match self.status {
            ScheduleStatus::Pending => self.begin(None),
            ScheduleStatus::Running => self.finish(),
            ScheduleStatus::Off => self.timer.disable(),
        }
    }

    /// Cancels a pulse that has not started yet, along with anything queued
    /// behind it. Running pulses are untouched.
    pub fn disable_pending(&mut self) {
        if self.status == ScheduleStatus::Pending {
            self.status = ScheduleStatus::Off;
            self.next = None;
        }
    }

    /// Ends the pulse now, bypassing the compare match, and drops any queued pulse.
    pub fn force_end(&mut self) {
        self.next = None;
        self.drive(false);
        self.status = ScheduleStatus::Off;
    }

    /// Drives the output inactive without touching the channel state.
    ///
    /// Used by the fixed cranking path, which fires coils straight from the
    /// tooth interrupt and lets the programmed end match land harmlessly.
    pub fn release_output(&mut self) {
        self.drive(false);
    }

    /// Moves the end of a running pulse to `time_to_end` µs from now.
    pub(crate) fn move_end(&mut self, time_to_end: u32) {
        self.end_compare = self
            .timer
            .read_counter()
            .wrapping_add(self.ticks(time_to_end));
        self.timer.write_compare(self.end_compare);
    }

    /// Latches an end compare `time_to_end` µs from now without programming it.
    pub(crate) fn latch_end(&mut self, time_to_end: u32) {
        self.end_compare = self
            .timer
            .read_counter()
            .wrapping_add(self.ticks(time_to_end));
    }
}

/// Fuel channels need nothing beyond the base machine.
pub type FuelSchedule<T, P> = Schedule<T, P>;

/// An ignition channel: the base machine plus dwell bookkeeping.
#[derive(Debug)]
pub struct IgnitionSchedule<T, P>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// The compare-match machine driving the coil.
    pub schedule: Schedule<T, P>,
    /// Time (µs) the coil started charging.
    pub start_time: u32,
    /// `schedule.end_compare` came from the tooth interrupt, not from the duration.
    pub end_set_by_decoder: bool,
    /// Crank angle the spark should occur at, used by the per-tooth path.
    pub end_angle: i16,
}

impl<T, P> IgnitionSchedule<T, P>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Creates an idle coil channel.
    pub fn new(timer: T, output: P, rate: TickRate, inverted: bool) -> Self {
        Self {
            schedule: Schedule::new(timer, output, rate, inverted),
            start_time: 0,
            end_set_by_decoder: false,
            end_angle: 0,
        }
    }

    /// Current state of the coil.
    pub fn status(&self) -> ScheduleStatus {
        self.schedule.status
    }

    /// Compare-match handler for a coil channel.
    ///
    /// # Arguments
    /// - `now`: the microsecond clock
    ///
    /// # Returns
    /// - The measured dwell when this match fired the spark, `None` otherwise
    pub fn on_compare(&mut self, now: u32) -> Option<u32> {
        match self.schedule.status {
            ScheduleStatus::Pending => {
                self.start_time = now;
                let end = if self.end_set_by_decoder {
                    Some(self.schedule.end_compare)
                } else {
                    None
                };
                self.schedule.begin(end);
                None
            }
            ScheduleStatus::Running => {
                self.end_set_by_decoder = false;
                self.schedule.finish();
                Some(now.wrapping_sub(self.start_time))
            }
            ScheduleStatus::Off => {
                self.schedule.timer.disable();
                None
            }
        }
    }
}

/// Exponential smoothing of the measured dwell.
pub(crate) fn dwell_average(sample: u32, previous: u32) -> u32 {
    let mixed = u64::from(sample) * u64::from(256 - DWELL_AVERAGE_ALPHA)
        + u64::from(previous) * u64::from(DWELL_AVERAGE_ALPHA);
    u32::try_from(mixed >> 8).unwrap_or(u32::MAX)
}
