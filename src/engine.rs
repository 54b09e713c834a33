//! The decoder, scheduler and dwell guard wired together.
//!
//! [`Engine`] is what the interrupt handlers talk to. It forwards edges to
//! the [`TriggerDecoder`], then runs the two tooth-driven ignition paths the
//! scheduler cannot see on its own:
//!
//! - **Per-tooth end adjust**: when a primary tooth is a coil's end tooth,
//!   the coil's spark is re-timed from that tooth's known angle.
//! - **Fixed cranking**: with crank lock on, distributor-style patterns fire
//!   the coils straight from the tooth interrupt while cranking.
//!
//! Everything else is a thin pass-through so a single global can serve all
//! interrupts (see the `timer-isr` helpers in [`timer`](crate::timer)).

use crate::config::{ConfigError, DwellConfig, TriggerConfig, TriggerPattern};
use crate::consts::{IGN_CHANNELS, INJ_CHANNELS, MIN_CYCLES_FOR_END_COMPARE};
use crate::decoder::{ToothEvent, TriggerDecoder, ignition_limits};
use crate::dwell::DwellGuard;
use crate::scheduler::Scheduler;
use crate::timer::HardwareTimer;
use embedded_hal::digital::{InputPin, OutputPin};

/// Coils a distributor or Daihatsu wheel can fire directly.
const FIXED_CRANKING_COILS: usize = 4;

/// An engine with the full complement of channels.
pub type FullEngine<T, P> = Engine<T, P, INJ_CHANNELS, IGN_CHANNELS>;

/// Decoder, output channels and overdwell guard of one engine.
///
/// # Type Parameters
/// - `T`: the per-channel compare-match timer
/// - `P`: the injector/coil output pin
/// - `INJ`: number of fuel channels
/// - `IGN`: number of ignition channels
#[derive(Debug)]
pub struct Engine<T, P, const INJ: usize, const IGN: usize>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Trigger decoder.
    pub decoder: TriggerDecoder,
    /// Fuel and ignition channels.
    pub scheduler: Scheduler<T, P, INJ, IGN>,
    /// Overdwell protection and dwell selection.
    pub dwell: DwellGuard,
}

impl<T, P, const INJ: usize, const IGN: usize> Engine<T, P, INJ, IGN>
where
    T: HardwareTimer,
    P: OutputPin,
{
    /// Builds the engine around an existing scheduler.
    ///
    /// # Arguments
    /// - `trigger`: wheel and engine configuration
    /// - `dwell`: dwell settings
    /// - `scheduler`: the output channels
    ///
    /// # Returns
    /// - The engine, or the [`ConfigError`] the trigger configuration failed with
    pub fn new(
        trigger: TriggerConfig,
        dwell: DwellConfig,
        scheduler: Scheduler<T, P, INJ, IGN>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            decoder: TriggerDecoder::new(trigger)?,
            scheduler,
            dwell: DwellGuard::new(dwell),
        })
    }

    /// Replaces the trigger configuration and restarts the decoder.
    ///
    /// The old decoder keeps running if the new configuration is rejected.
    pub fn reconfigure(&mut self, trigger: TriggerConfig) -> Result<(), ConfigError> {
        self.decoder = TriggerDecoder::new(trigger)?;
        Ok(())
    }

    /// Handles a primary tooth seen at `now`.
    ///
    /// # Returns
    /// - `false` when the decoder rejected the edge as noise
    pub fn on_primary_edge(&mut self, now: u32) -> bool {
        let had_sync = self.decoder.state.has_sync;
        if !self.decoder.on_primary_edge(now) {
            return false;
        }
        match (had_sync, self.decoder.state.has_sync) {
            (false, true) => debug!("sync acquired at tooth {}", self.decoder.state.tooth_counter),
            (true, false) => warn!(
                "sync lost, {} losses so far",
                self.decoder.state.sync_loss_counter
            ),
            _ => {}
        }

        self.fixed_cranking(had_sync);
        if let Some(event) = self.decoder.tooth_event() {
            self.per_tooth_timing(event);
        }
        true
    }

    /// Primary input interrupt, qualified by the pin level.
    pub fn on_primary_interrupt<I: InputPin>(&mut self, pin: &mut I, now: u32) -> bool {
        let level = pin.is_high().unwrap_or(false);
        if !self.decoder.config.primary_edge.accepts(level) {
            return false;
        }
        self.on_primary_edge(now)
    }

    /// Handles a secondary tooth seen at `now`.
    pub fn on_secondary_edge(&mut self, now: u32) {
        self.decoder.on_secondary_edge(now);
    }

    /// Secondary input interrupt, qualified by the pin level.
    pub fn on_secondary_interrupt<I: InputPin>(&mut self, pin: &mut I, now: u32) {
        self.decoder.on_secondary_interrupt(pin, now);
    }

    /// Compare-match interrupt of a fuel channel.
    pub fn on_fuel_compare(&mut self, channel: usize) {
        self.scheduler.on_fuel_compare(channel);
    }

    /// Compare-match interrupt of an ignition channel.
    pub fn on_ignition_compare(&mut self, channel: usize, now: u32) {
        self.scheduler.on_ignition_compare(channel, now);
    }

    /// Millisecond tick: overdwell protection.
    ///
    /// # Returns
    /// - The number of coils forced off
    pub fn dwell_tick(&mut self, now: u32) -> usize {
        let rpm = self.decoder.state.rpm;
        let crank_rpm = self.decoder.config.crank_rpm;
        self.dwell.check(&mut self.scheduler, now, rpm, crank_rpm)
    }

    /// Current engine speed, see [`TriggerDecoder::rpm`].
    pub fn rpm(&mut self, now: u32) -> u16 {
        self.decoder.rpm(now)
    }

    /// Current crank angle, see [`TriggerDecoder::crank_angle`].
    pub fn crank_angle(&self, now: u32) -> i16 {
        self.decoder.crank_angle(now)
    }

    /// Whether the engine is below cranking speed.
    pub fn is_cranking(&self) -> bool {
        self.decoder.is_cranking()
    }

    /// Records each coil's spark angle and recomputes the end teeth.
    ///
    /// # Arguments
    /// - `end_angles`: spark angle per ignition channel, extra entries are ignored
    /// - `advance`: current spark advance
    pub fn set_end_angles(&mut self, end_angles: &[i16], advance: i16) {
        for (coil, &angle) in self.scheduler.ignition.iter_mut().zip(end_angles) {
            coil.end_angle = angle;
        }
        self.decoder.set_end_teeth(end_angles, advance);
    }

    /// Requests an injector pulse, see [`Scheduler::arm_fuel`].
    pub fn arm_fuel(
        &mut self,
        channel: usize,
        timeout: u32,
        duration: u32,
    ) -> Result<(), ConfigError> {
        self.scheduler.arm_fuel(channel, timeout, duration)
    }

    /// Requests a coil charge, see [`Scheduler::arm_ignition`].
    pub fn arm_ignition(
        &mut self,
        channel: usize,
        timeout: u32,
        duration: u32,
    ) -> Result<(), ConfigError> {
        self.scheduler.arm_ignition(channel, timeout, duration)
    }

    /// Target dwell in microseconds for the current speed.
    pub fn compute_dwell(&self, map_dwell: Option<u8>) -> u32 {
        self.dwell.compute_dwell(self.is_cranking(), map_dwell)
    }

    /// Primes one injector per cylinder with a `pulse_width` µs pulse.
    pub fn begin_injector_priming(&mut self, pulse_width: u32) {
        let channels = usize::from(self.decoder.config.cylinders).min(INJ);
        self.scheduler.begin_injector_priming(channels, pulse_width);
    }

    /// Fires coils straight from the tooth interrupt while cranking.
    ///
    /// The distributor fires on every accepted tooth, synced or not. Daihatsu
    /// fires by tooth number, so it needs sync from before this tooth.
    fn fixed_cranking(&mut self, had_sync: bool) {
        if !self.dwell.config.fixed_cranking_override
            || !self.decoder.is_cranking()
            || !self.decoder.has_fixed_cranking()
        {
            return;
        }
        match self.decoder.config.pattern {
            TriggerPattern::Daihatsu => {
                if !(had_sync && self.decoder.state.has_sync) {
                    return;
                }
                let tooth = usize::from(self.decoder.state.tooth_counter);
                if (1..=FIXED_CRANKING_COILS).contains(&tooth) {
                    self.scheduler.fire_coil_now(tooth - 1);
                }
            }
            _ => {
                for channel in 0..FIXED_CRANKING_COILS.min(IGN) {
                    self.scheduler.fire_coil_now(channel);
                }
            }
        }
    }

    fn per_tooth_timing(&mut self, event: ToothEvent) {
        let locked = self.dwell.config.fixed_cranking_override && self.decoder.is_cranking();
        if locked || self.decoder.state.rpm == 0 {
            return;
        }
        let Some(channel) = self
            .decoder
            .end_teeth
            .iter()
            .take(IGN)
            .position(|&tooth| tooth == event.tooth)
        else {
            return;
        };
        let Some(coil) = self.scheduler.ignition.get(channel) else {
            return;
        };
        let max = self.decoder.config.max_ignition_angle();
        let angle = ignition_limits(
            i32::from(coil.end_angle) - i32::from(event.crank_angle),
            max,
        );
        let time = self
            .decoder
            .converter
            .angle_to_time(u16::try_from(angle).unwrap_or(0));
        let latch_pending = self.decoder.state.start_revolutions > MIN_CYCLES_FOR_END_COMPARE;
        self.scheduler
            .set_ignition_end_from_decoder(channel, time, latch_pending);
    }
}
