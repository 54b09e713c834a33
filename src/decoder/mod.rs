//! Trigger decoders.
//!
//! A [`TriggerDecoder`] turns primary (crank) and secondary (cam) edge
//! timestamps into tooth position, sync state, RPM and crank angle. The
//! wheel layout is picked once from [`TriggerConfig::pattern`] and every
//! operation dispatches on it:
//!
//! | Operation                              | Context             |
//! |----------------------------------------|---------------------|
//! | [`on_primary_edge`](TriggerDecoder::on_primary_edge)     | primary edge ISR   |
//! | [`on_secondary_edge`](TriggerDecoder::on_secondary_edge) | secondary edge ISR |
//! | [`rpm`](TriggerDecoder::rpm)           | main loop           |
//! | [`crank_angle`](TriggerDecoder::crank_angle) | main loop     |
//! | [`set_end_teeth`](TriggerDecoder::set_end_teeth) | main loop |
//!
//! ## Sync
//!
//! Nothing read from the decoder means anything until [`DecoderState::has_sync`]
//! is set. Sync is dropped (and [`DecoderState::sync_loss_counter`] bumped)
//! when the tooth count stops matching the wheel, and recovered on the next
//! valid reference tooth. A stall clears everything except that counter.
//!
//! ## Noise
//!
//! Most patterns reject primary edges arriving sooner than
//! [`DecoderState::filter_time`] after the previous tooth. Rejected edges
//! leave no trace in the state.

mod audi135;
mod daihatsu;
mod distributor;
mod dual_wheel;
mod gm24x;
mod gm7x;
mod honda_d17;
mod jeep2000;
mod log;
mod missing_tooth;
mod non360;

pub use log::ToothLog;

use crate::config::{ConfigError, TriggerConfig, TriggerFilter, TriggerPattern, TriggerSpeed};
use crate::consts::{DEFAULT_STALL_TIME, IGN_CHANNELS};
use crate::crank_math::{AngleConverter, ToothInterval, rpm_from_revolution_time};
use embedded_hal::digital::InputPin;

/// Everything a decoder knows about the wheels.
///
/// Written by the edge handlers only. Readers in the main loop should take a
/// [`snapshot`](TriggerDecoder::snapshot) rather than reading fields one by one.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DecoderState {
    /// Position of the last primary tooth in the current revolution or cycle.
    pub tooth_counter: u16,
    /// Timestamp of the last accepted primary tooth.
    pub last_tooth_time: u32,
    /// Timestamp of the primary tooth before that.
    pub prior_tooth_time: u32,
    /// Timestamp of the last tooth one.
    pub last_revolution_time: u32,
    /// Timestamp of the tooth one before that.
    pub prior_revolution_time: u32,
    /// Degrees covered by the last tooth interval.
    pub tooth_angle: u16,
    /// Tooth one has been positively identified.
    pub has_sync: bool,
    /// Position within one crank revolution is known, but not which revolution.
    pub half_sync: bool,
    /// Times sync has been lost, wrapping.
    pub sync_loss_counter: u8,
    /// Revolutions seen since sync was gained.
    pub start_revolutions: u16,
    /// The engine is in the first of the two crank revolutions of a cycle.
    pub revolution_one: bool,
    /// [`tooth_angle`](Self::tooth_angle) matches the last interval (it did not span a gap).
    pub tooth_angle_correct: bool,
    /// Secondary teeth seen since the secondary reference.
    pub secondary_tooth_count: u8,
    /// Timestamp of the last accepted secondary tooth.
    pub last_secondary_time: u32,
    /// Timestamp of the secondary tooth before that.
    pub prior_secondary_time: u32,
    /// Physical teeth seen since the last virtual tooth (Audi 135, Daihatsu).
    pub system_tooth_count: u8,
    /// Timestamp of the last physical tooth (Audi 135).
    pub last_system_tooth_time: u32,
    /// Gap measured at the previous primary edge.
    pub last_gap: u32,
    /// Primary edges closer than this to the last tooth are noise.
    pub filter_time: u32,
    /// Secondary edges closer than this to the last secondary tooth are noise.
    pub secondary_filter_time: u32,
    /// Last RPM reported.
    pub rpm: u16,
    /// No primary tooth for this long means the engine has stopped.
    pub stall_time: u32,
    /// Level of the secondary input at its last interrupt.
    pub secondary_level: bool,
}

/// Position reported by a primary edge to the per-tooth ignition path.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ToothEvent {
    /// Tooth index, in the same numbering as [`TriggerDecoder::end_teeth`].
    pub tooth: u16,
    /// Crank angle of that tooth.
    pub crank_angle: i16,
}

/// The active trigger decoder.
#[derive(Debug)]
pub struct TriggerDecoder {
    /// Wheel and engine configuration the decoder was built from.
    pub config: TriggerConfig,
    /// Live decoder state.
    pub state: DecoderState,
    /// Angle/time conversion factors, refreshed by [`rpm`](Self::rpm).
    pub converter: AngleConverter,
    /// Tooth at which each coil should fire, see [`set_end_teeth`](Self::set_end_teeth).
    pub end_teeth: [u16; IGN_CHANNELS],
    /// Log of primary tooth gaps.
    pub tooth_log: ToothLog,
    actual_teeth: u16,
}

impl TriggerDecoder {
    /// Builds and initialises a decoder.
    ///
    /// # Returns
    /// - The decoder, waiting for its first tooth
    /// - The [`ConfigError`] when the configuration cannot describe a wheel
    pub fn new(config: TriggerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut decoder = Self {
            config,
            state: DecoderState::default(),
            converter: AngleConverter::new(),
            end_teeth: [0; IGN_CHANNELS],
            tooth_log: ToothLog::new(),
            actual_teeth: 0,
        };
        decoder.setup();
        debug!(
            "decoder ready, tooth angle {} stall {} us",
            decoder.state.tooth_angle,
            decoder.state.stall_time
        );
        Ok(decoder)
    }

    /// Forgets everything and re-runs the pattern initialisation.
    pub fn setup(&mut self) {
        self.state = DecoderState {
            stall_time: DEFAULT_STALL_TIME,
            ..Default::default()
        };
        self.converter.clear();
        self.actual_teeth = self.config.teeth;
        match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::setup(self),
            TriggerPattern::DualWheel => dual_wheel::setup(self),
            TriggerPattern::BasicDistributor => distributor::setup(self),
            TriggerPattern::Gm7x => gm7x::setup(self),
            TriggerPattern::Gm24x => gm24x::setup(self),
            TriggerPattern::Jeep2000 => jeep2000::setup(self),
            TriggerPattern::Audi135 => audi135::setup(self),
            TriggerPattern::HondaD17 => honda_d17::setup(self),
            TriggerPattern::Non360 => non360::setup(self),
            TriggerPattern::Daihatsu => daihatsu::setup(self),
        }
        if let Some(stall_time) = self.config.stall_time {
            self.state.stall_time = stall_time;
        }
    }

    /// Teeth actually present on the primary wheel.
    pub fn actual_teeth(&self) -> u16 {
        self.actual_teeth
    }

    /// A consistent copy of the decoder state.
    pub fn snapshot(&self) -> DecoderState {
        self.state
    }

    /// Handles a primary tooth seen at `now`.
    ///
    /// # Returns
    /// - `false` when the edge was rejected as noise
    pub fn on_primary_edge(&mut self, now: u32) -> bool {
        let previous = self.state.last_tooth_time;
        let accepted = match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::primary(self, now),
            TriggerPattern::DualWheel | TriggerPattern::Non360 => dual_wheel::primary(self, now),
            TriggerPattern::BasicDistributor => distributor::primary(self, now),
            TriggerPattern::Gm7x => gm7x::primary(self, now),
            TriggerPattern::Gm24x => gm24x::primary(self, now),
            TriggerPattern::Jeep2000 => jeep2000::primary(self, now),
            TriggerPattern::Audi135 => audi135::primary(self, now),
            TriggerPattern::HondaD17 => honda_d17::primary(self, now),
            TriggerPattern::Daihatsu => daihatsu::primary(self, now),
        };
        if accepted {
            self.tooth_log.record(now.wrapping_sub(previous));
        }
        accepted
    }

    /// Handles a secondary tooth seen at `now`.
    pub fn on_secondary_edge(&mut self, now: u32) {
        match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::secondary(self, now),
            TriggerPattern::DualWheel | TriggerPattern::Non360 => dual_wheel::secondary(self, now),
            TriggerPattern::Gm24x => gm24x::secondary(self),
            TriggerPattern::Jeep2000 => jeep2000::secondary(self),
            TriggerPattern::Audi135 => audi135::secondary(self),
            TriggerPattern::BasicDistributor
            | TriggerPattern::Gm7x
            | TriggerPattern::HondaD17
            | TriggerPattern::Daihatsu => {}
        }
    }

    /// Primary input interrupt: reads the pin and forwards matching edges.
    ///
    /// # Arguments
    /// - `pin`: the primary sensor input
    /// - `now`: the microsecond clock
    ///
    /// # Returns
    /// - `true` if the edge reached the decoder and was accepted
    pub fn on_primary_interrupt<I: InputPin>(&mut self, pin: &mut I, now: u32) -> bool {
        let level = pin.is_high().unwrap_or(false);
        if !self.config.primary_edge.accepts(level) {
            return false;
        }
        self.on_primary_edge(now)
    }

    /// Secondary input interrupt: records the level and forwards matching edges.
    pub fn on_secondary_interrupt<I: InputPin>(&mut self, pin: &mut I, now: u32) {
        let level = pin.is_high().unwrap_or(false);
        self.state.secondary_level = level;
        if self.config.secondary_edge.accepts(level) {
            self.on_secondary_edge(now);
        }
    }

    /// Sets the secondary level for a polled cam input.
    pub fn set_secondary_level(&mut self, level_high: bool) {
        self.state.secondary_level = level_high;
    }

    /// Whether a tooth has been seen within the stall time.
    ///
    /// A last tooth time ahead of `now` means the clock wrapped under a
    /// running engine.
    pub fn is_engine_running(&self, now: u32) -> bool {
        let last = self.state.last_tooth_time;
        last > now || now - last < self.state.stall_time
    }

    /// The engine is below cranking speed.
    pub fn is_cranking(&self) -> bool {
        self.state.rpm < self.config.crank_rpm
    }

    /// Current engine speed.
    ///
    /// Also refreshes [`converter`](Self::converter). A stall resets the
    /// decoder to its initial state, keeping only the sync loss counter.
    ///
    /// # Returns
    /// - `0` when stalled or without any sync
    pub fn rpm(&mut self, now: u32) -> u16 {
        if !self.is_engine_running(now) {
            if self.state.has_sync || self.state.half_sync || self.state.rpm != 0 {
                info!(
                    "engine stalled after {} revolutions",
                    self.state.start_revolutions
                );
                let sync_loss_counter = self.state.sync_loss_counter;
                self.setup();
                self.state.sync_loss_counter = sync_loss_counter;
            }
            return 0;
        }
        if !self.state.has_sync && !self.state.half_sync {
            return 0;
        }
        let rpm = match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::rpm(self),
            TriggerPattern::DualWheel => dual_wheel::rpm(self),
            TriggerPattern::BasicDistributor => distributor::rpm(self),
            TriggerPattern::Non360 => non360::rpm(self),
            TriggerPattern::Daihatsu => self.std_rpm(TriggerSpeed::Cam),
            TriggerPattern::Gm7x
            | TriggerPattern::Gm24x
            | TriggerPattern::Jeep2000
            | TriggerPattern::Audi135
            | TriggerPattern::HondaD17 => self.std_rpm(TriggerSpeed::Crank),
        };
        self.state.rpm = rpm;
        rpm
    }

    /// Crank angle after TDC of cylinder one at `now`.
    ///
    /// Extrapolated from the last tooth and wrapped into
    /// `[0, `[`max_crank_angle`](TriggerConfig::max_crank_angle)`)`.
    pub fn crank_angle(&self, now: u32) -> i16 {
        let raw = match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::crank_angle(self, now),
            TriggerPattern::DualWheel => dual_wheel::crank_angle(self, now),
            TriggerPattern::BasicDistributor => distributor::crank_angle(self, now),
            TriggerPattern::Gm7x => gm7x::crank_angle(self, now),
            TriggerPattern::Gm24x => gm24x::crank_angle(self, now),
            TriggerPattern::Jeep2000 => jeep2000::crank_angle(self, now),
            TriggerPattern::Audi135 => audi135::crank_angle(self, now),
            TriggerPattern::HondaD17 => honda_d17::crank_angle(self, now),
            TriggerPattern::Non360 => non360::crank_angle(self, now),
            TriggerPattern::Daihatsu => daihatsu::crank_angle(self, now),
        };
        let max = i32::from(self.config.max_crank_angle());
        i16::try_from(raw.rem_euclid(max)).unwrap_or(0)
    }

    /// Works out the tooth each coil should fire on.
    ///
    /// Patterns without a per-tooth path leave [`end_teeth`](Self::end_teeth) untouched.
    ///
    /// # Arguments
    /// - `end_angles`: spark angle of each ignition channel
    /// - `advance`: current spark advance, used by patterns with fixed end teeth
    pub fn set_end_teeth(&mut self, end_angles: &[i16], advance: i16) {
        match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::end_teeth(self, end_angles),
            TriggerPattern::DualWheel => dual_wheel::end_teeth(self, end_angles),
            TriggerPattern::BasicDistributor => distributor::end_teeth(self, end_angles),
            TriggerPattern::Gm7x => gm7x::end_teeth(self, advance),
            TriggerPattern::Gm24x
            | TriggerPattern::Jeep2000
            | TriggerPattern::Audi135
            | TriggerPattern::HondaD17
            | TriggerPattern::Non360
            | TriggerPattern::Daihatsu => {}
        }
    }

    /// Tooth and angle of the last primary edge, for per-tooth ignition.
    ///
    /// # Returns
    /// - `None` when per-tooth ignition is off or the pattern does not
    ///   report this tooth
    pub fn tooth_event(&self) -> Option<ToothEvent> {
        if !self.config.per_tooth_ignition {
            return None;
        }
        match self.config.pattern {
            TriggerPattern::MissingTooth => missing_tooth::tooth_event(self),
            TriggerPattern::DualWheel => dual_wheel::tooth_event(self),
            TriggerPattern::BasicDistributor => Some(distributor::tooth_event(self)),
            TriggerPattern::Gm7x => gm7x::tooth_event(self),
            _ => None,
        }
    }

    /// Whether the pattern fires coils straight from the tooth interrupt
    /// when fixed cranking timing is in use.
    pub fn has_fixed_cranking(&self) -> bool {
        matches!(
            self.config.pattern,
            TriggerPattern::BasicDistributor | TriggerPattern::Daihatsu
        )
    }

    /// Crank revolution time the converter is working from.
    pub fn revolution_time(&self) -> u32 {
        self.converter.revolution_time()
    }

    fn revolution_time_frozen(&self) -> bool {
        self.state.rpm < self.config.crank_rpm && self.state.start_revolutions == 0
    }

    fn set_filter(&mut self, gap: u32) {
        self.state.filter_time = match self.config.filter {
            TriggerFilter::Off => 0,
            TriggerFilter::Lite => gap >> 2,
            TriggerFilter::Medium => gap >> 1,
            TriggerFilter::Aggressive => {
                u32::try_from((u64::from(gap) * 3) >> 2).unwrap_or(u32::MAX)
            }
        };
    }

    fn shift_tooth_times(&mut self, now: u32) {
        self.state.prior_tooth_time = self.state.last_tooth_time;
        self.state.last_tooth_time = now;
    }

    fn mark_tooth_one(&mut self, now: u32) {
        self.state.prior_revolution_time = self.state.last_revolution_time;
        self.state.last_revolution_time = now;
    }

    fn lose_sync(&mut self) {
        self.state.has_sync = false;
        self.state.half_sync = false;
        self.state.sync_loss_counter = self.state.sync_loss_counter.wrapping_add(1);
    }

    /// Degrees turned since the last tooth at the cached revolution speed.
    fn elapsed_angle(&self, now: u32) -> i32 {
        i32::from(
            self.converter
                .time_to_angle(now.wrapping_sub(self.state.last_tooth_time)),
        )
    }

    /// The last tooth interval, when it can be used for interpolation.
    fn last_tooth_interval(&self) -> Option<ToothInterval> {
        let s = &self.state;
        (s.tooth_angle_correct && s.prior_tooth_time > 0 && s.last_tooth_time > s.prior_tooth_time)
            .then(|| ToothInterval {
                angle: s.tooth_angle,
                period: s.last_tooth_time - s.prior_tooth_time,
            })
    }

    /// RPM from the interval between the last two tooth ones.
    fn std_rpm(&mut self, speed: TriggerSpeed) -> u16 {
        let s = self.state;
        if (s.has_sync || s.half_sync)
            && !self.revolution_time_frozen()
            && s.prior_revolution_time != 0
            && s.last_revolution_time > s.prior_revolution_time
        {
            let mut revolution_time = s.last_revolution_time - s.prior_revolution_time;
            if speed == TriggerSpeed::Cam {
                revolution_time >>= 1;
            }
            if self.converter.set_revolution_time(revolution_time) {
                return rpm_from_revolution_time(revolution_time, s.rpm);
            }
        }
        s.rpm
    }

    /// RPM from the last tooth interval scaled up to a whole revolution.
    fn cranking_rpm(&mut self, total_teeth: u16, speed: TriggerSpeed) -> u16 {
        let s = self.state;
        if s.start_revolutions >= u16::from(self.config.stg_cycles)
            && (s.has_sync || s.half_sync)
            && s.prior_tooth_time > 0
            && s.last_tooth_time > s.prior_tooth_time
        {
            let mut revolution_time =
                (s.last_tooth_time - s.prior_tooth_time).saturating_mul(u32::from(total_teeth));
            if speed == TriggerSpeed::Cam {
                revolution_time >>= 1;
            }
            if self.converter.set_revolution_time(revolution_time) {
                return rpm_from_revolution_time(revolution_time, s.rpm);
            }
        }
        s.rpm
    }
}

/// Pulls `value` back into `[min, max]` by one step of `amount`.
fn nudge(min: i16, max: i16, value: i16, amount: i16) -> i16 {
    if value < min {
        value + amount
    } else if value > max {
        value - amount
    } else {
        value
    }
}

/// Wraps an ignition angle into `[0, max)`.
pub(crate) fn ignition_limits(angle: i32, max: i16) -> i16 {
    i16::try_from(angle.rem_euclid(i32::from(max))).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    /// Feeds `count` primary edges `gap` µs apart starting after `start`.
    ///
    /// # Returns
    /// - The time of the last edge
    pub(crate) fn feed(decoder: &mut TriggerDecoder, start: u32, gap: u32, count: usize) -> u32 {
        let mut now = start;
        for _ in 0..count {
            now += gap;
            let _ = decoder.on_primary_edge(now);
        }
        now
    }

    #[test]
    fn test_filter_levels() {
        let mut decoder = TriggerDecoder::new(TriggerConfig::default()).unwrap();
        decoder.config.filter = TriggerFilter::Off;
        decoder.set_filter(1000);
        assert_eq!(decoder.state.filter_time, 0);
        decoder.config.filter = TriggerFilter::Lite;
        decoder.set_filter(1000);
        assert_eq!(decoder.state.filter_time, 250);
        decoder.config.filter = TriggerFilter::Medium;
        decoder.set_filter(1000);
        assert_eq!(decoder.state.filter_time, 500);
        decoder.config.filter = TriggerFilter::Aggressive;
        decoder.set_filter(1000);
        assert_eq!(decoder.state.filter_time, 750);
    }

    #[test]
    fn test_engine_running_window() {
        let mut decoder = TriggerDecoder::new(TriggerConfig::default()).unwrap();
        decoder.state.stall_time = 1000;
        decoder.state.last_tooth_time = 5000;
        assert!(decoder.is_engine_running(5999));
        assert!(!decoder.is_engine_running(6000));
        // the clock wrapped since the last tooth
        assert!(decoder.is_engine_running(10));
    }

    #[test]
    fn test_stall_resets_decoder() {
        let mut decoder = TriggerDecoder::new(TriggerConfig::default()).unwrap();
        decoder.state.has_sync = true;
        decoder.state.rpm = 800;
        decoder.state.sync_loss_counter = 3;
        decoder.state.start_revolutions = 40;
        decoder.state.last_tooth_time = 1_000;
        let stall = decoder.state.stall_time;

        assert_eq!(decoder.rpm(1_000 + stall), 0);
        assert!(!decoder.state.has_sync);
        assert_eq!(decoder.state.rpm, 0);
        assert_eq!(decoder.state.start_revolutions, 0);
        assert_eq!(decoder.state.sync_loss_counter, 3);
    }

    #[test]
    fn test_stall_time_override() {
        let decoder = TriggerDecoder::new(TriggerConfig {
            stall_time: Some(123_456),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(decoder.state.stall_time, 123_456);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = TriggerDecoder::new(TriggerConfig {
            teeth: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::ZeroTeeth)));
    }

    #[test]
    fn test_edge_qualification() {
        let mut decoder = TriggerDecoder::new(TriggerConfig {
            filter: TriggerFilter::Off,
            ..Default::default()
        })
        .unwrap();
        let mut pin = PinMock::new(&[
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::High),
        ]);
        assert!(!decoder.on_primary_interrupt(&mut pin, 10_000));
        assert_eq!(decoder.state.tooth_counter, 0);
        assert!(decoder.on_primary_interrupt(&mut pin, 20_000));
        assert_eq!(decoder.state.tooth_counter, 1);
        pin.done();

        let mut cam = PinMock::new(&[PinTransaction::get(PinState::Low)]);
        decoder.on_secondary_interrupt(&mut cam, 30_000);
        assert!(!decoder.state.secondary_level);
        cam.done();
    }

    #[test]
    fn test_tooth_log_records_accepted_gaps() {
        let mut decoder = TriggerDecoder::new(TriggerConfig::default()).unwrap();
        decoder.tooth_log.enabled = true;
        let _ = feed(&mut decoder, 0, 1000, 3);
        assert_eq!(decoder.tooth_log.entries(), &[1000, 1000, 1000]);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(nudge(1, 36, -2, 36), 34);
        assert_eq!(nudge(1, 36, 43, 36), 7);
        assert_eq!(nudge(1, 36, 20, 36), 20);
        assert_eq!(ignition_limits(-10, 360), 350);
        assert_eq!(ignition_limits(725, 720), 5);
        assert_eq!(ignition_limits(359, 360), 359);
    }
}
