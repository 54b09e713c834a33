//! Integer angle/time conversion.
//!
//! The converter caches two fixed-point factors derived from the last
//! crank revolution time, so the hot paths are one multiply and one shift:
//!
//! | Factor              | Format  | Derivation                      |
//! |---------------------|---------|---------------------------------|
//! | `micros_per_degree` | UQ24.8  | `(rev << 8) / 360`, truncated   |
//! | `degrees_per_micro` | UQ1.15  | `(360 << 15) / rev`, rounded    |
//!
//! Both conversions round the final shift to nearest. The factors are only
//! recomputed when the revolution time actually changes.
//!
//! The revolution time handed in is always one *crank* revolution. Cam
//! speed decoders halve their reference interval before storing it.

use crate::consts::{MAX_RPM, MICROS_PER_MIN};

const MICROS_PER_DEGREE_SHIFT: u32 = 8;
const DEGREES_PER_MICRO_SHIFT: u32 = 15;

/// Span of the last primary tooth interval, for per-tooth interpolation.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ToothInterval {
    /// Degrees covered by the interval.
    pub angle: u16,
    /// Microseconds the interval took.
    pub period: u32,
}

/// Fixed-point converter between crank degrees and microseconds.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct AngleConverter {
    revolution_time: u32,
    micros_per_degree: u32,
    degrees_per_micro: u16,
}

impl AngleConverter {
    /// A converter with no revolution time yet. Every conversion returns 0.
    pub const fn new() -> Self {
        Self {
            revolution_time: 0,
            micros_per_degree: 0,
            degrees_per_micro: 0,
        }
    }

    /// The crank revolution time the factors were derived from.
    pub fn revolution_time(&self) -> u32 {
        self.revolution_time
    }

    /// Stores a new crank revolution time and refreshes the cached factors.
    ///
    /// # Returns
    /// - `true` if the time differed from the stored one (factors recomputed)
    /// - `false` for a repeat or a zero time, which leaves everything as is
    pub fn set_revolution_time(&mut self, revolution_time: u32) -> bool {
        if revolution_time == 0 || revolution_time == self.revolution_time {
            return false;
        }
        self.revolution_time = revolution_time;
        let mpd = (u64::from(revolution_time) << MICROS_PER_DEGREE_SHIFT) / 360;
        self.micros_per_degree = u32::try_from(mpd).unwrap_or(u32::MAX);
        let dpm = ((360u32 << DEGREES_PER_MICRO_SHIFT) + revolution_time / 2) / revolution_time;
        self.degrees_per_micro = u16::try_from(dpm).unwrap_or(u16::MAX);
        true
    }

    /// Forgets the revolution time.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Microseconds the crank takes to turn `angle` degrees at the current speed.
    pub fn angle_to_time(&self, angle: u16) -> u32 {
        let scaled = u64::from(angle) * u64::from(self.micros_per_degree);
        let time = (scaled + (1 << (MICROS_PER_DEGREE_SHIFT - 1))) >> MICROS_PER_DEGREE_SHIFT;
        u32::try_from(time).unwrap_or(u32::MAX)
    }

    /// Degrees the crank turns in `time` microseconds at the current speed.
    pub fn time_to_angle(&self, time: u32) -> u16 {
        let scaled = u64::from(time) * u64::from(self.degrees_per_micro);
        let angle = (scaled + (1 << (DEGREES_PER_MICRO_SHIFT - 1))) >> DEGREES_PER_MICRO_SHIFT;
        u16::try_from(angle).unwrap_or(u16::MAX)
    }

    /// Degrees turned in `time` microseconds, interpolated on the last tooth if trusted.
    ///
    /// # Arguments
    /// - `time`: elapsed microseconds
    /// - `tooth`: the last tooth interval, `None` when it spanned a gap
    ///
    /// # Returns
    /// - `time * angle / period` truncated, when `tooth` is usable
    /// - [`time_to_angle`](Self::time_to_angle) otherwise
    pub fn time_to_angle_per_tooth(&self, time: u32, tooth: Option<ToothInterval>) -> u16 {
        match tooth {
            Some(interval) if interval.period > 0 => {
                let angle =
                    u64::from(time) * u64::from(interval.angle) / u64::from(interval.period);
                u16::try_from(angle).unwrap_or(u16::MAX)
            }
            _ => self.time_to_angle(time),
        }
    }
}

/// RPM for one crank revolution lasting `revolution_time` microseconds.
///
/// # Returns
/// - The rounded RPM, or `previous` when the time is zero or the result is
///   at or above [`MAX_RPM`]
pub fn rpm_from_revolution_time(revolution_time: u32, previous: u16) -> u16 {
    if revolution_time == 0 {
        return previous;
    }
    let rpm = (MICROS_PER_MIN + revolution_time / 2) / revolution_time;
    match u16::try_from(rpm) {
        Ok(rpm) if rpm < MAX_RPM => rpm,
        _ => previous,
    }
}
