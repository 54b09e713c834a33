//! Angle arithmetic feeding [`Scheduler::arm_fuel`] and [`Scheduler::arm_ignition`].
//!
//! All angles are crank degrees in `[0, max)`, where `max` is 720 for
//! sequential four-stroke outputs and 360 otherwise (see
//! [`TriggerConfig::max_ignition_angle`]).
//!
//! [`Scheduler::arm_fuel`]: super::Scheduler::arm_fuel
//! [`Scheduler::arm_ignition`]: super::Scheduler::arm_ignition
//! [`TriggerConfig::max_ignition_angle`]: crate::config::TriggerConfig::max_ignition_angle

use super::ScheduleStatus;
use crate::crank_math::AngleConverter;

/// Where a coil starts charging and where it fires.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct IgnitionAngles {
    /// Crank angle the dwell begins at.
    pub start: i16,
    /// Crank angle of the spark.
    pub end: i16,
}

/// Computes a channel's dwell window.
///
/// # Arguments
/// - `channel_degrees`: TDC of the channel's cylinder (0 means cylinder one)
/// - `advance`: spark advance in degrees BTDC
/// - `dwell_angle`: degrees the dwell takes at the current speed
/// - `max_angle`: engine cycle length for ignition
pub fn ignition_angles(
    channel_degrees: i16,
    advance: i16,
    dwell_angle: i16,
    max_angle: i16,
) -> IgnitionAngles {
    let tdc = if channel_degrees == 0 {
        max_angle
    } else {
        channel_degrees
    };
    let mut end = tdc - advance;
    if end > max_angle {
        end -= max_angle;
    }
    let mut start = end - dwell_angle;
    if start < 0 {
        start += max_angle;
    }
    IgnitionAngles { start, end }
}

/// Crank angle an injector must open at for its pulse to end at `inj_angle`.
///
/// # Arguments
/// - `inj_angle`: desired end-of-injection angle
/// - `channel_degrees`: TDC of the channel's cylinder
/// - `pulse_degrees`: degrees the pulse width takes at the current speed
/// - `max_angle`: engine cycle length for injection
pub fn injector_start_angle(
    inj_angle: u16,
    channel_degrees: u16,
    pulse_degrees: u16,
    max_angle: u16,
) -> u16 {
    let mut angle = inj_angle.wrapping_add(channel_degrees);
    if angle < pulse_degrees {
        angle = angle.wrapping_add(max_angle);
    }
    angle = angle.wrapping_sub(pulse_degrees);
    while max_angle > 0 && angle > max_angle {
        angle -= max_angle;
    }
    angle
}

/// Microseconds from now until the crank reaches `start_angle`.
///
/// Angles are taken relative to the channel's own TDC so every channel
/// compares against the same window. A start angle already passed is pushed
/// one cycle out while the channel is still running its previous pulse, so
/// the request lands in the queued slot instead of firing immediately.
///
/// # Returns
/// - The timeout, or `0` when the start angle has passed and the channel is idle
pub fn channel_timeout(
    converter: &AngleConverter,
    status: ScheduleStatus,
    start_angle: i16,
    channel_degrees: i16,
    crank_angle: i16,
    max_angle: i16,
) -> u32 {
    let mut crank = crank_angle - channel_degrees;
    if crank < 0 {
        crank += max_angle;
    }
    let mut start = start_angle - channel_degrees;
    if start < 0 {
        start += max_angle;
    }
    if start <= crank && status == ScheduleStatus::Running {
        start += max_angle;
    }
    if start > crank {
        converter.angle_to_time(start.abs_diff(crank))
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignition_angles_wrap() {
        assert_eq!(
            ignition_angles(0, 15, 30, 360),
            IgnitionAngles {
                start: 315,
                end: 345
            }
        );
        assert_eq!(
            ignition_angles(180, 15, 30, 360),
            IgnitionAngles {
                start: 135,
                end: 165
            }
        );
        // negative advance pushes the spark past max
        assert_eq!(
            ignition_angles(0, -10, 30, 360),
            IgnitionAngles { start: 340, end: 10 }
        );
        assert_eq!(
            ignition_angles(90, 80, 30, 720),
            IgnitionAngles {
                start: 700,
                end: 10
            }
        );
    }

    #[test]
    fn test_injector_start_angle() {
        assert_eq!(injector_start_angle(355, 0, 100, 360), 255);
        assert_eq!(injector_start_angle(10, 0, 100, 360), 270);
        assert_eq!(injector_start_angle(355, 180, 100, 360), 75);
    }

    #[test]
    fn test_channel_timeout() {
        let mut conv = AngleConverter::new();
        let _ = conv.set_revolution_time(36_000);
        // 100 µs per degree
        assert_eq!(
            channel_timeout(&conv, ScheduleStatus::Off, 300, 0, 100, 360),
            20_000
        );
        assert_eq!(
            channel_timeout(&conv, ScheduleStatus::Off, 100, 0, 300, 360),
            0
        );
        assert_eq!(
            channel_timeout(&conv, ScheduleStatus::Running, 100, 0, 300, 360),
            16_000
        );
        assert_eq!(
            channel_timeout(&conv, ScheduleStatus::Off, 200, 180, 190, 360),
            1_000
        );
    }
}
