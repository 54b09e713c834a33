//! Dual wheel whose tooth count does not divide 360.
//!
//! Tooth angles are kept multiplied by [`TriggerConfig::angle_multiplier`]
//! so they stay whole numbers. Edges are handled exactly like the dual wheel.
//!
//! [`TriggerConfig::angle_multiplier`]: crate::config::TriggerConfig::angle_multiplier

use super::TriggerDecoder;
use super::dual_wheel::{UNSYNCED_COUNT, effective_count, secondary_filter};
use crate::config::TriggerSpeed;
use crate::consts::{MAX_RPM, MICROS_PER_DEG_1_RPM, MICROS_PER_SEC};

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let config = dec.config;
    let scaled = 360 * u32::from(config.angle_multiplier) / u32::from(config.teeth);
    let state = &mut dec.state;
    state.tooth_angle = u16::try_from(scaled).unwrap_or(u16::MAX);
    state.tooth_counter = UNSYNCED_COUNT;
    state.filter_time = MICROS_PER_SEC / (u32::from(MAX_RPM / 60) * u32::from(config.teeth));
    state.secondary_filter_time = secondary_filter();
    state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * scaled;
}

pub(super) fn rpm(dec: &mut TriggerDecoder) -> u16 {
    if !dec.state.has_sync || dec.state.tooth_counter == 0 {
        return 0;
    }
    if dec.is_cranking() {
        dec.cranking_rpm(dec.config.teeth, TriggerSpeed::Crank)
    } else {
        dec.std_rpm(TriggerSpeed::Crank)
    }
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let scaled = (effective_count(dec) - 1) * i32::from(dec.state.tooth_angle);
    scaled / i32::from(dec.config.angle_multiplier.max(1))
        + i32::from(dec.config.trigger_angle)
        + dec.elapsed_angle(now)
}
