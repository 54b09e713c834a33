//! Evenly spaced primary wheel plus a one tooth secondary marking tooth one.
//!
//! Sync comes entirely from the secondary: the tooth after it is tooth one.
//! Until then every primary edge is counted but ignored.

use super::{ToothEvent, TriggerDecoder, nudge};
use crate::config::{SparkMode, TriggerSpeed};
use crate::consts::{MAX_RPM, MICROS_PER_DEG_1_RPM, MICROS_PER_MIN, MICROS_PER_SEC};

/// Tooth count meaning "no secondary seen yet".
pub(super) const UNSYNCED_COUNT: u16 = 255;

/// Noise filter of a two tooth secondary wheel at cam speed.
pub(super) fn secondary_filter() -> u32 {
    (MICROS_PER_SEC / (u32::from(MAX_RPM / 60) * 2)) / 2
}

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let config = dec.config;
    let wheel_degrees: u16 = match config.speed {
        TriggerSpeed::Crank => 360,
        TriggerSpeed::Cam => 720,
    };
    let state = &mut dec.state;
    state.tooth_angle = wheel_degrees / config.teeth;
    state.tooth_counter = UNSYNCED_COUNT;
    state.filter_time = MICROS_PER_SEC / (u32::from(MAX_RPM / 60) * u32::from(config.teeth));
    state.secondary_filter_time = secondary_filter();
    state.tooth_angle_correct = true;
    state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(state.tooth_angle);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    if gap < dec.state.filter_time {
        return false;
    }
    dec.state.tooth_counter = dec.state.tooth_counter.wrapping_add(1);
    dec.shift_tooth_times(now);

    if dec.state.has_sync {
        let state = &mut dec.state;
        if state.tooth_counter == 1 || state.tooth_counter > dec.config.teeth {
            state.tooth_counter = 1;
            state.revolution_one = !state.revolution_one;
            let step = if dec.config.speed == TriggerSpeed::Cam { 2 } else { 1 };
            state.start_revolutions = state.start_revolutions.wrapping_add(step);
            dec.mark_tooth_one(now);
        }
        dec.set_filter(gap);
    }
    true
}

pub(super) fn secondary(dec: &mut TriggerDecoder, now: u32) {
    let teeth = dec.config.teeth;
    let gap = now.wrapping_sub(dec.state.last_secondary_time);
    if gap < dec.state.secondary_filter_time {
        dec.state.secondary_filter_time = dec.converter.revolution_time() >> 1;
        return;
    }
    let state = &mut dec.state;
    state.last_secondary_time = now;
    state.secondary_filter_time = gap >> 2;

    if !state.has_sync || state.start_revolutions <= u16::from(dec.config.stg_cycles) {
        state.last_tooth_time = now;
        // pins the cranking RPM low until a full revolution has been seen
        state.prior_tooth_time = now.wrapping_sub((MICROS_PER_MIN / 10) / u32::from(teeth));
        state.tooth_counter = teeth;
        state.filter_time = 0;
        state.has_sync = true;
    } else {
        if state.tooth_counter != teeth && state.start_revolutions > 2 {
            state.sync_loss_counter = state.sync_loss_counter.wrapping_add(1);
        }
        if dec.config.use_resync {
            state.tooth_counter = teeth;
        }
    }
    state.revolution_one = true;
}

pub(super) fn rpm(dec: &mut TriggerDecoder) -> u16 {
    if !dec.state.has_sync {
        return 0;
    }
    let speed = dec.config.speed;
    if dec.is_cranking() {
        dec.cranking_rpm(dec.config.teeth, speed)
    } else {
        dec.std_rpm(speed)
    }
}

/// Tooth counter with the secondary tooth read as the last primary tooth.
pub(super) fn effective_count(dec: &TriggerDecoder) -> i32 {
    match dec.state.tooth_counter {
        0 => i32::from(dec.config.teeth),
        count => i32::from(count),
    }
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let mut angle = (effective_count(dec) - 1) * i32::from(dec.state.tooth_angle)
        + i32::from(dec.config.trigger_angle);
    angle += dec.elapsed_angle(now);
    if dec.state.revolution_one && dec.config.speed == TriggerSpeed::Crank {
        angle += 360;
    }
    angle
}

pub(super) fn tooth_event(dec: &TriggerDecoder) -> Option<ToothEvent> {
    if dec.is_cranking() {
        return None;
    }
    let config = dec.config;
    let mut angle = (i32::from(dec.state.tooth_counter) - 1) * i32::from(dec.state.tooth_angle)
        + i32::from(config.trigger_angle);
    let mut tooth = dec.state.tooth_counter;
    if config.spark_mode == SparkMode::Sequential
        && dec.state.revolution_one
        && config.speed == TriggerSpeed::Crank
    {
        angle += 360;
        tooth = tooth.wrapping_add(config.teeth);
    }
    Some(ToothEvent {
        tooth,
        crank_angle: i16::try_from(angle).unwrap_or(i16::MAX),
    })
}

pub(super) fn end_teeth(dec: &mut TriggerDecoder, end_angles: &[i16]) {
    let config = dec.config;
    let tooth_adder = if config.spark_mode == SparkMode::Sequential
        && config.speed == TriggerSpeed::Crank
    {
        config.teeth
    } else {
        0
    };
    let tooth_angle = i16::try_from(dec.state.tooth_angle).unwrap_or(i16::MAX).max(1);
    let range = i16::try_from(config.teeth + tooth_adder).unwrap_or(i16::MAX);
    for (slot, &end_angle) in dec.end_teeth.iter_mut().zip(end_angles) {
        let tooth = end_angle.wrapping_sub(config.trigger_angle) / tooth_angle;
        *slot = u16::try_from(nudge(1, range, tooth, range)).unwrap_or(1);
    }
}
