//! One primary pulse per cylinder from a distributor, no secondary.
//!
//! Every pulse after the first is counted from one to the cylinder count.
//! There is no way to tell cylinder one apart, so sync just means "counting".

use super::{ToothEvent, TriggerDecoder, ignition_limits};
use crate::config::{Strokes, TriggerSpeed};
use crate::consts::{
    DISTRIBUTOR_CRANKING_RPM_CEILING, DISTRIBUTOR_MIN_STALL_US, MICROS_PER_DEG_1_RPM,
};

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let config = dec.config;
    dec.actual_teeth = u16::from(config.cylinders.max(1));
    let cycle_degrees: u16 = match config.strokes {
        Strokes::Four => 720,
        Strokes::Two => 360,
    };
    let state = &mut dec.state;
    state.tooth_angle = cycle_degrees / dec.actual_teeth;
    state.filter_time = 0;
    state.tooth_counter = 0;
    state.tooth_angle_correct = true;
    // 90 rpm floor on small engines, the 50 rpm one would be far too long
    let min_rpm = if config.cylinders <= 4 { 90 } else { 50 };
    state.stall_time = (MICROS_PER_DEG_1_RPM / min_rpm) * u32::from(state.tooth_angle);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    if gap < dec.state.filter_time {
        return false;
    }
    if dec.state.has_sync {
        dec.set_filter(gap);
    } else {
        dec.state.filter_time = 0;
    }

    let actual = dec.actual_teeth;
    if dec.state.tooth_counter == actual || !dec.state.has_sync {
        dec.state.tooth_counter = 1;
        dec.mark_tooth_one(now);
        dec.state.has_sync = true;
        dec.state.start_revolutions = dec.state.start_revolutions.wrapping_add(1);
    } else if dec.state.tooth_counter < actual {
        dec.state.tooth_counter += 1;
    } else if dec.state.has_sync {
        dec.lose_sync();
    }
    dec.shift_tooth_times(now);
    true
}

fn distributor_speed(dec: &TriggerDecoder) -> TriggerSpeed {
    match dec.config.strokes {
        Strokes::Four => TriggerSpeed::Cam,
        Strokes::Two => TriggerSpeed::Crank,
    }
}

pub(super) fn rpm(dec: &mut TriggerDecoder) -> u16 {
    let speed = distributor_speed(dec);
    let rpm = if dec.is_cranking() || dec.state.rpm < DISTRIBUTOR_CRANKING_RPM_CEILING {
        dec.cranking_rpm(dec.actual_teeth, speed)
    } else {
        dec.std_rpm(speed)
    };
    if dec.config.stall_time.is_none() {
        dec.state.stall_time = (dec.converter.revolution_time() << 1).max(DISTRIBUTOR_MIN_STALL_US);
    }
    rpm
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let angle = (i32::from(dec.state.tooth_counter) - 1) * i32::from(dec.state.tooth_angle)
        + i32::from(dec.config.trigger_angle);
    let elapsed = now.wrapping_sub(dec.state.last_tooth_time);
    angle
        + i32::from(
            dec.converter
                .time_to_angle_per_tooth(elapsed, dec.last_tooth_interval()),
        )
}

pub(super) fn tooth_event(dec: &TriggerDecoder) -> ToothEvent {
    let angle = (i32::from(dec.state.tooth_counter) - 1) * i32::from(dec.state.tooth_angle)
        + i32::from(dec.config.trigger_angle);
    let half = dec.actual_teeth / 2;
    let tooth = if dec.state.tooth_counter > half {
        dec.state.tooth_counter - half
    } else {
        dec.state.tooth_counter
    };
    ToothEvent {
        tooth,
        crank_angle: ignition_limits(angle, dec.config.max_ignition_angle()),
    }
}

pub(super) fn end_teeth(dec: &mut TriggerDecoder, end_angles: &[i16]) {
    let Some(&first) = end_angles.first() else {
        return;
    };
    let angle = ignition_limits(
        i32::from(first) - i32::from(dec.config.trigger_angle),
        dec.config.max_ignition_angle(),
    );
    let teeth: &[u16] = match dec.config.cylinders {
        4 => {
            if angle > 180 || angle <= 0 {
                &[2, 1]
            } else {
                &[1, 2]
            }
        }
        3 | 6 => {
            if angle > 120 && angle <= 240 {
                &[2, 3, 1]
            } else if angle > 240 || angle <= 0 {
                &[3, 1, 2]
            } else {
                &[1, 2, 3]
            }
        }
        8 => {
            if angle > 90 && angle <= 180 {
                &[2, 3, 4, 1]
            } else if angle > 180 && angle <= 270 {
                &[3, 4, 1, 2]
            } else if angle > 270 || angle <= 0 {
                &[4, 1, 2, 3]
            } else {
                &[1, 2, 3, 4]
            }
        }
        _ => &[],
    };
    dec.end_teeth[..teeth.len()].copy_from_slice(teeth);
}
