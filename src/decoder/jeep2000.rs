//! Jeep 2000: four groups of three crank teeth and a cam window.
//!
//! Teeth within a group are 20° apart, groups are 60° apart. The cam edge
//! zeroes the count and the next crank tooth is tooth one.

use super::TriggerDecoder;
use super::gm24x::step_table;
use crate::consts::MICROS_PER_DEG_1_RPM;

const TOOTH_ANGLES: [i16; 12] = [174, 194, 214, 234, 294, 314, 334, 354, 414, 434, 454, 474];

/// Tooth count meaning "no cam edge seen yet".
const WAITING_COUNT: u16 = 13;
const GROUP_ANGLE: u16 = 60;
/// Angle reported while the cam edge was the last thing seen.
const CAM_EDGE_ANGLE: i32 = 114;

pub(super) fn setup(dec: &mut TriggerDecoder) {
    dec.state.tooth_angle = 0;
    dec.state.tooth_counter = WAITING_COUNT;
    dec.state.filter_time = 0;
    dec.state.tooth_angle_correct = true;
    dec.state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(GROUP_ANGLE);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    if dec.state.tooth_counter == WAITING_COUNT {
        dec.state.has_sync = false;
        dec.shift_tooth_times(now);
        return true;
    }
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    if gap < dec.state.filter_time {
        return false;
    }
    if dec.state.tooth_counter == 0 {
        let state = &mut dec.state;
        state.tooth_counter = 1;
        state.has_sync = true;
        state.start_revolutions = state.start_revolutions.wrapping_add(1);
        state.tooth_angle = GROUP_ANGLE;
        dec.mark_tooth_one(now);
    } else if !step_table(dec, &TOOTH_ANGLES) {
        dec.lose_sync();
        dec.state.tooth_counter = WAITING_COUNT;
    }
    dec.set_filter(gap);
    dec.shift_tooth_times(now);
    true
}

pub(super) fn secondary(dec: &mut TriggerDecoder) {
    dec.state.tooth_counter = 0;
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let angle = match dec.state.tooth_counter {
        0 => CAM_EDGE_ANGLE,
        count => TOOTH_ANGLES
            .get(usize::from(count) - 1)
            .map_or(0, |&a| i32::from(a)),
    };
    angle + i32::from(dec.config.trigger_angle) + dec.elapsed_angle(now)
}
