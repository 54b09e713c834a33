//! Daihatsu cam wheel: one tooth per cylinder plus an extra tooth 30°
//! after tooth one.
//!
//! Three and four cylinder engines only. The extra tooth is tooth two and is
//! recognised by a gap well under the spacing of the cylinder teeth.

use super::TriggerDecoder;
use crate::consts::{MAX_RPM, MICROS_PER_DEG_1_RPM, MICROS_PER_MIN};

const THREE_CYLINDER_ANGLES: [i16; 4] = [0, 30, 240, 480];
const FOUR_CYLINDER_ANGLES: [i16; 5] = [0, 30, 180, 360, 540];

/// Filter used for the short interval into the extra tooth.
const EXTRA_TOOTH_FILTER: u32 = 20;
/// Teeth to watch before the extra tooth can be told apart.
const TEETH_BEFORE_SYNC: u8 = 3;

fn tooth_angles(dec: &TriggerDecoder) -> &'static [i16] {
    if dec.config.cylinders == 3 {
        &THREE_CYLINDER_ANGLES
    } else {
        &FOUR_CYLINDER_ANGLES
    }
}

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let cylinders = dec.config.cylinders.max(1);
    dec.actual_teeth = u16::from(cylinders) + 1;
    let state = &mut dec.state;
    state.tooth_angle = 720 / dec.actual_teeth;
    state.filter_time = MICROS_PER_MIN / u32::from(MAX_RPM) / u32::from(cylinders) / 2;
    state.stall_time = ((MICROS_PER_DEG_1_RPM / 90) * u32::from(state.tooth_angle)) * 4;
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    dec.state.system_tooth_count = dec.state.system_tooth_count.saturating_add(1);

    if dec.state.has_sync {
        if dec.state.tooth_counter == dec.actual_teeth {
            dec.state.tooth_counter = 1;
            dec.state.start_revolutions = dec.state.start_revolutions.wrapping_add(1);
            dec.state.filter_time = EXTRA_TOOTH_FILTER;
            dec.mark_tooth_one(now);
        } else {
            dec.state.tooth_counter += 1;
            dec.set_filter(gap);
        }
    } else if dec.state.system_tooth_count >= TEETH_BEFORE_SYNC {
        // aim for anything under about 60° of the last cylinder interval
        let interval = dec
            .state
            .last_tooth_time
            .wrapping_sub(dec.state.prior_tooth_time);
        let target = if dec.config.cylinders == 3 {
            interval / 4
        } else {
            u32::try_from(u64::from(interval) * 3 / 8).unwrap_or(u32::MAX)
        };
        if gap < target {
            dec.state.tooth_counter = 2;
            dec.state.has_sync = true;
            dec.state.filter_time = target;
        }
    }
    dec.shift_tooth_times(now);
    true
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let angle = usize::from(dec.state.tooth_counter)
        .checked_sub(1)
        .and_then(|i| tooth_angles(dec).get(i))
        .map_or(0, |&a| i32::from(a));
    angle + i32::from(dec.config.trigger_angle) + dec.elapsed_angle(now)
}
