//! GM 7X: six teeth 60° apart plus one extra tooth shortly after tooth two.
//!
//! The extra tooth arrives in less than half the previous gap and is
//! numbered tooth three. Tooth one is 42° ATDC before the trigger offset.

use super::{ToothEvent, TriggerDecoder};
use crate::consts::MICROS_PER_DEG_1_RPM;

const TOOTH_ANGLE: u16 = 60;
const TOOTH_ONE_ANGLE: i32 = 42;
const EXTRA_TOOTH: u16 = 3;
const EXTRA_TOOTH_ANGLE: i32 = 112;
const WHEEL_TEETH: u16 = 7;

pub(super) fn setup(dec: &mut TriggerDecoder) {
    dec.state.tooth_angle = TOOTH_ANGLE;
    dec.state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(TOOTH_ANGLE);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    let last_gap = dec.state.last_gap;
    dec.state.last_gap = gap;
    dec.state.tooth_counter = dec.state.tooth_counter.wrapping_add(1);

    if dec.state.last_tooth_time > 0 && dec.state.prior_tooth_time > 0 {
        if dec.state.tooth_counter > WHEEL_TEETH {
            dec.state.tooth_counter = 1;
            dec.mark_tooth_one(now);
            dec.state.tooth_angle_correct = true;
        } else if gap < last_gap >> 1 {
            let state = &mut dec.state;
            state.tooth_counter = EXTRA_TOOTH;
            state.has_sync = true;
            // the interval into tooth three is twice the usual angle
            state.tooth_angle_correct = false;
            state.start_revolutions = state.start_revolutions.wrapping_add(1);
        } else {
            dec.state.tooth_angle_correct = true;
        }
    }
    dec.shift_tooth_times(now);
    true
}

fn tooth_angle(dec: &TriggerDecoder, count: u16) -> i32 {
    let teeth_past = if count < EXTRA_TOOTH {
        i32::from(count) - 1
    } else {
        i32::from(count) - 2
    };
    teeth_past * i32::from(TOOTH_ANGLE) + TOOTH_ONE_ANGLE + i32::from(dec.config.trigger_angle)
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let count = dec.state.tooth_counter;
    let angle = if count == EXTRA_TOOTH {
        EXTRA_TOOTH_ANGLE
    } else {
        tooth_angle(dec, count)
    };
    angle + dec.elapsed_angle(now)
}

pub(super) fn tooth_event(dec: &TriggerDecoder) -> Option<ToothEvent> {
    let count = dec.state.tooth_counter;
    (count != EXTRA_TOOTH).then(|| ToothEvent {
        tooth: count,
        crank_angle: i16::try_from(tooth_angle(dec, count)).unwrap_or(i16::MAX),
    })
}

pub(super) fn end_teeth(dec: &mut TriggerDecoder, advance: i16) {
    let teeth = if advance < 18 { [7, 2, 5] } else { [6, 1, 4] };
    dec.end_teeth[..3].copy_from_slice(&teeth);
}
