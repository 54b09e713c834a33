//! Honda D17: twelve evenly spaced crank teeth plus a thirteenth tooth
//! shortly after tooth twelve.
//!
//! The thirteenth tooth is found by a gap shorter than half the previous
//! one. Its timestamp is never used for speed or angle.

use super::TriggerDecoder;
use crate::consts::MICROS_PER_DEG_1_RPM;

const TOOTH_ANGLE: u16 = 30;
const EXTRA_TOOTH: u16 = 13;
const LAST_REAL_TOOTH: i32 = 12;

pub(super) fn setup(dec: &mut TriggerDecoder) {
    dec.state.tooth_angle = TOOTH_ANGLE;
    dec.state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(TOOTH_ANGLE);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let last_gap = dec.state.last_gap;
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    dec.state.last_gap = gap;
    dec.state.tooth_counter = dec.state.tooth_counter.wrapping_add(1);

    let synced = dec.state.has_sync;
    if synced && dec.state.tooth_counter == EXTRA_TOOTH {
        dec.state.tooth_counter = 0;
    } else if synced && dec.state.tooth_counter == 1 {
        dec.state.start_revolutions = dec.state.start_revolutions.wrapping_add(1);
        dec.mark_tooth_one(now);
        dec.shift_tooth_times(now);
    } else if gap < last_gap >> 1 {
        dec.state.tooth_counter = 0;
        dec.state.has_sync = true;
    } else {
        dec.shift_tooth_times(now);
    }
    true
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    // count 0 is the extra tooth, measured from tooth twelve
    let teeth_past = match dec.state.tooth_counter {
        0 => LAST_REAL_TOOTH - 1,
        count => i32::from(count) - 1,
    };
    teeth_past * i32::from(TOOTH_ANGLE)
        + i32::from(dec.config.trigger_angle)
        + dec.elapsed_angle(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TriggerConfig, TriggerPattern};
    use crate::decoder::tests::feed;

    const GAP: u32 = 1_000;

    fn decoder() -> TriggerDecoder {
        TriggerDecoder::new(TriggerConfig {
            pattern: TriggerPattern::HondaD17,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_setup_constants() {
        let dec = decoder();
        assert_eq!(dec.state.tooth_angle, 30);
        assert_eq!(dec.state.stall_time, 99_990);
    }

    #[test]
    fn test_short_gap_gives_sync() {
        let mut dec = decoder();
        let now = feed(&mut dec, 0, GAP, 5);
        assert!(!dec.state.has_sync);

        let tooth_twelve = now;
        assert!(dec.on_primary_edge(now + 100));
        assert!(dec.state.has_sync);
        assert_eq!(dec.state.tooth_counter, 0);
        // the extra tooth leaves the tooth times alone
        assert_eq!(dec.state.last_tooth_time, tooth_twelve);
        assert_eq!(dec.crank_angle(tooth_twelve), 330);

        let now = feed(&mut dec, tooth_twelve, GAP, 1);
        assert_eq!(dec.state.tooth_counter, 1);
        assert_eq!(dec.state.start_revolutions, 1);
        assert_eq!(dec.state.last_revolution_time, now);
    }

    #[test]
    fn test_full_revolution() {
        let mut dec = decoder();
        let now = feed(&mut dec, 0, GAP, 3);
        let _ = dec.on_primary_edge(now + 100);
        let now = feed(&mut dec, now, GAP, 12);
        assert_eq!(dec.state.tooth_counter, 12);
        assert_eq!(dec.crank_angle(now), 330);

        let _ = dec.on_primary_edge(now + 100);
        assert_eq!(dec.state.tooth_counter, 0);
        let now = feed(&mut dec, now, GAP, 1);
        assert_eq!(dec.state.tooth_counter, 1);
        assert_eq!(dec.state.start_revolutions, 2);

        assert_eq!(dec.rpm(now), 5_000);
        assert_eq!(dec.revolution_time(), 12_000);
    }
}
