//! Audi 135 tooth flywheel with one cam tooth.
//!
//! 135 does not divide 360, so only every third physical tooth is counted,
//! giving a 45 tooth wheel of 8° teeth. The cam tooth gives sync.

use super::TriggerDecoder;
use super::dual_wheel::secondary_filter;
use crate::consts::{MAX_RPM, MICROS_PER_DEG_1_RPM, MICROS_PER_SEC};

const PHYSICAL_TEETH: u32 = 135;
const VIRTUAL_TEETH: u16 = 45;
const TEETH_PER_VIRTUAL: u8 = 3;
const TOOTH_ANGLE: u16 = 8;

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let state = &mut dec.state;
    state.tooth_angle = TOOTH_ANGLE;
    state.tooth_counter = 255;
    state.system_tooth_count = 0;
    state.filter_time = MICROS_PER_SEC / (u32::from(MAX_RPM / 60) * PHYSICAL_TEETH);
    state.secondary_filter_time = secondary_filter();
    state.tooth_angle_correct = true;
    state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(TOOTH_ANGLE);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_system_tooth_time);
    if gap <= dec.state.filter_time && dec.state.start_revolutions != 0 {
        return false;
    }
    dec.state.system_tooth_count = dec.state.system_tooth_count.wrapping_add(1);

    if !dec.state.has_sync {
        dec.state.last_tooth_time = now;
    } else if dec.state.system_tooth_count >= TEETH_PER_VIRTUAL {
        let state = &mut dec.state;
        state.last_system_tooth_time = now;
        state.system_tooth_count = 0;
        state.tooth_counter = state.tooth_counter.wrapping_add(1);
        if state.tooth_counter == 1 || state.tooth_counter > VIRTUAL_TEETH {
            state.tooth_counter = 1;
            state.revolution_one = !state.revolution_one;
            state.start_revolutions = state.start_revolutions.wrapping_add(1);
            dec.mark_tooth_one(now);
        }
        dec.set_filter(gap);
        dec.shift_tooth_times(now);
    }
    true
}

pub(super) fn secondary(dec: &mut TriggerDecoder) {
    let use_resync = dec.config.use_resync;
    let state = &mut dec.state;
    if !state.has_sync {
        state.tooth_counter = 0;
        state.has_sync = true;
        // the next physical tooth completes a virtual one
        state.system_tooth_count = TEETH_PER_VIRTUAL;
    } else if use_resync {
        state.tooth_counter = 0;
        state.system_tooth_count = TEETH_PER_VIRTUAL;
    } else if state.start_revolutions < 100 && state.tooth_counter != VIRTUAL_TEETH {
        state.tooth_counter = 0;
    }
    state.revolution_one = true;
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let count = match dec.state.tooth_counter {
        0 => VIRTUAL_TEETH,
        count => count,
    };
    let mut angle = (i32::from(count) - 1) * i32::from(TOOTH_ANGLE)
        + i32::from(dec.config.trigger_angle)
        + dec.elapsed_angle(now);
    if dec.state.revolution_one {
        angle += 360;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TriggerConfig, TriggerFilter, TriggerPattern};
    use crate::decoder::tests::feed;

    const PHYSICAL_GAP: u32 = 100;

    fn decoder() -> TriggerDecoder {
        TriggerDecoder::new(TriggerConfig {
            pattern: TriggerPattern::Audi135,
            filter: TriggerFilter::Off,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_setup_constants() {
        let dec = decoder();
        assert_eq!(dec.state.filter_time, 24);
        assert_eq!(dec.state.stall_time, 26_664);
    }

    #[test]
    fn test_every_third_tooth_counts() {
        let mut dec = decoder();
        let now = feed(&mut dec, 10_000, PHYSICAL_GAP, 10);
        assert!(!dec.state.has_sync);
        assert_eq!(dec.state.last_tooth_time, now);

        dec.on_secondary_edge(now + 50);
        assert!(dec.state.has_sync);
        assert!(dec.state.revolution_one);

        let now = feed(&mut dec, now, PHYSICAL_GAP, 1);
        assert_eq!(dec.state.tooth_counter, 1);
        assert!(!dec.state.revolution_one);
        assert_eq!(dec.state.start_revolutions, 1);

        let now = feed(&mut dec, now, PHYSICAL_GAP, 3 * 44);
        assert_eq!(dec.state.tooth_counter, 45);
        assert_eq!(dec.crank_angle(now), 352);

        let _ = feed(&mut dec, now, PHYSICAL_GAP, 3);
        assert_eq!(dec.state.tooth_counter, 1);
        assert!(dec.state.revolution_one);
        assert_eq!(dec.state.start_revolutions, 2);
    }

    #[test]
    fn test_secondary_resync() {
        let mut dec = decoder();
        dec.on_secondary_edge(0);
        let now = feed(&mut dec, 10_000, PHYSICAL_GAP, 1 + 3 * 9);
        assert_eq!(dec.state.tooth_counter, 10);

        // an early cam tooth realigns the count during start-up
        dec.on_secondary_edge(now);
        assert_eq!(dec.state.tooth_counter, 0);

        dec.config.use_resync = true;
        let now = feed(&mut dec, now, PHYSICAL_GAP, 3);
        assert_eq!(dec.state.tooth_counter, 1);
        dec.on_secondary_edge(now);
        assert_eq!(dec.state.tooth_counter, 0);
        assert_eq!(dec.state.system_tooth_count, 3);
    }
}
