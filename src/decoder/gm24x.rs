//! GM 24X: 24 unevenly spaced crank teeth and a cam tooth once per cycle.
//!
//! The cam tooth zeroes the count, the next crank tooth is tooth one.
//! Tooth angles come from a fixed table.

use super::TriggerDecoder;
use crate::consts::MICROS_PER_DEG_1_RPM;

/// Angle of each tooth after tooth one's reference.
pub(super) const TOOTH_ANGLES: [i16; 24] = [
    12, 18, 33, 48, 63, 78, 102, 108, 123, 138, 162, 177, 183, 198, 222, 237, 252, 258, 282, 288,
    312, 327, 342, 357,
];

/// Tooth count meaning "no cam tooth seen yet".
const WAITING_COUNT: u16 = 25;
const FIRST_TOOTH_ANGLE: u16 = 15;

pub(super) fn setup(dec: &mut TriggerDecoder) {
    dec.state.tooth_angle = FIRST_TOOTH_ANGLE;
    dec.state.tooth_counter = WAITING_COUNT;
    dec.state.tooth_angle_correct = true;
    dec.state.stall_time = (MICROS_PER_DEG_1_RPM / 50) * u32::from(FIRST_TOOTH_ANGLE);
}

/// Advances along a tooth angle table.
///
/// # Returns
/// - `false` when the count ran off the end of the table (sync lost)
pub(super) fn step_table(dec: &mut TriggerDecoder, table: &[i16]) -> bool {
    let count = dec.state.tooth_counter.wrapping_add(1);
    let index = usize::from(count);
    let this = index.checked_sub(1).and_then(|i| table.get(i));
    let previous = index.checked_sub(2).and_then(|i| table.get(i));
    match (this, previous) {
        (Some(&this), Some(&previous)) => {
            dec.state.tooth_counter = count;
            dec.state.tooth_angle = this.abs_diff(previous);
            true
        }
        _ => false,
    }
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    if dec.state.tooth_counter == WAITING_COUNT {
        dec.state.has_sync = false;
        dec.state.last_tooth_time = now;
        return true;
    }
    if dec.state.tooth_counter == 0 {
        let state = &mut dec.state;
        state.tooth_counter = 1;
        state.revolution_one = !state.revolution_one;
        state.has_sync = true;
        state.start_revolutions = state.start_revolutions.wrapping_add(1);
        state.tooth_angle = FIRST_TOOTH_ANGLE;
        dec.mark_tooth_one(now);
    } else if !step_table(dec, &TOOTH_ANGLES) {
        dec.lose_sync();
        dec.state.tooth_counter = WAITING_COUNT;
    }
    dec.state.last_tooth_time = now;
    true
}

pub(super) fn secondary(dec: &mut TriggerDecoder) {
    dec.state.tooth_counter = 0;
    dec.state.revolution_one = true;
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let offset = i32::from(dec.config.trigger_angle);
    let mut angle = match dec.state.tooth_counter {
        0 => offset,
        count => {
            let index = usize::from(count) - 1;
            TOOTH_ANGLES.get(index).map_or(0, |&a| i32::from(a)) + offset
        }
    };
    angle += dec.elapsed_angle(now);
    if dec.state.revolution_one {
        angle += 360;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SparkMode, TriggerConfig, TriggerPattern};
    use crate::decoder::tests::feed;

    fn decoder() -> TriggerDecoder {
        TriggerDecoder::new(TriggerConfig {
            pattern: TriggerPattern::Gm24x,
            spark_mode: SparkMode::Sequential,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_waits_for_cam() {
        let mut dec = decoder();
        let _ = feed(&mut dec, 1_000, 500, 10);
        assert!(!dec.state.has_sync);
        assert_eq!(dec.state.tooth_counter, WAITING_COUNT);
    }

    #[test]
    fn test_cam_then_table() {
        let mut dec = decoder();
        dec.on_secondary_edge(1_000);
        assert!(dec.state.revolution_one);
        let now = feed(&mut dec, 1_000, 500, 1);
        assert!(dec.state.has_sync);
        assert!(!dec.state.revolution_one);
        assert_eq!(dec.state.tooth_counter, 1);
        assert_eq!(dec.state.last_revolution_time, now);

        let now = feed(&mut dec, now, 500, 6);
        assert_eq!(dec.state.tooth_counter, 7);
        assert_eq!(dec.state.tooth_angle, 24);
        assert_eq!(dec.crank_angle(now), 102);
    }

    #[test]
    fn test_running_off_the_table_loses_sync() {
        let mut dec = decoder();
        dec.on_secondary_edge(1_000);
        let _ = feed(&mut dec, 1_000, 500, 25);
        assert!(!dec.state.has_sync);
        assert_eq!(dec.state.sync_loss_counter, 1);
        assert_eq!(dec.state.tooth_counter, WAITING_COUNT);
    }
}
