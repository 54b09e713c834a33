//! Missing tooth wheels (36-1, 60-2, 24-1, 4-1...), optionally with a cam input.
//!
//! Tooth one is the first tooth after the gap. The gap is found when an
//! interval is well above the previous one (1.5× for one missing tooth, N×
//! for N missing), or when more teeth than the wheel carries have been
//! counted. With sequential outputs on a crank wheel the gap alone only
//! gives half sync, and the cam input picks the revolution.

use super::{ToothEvent, TriggerDecoder, ignition_limits, nudge};
use crate::config::{SecondaryPattern, SparkMode, Strokes, TriggerSpeed};
use crate::consts::{
    MAX_RPM, MICROS_PER_DEG_1_RPM, MICROS_PER_MIN, MICROS_PER_SEC, MISSING_TOOTH_GAP_CHECK_RPM,
};

pub(super) fn setup(dec: &mut TriggerDecoder) {
    let config = dec.config;
    let wheel_degrees: u16 = match config.speed {
        TriggerSpeed::Crank => 360,
        TriggerSpeed::Cam => 720,
    };
    dec.state.tooth_angle = wheel_degrees / config.teeth;
    dec.actual_teeth = config.teeth - u16::from(config.missing_teeth);

    let max_revs_per_sec = u32::from(MAX_RPM / 60);
    dec.state.filter_time = MICROS_PER_SEC / (max_revs_per_sec * u32::from(config.teeth));
    dec.state.secondary_filter_time = match config.secondary {
        SecondaryPattern::FourMinusOne => MICROS_PER_MIN / u32::from(MAX_RPM) / 4 / 2,
        _ => MICROS_PER_SEC / max_revs_per_sec,
    };
    dec.state.stall_time = (MICROS_PER_DEG_1_RPM / 50)
        * u32::from(dec.state.tooth_angle)
        * (u32::from(config.missing_teeth) + 1);
}

pub(super) fn primary(dec: &mut TriggerDecoder, now: u32) -> bool {
    let gap = now.wrapping_sub(dec.state.last_tooth_time);
    if gap < dec.state.filter_time {
        return false;
    }
    dec.state.tooth_counter = dec.state.tooth_counter.wrapping_add(1);

    let s = dec.state;
    if s.last_tooth_time == 0 || s.prior_tooth_time == 0 {
        dec.shift_tooth_times(now);
        return true;
    }

    let actual = dec.actual_teeth;
    let check_gap = !s.has_sync
        || s.rpm < MISSING_TOOTH_GAP_CHECK_RPM
        || u32::from(s.tooth_counter) >= (3 * u32::from(actual)) >> 2;
    let is_missing = check_gap && {
        let last_gap = s.last_tooth_time.wrapping_sub(s.prior_tooth_time);
        let target = if dec.config.missing_teeth == 1 {
            last_gap.saturating_mul(3) >> 1
        } else {
            last_gap.saturating_mul(u32::from(dec.config.missing_teeth))
        };
        gap > target || s.tooth_counter > actual
    };

    if !is_missing {
        dec.set_filter(gap);
        dec.shift_tooth_times(now);
        dec.state.tooth_angle_correct = true;
    } else if s.tooth_counter < actual && s.has_sync {
        // gap arrived early, teeth were lost
        dec.lose_sync();
    } else {
        tooth_one(dec, now);
    }
    true
}

fn tooth_one(dec: &mut TriggerDecoder, now: u32) {
    let config = dec.config;
    let state = &mut dec.state;
    if state.has_sync || state.half_sync {
        let step = if config.speed == TriggerSpeed::Cam { 2 } else { 1 };
        state.start_revolutions = state.start_revolutions.wrapping_add(step);
    } else {
        state.start_revolutions = 0;
    }
    state.tooth_counter = 1;
    state.revolution_one = if config.secondary == SecondaryPattern::Poll {
        config.poll_level_high == state.secondary_level
    } else {
        !state.revolution_one
    };

    if config.needs_full_cycle() {
        if state.secondary_tooth_count > 0
            || config.speed == TriggerSpeed::Cam
            || config.secondary == SecondaryPattern::Poll
            || config.strokes == Strokes::Two
        {
            state.has_sync = true;
            state.half_sync = false;
        } else if !state.has_sync {
            state.half_sync = true;
        }
    } else {
        state.has_sync = true;
        state.half_sync = false;
    }

    if matches!(
        config.secondary,
        SecondaryPattern::Single | SecondaryPattern::Toyota3
    ) {
        state.secondary_tooth_count = 0;
    }
    state.filter_time = 0;
    state.tooth_angle_correct = false;
    dec.mark_tooth_one(now);
    dec.shift_tooth_times(now);
}

pub(super) fn secondary(dec: &mut TriggerDecoder, now: u32) {
    let state = &mut dec.state;
    let mut gap = now.wrapping_sub(state.last_secondary_time);
    if state.last_secondary_time == 0 {
        gap = 0;
        state.last_secondary_time = now;
    }
    if gap < state.secondary_filter_time {
        return;
    }

    match dec.config.secondary {
        SecondaryPattern::FourMinusOne => {
            let target = state
                .last_secondary_time
                .wrapping_sub(state.prior_secondary_time)
                .saturating_mul(3)
                >> 1;
            state.prior_secondary_time = state.last_secondary_time;
            if gap >= target || state.secondary_tooth_count > 3 {
                state.secondary_tooth_count = 1;
                state.revolution_one = true;
                state.secondary_filter_time = 0;
            } else {
                state.secondary_filter_time = gap >> 2;
                state.secondary_tooth_count = state.secondary_tooth_count.wrapping_add(1);
            }
        }
        SecondaryPattern::Poll => {
            state.secondary_filter_time = gap >> 1;
        }
        SecondaryPattern::Single => {
            state.revolution_one = true;
            state.secondary_filter_time = gap >> 1;
            state.secondary_tooth_count = state.secondary_tooth_count.wrapping_add(1);
        }
        SecondaryPattern::Toyota3 => {
            state.secondary_tooth_count = state.secondary_tooth_count.wrapping_add(1);
            if state.secondary_tooth_count == 2 {
                state.revolution_one = true;
            }
            state.secondary_filter_time = gap >> 2;
        }
    }
    state.last_secondary_time = now;
}

pub(super) fn rpm(dec: &mut TriggerDecoder) -> u16 {
    let speed = dec.config.speed;
    if dec.is_cranking() {
        // the interval ending on tooth one spans the gap
        if dec.state.tooth_counter == 1 {
            dec.state.rpm
        } else {
            dec.cranking_rpm(dec.config.teeth, speed)
        }
    } else {
        dec.std_rpm(speed)
    }
}

fn tooth_base_angle(dec: &TriggerDecoder) -> i32 {
    (i32::from(dec.state.tooth_counter) - 1) * i32::from(dec.state.tooth_angle)
        + i32::from(dec.config.trigger_angle)
}

pub(super) fn crank_angle(dec: &TriggerDecoder, now: u32) -> i32 {
    let mut angle = tooth_base_angle(dec);
    if dec.state.revolution_one && dec.config.speed == TriggerSpeed::Crank {
        angle += 360;
    }
    angle + dec.elapsed_angle(now)
}

pub(super) fn tooth_event(dec: &TriggerDecoder) -> Option<ToothEvent> {
    if dec.is_cranking() {
        return None;
    }
    let config = dec.config;
    let mut angle = tooth_base_angle(dec);
    let mut tooth = dec.state.tooth_counter;
    if config.spark_mode == SparkMode::Sequential
        && dec.state.revolution_one
        && config.speed == TriggerSpeed::Crank
        && config.strokes == Strokes::Four
    {
        angle += 360;
        tooth = tooth.wrapping_add(config.teeth);
    }
    Some(ToothEvent {
        tooth,
        crank_angle: ignition_limits(angle, config.max_ignition_angle()),
    })
}

pub(super) fn end_teeth(dec: &mut TriggerDecoder, end_angles: &[i16]) {
    let config = dec.config;
    let tooth_adder = if matches!(config.spark_mode, SparkMode::Sequential | SparkMode::Single)
        && config.speed == TriggerSpeed::Crank
        && config.strokes == Strokes::Four
    {
        config.teeth
    } else {
        0
    };
    let tooth_angle = i16::try_from(dec.state.tooth_angle).unwrap_or(i16::MAX).max(1);
    let range = i16::try_from(config.teeth + tooth_adder).unwrap_or(i16::MAX);
    let actual = dec.actual_teeth;

    for (slot, &end_angle) in dec.end_teeth.iter_mut().zip(end_angles) {
        let mut tooth = end_angle.wrapping_sub(config.trigger_angle) / tooth_angle;
        // one tooth of margin for the calculation time on fine wheels
        if config.teeth > 12 {
            tooth -= 1;
        }
        let mut tooth = u16::try_from(nudge(1, range, tooth, range)).unwrap_or(1);
        if tooth > actual && tooth <= config.teeth {
            tooth = actual;
        }
        *slot = tooth.min(actual + tooth_adder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TriggerConfig, TriggerPattern};

    const TOOTH: u32 = 1_000;

    fn decoder(config: TriggerConfig) -> TriggerDecoder {
        TriggerDecoder::new(TriggerConfig {
            pattern: TriggerPattern::MissingTooth,
            ..config
        })
        .unwrap()
    }

    /// Runs a 36-1 wheel, starting with the tooth after the gap.
    ///
    /// # Returns
    /// - The time of the last edge and the number of edges until sync, if seen
    fn run_wheel(dec: &mut TriggerDecoder, mut now: u32, revs: usize) -> (u32, Option<usize>) {
        let mut synced_at = None;
        let mut edges = 0;
        for _ in 0..revs {
            for tooth in 1..=35 {
                now += if tooth == 1 { 2 * TOOTH } else { TOOTH };
                assert!(dec.on_primary_edge(now));
                edges += 1;
                if synced_at.is_none() && (dec.state.has_sync || dec.state.half_sync) {
                    synced_at = Some(edges);
                }
            }
        }
        (now, synced_at)
    }

    #[test]
    fn test_setup_constants() {
        let dec = decoder(TriggerConfig::default());
        assert_eq!(dec.state.tooth_angle, 10);
        assert_eq!(dec.actual_teeth(), 35);
        assert_eq!(dec.state.filter_time, 92);
        assert_eq!(dec.state.secondary_filter_time, 3_333);
        assert_eq!(dec.state.stall_time, 66_660);

        let dec = decoder(TriggerConfig {
            teeth: 4,
            speed: TriggerSpeed::Cam,
            secondary: SecondaryPattern::FourMinusOne,
            ..Default::default()
        });
        assert_eq!(dec.state.tooth_angle, 180);
        assert_eq!(dec.state.secondary_filter_time, 416);
    }

    #[test]
    fn test_sync_on_gap() {
        let mut dec = decoder(TriggerConfig::default());
        let (now, synced_at) = run_wheel(&mut dec, 0, 2);
        assert_eq!(synced_at, Some(36));
        assert!(dec.state.has_sync);
        assert!(!dec.state.half_sync);
        assert_eq!(dec.state.tooth_counter, 35);
        assert_eq!(dec.state.last_tooth_time, now);

        // counter cycles through the wheel without losing sync
        let (_, _) = run_wheel(&mut dec, now, 3);
        assert!(dec.state.has_sync);
        assert_eq!(dec.state.sync_loss_counter, 0);
        assert_eq!(dec.state.start_revolutions, 3);
    }

    #[test]
    fn test_resync_is_repeatable() {
        let mut dec = decoder(TriggerConfig::default());
        let (_, first) = run_wheel(&mut dec, 0, 2);
        dec.setup();
        let (_, second) = run_wheel(&mut dec, 0, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_noise_edge_is_ignored() {
        let mut dec = decoder(TriggerConfig::default());
        let (now, _) = run_wheel(&mut dec, 0, 2);
        assert_eq!(dec.state.filter_time, TOOTH / 2);
        let before = dec.state;
        assert!(!dec.on_primary_edge(now + 100));
        assert_eq!(dec.state, before);
    }

    #[test]
    fn test_early_gap_loses_sync() {
        let mut dec = decoder(TriggerConfig::default());
        let (mut now, _) = run_wheel(&mut dec, 0, 2);
        now += 2 * TOOTH;
        let _ = dec.on_primary_edge(now);
        for _ in 0..10 {
            now += TOOTH;
            let _ = dec.on_primary_edge(now);
        }
        // a gap at tooth 12
        now += 2 * TOOTH;
        let _ = dec.on_primary_edge(now);
        assert!(!dec.state.has_sync);
        assert_eq!(dec.state.sync_loss_counter, 1);
    }

    #[test]
    fn test_rpm_and_angle() {
        let mut dec = decoder(TriggerConfig::default());
        let (now, _) = run_wheel(&mut dec, 0, 2);
        // tooth one, then tooth two
        let now = now + 2 * TOOTH;
        let _ = dec.on_primary_edge(now);
        assert_eq!(dec.rpm(now), 0);
        let now = now + TOOTH;
        let _ = dec.on_primary_edge(now);
        assert_eq!(dec.rpm(now), 1_667);
        assert_eq!(dec.revolution_time(), 36_000);
        assert_eq!(dec.rpm(now), 1_667);

        assert!(!dec.state.revolution_one);
        assert_eq!(dec.crank_angle(now + 500), 15);
    }

    #[test]
    fn test_sequential_needs_cam() {
        let mut dec = decoder(TriggerConfig {
            spark_mode: SparkMode::Sequential,
            ..Default::default()
        });
        let (now, _) = run_wheel(&mut dec, 0, 2);
        assert!(dec.state.half_sync);
        assert!(!dec.state.has_sync);

        // the first cam edge only primes the secondary timing
        dec.on_secondary_edge(now);
        assert_eq!(dec.state.secondary_tooth_count, 0);
        dec.on_secondary_edge(now + 72_000);
        assert_eq!(dec.state.secondary_tooth_count, 1);
        assert!(dec.state.revolution_one);

        let (_, _) = run_wheel(&mut dec, now + 72_000, 1);
        assert!(dec.state.has_sync);
        assert!(!dec.state.half_sync);
        assert_eq!(dec.state.secondary_tooth_count, 0);
    }

    #[test]
    fn test_four_minus_one_cam() {
        let mut dec = decoder(TriggerConfig {
            secondary: SecondaryPattern::FourMinusOne,
            ..Default::default()
        });
        for now in [10_000, 11_000, 12_000, 13_000] {
            dec.on_secondary_edge(now);
        }
        assert_eq!(dec.state.secondary_tooth_count, 3);
        assert_eq!(dec.state.secondary_filter_time, 250);
        dec.on_secondary_edge(15_000);
        assert_eq!(dec.state.secondary_tooth_count, 1);
        assert!(dec.state.revolution_one);
        assert_eq!(dec.state.secondary_filter_time, 0);
    }

    #[test]
    fn test_poll_picks_revolution_from_cam_level() {
        let mut dec = decoder(TriggerConfig {
            secondary: SecondaryPattern::Poll,
            spark_mode: SparkMode::Sequential,
            ..Default::default()
        });
        dec.set_secondary_level(true);
        let (now, _) = run_wheel(&mut dec, 0, 2);
        assert!(dec.state.has_sync);
        assert!(dec.state.revolution_one);

        dec.set_secondary_level(false);
        let (_, _) = run_wheel(&mut dec, now, 1);
        assert!(!dec.state.revolution_one);
    }

    #[test]
    fn test_end_teeth_wasted() {
        let mut dec = decoder(TriggerConfig::default());
        for (offset, expected) in [
            (0, 34),
            (90, 25),
            (180, 16),
            (270, 7),
            (360, 34),
            (-90, 7),
            (-180, 16),
            (-270, 25),
            (-360, 34),
        ] {
            dec.config.trigger_angle = offset;
            dec.set_end_teeth(&[350], 0);
            assert_eq!(dec.end_teeth[0], expected, "offset {}", offset);
        }
    }

    #[test]
    fn test_end_teeth_sequential() {
        let mut dec = decoder(TriggerConfig {
            spark_mode: SparkMode::Sequential,
            ..Default::default()
        });
        dec.set_end_teeth(&[710, 355, 5], 0);
        assert_eq!(&dec.end_teeth[..3], &[70, 34, 71]);
    }

    #[test]
    fn test_tooth_event() {
        let mut dec = decoder(TriggerConfig {
            per_tooth_ignition: true,
            trigger_angle: -20,
            ..Default::default()
        });
        dec.state.tooth_counter = 1;
        assert_eq!(dec.tooth_event(), None);

        dec.state.rpm = 3_000;
        assert_eq!(
            dec.tooth_event(),
            Some(ToothEvent {
                tooth: 1,
                crank_angle: 340
            })
        );

        dec.config.spark_mode = SparkMode::Sequential;
        dec.state.revolution_one = true;
        dec.state.tooth_counter = 3;
        assert_eq!(
            dec.tooth_event(),
            Some(ToothEvent {
                tooth: 39,
                crank_angle: 360
            })
        );
    }
}
