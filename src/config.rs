//! Trigger and dwell configuration.
//!
//! These structs are the only inputs the core takes from the tune. They are
//! plain `Copy` data so the main loop can hand a fresh copy to the decoder
//! whenever the tune changes, then rebuild it with [`TriggerDecoder::new`].
//!
//! [`TriggerDecoder::new`]: crate::decoder::TriggerDecoder::new

use crate::consts::{CRANK_ANGLE_MAX, IGN_CHANNELS};
use thiserror::Error;

/// Which trigger wheel layout the decoder should expect.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TriggerPattern {
    /// Evenly spaced wheel with one or more consecutive teeth removed (36-1, 60-2, 4-1...).
    #[default]
    MissingTooth,
    /// Evenly spaced primary wheel plus a single-tooth secondary giving tooth one.
    DualWheel,
    /// One primary pulse per cylinder from a distributor, no secondary.
    BasicDistributor,
    /// GM 6+1 crank wheel (7X) with the extra tooth marking tooth three.
    Gm7x,
    /// GM 24X crank wheel with irregular tooth spacing and a cam reference.
    Gm24x,
    /// Jeep 2000 crank wheel: four groups of three teeth plus a cam reference.
    Jeep2000,
    /// Audi 135 tooth flywheel, divided down to 45 virtual teeth.
    Audi135,
    /// Honda D17 12+1 wheel, the extra tooth closing up on tooth twelve.
    HondaD17,
    /// Dual wheel whose tooth count does not divide 360 evenly.
    Non360,
    /// Daihatsu cam wheel with one tooth per cylinder plus one sync tooth.
    Daihatsu,
}

/// The shaft the primary wheel is mounted on.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TriggerSpeed {
    /// Crankshaft speed: one wheel turn per crank revolution.
    #[default]
    Crank,
    /// Camshaft speed: one wheel turn per two crank revolutions.
    Cam,
}

/// Strength of the primary noise filter.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TriggerFilter {
    /// Every edge is accepted.
    Off,
    /// Reject edges sooner than 25% of the last gap.
    Lite,
    /// Reject edges sooner than 50% of the last gap.
    #[default]
    Medium,
    /// Reject edges sooner than 75% of the last gap.
    Aggressive,
}

/// Layout of the secondary (cam) wheel paired with a missing tooth crank wheel.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SecondaryPattern {
    /// A single tooth per cam revolution.
    #[default]
    Single,
    /// Four evenly spaced teeth with one removed.
    FourMinusOne,
    /// Cam level is polled when the crank gap is seen instead of counted.
    Poll,
    /// Toyota three tooth cam wheel.
    Toyota3,
}

/// Engine cycle type.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Strokes {
    /// Four-stroke: one engine cycle per 720°.
    #[default]
    Four,
    /// Two-stroke: one engine cycle per 360°.
    Two,
}

/// How coils are wired to cylinders.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SparkMode {
    /// Paired coils fired every revolution.
    #[default]
    Wasted,
    /// One coil through a distributor.
    Single,
    /// Coil-on-plug fired as wasted spark.
    WastedCop,
    /// One coil per cylinder fired once per cycle.
    Sequential,
    /// Rotary leading/trailing split.
    Rotary,
}

/// How injectors are wired to cylinders.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum InjLayout {
    /// Injectors fired in banks every revolution.
    Paired,
    /// One injector per channel, fired every revolution.
    #[default]
    SemiSequential,
    /// One injector per cylinder, fired once per cycle.
    Sequential,
}

/// Which sensor transitions count as teeth.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Edge {
    /// Low to high transitions.
    #[default]
    Rising,
    /// High to low transitions.
    Falling,
    /// Both transitions.
    Change,
}

impl Edge {
    /// Whether an interrupt that left the input at `level_high` is a tooth for this polarity.
    pub fn accepts(self, level_high: bool) -> bool {
        match self {
            Edge::Rising => level_high,
            Edge::Falling => !level_high,
            Edge::Change => true,
        }
    }
}

/// Reasons a [`TriggerConfig`] or [`DwellConfig`] cannot be used.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ConfigError {
    /// The wheel was configured with zero teeth.
    #[error("trigger wheel must have at least one tooth")]
    ZeroTeeth,
    /// There are as many or more missing teeth than teeth on the wheel.
    #[error("{missing} missing teeth leave nothing of a {teeth} tooth wheel")]
    TooManyMissingTeeth {
        /// Configured tooth count.
        teeth: u16,
        /// Configured missing tooth count.
        missing: u8,
    },
    /// The engine was configured with zero cylinders.
    #[error("cylinder count must be at least one")]
    ZeroCylinders,
    /// The pattern has no geometry for this cylinder count.
    #[error("{pattern:?} does not support {cylinders} cylinders")]
    UnsupportedCylinderCount {
        /// Selected pattern.
        pattern: TriggerPattern,
        /// Configured cylinder count.
        cylinders: u8,
    },
    /// The non-360 angle multiplier was zero.
    #[error("angle multiplier must be non-zero")]
    ZeroAngleMultiplier,
    /// The wheel has so many teeth that a tooth spans less than one degree.
    #[error("tooth angle rounds down to zero degrees")]
    ToothAngleTooSmall,
    /// A channel index beyond the scheduler's channel count.
    #[error("channel {index} does not exist")]
    InvalidChannel {
        /// Offending index.
        index: usize,
    },
}

/// Everything the decoder needs to know about the trigger wheels and the engine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TriggerConfig {
    /// Wheel layout.
    pub pattern: TriggerPattern,
    /// Teeth on the primary wheel, counting the missing ones.
    pub teeth: u16,
    /// Missing teeth (missing tooth pattern only).
    pub missing_teeth: u8,
    /// Crank angle of tooth one after TDC of cylinder one, in degrees.
    pub trigger_angle: i16,
    /// Shaft the primary wheel turns with.
    pub speed: TriggerSpeed,
    /// Secondary wheel layout (missing tooth pattern only).
    pub secondary: SecondaryPattern,
    /// Primary noise filter strength.
    pub filter: TriggerFilter,
    /// Primary sensor polarity.
    pub primary_edge: Edge,
    /// Secondary sensor polarity.
    pub secondary_edge: Edge,
    /// Engine cycle type.
    pub strokes: Strokes,
    /// Number of cylinders.
    pub cylinders: u8,
    /// Coil wiring.
    pub spark_mode: SparkMode,
    /// Injector wiring.
    pub inj_layout: InjLayout,
    /// End the dwell from the tooth interrupt when the end tooth is reached.
    pub per_tooth_ignition: bool,
    /// Force the tooth count back into line on every secondary tooth.
    pub use_resync: bool,
    /// Revolutions to wait before the cranking RPM method is trusted.
    pub stg_cycles: u8,
    /// Angle scale for wheels that do not divide 360 (non-360 pattern only).
    pub angle_multiplier: u8,
    /// Cam level meaning "first revolution" when the secondary is polled.
    pub poll_level_high: bool,
    /// Speed below which the engine is considered to be cranking.
    pub crank_rpm: u16,
    /// Override for the pattern's own stall timeout, in microseconds.
    pub stall_time: Option<u32>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            pattern: TriggerPattern::MissingTooth,
            teeth: 36,
            missing_teeth: 1,
            trigger_angle: 0,
            speed: TriggerSpeed::Crank,
            secondary: SecondaryPattern::Single,
            filter: TriggerFilter::Medium,
            primary_edge: Edge::Rising,
            secondary_edge: Edge::Rising,
            strokes: Strokes::Four,
            cylinders: 4,
            spark_mode: SparkMode::Wasted,
            inj_layout: InjLayout::SemiSequential,
            per_tooth_ignition: false,
            use_resync: false,
            stg_cycles: 0,
            angle_multiplier: 1,
            poll_level_high: true,
            crank_rpm: 400,
            stall_time: None,
        }
    }
}

impl TriggerConfig {
    /// Checks that the selected pattern can be built from this configuration.
    ///
    /// # Returns
    /// - `Ok(())` if every field the pattern reads is usable
    /// - The first [`ConfigError`] found otherwise
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check();
        if let Err(err) = result {
            warn!("trigger configuration rejected: {}", err);
        }
        result
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.cylinders == 0 {
            return Err(ConfigError::ZeroCylinders);
        }
        match self.pattern {
            TriggerPattern::MissingTooth | TriggerPattern::DualWheel => {
                if self.teeth == 0 {
                    return Err(ConfigError::ZeroTeeth);
                }
                if u16::from(self.missing_teeth) >= self.teeth
                    && self.pattern == TriggerPattern::MissingTooth
                {
                    return Err(ConfigError::TooManyMissingTeeth {
                        teeth: self.teeth,
                        missing: self.missing_teeth,
                    });
                }
                let wheel_degrees = match self.speed {
                    TriggerSpeed::Crank => 360,
                    TriggerSpeed::Cam => 720,
                };
                if self.teeth > wheel_degrees {
                    return Err(ConfigError::ToothAngleTooSmall);
                }
            }
            TriggerPattern::Non360 => {
                if self.teeth == 0 {
                    return Err(ConfigError::ZeroTeeth);
                }
                if self.angle_multiplier == 0 {
                    return Err(ConfigError::ZeroAngleMultiplier);
                }
                if u32::from(self.teeth) > 360 * u32::from(self.angle_multiplier) {
                    return Err(ConfigError::ToothAngleTooSmall);
                }
            }
            TriggerPattern::Daihatsu => {
                if self.cylinders != 3 && self.cylinders != 4 {
                    return Err(ConfigError::UnsupportedCylinderCount {
                        pattern: self.pattern,
                        cylinders: self.cylinders,
                    });
                }
            }
            TriggerPattern::BasicDistributor => {
                if usize::from(self.cylinders) > IGN_CHANNELS {
                    return Err(ConfigError::UnsupportedCylinderCount {
                        pattern: self.pattern,
                        cylinders: self.cylinders,
                    });
                }
            }
            TriggerPattern::Gm7x
            | TriggerPattern::Gm24x
            | TriggerPattern::Jeep2000
            | TriggerPattern::Audi135
            | TriggerPattern::HondaD17 => {}
        }
        Ok(())
    }

    /// Whether any output needs to know which of the two crank revolutions is current.
    pub fn needs_full_cycle(&self) -> bool {
        self.spark_mode == SparkMode::Sequential || self.inj_layout == InjLayout::Sequential
    }

    /// Upper bound (exclusive) of ignition angles for this engine.
    ///
    /// Sequential spark on a four-stroke works over the whole 720° cycle,
    /// everything else repeats every 360°.
    pub fn max_ignition_angle(&self) -> i16 {
        if self.spark_mode == SparkMode::Sequential && self.strokes == Strokes::Four {
            CRANK_ANGLE_MAX
        } else {
            CRANK_ANGLE_MAX / 2
        }
    }

    /// Upper bound (exclusive) of injection angles for this engine.
    pub fn max_injection_angle(&self) -> i16 {
        if self.inj_layout == InjLayout::Sequential && self.strokes == Strokes::Four {
            CRANK_ANGLE_MAX
        } else {
            CRANK_ANGLE_MAX / 2
        }
    }

    /// Range the reported crank angle is wrapped into.
    pub fn max_crank_angle(&self) -> i16 {
        self.max_ignition_angle().max(self.max_injection_angle())
    }
}

/// Coil dwell settings used by [`DwellGuard`](crate::dwell::DwellGuard).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DwellConfig {
    /// Longest a coil may charge, in milliseconds.
    pub limit_ms: u8,
    /// Enable the overdwell guard.
    pub use_dwell_limit: bool,
    /// Fixed ignition timing while cranking (crank lock).
    pub fixed_cranking_override: bool,
    /// Dwell while cranking, in tenths of a millisecond.
    pub cranking_dwell: u8,
    /// Dwell while running, in tenths of a millisecond.
    pub running_dwell: u8,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            limit_ms: 8,
            use_dwell_limit: true,
            fixed_cranking_override: false,
            cranking_dwell: 45,
            running_dwell: 30,
        }
    }
}

impl DwellConfig {
    /// The overdwell limit in microseconds.
    pub fn limit_us(&self) -> u32 {
        u32::from(self.limit_ms) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(TriggerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_missing_teeth_must_leave_teeth() {
        let config = TriggerConfig {
            teeth: 4,
            missing_teeth: 4,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyMissingTeeth {
                teeth: 4,
                missing: 4
            })
        );
    }

    #[test]
    fn test_tooth_limit_follows_wheel_speed() {
        let mut config = TriggerConfig {
            teeth: 500,
            missing_teeth: 1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ToothAngleTooSmall));
        config.speed = TriggerSpeed::Cam;
        assert_eq!(config.validate(), Ok(()));
        config.teeth = 721;
        assert_eq!(config.validate(), Err(ConfigError::ToothAngleTooSmall));
    }

    #[test]
    fn test_daihatsu_cylinder_counts() {
        let mut config = TriggerConfig {
            pattern: TriggerPattern::Daihatsu,
            cylinders: 6,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedCylinderCount { cylinders: 6, .. })
        ));
        config.cylinders = 3;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = TriggerConfig {
            teeth: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTeeth));
        let config = TriggerConfig {
            cylinders: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCylinders));
        let config = TriggerConfig {
            pattern: TriggerPattern::Non360,
            angle_multiplier: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroAngleMultiplier));
    }

    #[test]
    fn test_ignition_angle_range() {
        let mut config = TriggerConfig::default();
        assert_eq!(config.max_ignition_angle(), 360);
        config.spark_mode = SparkMode::Sequential;
        assert_eq!(config.max_ignition_angle(), 720);
        config.strokes = Strokes::Two;
        assert_eq!(config.max_ignition_angle(), 360);
    }

    #[test]
    fn test_edge_polarity() {
        assert!(Edge::Rising.accepts(true));
        assert!(!Edge::Rising.accepts(false));
        assert!(Edge::Falling.accepts(false));
        assert!(Edge::Change.accepts(false));
        assert_eq!(DwellConfig::default().limit_us(), 8000);
    }
}
