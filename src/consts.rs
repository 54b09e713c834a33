//! Constants shared by the decoders, the angle/time converter and the scheduler.
//!
//! ## Key Concepts
//!
//! - **Angles** are whole crank degrees. A four-stroke cycle spans 720°.
//! - **Times** are microseconds from a free-running 32-bit counter that wraps.
//! - **Channel counts** size the fixed arrays held by the scheduler and decoder,
//!   so nothing in the interrupt paths allocates.

/// Highest engine speed the decoders will report.
///
/// An RPM computed at or above this value is treated as a glitch and the
/// previous reading is kept instead. Noise filters are also derived from it.
pub const MAX_RPM: u16 = 18_000;

/// Microseconds in one second.
pub const MICROS_PER_SEC: u32 = 1_000_000;

/// Microseconds in one minute.
pub const MICROS_PER_MIN: u32 = 60_000_000;

/// Microseconds per crank degree at 1 RPM (`60e6 / 360`).
pub const MICROS_PER_DEG_1_RPM: u32 = 166_666;

/// Stall timeout used until a decoder computes its own.
pub const DEFAULT_STALL_TIME: u32 = 500_000;

/// Degrees in a full four-stroke engine cycle.
pub const CRANK_ANGLE_MAX: i16 = 720;

/// Number of ignition channels (coils) the scheduler owns.
pub const IGN_CHANNELS: usize = 8;

/// Number of fuel channels (injectors) the scheduler owns.
pub const INJ_CHANNELS: usize = 8;

/// Capacity of the tooth-gap log.
pub const TOOTH_LOG_SIZE: usize = 127;

/// Delay between arming and opening the injectors for the priming pulse.
pub const INJECTOR_PRIMING_DELAY_US: u32 = 100;

/// Weight (out of 256) given to the previous actual-dwell reading.
pub const DWELL_AVERAGE_ALPHA: u32 = 30;

/// Lower bound on the stall timeout of the basic distributor decoder.
pub const DISTRIBUTOR_MIN_STALL_US: u32 = 366_667;

/// Below this speed the basic distributor always uses the cranking RPM method.
pub const DISTRIBUTOR_CRANKING_RPM_CEILING: u16 = 1_500;

/// Below this speed the missing tooth decoder checks every tooth for the gap.
pub const MISSING_TOOTH_GAP_CHECK_RPM: u16 = 2_000;

/// Revolutions after start-up before a pending coil will take its end from the tooth interrupt.
pub const MIN_CYCLES_FOR_END_COMPARE: u16 = 6;
