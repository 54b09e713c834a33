//! # ems-trigger
//!
//! A portable, no_std Rust core for engine management firmware: trigger
//! wheel decoding, crank angle/time conversion and injector/coil event
//! scheduling on compare-match timers.
//!
//! This crate implements the real-time half of an EMS using:
//! - `embedded-hal` traits for injector/coil outputs and sensor inputs
//! - a [`HardwareTimer`](timer::HardwareTimer) trait for 16-bit compare-match channels
//! - interrupt-safe access to a global engine with `critical-section`
//! - integer-only fixed point angle/time maths
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support and replaces the `heapless::Vec` tooth log
//! with a `std::vec::Vec` |
//! | `timer-isr` (default) | Global engine helpers and ISR macros built on `critical_section::with` |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Software Features
//!
//! - **Trigger decoders** for missing tooth wheels (with single, 4-1, polled
//!   and Toyota cam inputs), dual wheels, distributors, GM 7X and 24X,
//!   Jeep 2000, Audi 135, Honda D17, non-360 dual wheels and Daihatsu +1
//! - **Sync tracking** with noise filtering, sync loss counting, half sync and
//!   stall detection
//! - **Event scheduler** with one queued pulse per channel, so a new request
//!   never cuts short or stretches the pulse in flight
//! - **Per-tooth ignition** re-timing the spark from the end tooth
//! - **Overdwell guard** switching off coils that charge for too long
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ems_trigger::config::{DwellConfig, TriggerConfig};
//! use ems_trigger::engine::Engine;
//! use ems_trigger::scheduler::Scheduler;
//! use ems_trigger::timer::TickRate;
//!
//! ems_trigger::init_engine!(CompareChannel, OutputPin, 4, 4);
//!
//! let scheduler = Scheduler::new(injectors, coils, TickRate::FourMicros, false);
//! let engine = Engine::new(TriggerConfig::default(), DwellConfig::default(), scheduler)?;
//! ems_trigger::setup_engine!(engine);
//! ```
//!
//! Then from the interrupts:
//!
//! ```rust,ignore
//! #[interrupt]
//! fn EXTI0() {
//!     ems_trigger::primary_trigger!(&mut crank_pin, micros());
//! }
//!
//! #[interrupt]
//! fn TIM3() {
//!     ems_trigger::fuel_compare_match!(0);
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Times are microseconds from a free-running 32-bit clock that may wrap
//! - Every channel needs its own compare register and interrupt
//! - The main loop must read and arm through a critical section (the
//!   `global_engine_with` helper or your own `critical_section::with`)
//! - Only one engine instance should be active at a time in interrupt-driven mode
//!
//! --
//! Designed for `#![no_std]` use on AVR and Cortex-M engine controllers.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

#[macro_use]
mod fmt;

pub mod config;
pub mod consts;
pub mod crank_math;
pub mod decoder;
pub mod dwell;
pub mod engine;
pub mod scheduler;
pub mod timer;
