use crate::engine::Engine;
use crate::timer::HardwareTimer;
use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::digital::{InputPin, OutputPin};

/// The global engine slot shared by the main loop and the interrupts.
pub type GlobalEngine<T, P, const INJ: usize, const IGN: usize> =
    Mutex<RefCell<Option<Engine<T, P, INJ, IGN>>>>;

/// Used to initialize the global static [`Engine`] for use with
/// `critical_section`.
///
/// # Returns
/// * An empty slot, filled later by [`global_engine_setup`]
///
/// # Example
/// ```rust,ignore
/// static ENGINE: GlobalEngine<Tim1Ch, PB0, 4, 4> = global_engine_init();
/// ```
pub const fn global_engine_init<
    T: HardwareTimer,
    P: OutputPin,
    const INJ: usize,
    const IGN: usize,
>() -> GlobalEngine<T, P, INJ, IGN> {
    Mutex::new(RefCell::new(None))
}

/// Installs a fully built engine in the global slot.
///
/// Any engine already installed is dropped. Call with the trigger and
/// compare interrupts either masked or not yet enabled.
pub fn global_engine_setup<T: HardwareTimer, P: OutputPin, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    engine: Engine<T, P, INJ, IGN>,
) {
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(engine));
    });
}

/// Takes the engine back out of the global slot.
///
/// Interrupts arriving afterwards find an empty slot and do nothing.
pub fn global_engine_release<T: HardwareTimer, P: OutputPin, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
) -> Option<Engine<T, P, INJ, IGN>> {
    critical_section::with(|cs| global.borrow(cs).borrow_mut().take())
}

/// Runs `f` on the engine with every interrupt masked.
///
/// This is how the main loop reads RPM and crank angle or arms channels
/// without racing the interrupts.
///
/// # Returns
/// * `f`'s result, or `None` if no engine is installed
///
/// # Example
/// ```rust,ignore
/// let rpm = global_engine_with(&ENGINE, |engine| engine.rpm(now));
/// ```
pub fn global_engine_with<T, P, R, F, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    f: F,
) -> Option<R>
where
    T: HardwareTimer,
    P: OutputPin,
    F: FnOnce(&mut Engine<T, P, INJ, IGN>) -> R,
{
    critical_section::with(|cs| global.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Primary trigger interrupt.
///
/// # Arguments
/// * The global static [`Engine`]
/// * The primary sensor input, read to qualify the edge
/// * The microsecond clock
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn EXTI0() {
///     global_primary_trigger(&ENGINE, &mut crank_pin, micros());
/// }
/// ```
pub fn global_primary_trigger<T, P, I, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    pin: &mut I,
    now: u32,
) where
    T: HardwareTimer,
    P: OutputPin,
    I: InputPin,
{
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            let _ = engine.on_primary_interrupt(pin, now);
        }
    });
}

/// Secondary trigger interrupt.
pub fn global_secondary_trigger<T, P, I, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    pin: &mut I,
    now: u32,
) where
    T: HardwareTimer,
    P: OutputPin,
    I: InputPin,
{
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.on_secondary_interrupt(pin, now);
        }
    });
}

/// Compare-match interrupt of fuel channel `channel`.
pub fn global_fuel_compare<T: HardwareTimer, P: OutputPin, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    channel: usize,
) {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.on_fuel_compare(channel);
        }
    });
}

/// Compare-match interrupt of ignition channel `channel`.
pub fn global_ignition_compare<T: HardwareTimer, P: OutputPin, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    channel: usize,
    now: u32,
) {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            engine.on_ignition_compare(channel, now);
        }
    });
}

/// Millisecond tick running the overdwell guard.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM7() {
///     global_dwell_tick(&ENGINE, micros());
/// }
/// ```
pub fn global_dwell_tick<T: HardwareTimer, P: OutputPin, const INJ: usize, const IGN: usize>(
    global: &'static GlobalEngine<T, P, INJ, IGN>,
    now: u32,
) {
    critical_section::with(|cs| {
        if let Some(engine) = global.borrow(cs).borrow_mut().as_mut() {
            let _ = engine.dwell_tick(now);
        }
    });
}
