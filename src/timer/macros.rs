/// Declares a static global `ENGINE` instance protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton `ENGINE` suitable for use in
/// interrupt-based environments, where the main loop and every trigger,
/// compare and tick ISR need to safely share the engine state.
///
/// # Arguments
/// - `$timer`: The concrete compare-match timer type (must implement `HardwareTimer`)
/// - `$pin`: The concrete injector/coil pin type (must implement `OutputPin`)
/// - `$inj`: Number of fuel channels
/// - `$ign`: Number of ignition channels
///
/// # Example
/// ```rust,ignore
/// init_engine!(Tim1Channel, OutputPin, 4, 4);
/// ```
#[macro_export]
macro_rules! init_engine {
    ( $timer:ty, $pin:ty, $inj:expr, $ign:expr ) => {
        pub static ENGINE: $crate::critical_section::Mutex<
            ::core::cell::RefCell<Option<$crate::engine::Engine<$timer, $pin, { $inj }, { $ign }>>>,
        > = $crate::critical_section::Mutex::new(::core::cell::RefCell::new(None));
    };
}

/// Installs a built engine in the global `ENGINE` declared by `init_engine!`.
///
/// # Arguments
/// - `$engine`: An [`Engine`](crate::engine::Engine) value
///
/// # Example
/// ```rust,ignore
/// let engine = Engine::new(trigger, dwell, scheduler)?;
/// setup_engine!(engine);
/// ```
///
/// # Notes
/// - Must be called before the trigger interrupts are enabled.
#[macro_export]
macro_rules! setup_engine {
    ( $engine:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = ENGINE.borrow(cs).replace(Some($engine));
        });
    };
}

/// Feeds a primary trigger interrupt to the global `ENGINE`.
///
/// # Arguments
/// - `$pin`: Mutable reference to the primary sensor input
/// - `$now`: The microsecond clock
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn EXTI0() {
///     primary_trigger!(&mut crank_pin, micros());
/// }
/// ```
#[macro_export]
macro_rules! primary_trigger {
    ( $pin:expr, $now:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(engine) = ENGINE.borrow(cs).borrow_mut().as_mut() {
                let _ = engine.on_primary_interrupt($pin, $now);
            }
        });
    };
}

/// Feeds a secondary trigger interrupt to the global `ENGINE`.
#[macro_export]
macro_rules! secondary_trigger {
    ( $pin:expr, $now:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(engine) = ENGINE.borrow(cs).borrow_mut().as_mut() {
                engine.on_secondary_interrupt($pin, $now);
            }
        });
    };
}

/// Runs the compare-match handler of a fuel channel on the global `ENGINE`.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM3() {
///     fuel_compare_match!(0);
/// }
/// ```
#[macro_export]
macro_rules! fuel_compare_match {
    ( $channel:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(engine) = ENGINE.borrow(cs).borrow_mut().as_mut() {
                engine.on_fuel_compare($channel);
            }
        });
    };
}

/// Runs the compare-match handler of an ignition channel on the global `ENGINE`.
#[macro_export]
macro_rules! ignition_compare_match {
    ( $channel:expr, $now:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(engine) = ENGINE.borrow(cs).borrow_mut().as_mut() {
                engine.on_ignition_compare($channel, $now);
            }
        });
    };
}

/// Runs the overdwell guard on the global `ENGINE`.
///
/// Intended for a 1 ms timer interrupt.
///
/// # Notes
/// - Safe to call before `setup_engine!`, it silently does nothing.
#[macro_export]
macro_rules! dwell_tick {
    ( $now:expr ) => {
        $crate::critical_section::with(|cs| {
            if let Some(engine) = ENGINE.borrow(cs).borrow_mut().as_mut() {
                let _ = engine.dwell_tick($now);
            }
        });
    };
}
