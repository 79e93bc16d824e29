use std::io;
use std::time::Duration;
use strum::{Display, EnumString};

pub mod cli;
pub mod driver;
pub mod gpio;
mod gpio_proxy;
pub mod utils;

pub use gpio_proxy::{NullGpioProxy, RppalGpioProxy};

pub const DEFAULT_SLEEP: Duration = Duration::from_millis(500);
pub const DEFAULT_FREQUENCY_HZ: u32 = 2000;
pub const DEFAULT_DUTY: u32 = 50;
pub const DEFAULT_CYCLE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ModeName {
    Out,
    Pwm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Level {
    High,
    Low,
}

/// PWM parameters, validated on construction (see [PwmSettings::new]).
#[derive(Debug, Clone, PartialEq)]
pub struct PwmSettings {
    frequency_hz: u32,
    duty: u32,
    cycle: u32,
    sleep: Duration,
    auto: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Out(Level),
    Pwm(PwmSettings),
}

/// Immutable snapshot of everything parsed from the command line, created
/// once before any hardware is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub pin: u8,
    pub mode: Mode,
    pub strict: bool,
    pub dry_run: bool,
}

/// Duty numerator bounded to `[0, cycle]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCounter {
    duty: u32,
    cycle: u32,
}

pub enum GpioTestError {
    MissingPin,
    Usage(String),
    Privilege,
    Open(String),
    Signal(String),
    NoPin(&'static str),
    Hardware {
        operation: &'static str,
        message: String,
    },
    Io(io::Error),
}

pub type GpioResult<T> = Result<T, GpioTestError>;

/// The operations the GPIO library has to provide.  Everything that touches
/// registers lives behind this trait.
pub trait GpioProxy {
    /// Claims `pin` and switches it to output mode.
    fn set_output(&mut self, pin: u8) -> GpioResult<()>;

    fn set_high(&mut self) -> GpioResult<()>;

    fn set_low(&mut self) -> GpioResult<()>;

    /// Puts the claimed pin into PWM mode.
    fn enable_pwm(&mut self) -> GpioResult<()>;

    /// Sets the duty cycle as `duty / cycle`.
    fn set_duty_cycle(&mut self, duty: u32, cycle: u32) -> GpioResult<()>;

    /// Sets the PWM clock frequency.
    fn set_frequency(&mut self, frequency_hz: u32) -> GpioResult<()>;

    fn start_pwm(&mut self) -> GpioResult<()>;

    fn stop_pwm(&mut self) -> GpioResult<()>;

    /// Releases the pin and the register mapping.
    fn close(&mut self) -> GpioResult<()>;
}
