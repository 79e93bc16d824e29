use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use std::str::FromStr;
use std::time::Duration;

use crate::utils::{built_info, parse_duration};
use crate::{
    GpioResult, GpioTestError, Level, Mode, ModeName, PwmSettings, RunConfig, DEFAULT_CYCLE,
    DEFAULT_DUTY, DEFAULT_FREQUENCY_HZ, DEFAULT_SLEEP,
};

/// Drive a GPIO pin high/low, or generate software PWM on it
#[derive(Parser, Debug)]
#[command(
    name = "gpiotest",
    author,
    version = built_info::PKG_VERSION,
    about,
    long_about = None,
    override_usage = "gpiotest {pin} [options]",
    disable_version_flag = true
)]
pub struct Args {
    /// GPIO pin number (BCM numbering)
    #[arg(value_name = "pin")]
    pub pin: Option<String>,

    /// Print the version and exit
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Set mode to 'out' or 'pwm'
    #[arg(short, long, default_value = "out")]
    pub mode: String,

    /// If set and -m out, will turn the pin on (high)
    #[arg(short = 'H', long)]
    pub high: bool,

    /// If set and -m out, will turn the pin off (low)
    #[arg(short = 'L', long)]
    pub low: bool,

    /// Time between duty steps in auto mode [default: 500ms]
    #[arg(long, value_name = "duration", value_parser = parse_duration)]
    pub sleep: Option<Duration>,

    /// If set, pwm will increment every --sleep duration, if not, user interaction is required
    #[arg(short, long)]
    pub auto: bool,

    /// PWM frequency in Hz [default: 2000]
    #[arg(long, value_name = "uint32")]
    pub rf: Option<u32>,

    /// Initial duty [default: 50]
    #[arg(long, value_name = "uint32")]
    pub duty: Option<u32>,

    /// Cycle (duty resolution) [default: 100]
    #[arg(long, value_name = "uint32")]
    pub cycle: Option<u32>,

    /// Fail on the first hardware call that returns an error
    #[arg(long)]
    pub strict: bool,

    /// Log hardware calls instead of performing them
    #[arg(long)]
    pub dry_run: bool,
}

/// Answers whether the process may touch the GPIO registers.
pub trait PrivilegeCheck {
    fn is_root(&self) -> bool;
}

/// Checks the effective user of this process.
pub struct EffectiveUser;

impl PrivilegeCheck for EffectiveUser {
    fn is_root(&self) -> bool {
        nix::unistd::Uid::effective().is_root()
    }
}

/// Full usage text, as printed for `--help`.
pub fn usage() -> String {
    Args::command().render_help().to_string()
}

/// Exit status for a command line clap refused to parse: 0 when it only
/// asked for help or the version, 1 for anything else.
pub fn parse_error_exit_code(error: &clap::Error) -> u8 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn parse_pin(pin: &str) -> GpioResult<u8> {
    let value = match pin.parse::<i64>() {
        Ok(value) => value,
        Err(_) => {
            return Err(GpioTestError::Usage(format!(
                "fatal: pin was not an integer, was: {}",
                pin
            )))
        }
    };

    u8::try_from(value)
        .map_err(|_| GpioTestError::Usage(format!("fatal: pin out of range, was: {}", pin)))
}

impl Args {
    /// Checks everything that can be checked without touching hardware and
    /// produces the [RunConfig].  Checks run in a fixed order: pin present,
    /// privilege, pin value, mode, then mode-specific flags.
    pub fn validate(&self, privilege: &dyn PrivilegeCheck) -> GpioResult<RunConfig> {
        let pin = match &self.pin {
            Some(pin) => pin,
            None => return Err(GpioTestError::MissingPin),
        };

        if self.dry_run {
            log::warn!(target: "cli", "Dry run, no hardware will be touched.");
        } else if !privilege.is_root() {
            return Err(GpioTestError::Privilege);
        }

        let pin = parse_pin(pin)?;

        let mode = ModeName::from_str(&self.mode).map_err(|_| {
            GpioTestError::Usage(format!(
                "Invalid pin mode '{}', only 'pwm' or 'out' are valid.",
                self.mode
            ))
        })?;

        let mode = match mode {
            ModeName::Out => Mode::Out(self.level()?),
            ModeName::Pwm => Mode::Pwm(self.pwm_settings()?),
        };

        let run_config = RunConfig {
            pin,
            mode,
            strict: self.strict,
            dry_run: self.dry_run,
        };
        log::debug!(target: "cli", "{:?}", run_config);

        Ok(run_config)
    }

    fn level(&self) -> GpioResult<Level> {
        match (self.high, self.low) {
            (true, false) => Ok(Level::High),
            (false, true) => Ok(Level::Low),
            _ => Err(GpioTestError::Usage(
                "You must specify only --high or --low with -m out".to_owned(),
            )),
        }
    }

    fn pwm_settings(&self) -> GpioResult<PwmSettings> {
        PwmSettings::new(
            self.rf.unwrap_or(DEFAULT_FREQUENCY_HZ),
            self.duty.unwrap_or(DEFAULT_DUTY),
            self.cycle.unwrap_or(DEFAULT_CYCLE),
            self.sleep.unwrap_or(DEFAULT_SLEEP),
            self.auto,
        )
    }
}
