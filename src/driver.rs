use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::gpio::GpioSession;
use crate::utils::format_duration;
use crate::{
    DutyCounter, GpioProxy, GpioResult, GpioTestError, Level, Mode, PwmSettings, RunConfig,
};

/// What ends a wait in the PWM loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Advance the duty cycle.
    Step,
    /// SIGINT received.
    Interrupt,
    /// Standard input reached end of file.
    InputClosed,
}

impl DutyCounter {
    pub fn new(duty: u32, cycle: u32) -> DutyCounter {
        DutyCounter { duty, cycle }
    }

    pub fn duty(&self) -> u32 {
        self.duty
    }

    /// Advances by one, wrapping to 0 once `cycle` is exceeded.
    pub fn step(&mut self) -> u32 {
        self.duty = match self.duty.checked_add(1) {
            Some(duty) if duty <= self.cycle => duty,
            _ => 0,
        };
        self.duty
    }
}

impl PwmSettings {
    /// Validates PWM parameters: `cycle` must be non-zero, `duty` may not
    /// exceed it, and `frequency_hz * cycle` must fit the clock frequency.
    pub fn new(
        frequency_hz: u32,
        duty: u32,
        cycle: u32,
        sleep: Duration,
        auto: bool,
    ) -> GpioResult<PwmSettings> {
        if cycle == 0 {
            return Err(GpioTestError::Usage(
                "fatal: --cycle must be greater than 0".to_owned(),
            ));
        }
        if duty > cycle {
            return Err(GpioTestError::Usage(format!(
                "fatal: --duty ({}) must not exceed --cycle ({})",
                duty, cycle
            )));
        }
        if frequency_hz.checked_mul(cycle).is_none() {
            return Err(GpioTestError::Usage(format!(
                "fatal: --rf ({}) x --cycle ({}) overflows the clock frequency",
                frequency_hz, cycle
            )));
        }

        Ok(PwmSettings {
            frequency_hz,
            duty,
            cycle,
            sleep,
            auto,
        })
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn duty(&self) -> u32 {
        self.duty
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    pub fn auto(&self) -> bool {
        self.auto
    }

    /// The clock frequency handed to the hardware: the requested frequency
    /// times the cycle resolution.
    pub fn effective_frequency_hz(&self) -> u32 {
        self.frequency_hz.saturating_mul(self.cycle)
    }

    fn next_event(&self, steps: &Receiver<StepEvent>) -> StepEvent {
        if self.auto {
            match steps.recv_timeout(self.sleep) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => StepEvent::Step,
                Err(RecvTimeoutError::Disconnected) => StepEvent::Interrupt,
            }
        } else {
            steps.recv().unwrap_or(StepEvent::Interrupt)
        }
    }
}

/// Drives `pin` to `level` and releases the session.
pub fn drive_level(
    session: &mut GpioSession,
    pin: u8,
    level: Level,
    out: &mut dyn Write,
) -> GpioResult<()> {
    session.set_output(pin)?;
    match level {
        Level::High => session.set_high()?,
        Level::Low => session.set_low()?,
    }
    writeln!(out, "Set pin {} {}.", pin, level)?;

    session.release()
}

/// Starts PWM on `pin` and steps the duty cycle on every [StepEvent::Step]
/// until interrupted or input closes.  Stops PWM, releases the session and
/// returns the last duty applied.
pub fn run_pwm(
    session: &mut GpioSession,
    pin: u8,
    settings: &PwmSettings,
    steps: &Receiver<StepEvent>,
    out: &mut dyn Write,
) -> GpioResult<u32> {
    let effective_hz = settings.effective_frequency_hz();

    session.set_output(pin)?;
    session.enable_pwm()?;
    session.set_duty_cycle(settings.duty, settings.cycle)?;
    session.set_frequency(effective_hz)?;
    session.start_pwm()?;
    writeln!(
        out,
        "Set pin {} to {} Hz ({} actual) with a Duty Cycle of {} / {}.",
        pin, settings.frequency_hz, effective_hz, settings.duty, settings.cycle
    )?;

    let mut counter = DutyCounter::new(settings.duty, settings.cycle);
    loop {
        if settings.auto {
            writeln!(out, "Waiting {}...", format_duration(settings.sleep))?;
        } else {
            writeln!(out, "Press enter to continue...")?;
        }

        match settings.next_event(steps) {
            StepEvent::Step => {}
            StepEvent::Interrupt => {
                log::info!(target: "pwm", "Interrupted, stopping PWM on pin {}", pin);
                break;
            }
            StepEvent::InputClosed => {
                log::info!(target: "pwm", "Input closed, stopping PWM on pin {}", pin);
                break;
            }
        }

        let duty = counter.step();
        session.set_duty_cycle(duty, settings.cycle)?;
        writeln!(out, "Duty set to {} / {}", duty, settings.cycle)?;
    }

    session.stop_pwm()?;
    session.release()?;

    Ok(counter.duty())
}

/// Installs the SIGINT handler and, unless stepping automatically, a thread
/// turning each line of standard input into a [StepEvent::Step].
pub fn step_source(auto: bool) -> GpioResult<Receiver<StepEvent>> {
    let (tx, rx) = mpsc::channel();

    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(StepEvent::Interrupt);
    })
    .map_err(|error| GpioTestError::Signal(error.to_string()))?;

    if !auto {
        thread::spawn(move || forward_lines(io::stdin().lock(), tx));
    }

    Ok(rx)
}

/// Sends a step per newline-terminated line, whatever its bytes, and
/// [StepEvent::InputClosed] at end of file or on a read error.
fn forward_lines<R: BufRead>(input: R, tx: Sender<StepEvent>) {
    for line in input.split(b'\n') {
        match line {
            Ok(_) => {
                if tx.send(StepEvent::Step).is_err() {
                    return;
                }
            }
            Err(error) => {
                log::warn!(target: "pwm", "Reading standard input failed: {}", error);
                break;
            }
        }
    }
    let _ = tx.send(StepEvent::InputClosed);
}

/// Runs the configured mode against an opened proxy, writing status lines to
/// `out`.
pub fn run(config: &RunConfig, proxy: Box<dyn GpioProxy>, out: &mut dyn Write) -> GpioResult<()> {
    let mut session = GpioSession::new(proxy, config.strict);

    match &config.mode {
        Mode::Out(level) => drive_level(&mut session, config.pin, *level, out),
        Mode::Pwm(settings) => {
            let steps = step_source(settings.auto)?;
            run_pwm(&mut session, config.pin, settings, &steps, out).map(|_| ())
        }
    }
}
