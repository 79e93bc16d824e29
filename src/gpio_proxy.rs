use crate::{GpioProxy, GpioResult, GpioTestError};
use rppal::gpio::{Gpio, OutputPin};

/// [GpioProxy] backed by `rppal`'s memory-mapped GPIO access.
///
/// PWM is generated in software.  The frequency handed to
/// [GpioProxy::set_frequency] is a clock frequency: the waveform runs at
/// `clock / cycle` Hz with a duty ratio of `duty / cycle`.
pub struct RppalGpioProxy {
    gpio: Option<Gpio>,
    pin: Option<OutputPin>,
    clock_hz: u32,
    duty: u32,
    cycle: u32,
    pwm_enabled: bool,
    running: bool,
}

fn driver_error(operation: &'static str) -> impl Fn(rppal::gpio::Error) -> GpioTestError {
    move |error| GpioTestError::Hardware {
        operation,
        message: error.to_string(),
    }
}

impl GpioProxy for RppalGpioProxy {
    fn set_output(&mut self, pin: u8) -> GpioResult<()> {
        let gpio = match &self.gpio {
            Some(gpio) => gpio,
            None => {
                return Err(GpioTestError::Hardware {
                    operation: "set_output",
                    message: "GPIO session already closed".to_owned(),
                })
            }
        };

        let mut output = gpio
            .get(pin)
            .map_err(driver_error("set_output"))?
            .into_output();
        // Leave the pin as configured once we exit
        output.set_reset_on_drop(false);

        log::info!(target: "gpio", "Pin {} set to output", pin);
        self.pin = Some(output);
        Ok(())
    }

    fn set_high(&mut self) -> GpioResult<()> {
        self.pin_mut("set_high")?.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> GpioResult<()> {
        self.pin_mut("set_low")?.set_low();
        Ok(())
    }

    fn enable_pwm(&mut self) -> GpioResult<()> {
        self.pin_mut("enable_pwm")?;
        self.pwm_enabled = true;
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: u32, cycle: u32) -> GpioResult<()> {
        self.duty = duty;
        self.cycle = cycle;

        if self.running {
            self.apply_pwm("set_duty_cycle")
        } else {
            Ok(())
        }
    }

    fn set_frequency(&mut self, frequency_hz: u32) -> GpioResult<()> {
        self.clock_hz = frequency_hz;

        if self.running {
            self.apply_pwm("set_frequency")
        } else {
            Ok(())
        }
    }

    fn start_pwm(&mut self) -> GpioResult<()> {
        if !self.pwm_enabled {
            return Err(GpioTestError::Hardware {
                operation: "start_pwm",
                message: "PWM mode has not been enabled".to_owned(),
            });
        }

        self.apply_pwm("start_pwm")?;
        self.running = true;
        Ok(())
    }

    fn stop_pwm(&mut self) -> GpioResult<()> {
        if !self.running {
            return Ok(());
        }

        self.running = false;
        self.pin_mut("stop_pwm")?
            .clear_pwm()
            .map_err(driver_error("stop_pwm"))
    }

    fn close(&mut self) -> GpioResult<()> {
        let stopped = self.stop_pwm();

        self.pin = None;
        self.gpio = None;
        self.pwm_enabled = false;
        log::info!(target: "gpio", "GPIO session closed");

        stopped
    }
}

impl RppalGpioProxy {
    /// Maps the GPIO registers.  Fails when the peripheral is unavailable or
    /// the process lacks permission.
    pub fn open() -> GpioResult<Box<dyn GpioProxy>> {
        let gpio = Gpio::new().map_err(|error| GpioTestError::Open(error.to_string()))?;

        return Ok(Box::new(RppalGpioProxy {
            gpio: Some(gpio),
            pin: None,
            clock_hz: 0,
            duty: 0,
            cycle: 0,
            pwm_enabled: false,
            running: false,
        }));
    }

    fn pin_mut(&mut self, operation: &'static str) -> GpioResult<&mut OutputPin> {
        self.pin.as_mut().ok_or(GpioTestError::NoPin(operation))
    }

    fn apply_pwm(&mut self, operation: &'static str) -> GpioResult<()> {
        if self.cycle == 0 {
            return Err(GpioTestError::Hardware {
                operation,
                message: "cycle must be greater than 0".to_owned(),
            });
        }

        let frequency_hz = self.clock_hz as f64 / self.cycle as f64;
        let duty_cycle = (self.duty as f64 / self.cycle as f64).clamp(0.0, 1.0);

        log::debug!(
            target: "gpio",
            "Software PWM at {:0.3}Hz, duty cycle {:0.4}",
            frequency_hz,
            duty_cycle
        );

        self.pin_mut(operation)?
            .set_pwm_frequency(frequency_hz, duty_cycle)
            .map_err(driver_error(operation))
    }
}

/// [GpioProxy] which touches no hardware and only logs what it would have
/// done.  Used for `--dry-run`.
#[derive(Debug, Default)]
pub struct NullGpioProxy {
    pin: Option<u8>,
}

impl NullGpioProxy {
    pub fn new() -> Box<dyn GpioProxy> {
        Box::new(NullGpioProxy::default())
    }

    fn pin(&self, operation: &'static str) -> GpioResult<u8> {
        self.pin.ok_or(GpioTestError::NoPin(operation))
    }
}

impl GpioProxy for NullGpioProxy {
    fn set_output(&mut self, pin: u8) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] pin {} set to output", pin);
        self.pin = Some(pin);
        Ok(())
    }

    fn set_high(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] pin {} HIGH", self.pin("set_high")?);
        Ok(())
    }

    fn set_low(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] pin {} LOW", self.pin("set_low")?);
        Ok(())
    }

    fn enable_pwm(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] pin {} PWM mode", self.pin("enable_pwm")?);
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty: u32, cycle: u32) -> GpioResult<()> {
        let pin = self.pin("set_duty_cycle")?;
        log::info!(target: "gpio", "[dry-run] pin {} duty cycle {} / {}", pin, duty, cycle);
        Ok(())
    }

    fn set_frequency(&mut self, frequency_hz: u32) -> GpioResult<()> {
        let pin = self.pin("set_frequency")?;
        log::info!(target: "gpio", "[dry-run] pin {} frequency {}Hz", pin, frequency_hz);
        Ok(())
    }

    fn start_pwm(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] start PWM");
        Ok(())
    }

    fn stop_pwm(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] stop PWM");
        Ok(())
    }

    fn close(&mut self) -> GpioResult<()> {
        log::info!(target: "gpio", "[dry-run] close");
        self.pin = None;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{GpioProxy, GpioResult, GpioTestError};
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) type Calls = Rc<RefCell<Vec<String>>>;

    /// Records every call; optionally fails one operation.
    pub(crate) struct RecordingGpioProxy {
        calls: Calls,
        fail_on: Option<&'static str>,
    }

    impl RecordingGpioProxy {
        pub(crate) fn new() -> (Box<dyn GpioProxy>, Calls) {
            RecordingGpioProxy::failing(None)
        }

        pub(crate) fn failing(fail_on: Option<&'static str>) -> (Box<dyn GpioProxy>, Calls) {
            let calls: Calls = Default::default();
            let proxy = RecordingGpioProxy {
                calls: calls.clone(),
                fail_on,
            };
            (Box::new(proxy), calls)
        }

        fn record(&mut self, operation: &'static str, call: String) -> GpioResult<()> {
            self.calls.borrow_mut().push(call);

            if self.fail_on == Some(operation) {
                return Err(GpioTestError::Hardware {
                    operation,
                    message: "injected failure".to_owned(),
                });
            }
            Ok(())
        }
    }

    impl GpioProxy for RecordingGpioProxy {
        fn set_output(&mut self, pin: u8) -> GpioResult<()> {
            self.record("set_output", format!("set_output({})", pin))
        }

        fn set_high(&mut self) -> GpioResult<()> {
            self.record("set_high", "set_high".to_owned())
        }

        fn set_low(&mut self) -> GpioResult<()> {
            self.record("set_low", "set_low".to_owned())
        }

        fn enable_pwm(&mut self) -> GpioResult<()> {
            self.record("enable_pwm", "enable_pwm".to_owned())
        }

        fn set_duty_cycle(&mut self, duty: u32, cycle: u32) -> GpioResult<()> {
            self.record(
                "set_duty_cycle",
                format!("set_duty_cycle({}, {})", duty, cycle),
            )
        }

        fn set_frequency(&mut self, frequency_hz: u32) -> GpioResult<()> {
            self.record("set_frequency", format!("set_frequency({})", frequency_hz))
        }

        fn start_pwm(&mut self) -> GpioResult<()> {
            self.record("start_pwm", "start_pwm".to_owned())
        }

        fn stop_pwm(&mut self) -> GpioResult<()> {
            self.record("stop_pwm", "stop_pwm".to_owned())
        }

        fn close(&mut self) -> GpioResult<()> {
            self.record("close", "close".to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NullGpioProxy;
    use crate::{GpioProxy, GpioTestError};

    #[test]
    fn null_proxy_requires_output_pin() {
        let mut proxy = NullGpioProxy::new();

        match proxy.set_high() {
            Err(GpioTestError::NoPin(operation)) => assert_eq!(operation, "set_high"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn null_proxy_accepts_pwm_sequence() {
        let mut proxy = NullGpioProxy::new();

        proxy.set_output(18).unwrap();
        proxy.enable_pwm().unwrap();
        proxy.set_duty_cycle(50, 100).unwrap();
        proxy.set_frequency(200_000).unwrap();
        proxy.start_pwm().unwrap();
        proxy.stop_pwm().unwrap();
        proxy.close().unwrap();

        assert!(proxy.set_low().is_err());
    }
}
