use crate::{GpioProxy, GpioResult, GpioTestError};

/// An open GPIO session.  Holding one is the capability to touch the pin;
/// dropping it (or calling [GpioSession::release]) stops PWM and releases
/// the hardware exactly once.
pub struct GpioSession {
    inner: Box<dyn GpioProxy>,
    strict: bool,
    pwm_running: bool,
    released: bool,
}

impl GpioSession {
    /// Wraps an opened [GpioProxy].  When `strict` is false a failing
    /// hardware call is logged and otherwise ignored.
    pub fn new(inner: Box<dyn GpioProxy>, strict: bool) -> GpioSession {
        GpioSession {
            inner,
            strict,
            pwm_running: false,
            released: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_strict(&self) -> bool {
        return self.strict;
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        return self.released;
    }

    #[cfg(test)]
    pub(crate) fn is_pwm_running(&self) -> bool {
        return self.pwm_running;
    }

    pub fn set_output(&mut self, pin: u8) -> GpioResult<()> {
        self.ensure_open("set_output")?;
        log::debug!(target: "gpio", "Setting pin {} to output", pin);
        let result = self.inner.set_output(pin);
        self.check("set_output", result)
    }

    pub fn set_high(&mut self) -> GpioResult<()> {
        self.ensure_open("set_high")?;
        let result = self.inner.set_high();
        self.check("set_high", result)
    }

    pub fn set_low(&mut self) -> GpioResult<()> {
        self.ensure_open("set_low")?;
        let result = self.inner.set_low();
        self.check("set_low", result)
    }

    pub fn enable_pwm(&mut self) -> GpioResult<()> {
        self.ensure_open("enable_pwm")?;
        let result = self.inner.enable_pwm();
        self.check("enable_pwm", result)
    }

    pub fn set_duty_cycle(&mut self, duty: u32, cycle: u32) -> GpioResult<()> {
        self.ensure_open("set_duty_cycle")?;
        log::debug!(target: "gpio", "Setting duty cycle to {} / {}", duty, cycle);
        let result = self.inner.set_duty_cycle(duty, cycle);
        self.check("set_duty_cycle", result)
    }

    pub fn set_frequency(&mut self, frequency_hz: u32) -> GpioResult<()> {
        self.ensure_open("set_frequency")?;
        log::debug!(target: "gpio", "Setting frequency to {}Hz", frequency_hz);
        let result = self.inner.set_frequency(frequency_hz);
        self.check("set_frequency", result)
    }

    pub fn start_pwm(&mut self) -> GpioResult<()> {
        self.ensure_open("start_pwm")?;
        // Even a failed start gets a stop on release.
        self.pwm_running = true;
        let result = self.inner.start_pwm();
        self.check("start_pwm", result)
    }

    /// Stops PWM generation.  A no-op unless PWM was started.
    pub fn stop_pwm(&mut self) -> GpioResult<()> {
        if !self.pwm_running || self.released {
            return Ok(());
        }

        self.pwm_running = false;
        let result = self.inner.stop_pwm();
        self.check("stop_pwm", result)
    }

    /// Stops PWM if needed and closes the session.  Only the first call has
    /// any effect.
    pub fn release(&mut self) -> GpioResult<()> {
        if self.released {
            return Ok(());
        }

        let stopped = self.stop_pwm();
        self.released = true;

        log::info!(target: "gpio", "Releasing GPIO session");
        let result = self.inner.close();
        let closed = self.check("close", result);

        stopped.and(closed)
    }

    fn ensure_open(&self, operation: &'static str) -> GpioResult<()> {
        if self.released {
            return Err(GpioTestError::Hardware {
                operation,
                message: "GPIO session already released".to_owned(),
            });
        }
        Ok(())
    }

    fn check(&self, operation: &'static str, result: GpioResult<()>) -> GpioResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if self.strict => Err(error),
            Err(error) => {
                log::warn!(target: "gpio", "Ignoring failed {}: {}", operation, error);
                Ok(())
            }
        }
    }
}

impl Drop for GpioSession {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            log::error!(target: "gpio", "Unable to release GPIO session: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GpioSession;
    use crate::gpio_proxy::testing::RecordingGpioProxy;
    use crate::GpioTestError;

    #[test]
    fn release_once() {
        let (proxy, calls) = RecordingGpioProxy::new();
        let mut session = GpioSession::new(proxy, false);

        session.set_output(18).unwrap();
        session.enable_pwm().unwrap();
        session.start_pwm().unwrap();
        session.release().unwrap();
        session.release().unwrap();
        drop(session);

        assert_eq!(
            *calls.borrow(),
            vec!["set_output(18)", "enable_pwm", "start_pwm", "stop_pwm", "close"]
        );
    }

    #[test]
    fn drop_releases() {
        let (proxy, calls) = RecordingGpioProxy::new();
        {
            let mut session = GpioSession::new(proxy, false);
            session.set_output(4).unwrap();
            session.set_low().unwrap();
        }

        assert_eq!(*calls.borrow(), vec!["set_output(4)", "set_low", "close"]);
    }

    #[test]
    fn stop_without_start() {
        let (proxy, calls) = RecordingGpioProxy::new();
        let mut session = GpioSession::new(proxy, false);

        session.stop_pwm().unwrap();
        assert!(!session.is_pwm_running());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn lenient_ignores_failures() {
        let (proxy, calls) = RecordingGpioProxy::failing(Some("set_high"));
        let mut session = GpioSession::new(proxy, false);

        session.set_output(17).unwrap();
        session.set_high().unwrap();

        assert!(!session.is_strict());
        assert_eq!(*calls.borrow(), vec!["set_output(17)", "set_high"]);
    }

    #[test]
    fn strict_surfaces_failures() {
        let (proxy, _calls) = RecordingGpioProxy::failing(Some("set_high"));
        let mut session = GpioSession::new(proxy, true);

        session.set_output(17).unwrap();
        match session.set_high() {
            Err(GpioTestError::Hardware { operation, .. }) => assert_eq!(operation, "set_high"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn strict_release_still_closes() {
        let (proxy, calls) = RecordingGpioProxy::failing(Some("stop_pwm"));
        let mut session = GpioSession::new(proxy, true);

        session.set_output(18).unwrap();
        session.enable_pwm().unwrap();
        session.start_pwm().unwrap();

        assert!(session.release().is_err());
        assert!(session.is_released());
        assert_eq!(calls.borrow().last().unwrap(), "close");
    }

    #[test]
    fn released_session_refuses_calls() {
        let (proxy, calls) = RecordingGpioProxy::new();
        let mut session = GpioSession::new(proxy, false);

        session.release().unwrap();
        assert!(session.set_output(18).is_err());
        assert_eq!(*calls.borrow(), vec!["close"]);
    }
}
