//! ESC driven from one PWM channel
//!
//! The ESC expects a 50 Hz servo pulse. The core expresses duties in
//! [`ESC_DUTY_RESOLUTION`] counts per period; this driver rescales them to
//! whatever resolution the PWM channel reports, so the channel's period
//! must already be set to 20 ms.
//!
//! ```ignore
//! let esc = PwmEsc::new(pwm_output);
//! let mut motion = MotionController::new(config.hardware, esc);
//! ```

use embedded_hal::pwm::SetDutyCycle;
use trolley_core::traits::{EscError, EscOutput, ESC_DUTY_RESOLUTION};

/// ESC on a PWM output
pub struct PwmEsc<P> {
    pwm: P,
    /// Last duty written, in core counts
    duty: u16,
}

impl<P: SetDutyCycle> PwmEsc<P> {
    pub fn new(pwm: P) -> Self {
        Self { pwm, duty: 0 }
    }

    /// Last duty successfully written, in core counts
    pub fn duty(&self) -> u16 {
        self.duty
    }

    /// Convert core counts to the channel's counts
    fn scale(&self, duty: u16) -> u16 {
        let max = self.pwm.max_duty_cycle() as u32;
        ((duty as u32 * max) / ESC_DUTY_RESOLUTION as u32) as u16
    }

    pub fn release(self) -> P {
        self.pwm
    }
}

impl<P: SetDutyCycle> EscOutput for PwmEsc<P> {
    fn set_duty(&mut self, duty: u16) -> Result<(), EscError> {
        if duty > ESC_DUTY_RESOLUTION {
            return Err(EscError::OutOfRange);
        }
        let scaled = self.scale(duty);
        self.pwm
            .set_duty_cycle(scaled)
            .map_err(|_| EscError::Output)?;
        self.duty = duty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::pwm::{ErrorKind, ErrorType};

    #[derive(Debug)]
    struct MockError;

    impl embedded_hal::pwm::Error for MockError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    struct MockPwm {
        max: u16,
        duty: u16,
        fail: bool,
    }

    impl ErrorType for MockPwm {
        type Error = MockError;
    }

    impl SetDutyCycle for MockPwm {
        fn max_duty_cycle(&self) -> u16 {
            self.max
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
            if self.fail {
                return Err(MockError);
            }
            self.duty = duty;
            Ok(())
        }
    }

    fn pwm(max: u16) -> MockPwm {
        MockPwm {
            max,
            duty: 0,
            fail: false,
        }
    }

    #[test]
    fn test_same_resolution_passes_through() {
        let mut esc = PwmEsc::new(pwm(ESC_DUTY_RESOLUTION));
        esc.set_duty(1229).unwrap();
        assert_eq!(esc.duty(), 1229);
        assert_eq!(esc.release().duty, 1229);
    }

    #[test]
    fn test_rescales_to_channel() {
        // RP2040 at 125 MHz, divider 40: 62 500 counts per 20 ms
        let mut esc = PwmEsc::new(pwm(62_500));
        esc.set_duty(ESC_DUTY_RESOLUTION / 2).unwrap();
        assert_eq!(esc.release().duty, 31_250);

        // Neutral pulse (1.5 ms) lands on 7.5 % of the period
        let mut esc = PwmEsc::new(pwm(62_500));
        esc.set_duty(1229).unwrap();
        let duty = esc.release().duty;
        assert!((4680..=4700).contains(&duty), "duty {}", duty);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut esc = PwmEsc::new(pwm(1000));
        assert_eq!(
            esc.set_duty(ESC_DUTY_RESOLUTION + 1),
            Err(EscError::OutOfRange)
        );
        assert_eq!(esc.duty(), 0);
    }

    #[test]
    fn test_output_error_mapped() {
        let mut mock = pwm(1000);
        mock.fail = true;
        let mut esc = PwmEsc::new(mock);
        assert_eq!(esc.set_duty(819), Err(EscError::Output));
        assert_eq!(esc.duty(), 0);
    }
}
