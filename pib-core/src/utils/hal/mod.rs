//! Hardware seams consumed by the controllers.
//!
//! Digital pins come straight from `embedded-hal`: an owned `OutputPin` or
//! `InputPin` *is* the configured pin direction. The board HAL is brought up
//! once by the caller and the resulting pins, PWM outputs and clock are handed
//! to each component.

pub mod pca9685;

use embassy_time::Instant;
use embedded_hal::pwm::SetDutyCycle;

pub use pca9685::{configure_pca9685, prescale_for, Pca9685Output};

/// Monotonic time source used to timestamp echo edges.
pub trait Clock {
    /// Current monotonic time.
    fn now(&self) -> Instant;
}

/// `Clock` backed by the embassy time driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A single PWM output bound to one physical pin.
///
/// Duty values are percentages of the period, `0.0..=100.0`.
pub trait PwmOutput {
    type Error: core::fmt::Debug;

    /// Enable the output at `frequency_hz` with an initial duty.
    fn start(
        &mut self,
        frequency_hz: u32,
        duty_percent: f32,
    ) -> Result<(), Self::Error>;

    /// Change the duty of a running output.
    fn set_duty(
        &mut self,
        duty_percent: f32,
    ) -> Result<(), Self::Error>;

    /// Disable the output (line held low).
    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// Resolution used when handing a percentage to `SetDutyCycle`.
const DUTY_BASIS_POINTS: u16 = 10_000;

/// Adapter from any `embedded_hal::pwm::SetDutyCycle` pin to [`PwmOutput`].
///
/// The period of an embedded-hal PWM pin is fixed when the HAL configures the
/// slice, so `start` only records the requested frequency.
pub struct DutyCycleOutput<P> {
    pwm: P,
    frequency_hz: Option<u32>,
}

impl<P: SetDutyCycle> DutyCycleOutput<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            frequency_hz: None,
        }
    }

    /// Frequency requested by the last `start`, if any.
    pub fn frequency_hz(&self) -> Option<u32> {
        self.frequency_hz
    }

    pub fn inner(&self) -> &P {
        &self.pwm
    }
}

impl<P: SetDutyCycle> PwmOutput for DutyCycleOutput<P> {
    type Error = P::Error;

    fn start(
        &mut self,
        frequency_hz: u32,
        duty_percent: f32,
    ) -> Result<(), Self::Error> {
        tracing::info!(frequency_hz, duty_percent, "PWM output started");
        self.frequency_hz = Some(frequency_hz);
        self.set_duty(duty_percent)
    }

    fn set_duty(
        &mut self,
        duty_percent: f32,
    ) -> Result<(), Self::Error> {
        let bp = (duty_percent.clamp(0.0, 100.0) * 100.0 + 0.5) as u16;
        self.pwm.set_duty_cycle_fraction(bp, DUTY_BASIS_POINTS)
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.frequency_hz = None;
        self.pwm.set_duty_cycle_fully_off()
    }
}
