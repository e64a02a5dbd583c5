//! PCA9685 backend for [`PwmOutput`].
//!
//! One chip drives up to 16 servo channels over I2C. The chip is shared by
//! reference so each drive side can own its own `Pca9685Output`.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use pwm_pca9685::{Channel, Error as PwmError, Pca9685};

use super::PwmOutput;

/// Internal oscillator frequency of the PCA9685.
const OSC_CLOCK_HZ: u32 = 25_000_000;
/// Counter steps per PWM period.
const STEPS: u32 = 4096;
/// Largest off-count accepted by the chip.
const MAX_COUNT: u16 = 4095;

/// Prescale register value for the wanted output frequency.
///
/// `round(25 MHz / (4096 * f)) - 1`, clamped to the chip's `3..=255`.
pub fn prescale_for(frequency_hz: u32) -> u8 {
    if frequency_hz == 0 {
        return u8::MAX;
    }
    let step = u64::from(STEPS) * u64::from(frequency_hz);
    let rounded = (u64::from(OSC_CLOCK_HZ) + step / 2) / step;
    rounded.saturating_sub(1).clamp(3, 255) as u8
}

/// One-time chip bring-up: wake the oscillator and set the shared PWM frequency.
pub fn configure_pca9685<I2C, E>(
    pca: &mut Pca9685<I2C>,
    frequency_hz: u32,
) -> Result<(), PwmError<E>>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pca.enable()?;
    tracing::info!("PWM enabled");
    let prescale = prescale_for(frequency_hz);
    pca.set_prescale(prescale)?;
    tracing::info!(frequency_hz, prescale, "PWM prescale set");
    Ok(())
}

/// A single PCA9685 channel used as a servo output.
pub struct Pca9685Output<'a, I2C> {
    pca: &'a RefCell<Pca9685<I2C>>,
    channel: Channel,
    frequency_hz: u32,
}

impl<'a, I2C, E> Pca9685Output<'a, I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(
        pca: &'a RefCell<Pca9685<I2C>>,
        channel: Channel,
    ) -> Self {
        Self {
            pca,
            channel,
            frequency_hz: 0,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Convert a duty percentage to the chip's 12-bit off-count.
    pub fn off_count(duty_percent: f32) -> u16 {
        let count = duty_percent.clamp(0.0, 100.0) / 100.0 * STEPS as f32 + 0.5;
        (count as u16).min(MAX_COUNT)
    }

    fn write_count(
        &mut self,
        off: u16,
    ) -> Result<(), PwmError<E>> {
        self.pca
            .borrow_mut()
            .set_channel_on_off(self.channel, 0, off)
    }
}

impl<I2C, E> PwmOutput for Pca9685Output<'_, I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = PwmError<E>;

    fn start(
        &mut self,
        frequency_hz: u32,
        duty_percent: f32,
    ) -> Result<(), Self::Error> {
        // The prescale is chip-wide; configure_pca9685 owns it.
        if self.frequency_hz != 0 && self.frequency_hz != frequency_hz {
            tracing::warn!(
                requested = frequency_hz,
                current = self.frequency_hz,
                "PCA9685 channels share one frequency"
            );
        }
        self.frequency_hz = frequency_hz;
        self.write_count(Self::off_count(duty_percent))
    }

    fn set_duty(
        &mut self,
        duty_percent: f32,
    ) -> Result<(), Self::Error> {
        self.write_count(Self::off_count(duty_percent))
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.write_count(0)
    }
}
