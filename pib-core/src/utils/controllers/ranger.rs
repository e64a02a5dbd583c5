//! HC-SR04 style ultrasonic ranging.
//!
//! A measurement fires a trigger pulse, then busy-polls the echo line for the
//! rising and falling edges. Both waits are bounded by a deadline so a
//! disconnected sensor surfaces as [`SensorFault::EchoTimeout`] instead of
//! blocking forever.

use core::str::FromStr;

use embassy_time::{Duration, Instant};
use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorKind, InputPin, OutputPin},
};
use serde::{Deserialize, Serialize};

use crate::utils::hal::Clock;

/// Echo microseconds per centimeter of distance (round trip).
pub const MICROS_PER_CM: f32 = 58.0;
/// Echo microseconds per inch of distance (round trip).
pub const MICROS_PER_INCH: f32 = 148.0;
/// Reading reported by [`Ranger::measure_or_sentinel`] when the sensor faults.
///
/// Callers should treat it as "unknown, likely obstructed".
pub const UNKNOWN_DISTANCE: f32 = 100.0;

const DEFAULT_ECHO_TIMEOUT_MS: u64 = 60;
const DEFAULT_TRIGGER_PULSE_US: u32 = 10;
const DEFAULT_SETTLE_US: u32 = 2;

/// Unit a distance is reported in.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "in")]
    Inches,
}

impl DistanceUnit {
    /// Convert an echo pulse width into a distance in this unit.
    pub fn convert_pulse(
        self,
        pulse: Duration,
    ) -> f32 {
        let micros = pulse.as_micros() as f32;
        match self {
            DistanceUnit::Centimeters => micros / MICROS_PER_CM,
            DistanceUnit::Inches => micros / MICROS_PER_INCH,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = RangerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cm" | "centimeters" => Ok(DistanceUnit::Centimeters),
            "in" | "inches" => Ok(DistanceUnit::Inches),
            _ => Err(RangerError::InvalidArgument),
        }
    }
}

/// Which echo transition a poll was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    Rising,
    Falling,
}

/// Hardware-side failures while ranging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// Reading or driving a pin failed.
    Pin(ErrorKind),
    /// The echo line did not change level before the deadline.
    EchoTimeout(EchoEdge),
}

/// Errors returned by a distance measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangerError {
    /// Unrecognised distance unit.
    InvalidArgument,
    /// No ranger is attached to the controller.
    NotAttached,
    SensorFault(SensorFault),
}

impl From<SensorFault> for RangerError {
    fn from(fault: SensorFault) -> Self {
        RangerError::SensorFault(fault)
    }
}

fn pin_fault<E: embedded_hal::digital::Error>(e: E) -> RangerError {
    RangerError::SensorFault(SensorFault::Pin(e.kind()))
}

/// Timing parameters for a ranger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangerConfig {
    /// Bound on each echo wait (rising, then falling).
    pub echo_timeout: Duration,
    /// Width of the trigger pulse.
    pub trigger_pulse_us: u32,
    /// Low time on the trigger before the pulse.
    pub settle_us: u32,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            echo_timeout: Duration::from_millis(DEFAULT_ECHO_TIMEOUT_MS),
            trigger_pulse_us: DEFAULT_TRIGGER_PULSE_US,
            settle_us: DEFAULT_SETTLE_US,
        }
    }
}

/// Anything that can produce a single distance reading on demand.
pub trait RangeSensor {
    fn measure(
        &mut self,
        unit: DistanceUnit,
    ) -> Result<f32, RangerError>;
}

/// Ultrasonic ranger over an owned trigger/echo pin pair.
pub struct Ranger<Trig, Echo, C, D> {
    trigger: Trig,
    echo: Echo,
    clock: C,
    delay: D,
    config: RangerConfig,
}

impl<Trig, Echo, C, D> Ranger<Trig, Echo, C, D>
where
    Trig: OutputPin,
    Echo: InputPin,
    C: Clock,
    D: DelayNs,
{
    /// Bind a ranger to its pins. `config` falls back to [`RangerConfig::default`].
    pub fn new(
        trigger: Trig,
        echo: Echo,
        clock: C,
        delay: D,
        config: Option<RangerConfig>,
    ) -> Self {
        Ranger {
            trigger,
            echo,
            clock,
            delay,
            config: config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &RangerConfig {
        &self.config
    }

    /// Measure a distance using the configured echo timeout.
    pub fn measure(
        &mut self,
        unit: DistanceUnit,
    ) -> Result<f32, RangerError> {
        let timeout = self.config.echo_timeout;
        self.measure_within(unit, timeout)
    }

    /// Measure a distance, parsing the unit from its name (`"cm"`, `"in"`, ...).
    pub fn measure_named(
        &mut self,
        unit: &str,
    ) -> Result<f32, RangerError> {
        let unit = unit.parse::<DistanceUnit>()?;
        self.measure(unit)
    }

    /// Measure a distance with an explicit bound on each echo wait.
    pub fn measure_within(
        &mut self,
        unit: DistanceUnit,
        timeout: Duration,
    ) -> Result<f32, RangerError> {
        let pulse = self.echo_pulse(timeout)?;
        let distance = unit.convert_pulse(pulse);
        tracing::debug!(pulse_us = pulse.as_micros(), distance, ?unit, "Range read");
        Ok(distance)
    }

    /// Measure a distance, reporting [`UNKNOWN_DISTANCE`] if the sensor faults.
    pub fn measure_or_sentinel(
        &mut self,
        unit: DistanceUnit,
    ) -> f32 {
        match self.measure(unit) {
            Ok(distance) => distance,
            Err(e) => {
                tracing::warn!(?e, "Range read failed, reporting {}", UNKNOWN_DISTANCE);
                UNKNOWN_DISTANCE
            }
        }
    }

    /// Fire the trigger and time the echo pulse.
    fn echo_pulse(
        &mut self,
        timeout: Duration,
    ) -> Result<Duration, RangerError> {
        if let Err(e) = self.fire_trigger() {
            // Leave the trigger idle even if the pulse failed half way.
            let _ = self.trigger.set_low();
            return Err(e);
        }

        // Deadlines past the end of time wait as long as the clock allows.
        let start = self.clock.now();
        let deadline = start.checked_add(timeout).unwrap_or(Instant::MAX);
        let rise = self.wait_for_echo(true, deadline, EchoEdge::Rising)?;
        let deadline = rise.checked_add(timeout).unwrap_or(Instant::MAX);
        let fall = self.wait_for_echo(false, deadline, EchoEdge::Falling)?;

        Ok(fall
            .checked_duration_since(rise)
            .unwrap_or(Duration::from_ticks(0)))
    }

    fn fire_trigger(&mut self) -> Result<(), RangerError> {
        self.trigger.set_low().map_err(pin_fault)?;
        self.delay.delay_us(self.config.settle_us);
        self.trigger.set_high().map_err(pin_fault)?;
        self.delay.delay_us(self.config.trigger_pulse_us);
        self.trigger.set_low().map_err(pin_fault)
    }

    /// Busy-poll the echo line until its level equals `high`.
    ///
    /// Returns the clock reading taken in the iteration that saw the level.
    fn wait_for_echo(
        &mut self,
        high: bool,
        deadline: Instant,
        edge: EchoEdge,
    ) -> Result<Instant, RangerError> {
        loop {
            let now = self.clock.now();
            if self.echo.is_high().map_err(pin_fault)? == high {
                return Ok(now);
            }
            if now >= deadline {
                tracing::warn!(?edge, "Timed out waiting for echo");
                return Err(SensorFault::EchoTimeout(edge).into());
            }
        }
    }
}

impl<Trig, Echo, C, D> RangeSensor for Ranger<Trig, Echo, C, D>
where
    Trig: OutputPin,
    Echo: InputPin,
    C: Clock,
    D: DelayNs,
{
    fn measure(
        &mut self,
        unit: DistanceUnit,
    ) -> Result<f32, RangerError> {
        Ranger::measure(self, unit)
    }
}
