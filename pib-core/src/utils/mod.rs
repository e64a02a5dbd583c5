//! Utility re-exports for the robot core.
//!
//! - `hal`: clock and PWM output seams, plus adapters for embedded-hal PWM pins
//!   and the PCA9685 driver
//! - `controllers`: ultrasonic ranger, servo channels, differential drive and
//!   the system command intake

pub mod controllers;
pub mod hal;

pub use controllers::{
    drive::DriveController,
    pwm::{PwmCalibration, PwmChannel},
    ranger::{DistanceUnit, Ranger, RangerConfig},
    SystemController,
};
pub use embassy_time::{Duration, Instant};
