//! Differential drive over two servo channels.
//!
//! The two sides are mounted mirrored, so "forward" spins the clockwise side
//! clockwise and the counter-clockwise side counter-clockwise. Commands are
//! applied immediately; nothing runs between calls, the caller repeats or
//! stops as needed.

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use super::pwm::{ChannelError, PwmCalibration, PwmChannel};
use crate::utils::hal::PwmOutput;

/// Time given to both servos to settle at neutral after setup.
pub const SETTLE_DELAY_MS: u32 = 2_000;

/// Drive command variants.
///
/// Serialized as JSON with tag `"dc"`. `s` is the clockwise-side speed and
/// `s2` the optional counter-clockwise-side speed (defaults to `s`).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "dc", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Forward.
    F { s: f32, s2: Option<f32> },
    /// Backward.
    B { s: f32, s2: Option<f32> },
    /// Spin left in place.
    L { s: f32, s2: Option<f32> },
    /// Spin right in place.
    R { s: f32, s2: Option<f32> },
    /// Both sides to neutral.
    S,
}

/// Dispatches motion commands onto a pair of servo channels.
pub struct DriveController<P: PwmOutput> {
    cw_side: PwmChannel<P>,
    ccw_side: PwmChannel<P>,
    is_ready: bool,
}

impl<P: PwmOutput> DriveController<P> {
    /// Build a controller over two channels. Ready only if both are.
    pub fn new(
        cw_side: PwmChannel<P>,
        ccw_side: PwmChannel<P>,
    ) -> Self {
        let is_ready = cw_side.is_ready() && ccw_side.is_ready();
        if !is_ready {
            tracing::warn!(
                cw_ready = cw_side.is_ready(),
                ccw_ready = ccw_side.is_ready(),
                "Drive controller disabled"
            );
        }
        DriveController {
            cw_side,
            ccw_side,
            is_ready,
        }
    }

    /// Bring up both channels fail-soft and wait for the servos to settle.
    pub fn setup<D: DelayNs>(
        cw_output: P,
        ccw_output: P,
        cw_calibration: Option<PwmCalibration>,
        ccw_calibration: Option<PwmCalibration>,
        delay: &mut D,
    ) -> Self {
        let cw_side = PwmChannel::setup(cw_output, cw_calibration.unwrap_or_default());
        let ccw_side = PwmChannel::setup(ccw_output, ccw_calibration.unwrap_or_default());
        delay.delay_ms(SETTLE_DELAY_MS);
        Self::new(cw_side, ccw_side)
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Readiness as a `Result`, reporting the first side that is down.
    pub fn ensure_ready(&self) -> Result<(), ChannelError<P::Error>> {
        self.cw_side.ensure_ready()?;
        self.ccw_side.ensure_ready()
    }

    pub fn cw_side(&self) -> &PwmChannel<P> {
        &self.cw_side
    }

    pub fn ccw_side(&self) -> &PwmChannel<P> {
        &self.ccw_side
    }

    pub fn forward(
        &mut self,
        speed_cw: f32,
        speed_ccw: Option<f32>,
    ) {
        if self.is_ready {
            self.cw_side.drive_cw(speed_cw);
            self.ccw_side.drive_ccw(speed_ccw.unwrap_or(speed_cw));
        }
    }

    pub fn backward(
        &mut self,
        speed_cw: f32,
        speed_ccw: Option<f32>,
    ) {
        if self.is_ready {
            self.cw_side.drive_ccw(speed_cw);
            self.ccw_side.drive_cw(speed_ccw.unwrap_or(speed_cw));
        }
    }

    /// Spin in place to the left: both sides clockwise.
    pub fn turn_left(
        &mut self,
        speed_cw: f32,
        speed_ccw: Option<f32>,
    ) {
        if self.is_ready {
            self.cw_side.drive_cw(speed_cw);
            self.ccw_side.drive_cw(speed_ccw.unwrap_or(speed_cw));
        }
    }

    /// Spin in place to the right: both sides counter-clockwise.
    pub fn turn_right(
        &mut self,
        speed_cw: f32,
        speed_ccw: Option<f32>,
    ) {
        if self.is_ready {
            self.cw_side.drive_ccw(speed_cw);
            self.ccw_side.drive_ccw(speed_ccw.unwrap_or(speed_cw));
        }
    }

    pub fn stop(&mut self) {
        if self.is_ready {
            self.cw_side.stop();
            self.ccw_side.stop();
        }
    }

    /// Apply a [`DriveCommand`].
    pub fn execute(
        &mut self,
        command: DriveCommand,
    ) {
        match command {
            DriveCommand::F { s, s2 } => self.forward(s, s2),
            DriveCommand::B { s, s2 } => self.backward(s, s2),
            DriveCommand::L { s, s2 } => self.turn_left(s, s2),
            DriveCommand::R { s, s2 } => self.turn_right(s, s2),
            DriveCommand::S => self.stop(),
        }
    }
}
