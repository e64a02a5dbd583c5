//! Continuous-rotation servo channel driven by PWM duty cycle.
//!
//! A channel holds its calibration (neutral, full clockwise and full
//! counter-clockwise duty) and maps a speed percentage onto the duty between
//! neutral and the chosen extreme.
//!
//! Setup failures do not propagate out of [`PwmChannel::setup`]: the channel
//! simply stays not ready and every motion call becomes a no-op. A servo that
//! failed to come up must not start moving mid-maneuver, so check
//! [`PwmChannel::is_ready`] after construction.

use serde::{Deserialize, Serialize};

use crate::utils::hal::PwmOutput;

const DEFAULT_FREQUENCY_HZ: u32 = 50;
const DEFAULT_NEUTRAL_DUTY: f32 = 7.5;
const DEFAULT_MAX_CW_DUTY: f32 = 10.0;
const DEFAULT_MAX_CCW_DUTY: f32 = 5.0;

/// Errors raised while bringing a channel up.
#[derive(Debug)]
pub enum ChannelError<E: core::fmt::Debug> {
    /// Calibration outside `0..=100` percent, or a zero frequency.
    InvalidArgument,
    /// The PWM output rejected the request.
    Output(E),
    /// The channel was used before a successful `configure`.
    NotReady,
}

/// Per-servo calibration, in duty-cycle percent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PwmCalibration {
    pub frequency_hz: u32,
    pub neutral_duty: f32,
    pub max_cw_duty: f32,
    pub max_ccw_duty: f32,
}

impl Default for PwmCalibration {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            neutral_duty: DEFAULT_NEUTRAL_DUTY,
            max_cw_duty: DEFAULT_MAX_CW_DUTY,
            max_ccw_duty: DEFAULT_MAX_CCW_DUTY,
        }
    }
}

impl PwmCalibration {
    /// Every duty is a percentage and the frequency is non-zero.
    pub fn is_valid(&self) -> bool {
        let duties = [self.neutral_duty, self.max_cw_duty, self.max_ccw_duty];
        self.frequency_hz != 0 && duties.iter().all(|d| (0.0..=100.0).contains(d))
    }
}

/// One servo channel bound to a PWM output.
pub struct PwmChannel<P: PwmOutput> {
    output: P,
    calibration: PwmCalibration,
    current_duty: f32,
    is_ready: bool,
}

impl<P: PwmOutput> PwmChannel<P> {
    /// Bind a channel without starting the output. The channel is not ready
    /// until [`configure`](Self::configure) succeeds.
    pub fn new(
        output: P,
        calibration: PwmCalibration,
    ) -> Self {
        Self {
            output,
            current_duty: calibration.neutral_duty,
            calibration,
            is_ready: false,
        }
    }

    /// Bind and start a channel, swallowing any setup failure.
    pub fn setup(
        output: P,
        calibration: PwmCalibration,
    ) -> Self {
        let mut channel = Self::new(output, calibration);
        if let Err(e) = channel.configure() {
            tracing::warn!("PWM channel setup failed, channel disabled: {:?}", e);
        }
        channel
    }

    /// Validate the calibration and start the output at neutral duty.
    pub fn configure(&mut self) -> Result<(), ChannelError<P::Error>> {
        self.is_ready = false;
        if !self.calibration.is_valid() {
            return Err(ChannelError::InvalidArgument);
        }
        let PwmCalibration {
            frequency_hz,
            neutral_duty,
            ..
        } = self.calibration;
        self.output
            .start(frequency_hz, neutral_duty)
            .map_err(ChannelError::Output)?;
        self.current_duty = neutral_duty;
        self.is_ready = true;
        tracing::info!(frequency_hz, neutral_duty, "PWM channel ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Readiness as a `Result`, for callers that want to bail out with `?`.
    pub fn ensure_ready(&self) -> Result<(), ChannelError<P::Error>> {
        if self.is_ready {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }

    /// Duty currently applied to the output.
    pub fn current_duty(&self) -> f32 {
        self.current_duty
    }

    pub fn calibration(&self) -> &PwmCalibration {
        &self.calibration
    }

    pub fn output(&self) -> &P {
        &self.output
    }

    /// Duty for `speed` percent of the way from neutral to `extreme`.
    ///
    /// Speed is not clamped, values past 100 extrapolate beyond the extreme.
    pub fn duty_for(
        &self,
        extreme: f32,
        speed: f32,
    ) -> f32 {
        let neutral = self.calibration.neutral_duty;
        neutral + (extreme - neutral) * speed / 100.0
    }

    /// Rotate clockwise at `speed` percent.
    pub fn drive_cw(
        &mut self,
        speed: f32,
    ) {
        if self.is_ready {
            let duty = self.duty_for(self.calibration.max_cw_duty, speed);
            self.apply(duty);
        }
    }

    /// Rotate counter-clockwise at `speed` percent.
    pub fn drive_ccw(
        &mut self,
        speed: f32,
    ) {
        if self.is_ready {
            let duty = self.duty_for(self.calibration.max_ccw_duty, speed);
            self.apply(duty);
        }
    }

    /// Return to neutral duty.
    pub fn stop(&mut self) {
        if self.is_ready {
            self.apply(self.calibration.neutral_duty);
        }
    }

    /// Disable the output. The channel is not ready afterwards.
    pub fn shutdown(&mut self) {
        if !self.is_ready {
            return;
        }
        self.is_ready = false;
        if let Err(e) = self.output.stop() {
            tracing::error!("Failed to stop PWM output: {:?}", e);
        }
    }

    fn apply(
        &mut self,
        duty: f32,
    ) {
        match self.output.set_duty(duty) {
            Ok(()) => self.current_duty = duty,
            Err(e) => tracing::error!(duty, "PWM duty write failed: {:?}", e),
        }
    }
}

impl<P: PwmOutput> Drop for PwmChannel<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::cell::Cell;

    /// Output that records the last duty and can be told to fail.
    pub(crate) struct FakeOutput<'a> {
        pub duty: Option<f32>,
        pub frequency_hz: Option<u32>,
        pub fail_start: bool,
        pub fail_writes: bool,
        pub stopped: &'a Cell<bool>,
    }

    impl<'a> FakeOutput<'a> {
        pub(crate) fn new(stopped: &'a Cell<bool>) -> Self {
            Self {
                duty: None,
                frequency_hz: None,
                fail_start: false,
                fail_writes: false,
                stopped,
            }
        }
    }

    #[derive(Debug)]
    pub(crate) struct FakeError;

    impl PwmOutput for FakeOutput<'_> {
        type Error = FakeError;

        fn start(
            &mut self,
            frequency_hz: u32,
            duty_percent: f32,
        ) -> Result<(), Self::Error> {
            if self.fail_start {
                return Err(FakeError);
            }
            self.frequency_hz = Some(frequency_hz);
            self.duty = Some(duty_percent);
            Ok(())
        }

        fn set_duty(
            &mut self,
            duty_percent: f32,
        ) -> Result<(), Self::Error> {
            if self.fail_writes {
                return Err(FakeError);
            }
            self.duty = Some(duty_percent);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Self::Error> {
            self.stopped.set(true);
            Ok(())
        }
    }

    fn ready_channel(stopped: &Cell<bool>) -> PwmChannel<FakeOutput<'_>> {
        PwmChannel::setup(FakeOutput::new(stopped), PwmCalibration::default())
    }

    #[test]
    fn test_setup_starts_at_neutral() {
        let stopped = Cell::new(false);
        let ch = ready_channel(&stopped);
        assert!(ch.is_ready());
        assert_eq!(ch.current_duty(), 7.5);
        assert_eq!(ch.output().duty, Some(7.5));
        assert_eq!(ch.output().frequency_hz, Some(50));
    }

    #[test]
    fn test_drive_cw_follows_calibration() {
        let stopped = Cell::new(false);
        let mut ch = ready_channel(&stopped);
        for speed in [0.0f32, 12.5, 20.0, 50.0, 73.0, 100.0] {
            ch.drive_cw(speed);
            let expected = 7.5 + (10.0 - 7.5) * speed / 100.0;
            assert!((ch.current_duty() - expected).abs() < 1e-6);
            assert_eq!(ch.output().duty, Some(ch.current_duty()));
        }
    }

    #[test]
    fn test_drive_ccw_follows_calibration() {
        let stopped = Cell::new(false);
        let mut ch = ready_channel(&stopped);
        ch.drive_ccw(100.0);
        assert_eq!(ch.current_duty(), 5.0);
        ch.drive_ccw(50.0);
        assert_eq!(ch.current_duty(), 6.25);
    }

    #[test]
    fn test_stop_returns_to_neutral() {
        let stopped = Cell::new(false);
        let mut ch = ready_channel(&stopped);
        ch.drive_cw(80.0);
        ch.stop();
        assert_eq!(ch.current_duty(), 7.5);
        ch.drive_ccw(35.0);
        ch.stop();
        assert_eq!(ch.current_duty(), 7.5);
    }

    #[test]
    fn test_speed_is_not_clamped() {
        let stopped = Cell::new(false);
        let mut ch = ready_channel(&stopped);
        ch.drive_cw(200.0);
        assert_eq!(ch.current_duty(), 12.5);
    }

    #[test]
    fn test_failed_start_disables_channel() {
        let stopped = Cell::new(false);
        let mut out = FakeOutput::new(&stopped);
        out.fail_start = true;
        let mut ch = PwmChannel::setup(out, PwmCalibration::default());
        assert!(!ch.is_ready());
        assert!(matches!(ch.ensure_ready(), Err(ChannelError::NotReady)));

        ch.drive_cw(100.0);
        ch.drive_ccw(100.0);
        ch.stop();
        assert_eq!(ch.current_duty(), 7.5);
        assert_eq!(ch.output().duty, None);
    }

    #[test]
    fn test_invalid_calibration_rejected() {
        let stopped = Cell::new(false);
        let cal = PwmCalibration {
            max_cw_duty: 120.0,
            ..PwmCalibration::default()
        };
        let mut ch = PwmChannel::new(FakeOutput::new(&stopped), cal);
        assert!(matches!(ch.configure(), Err(ChannelError::InvalidArgument)));
        assert!(!ch.is_ready());

        let cal = PwmCalibration {
            frequency_hz: 0,
            ..PwmCalibration::default()
        };
        let mut ch = PwmChannel::new(FakeOutput::new(&stopped), cal);
        assert!(matches!(ch.configure(), Err(ChannelError::InvalidArgument)));
    }

    #[test]
    fn test_failed_write_keeps_last_duty() {
        let stopped = Cell::new(false);
        let mut out = FakeOutput::new(&stopped);
        out.fail_writes = true;
        let mut ch = PwmChannel::setup(out, PwmCalibration::default());
        assert!(ch.is_ready());

        ch.drive_cw(40.0);
        assert_eq!(ch.current_duty(), 7.5);
        assert_eq!(ch.output().duty, Some(7.5));
    }

    #[test]
    fn test_drop_stops_output() {
        let stopped = Cell::new(false);
        {
            let mut ch = ready_channel(&stopped);
            ch.drive_cw(10.0);
        }
        assert!(stopped.get());
    }

    #[test]
    fn test_shutdown_disables_motion() {
        let stopped = Cell::new(false);
        let mut ch = ready_channel(&stopped);
        ch.shutdown();
        assert!(stopped.get());
        assert!(!ch.is_ready());
        ch.drive_cw(100.0);
        assert_eq!(ch.current_duty(), 7.5);
    }

    #[test]
    fn test_unready_channel_is_not_stopped_on_drop() {
        let stopped = Cell::new(false);
        {
            let mut out = FakeOutput::new(&stopped);
            out.fail_start = true;
            let _ch = PwmChannel::setup(out, PwmCalibration::default());
        }
        assert!(!stopped.get());
    }
}
