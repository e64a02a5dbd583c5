//! Module Exports
//!
//! - `ranger`: ultrasonic distance measurement
//! - `pwm`: calibrated servo channel
//! - `drive`: differential drive over two servo channels

pub mod drive;
pub mod pwm;
pub mod ranger;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};

use crate::utils::hal::PwmOutput;
pub use drive::DriveCommand;
pub use ranger::{DistanceUnit, RangeSensor, RangerError, SensorFault};

/// Channel used to receive system commands (`SystemCommand` messages).
pub static SYSTEM_CHANNEL: embassy_sync::channel::Channel<
    CriticalSectionRawMutex,
    SystemCommand,
    16,
> = embassy_sync::channel::Channel::new();

/// Ranging command variants.
///
/// Serialized as JSON with tag `"rc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "rc", rename_all = "snake_case")]
pub enum RangeCommand {
    /// Take one reading, in `u` (centimeters if omitted).
    M { u: Option<DistanceUnit> },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "ct", rename_all = "snake_case")] // ct = command type
pub enum SystemCommand {
    D(DriveCommand),
    R(RangeCommand),
}

/// Decode a JSON command frame.
pub fn parse_command(frame: &[u8]) -> Result<SystemCommand, serde_json::Error> {
    serde_json::from_slice(frame)
}

pub struct SystemController<R, P: PwmOutput> {
    pub ranger: Option<R>,
    pub drive: drive::DriveController<P>,
}

impl<R, P> SystemController<R, P>
where
    R: RangeSensor,
    P: PwmOutput,
{
    pub fn new(
        ranger: Option<R>,
        drive: drive::DriveController<P>,
    ) -> Self {
        if !drive.is_ready() {
            tracing::warn!("Drive not ready, motion commands will be ignored");
        }
        SystemController { ranger, drive }
    }

    /// Execute one command. Returns the reading for range commands.
    pub fn execute_command(
        &mut self,
        command: SystemCommand,
    ) -> Result<Option<f32>, RangerError> {
        match command {
            SystemCommand::D(cmd) => {
                self.drive.execute(cmd);
                Ok(None)
            }
            SystemCommand::R(RangeCommand::M { u }) => {
                let ranger = self
                    .ranger
                    .as_mut()
                    .ok_or(RangerError::NotAttached)?;
                let distance = ranger.measure(u.unwrap_or(DistanceUnit::Centimeters))?;
                Ok(Some(distance))
            }
        }
    }

    /// Serve commands from `SYSTEM_CHANNEL` forever.
    pub async fn cmd_ch(&mut self) -> ! {
        loop {
            let command = SYSTEM_CHANNEL.receiver().receive().await;
            tracing::info!("Received Command: {:?}", command);
            match self.execute_command(command) {
                Ok(Some(distance)) => tracing::info!(distance, "Range read"),
                Ok(None) => tracing::info!("Command executed successfully"),
                Err(e) => tracing::error!("Command failed: {:?}", e),
            }
        }
    }
}
