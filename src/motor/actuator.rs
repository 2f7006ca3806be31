// Motor actuation capability
//
// The mission loop only ever talks to motors through this trait. Writes are
// best-effort: the caller logs failures and retries on the next tick.

use tracing::debug;

use super::mixing::{omni_mix, WheelSpeeds};

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Motor transport error: {0}")]
    Transport(String),

    #[error("Actuation channel closed")]
    Disconnected,
}

pub trait MotorActuator {
    /// Write per-wheel commands in percent ([-100, 100])
    fn set_wheel_speeds(&mut self, speeds: &WheelSpeeds) -> Result<(), ActuatorError>;

    /// Command an omni base by axis velocity
    ///
    /// `w` is the rotation expressed as wheel rim speed (mm/s).
    fn set_axis_velocity(&mut self, vx: f64, vy: f64, w: f64) -> Result<(), ActuatorError> {
        self.set_wheel_speeds(&omni_mix(vx, vy, w).quantize())
    }

    /// Terminal stop, issued when a mission completes or is cancelled
    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.set_wheel_speeds(&WheelSpeeds::zero())
    }
}

/// Actuator used in simulation: accepts every command and does nothing
#[derive(Debug, Default)]
pub struct NullActuator;

impl MotorActuator for NullActuator {
    fn set_wheel_speeds(&mut self, speeds: &WheelSpeeds) -> Result<(), ActuatorError> {
        debug!("Simulated wheel speeds: {:?}", speeds.as_array());
        Ok(())
    }
}
